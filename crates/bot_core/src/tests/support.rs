//! In-memory `BlinkoRepository` used by the bot_core tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use blinko_client::{BlinkoError, BlinkoRepository, BlinkoResult, ListQuery, NoteUpdate};
use shared::{
    domain::{Note, NoteId, NoteType, TagId, TagSummary},
    tags::extract_tags,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { content: String, note_type: NoteType },
    List(ListQuery),
    ListAll(ListQuery),
    Update(NoteUpdate),
    Delete(NoteId),
    Search(String),
    Tags,
    Upload { filename: String, len: usize },
    Fetch(String),
}

#[derive(Default)]
struct Store {
    notes: Vec<Note>,
    calls: Vec<Call>,
    next_id: i64,
}

#[derive(Clone, Default)]
pub struct FakeRepository {
    store: Arc<Mutex<Store>>,
    failing: Arc<AtomicBool>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        let repository = Self::new();
        {
            let mut store = repository.store.lock().expect("store");
            store.next_id = notes.iter().map(|note| note.id.0).max().unwrap_or(0);
            store.notes = notes;
        }
        repository
    }

    /// Every later call fails with a 500 status.
    pub fn fail_requests(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn notes(&self) -> Vec<Note> {
        self.store.lock().expect("store").notes.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.store.lock().expect("store").calls.clone()
    }

    pub fn created(&self) -> Vec<(String, NoteType)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { content, note_type } => Some((content, note_type)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> BlinkoResult<std::sync::MutexGuard<'_, Store>> {
        let mut store = self.store.lock().expect("store");
        store.calls.push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BlinkoError::Status {
                status: 500,
                body: "backend down".into(),
            });
        }
        Ok(store)
    }
}

pub fn note(id: i64, content: &str, note_type: NoteType, is_archived: bool) -> Note {
    Note {
        id: NoteId(id),
        content: content.to_string(),
        note_type,
        is_archived,
        created_at: None,
        tags: extract_tags(content),
    }
}

#[async_trait]
impl BlinkoRepository for FakeRepository {
    async fn create_note(&self, content: &str, note_type: NoteType) -> BlinkoResult<Note> {
        let mut store = self.record(Call::Create {
            content: content.to_string(),
            note_type,
        })?;
        store.next_id += 1;
        let created = note(store.next_id, content, note_type, false);
        store.notes.push(created.clone());
        Ok(created)
    }

    async fn list_notes(&self, query: ListQuery) -> BlinkoResult<Vec<Note>> {
        let store = self.record(Call::List(query.clone()))?;
        Ok(store
            .notes
            .iter()
            .filter(|note| query.matches(note))
            .take(query.size as usize)
            .cloned()
            .collect())
    }

    async fn list_all_notes(&self, query: ListQuery) -> BlinkoResult<Vec<Note>> {
        let store = self.record(Call::ListAll(query.clone()))?;
        Ok(store
            .notes
            .iter()
            .filter(|note| query.matches(note))
            .cloned()
            .collect())
    }

    async fn update_note(&self, update: NoteUpdate) -> BlinkoResult<()> {
        let mut store = self.record(Call::Update(update.clone()))?;
        if let Some(note) = store.notes.iter_mut().find(|note| note.id == update.id) {
            if let Some(content) = update.content {
                note.tags = extract_tags(&content);
                note.content = content;
            }
            if let Some(note_type) = update.note_type {
                note.note_type = note_type;
            }
            if let Some(is_archived) = update.is_archived {
                note.is_archived = is_archived;
            }
        }
        Ok(())
    }

    async fn delete_note(&self, id: NoteId) -> BlinkoResult<()> {
        let mut store = self.record(Call::Delete(id))?;
        store.notes.retain(|note| note.id != id);
        Ok(())
    }

    async fn search_notes(&self, query: &str) -> BlinkoResult<Vec<Note>> {
        let store = self.record(Call::Search(query.to_string()))?;
        // Blinko's search is fuzzy; the fake returns everything.
        Ok(store.notes.clone())
    }

    async fn list_tags(&self) -> BlinkoResult<Vec<TagSummary>> {
        let store = self.record(Call::Tags)?;
        let mut tags: Vec<TagSummary> = Vec::new();
        for note in &store.notes {
            for name in &note.tags {
                match tags.iter_mut().find(|tag| &tag.name == name) {
                    Some(tag) => tag.count = tag.count.map(|count| count + 1),
                    None => tags.push(TagSummary {
                        id: TagId(tags.len() as i64 + 1),
                        name: name.clone(),
                        count: Some(1),
                    }),
                }
            }
        }
        Ok(tags)
    }

    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> BlinkoResult<String> {
        self.record(Call::Upload {
            filename: filename.to_string(),
            len: bytes.len(),
        })?;
        Ok(format!("/api/file/{filename}"))
    }

    async fn fetch_attachment(&self, url: &str) -> BlinkoResult<Vec<u8>> {
        self.record(Call::Fetch(url.to_string()))?;
        if url.contains("missing") {
            return Err(BlinkoError::Status {
                status: 404,
                body: "gone".into(),
            });
        }
        Ok(url.as_bytes().to_vec())
    }
}
