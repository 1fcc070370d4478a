use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::{Note, NoteId, NoteType, TagId, TagSummary},
    protocol::{
        BatchDeleteRequest, ListNotesRequest, NoteListResponse, NoteRecord, TagRecord,
        UploadResponse, UpsertNoteRequest,
    },
    tags::extract_tags,
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// `note/list` pages are over-fetched by this factor because Blinko ignores
/// the type filter; filtering happens client-side.
const LIST_OVERFETCH_FACTOR: u32 = 5;
const SEARCH_PAGE_SIZE: u32 = 9999;
/// Upper bound for `list_all_notes`, in case the backend ignores `page`.
const MAX_LIST_PAGES: u32 = 200;

#[derive(Debug, Error)]
pub enum BlinkoError {
    #[error("invalid Blinko base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("API request failed: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("unexpected Blinko response: {0}")]
    Decode(String),
    #[error("upload response did not include a file url")]
    MissingUploadUrl,
}

pub type BlinkoResult<T> = Result<T, BlinkoError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub size: u32,
    pub note_type: Option<NoteType>,
    pub tag_id: Option<TagId>,
    pub archived: Option<bool>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            size: 30,
            note_type: None,
            tag_id: None,
            archived: None,
        }
    }
}

impl ListQuery {
    pub fn open_todos(size: u32) -> Self {
        Self {
            size,
            note_type: Some(NoteType::Todo),
            archived: Some(false),
            ..Self::default()
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        self.note_type.map_or(true, |kind| note.note_type == kind)
            && self.archived.map_or(true, |archived| note.is_archived == archived)
    }
}

/// Partial update; `None` fields are left untouched by Blinko.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpdate {
    pub id: NoteId,
    pub content: Option<String>,
    pub note_type: Option<NoteType>,
    pub is_archived: Option<bool>,
}

impl NoteUpdate {
    pub fn archive(id: NoteId) -> Self {
        Self {
            id,
            content: None,
            note_type: None,
            is_archived: Some(true),
        }
    }

    pub fn content(id: NoteId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: Some(content.into()),
            note_type: None,
            is_archived: None,
        }
    }
}

#[async_trait]
pub trait BlinkoRepository: Send + Sync {
    async fn create_note(&self, content: &str, note_type: NoteType) -> BlinkoResult<Note>;
    async fn list_notes(&self, query: ListQuery) -> BlinkoResult<Vec<Note>>;
    /// Every note matching `query`, walking pages from `query.page` until a
    /// short page comes back. `query.size` is the page size.
    async fn list_all_notes(&self, query: ListQuery) -> BlinkoResult<Vec<Note>>;
    async fn update_note(&self, update: NoteUpdate) -> BlinkoResult<()>;
    async fn delete_note(&self, id: NoteId) -> BlinkoResult<()>;
    async fn search_notes(&self, query: &str) -> BlinkoResult<Vec<Note>>;
    async fn list_tags(&self) -> BlinkoResult<Vec<TagSummary>>;
    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> BlinkoResult<String>;
    async fn fetch_attachment(&self, url: &str) -> BlinkoResult<Vec<u8>>;
}

pub struct BlinkoClient {
    http: Client,
    base_url: String,
    token: String,
}

impl BlinkoClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> BlinkoResult<Self> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> BlinkoResult<Response> {
        debug!(path, "blinko POST");
        let request = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.token)
            .json(body);
        send_checked(request).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> BlinkoResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        decode_json(self.post(path, body).await?).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BlinkoResult<T> {
        debug!(path, "blinko GET");
        let request = self.http.get(self.endpoint(path)).bearer_auth(&self.token);
        decode_json(send_checked(request).await?).await
    }

    async fn fetch_records(&self, body: &ListNotesRequest) -> BlinkoResult<Vec<NoteRecord>> {
        let response: NoteListResponse = self.post_json("/v1/note/list", body).await?;
        Ok(response.into_records())
    }
}

fn into_notes(records: Vec<NoteRecord>) -> impl Iterator<Item = Note> {
    records.into_iter().filter_map(|record| {
        let id = record.id;
        Note::try_from(record)
            .map_err(|error| debug!(note_id = id, %error, "skipping note"))
            .ok()
    })
}

fn list_request(query: &ListQuery, page: u32, size: u32) -> ListNotesRequest {
    ListNotesRequest {
        page,
        size,
        tag_id: query.tag_id.map(|id| id.0),
        search_text: None,
        order_by: "desc".into(),
    }
}

#[async_trait]
impl BlinkoRepository for BlinkoClient {
    async fn create_note(&self, content: &str, note_type: NoteType) -> BlinkoResult<Note> {
        // Tags are not sent separately; Blinko parses them from the content.
        let body = UpsertNoteRequest {
            content: Some(content.to_string()),
            note_type: Some(note_type),
            ..Default::default()
        };
        let response: Value = self.post_json("/v1/note/upsert", &body).await?;
        let id = response
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| BlinkoError::Decode("upsert response is missing the note id".into()))?;

        Ok(Note {
            id: NoteId(id),
            content: content.to_string(),
            note_type,
            is_archived: false,
            created_at: None,
            tags: extract_tags(content),
        })
    }

    async fn list_notes(&self, query: ListQuery) -> BlinkoResult<Vec<Note>> {
        let size = query.size.saturating_mul(LIST_OVERFETCH_FACTOR);
        let records = self.fetch_records(&list_request(&query, query.page, size)).await?;
        Ok(into_notes(records)
            .filter(|note| query.matches(note))
            .take(query.size as usize)
            .collect())
    }

    async fn list_all_notes(&self, query: ListQuery) -> BlinkoResult<Vec<Note>> {
        let size = query.size.max(1);
        let first = query.page.max(1);
        let mut notes = Vec::new();
        for page in first..first.saturating_add(MAX_LIST_PAGES) {
            let records = self.fetch_records(&list_request(&query, page, size)).await?;
            let fetched = records.len();
            notes.extend(into_notes(records).filter(|note| query.matches(note)));
            if fetched < size as usize {
                debug!(pages = page - first + 1, notes = notes.len(), "listed all notes");
                return Ok(notes);
            }
        }
        warn!(pages = MAX_LIST_PAGES, "note listing stopped at the page limit");
        Ok(notes)
    }

    async fn update_note(&self, update: NoteUpdate) -> BlinkoResult<()> {
        let body = UpsertNoteRequest {
            id: Some(update.id.0),
            content: update.content,
            note_type: update.note_type,
            is_archived: update.is_archived,
        };
        self.post("/v1/note/upsert", &body).await?;
        Ok(())
    }

    async fn delete_note(&self, id: NoteId) -> BlinkoResult<()> {
        let body = BatchDeleteRequest {
            note_ids: vec![id.0],
        };
        self.post("/v1/note/batch-delete", &body).await?;
        Ok(())
    }

    async fn search_notes(&self, query: &str) -> BlinkoResult<Vec<Note>> {
        let body = ListNotesRequest {
            page: 1,
            size: SEARCH_PAGE_SIZE,
            tag_id: None,
            search_text: Some(query.to_string()),
            order_by: "desc".into(),
        };
        Ok(into_notes(self.fetch_records(&body).await?).collect())
    }

    async fn list_tags(&self) -> BlinkoResult<Vec<TagSummary>> {
        let tags: Vec<TagRecord> = self.get_json("/v1/tags/list").await?;
        Ok(tags.into_iter().map(TagSummary::from).collect())
    }

    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> BlinkoResult<String> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let request = self
            .http
            .post(self.endpoint("/v1/file/upload"))
            .bearer_auth(&self.token)
            .multipart(form);
        let response: UploadResponse = decode_json(send_checked(request).await?).await?;
        match response.uploaded_url() {
            Some(url) => Ok(url.to_string()),
            None => {
                warn!(filename, "upload response did not include a url");
                Err(BlinkoError::MissingUploadUrl)
            }
        }
    }

    async fn fetch_attachment(&self, url: &str) -> BlinkoResult<Vec<u8>> {
        let response = send_checked(self.http.get(url)).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

async fn send_checked(request: RequestBuilder) -> BlinkoResult<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(BlinkoError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> BlinkoResult<T> {
    let raw = response.text().await?;
    serde_json::from_str(&raw).map_err(|error| BlinkoError::Decode(error.to_string()))
}

fn normalize_base_url(raw: &str) -> BlinkoResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|error| BlinkoError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: error.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BlinkoError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
