//! Request and response bodies of the Blinko REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Note, NoteId, NoteType, TagId, TagSummary, UnknownNoteType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertNoteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub note_type: Option<NoteType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotesRequest {
    pub page: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    pub order_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteRequest {
    pub note_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub note_type: i64,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<NoteTagLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTagLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// Blinko answers `note/list` with either a bare array or `{ "notes": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NoteListResponse {
    Bare(Vec<NoteRecord>),
    Wrapped {
        #[serde(default)]
        notes: Vec<NoteRecord>,
    },
}

impl NoteListResponse {
    pub fn into_records(self) -> Vec<NoteRecord> {
        match self {
            NoteListResponse::Bare(notes) | NoteListResponse::Wrapped { notes } => notes,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub data: Option<UploadData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadData {
    #[serde(default)]
    pub url: Option<String>,
}

impl UploadResponse {
    pub fn uploaded_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|data| data.url.as_deref()))
            .filter(|url| !url.is_empty())
    }
}

impl TryFrom<NoteRecord> for Note {
    type Error = UnknownNoteType;

    fn try_from(record: NoteRecord) -> Result<Self, Self::Error> {
        let note_type = NoteType::try_from(record.note_type)?;
        let created_at = record
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc));
        let tags = record
            .tags
            .into_iter()
            .filter_map(|link| link.tag.map(|tag| tag.name))
            .filter(|name| !name.is_empty())
            .collect();

        Ok(Note {
            id: NoteId(record.id),
            content: record.content,
            note_type,
            is_archived: record.is_archived,
            created_at,
            tags,
        })
    }
}

impl From<TagRecord> for TagSummary {
    fn from(record: TagRecord) -> Self {
        Self {
            id: TagId(record.id),
            name: record.name,
            count: record.count,
        }
    }
}
