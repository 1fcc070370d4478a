use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(NoteId);
id_newtype!(TagId);

/// Blinko note kind, carried on the wire as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum NoteType {
    Flash,
    Todo,
}

impl NoteType {
    pub const fn code(self) -> i64 {
        match self {
            NoteType::Flash => 0,
            NoteType::Todo => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            NoteType::Flash => "flash",
            NoteType::Todo => "todo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown note type code {0}")]
pub struct UnknownNoteType(pub i64);

impl TryFrom<i64> for NoteType {
    type Error = UnknownNoteType;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NoteType::Flash),
            1 => Ok(NoteType::Todo),
            other => Err(UnknownNoteType(other)),
        }
    }
}

impl From<NoteType> for i64 {
    fn from(value: NoteType) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub note_type: NoteType,
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Note {
    /// Category used for grouping: the first Blinko tag, if any.
    pub fn category(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: TagId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// An open todo as shown to the user; `position` is the 1-based number
/// accepted by `#done`, `#del` and `#edit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoItem {
    pub position: usize,
    pub note_id: NoteId,
    pub content: String,
    pub category: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
}
