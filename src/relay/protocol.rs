//! Relay wire format: JSON text frames `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::types::{File, Message, ProjectSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChange {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RelayEvent {
    RequestProjectData,
    ProjectData(Option<ProjectSnapshot>),
    ShareProjectData(ProjectSnapshot),
    CodeChange(CodeChange),
    FileCreated(File),
    FileDeleted(String),
    NewMessage(Message),
    Error(String),
}

impl RelayEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestProjectData => "request-project-data",
            Self::ProjectData(_) => "project-data",
            Self::ShareProjectData(_) => "share-project-data",
            Self::CodeChange(_) => "code-change",
            Self::FileCreated(_) => "file-created",
            Self::FileDeleted(_) => "file-deleted",
            Self::NewMessage(_) => "new-message",
            Self::Error(_) => "error",
        }
    }

    /// Events that rewrite project files and so need the admin.
    #[must_use]
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::ShareProjectData(_) | Self::CodeChange(_) | Self::FileCreated(_) | Self::FileDeleted(_)
        )
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}
