// Response artifacts: the unit appended to the conversation log and rendered

use serde::Serialize;

use crate::agents::Intent;
use crate::dataset::DataTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// Serialized as `{"kind": .., "payload": ..}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ArtifactPayload {
    Text(String),
    Table(DataTable),
    Image {
        path: String,
    },
    /// User-facing message; `detail` carries diagnostics for operators
    Notice {
        level: NoticeLevel,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseArtifact {
    /// The classified intent this artifact answers
    pub source: Intent,
    #[serde(flatten)]
    pub payload: ArtifactPayload,
}

impl ResponseArtifact {
    pub fn text(source: Intent, text: impl Into<String>) -> Self {
        Self {
            source,
            payload: ArtifactPayload::Text(text.into()),
        }
    }

    pub fn table(source: Intent, table: DataTable) -> Self {
        Self {
            source,
            payload: ArtifactPayload::Table(table),
        }
    }

    pub fn image(source: Intent, path: impl Into<String>) -> Self {
        Self {
            source,
            payload: ArtifactPayload::Image { path: path.into() },
        }
    }

    pub fn warning(source: Intent, message: impl Into<String>) -> Self {
        Self {
            source,
            payload: ArtifactPayload::Notice {
                level: NoticeLevel::Warning,
                message: message.into(),
                detail: None,
            },
        }
    }

    pub fn error(source: Intent, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            source,
            payload: ArtifactPayload::Notice {
                level: NoticeLevel::Error,
                message: message.into(),
                detail,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.payload {
            ArtifactPayload::Text(_) => "text",
            ArtifactPayload::Table(_) => "table",
            ArtifactPayload::Image { .. } => "image",
            ArtifactPayload::Notice {
                level: NoticeLevel::Warning,
                ..
            } => "warning",
            ArtifactPayload::Notice {
                level: NoticeLevel::Error,
                ..
            } => "error",
        }
    }
}
