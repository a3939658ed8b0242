use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::Result;

use super::{FileDescriptor, LineKind, LineProperties, Reaction};

/// Message as handed over by the transport layer.
///
/// Every field is optional at the type level so that validation, not
/// deserialization, decides what is missing and reports it by name.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Option<String>,
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub from: Option<RawSender>,
    pub content: Option<Value>,
    pub reactions: Option<Vec<Reaction>>,
    pub metas: Option<RawMetas>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSender {
    #[serde(alias = "jid")]
    pub user_id: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetas {
    pub encrypted: Option<bool>,
    pub secure: Option<bool>,
    pub edited: Option<bool>,
    pub transient: Option<bool>,
}

impl RawMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_batch(raw: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn text(
        id: impl Into<String>,
        date: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(LineKind::Text.to_string()),
            date: Some(date.into()),
            from: Some(RawSender::new(user_id)),
            content: Some(Value::String(text.into())),
            ..Self::default()
        }
    }

    pub fn files(
        id: impl Into<String>,
        date: impl Into<String>,
        user_id: impl Into<String>,
        files: Vec<FileDescriptor>,
    ) -> Self {
        let content = files
            .into_iter()
            .map(|file| serde_json::to_value(file).unwrap_or(Value::Null))
            .collect();
        Self {
            id: Some(id.into()),
            kind: Some(LineKind::File.to_string()),
            date: Some(date.into()),
            from: Some(RawSender::new(user_id)),
            content: Some(Value::Array(content)),
            ..Self::default()
        }
    }

    /// Partial update carrying only a kind and content, as sent for edits.
    pub fn diff(kind: LineKind, content: Value) -> Self {
        Self {
            kind: Some(kind.to_string()),
            content: Some(content),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_date(mut self, date: OffsetDateTime) -> Self {
        self.date = date.format(&Rfc3339).ok();
        self
    }

    pub fn with_sender(mut self, user_id: impl Into<String>) -> Self {
        self.from = Some(RawSender::new(user_id));
        self
    }

    pub fn with_reactions(mut self, reactions: Vec<Reaction>) -> Self {
        self.reactions = Some(reactions);
        self
    }

    pub fn with_metas(mut self, metas: RawMetas) -> Self {
        self.metas = Some(metas);
        self
    }
}

impl RawSender {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

impl RawMetas {
    pub fn to_properties(self) -> LineProperties {
        let mut properties = LineProperties::empty();
        properties.set(LineProperties::ENCRYPTED, self.encrypted.unwrap_or(false));
        properties.set(LineProperties::SECURE, self.secure.unwrap_or(false));
        properties.set(LineProperties::EDITED, self.edited.unwrap_or(false));
        properties.set(LineProperties::TRANSIENT, self.transient.unwrap_or(false));
        properties
    }

    pub fn from_properties(properties: LineProperties) -> Option<Self> {
        if properties.is_empty() {
            return None;
        }
        let flag = |bit| properties.contains(bit).then_some(true);
        Some(Self {
            encrypted: flag(LineProperties::ENCRYPTED),
            secure: flag(LineProperties::SECURE),
            edited: flag(LineProperties::EDITED),
            transient: flag(LineProperties::TRANSIENT),
        })
    }
}
