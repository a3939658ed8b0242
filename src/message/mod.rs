//! Inbound message validation and the typed `Line` model.
//!
//! Raw transport objects are checked here once; everything past this module
//! works with `Line`s whose shape is already known to be valid.

use std::str::FromStr;

use bitflags::bitflags;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use serde_with::skip_serializing_none;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::date;
use crate::feed::{EntryId, Separator};

mod raw;

pub use raw::{RawMessage, RawMetas, RawSender};

pub type LineId = String;
pub type UserId = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is incomplete (missing `{field}`)")]
    MissingField { field: &'static str },

    #[error("message date `{raw}` is invalid (cannot parse)")]
    InvalidDate { raw: String },

    #[error("message kind `{raw}` is not recognized, allowed values: text, file")]
    UnknownKind { raw: String },

    #[error("message content is invalid for kind `{kind}`: {reason}")]
    InvalidContent { kind: LineKind, reason: String },
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LineKind {
    Text,
    File,
}

impl LineKind {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        LineKind::from_str(raw).map_err(|_| ValidationError::UnknownKind { raw: raw.to_owned() })
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Other,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub url: String,
    pub preview: Option<FilePreview>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePreview {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub reaction: String,
    pub authors: Vec<String>,
}

/// Reaction state of a line.
///
/// `Cleared` is not the same as `Absent`: a partial update carrying an empty
/// list must wipe existing reactions, one without the key must keep them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Reactions {
    #[default]
    Absent,
    Cleared,
    List(Vec<Reaction>),
}

impl Reactions {
    pub fn from_raw(raw: Option<Vec<Reaction>>) -> Self {
        match raw {
            None => Reactions::Absent,
            Some(list) if list.is_empty() => Reactions::Cleared,
            Some(list) => Reactions::List(list),
        }
    }

    pub fn to_raw(&self) -> Option<Vec<Reaction>> {
        match self {
            Reactions::Absent => None,
            Reactions::Cleared => Some(Vec::new()),
            Reactions::List(list) => Some(list.clone()),
        }
    }

    pub fn as_slice(&self) -> &[Reaction] {
        match self {
            Reactions::List(list) => list,
            Reactions::Absent | Reactions::Cleared => &[],
        }
    }

    /// Applies a patch: `Absent` leaves `self` untouched.
    pub fn apply(&mut self, patch: Reactions) {
        if patch != Reactions::Absent {
            *self = patch;
        }
    }
}

impl Serialize for Reactions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LineProperties: u8 {
        const ENCRYPTED = 1 << 0;
        const SECURE = 1 << 1;
        const EDITED = 1 << 2;
        const TRANSIENT = 1 << 3;
    }
}

bitflags! {
    /// Popover locks pinned open on a line by the view layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Locks: u8 {
        const REACTIONS = 1 << 0;
        const ACTIONS = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineBody {
    Text { text: String, highlighted: bool },
    File { file: FileDescriptor },
}

impl LineBody {
    pub fn kind(&self) -> LineKind {
        match self {
            LineBody::Text { .. } => LineKind::Text,
            LineBody::File { .. } => LineKind::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub id: LineId,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(flatten)]
    pub body: LineBody,
    pub reactions: Reactions,
    #[serde(serialize_with = "serialize_properties")]
    pub properties: LineProperties,
    #[serde(serialize_with = "serialize_locks")]
    locks: Option<Locks>,
}

impl Line {
    pub fn new(id: impl Into<LineId>, date: OffsetDateTime, body: LineBody) -> Self {
        Self {
            id: id.into(),
            date,
            body,
            reactions: Reactions::Absent,
            properties: LineProperties::empty(),
            locks: None,
        }
    }

    pub fn kind(&self) -> LineKind {
        self.body.kind()
    }

    pub fn is_file(&self) -> bool {
        self.kind() == LineKind::File
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            LineBody::Text { text, .. } => Some(text),
            LineBody::File { .. } => None,
        }
    }

    pub fn file(&self) -> Option<&FileDescriptor> {
        match &self.body {
            LineBody::File { file } => Some(file),
            LineBody::Text { .. } => None,
        }
    }

    pub fn is_highlighted(&self) -> bool {
        matches!(self.body, LineBody::Text { highlighted: true, .. })
    }

    /// Returns whether the flag changed. File lines cannot carry a highlight.
    pub fn set_highlighted(&mut self, value: bool) -> bool {
        match &mut self.body {
            LineBody::Text { highlighted, .. } if *highlighted != value => {
                *highlighted = value;
                true
            }
            _ => false,
        }
    }

    pub fn locks(&self) -> Option<Locks> {
        self.locks
    }

    /// Returns whether the lock set changed. Releasing the last lock drops
    /// the set entirely rather than leaving it empty.
    pub fn set_lock(&mut self, lock: Locks, active: bool) -> bool {
        let before = self.locks;
        let mut next = before.unwrap_or_else(Locks::empty);
        next.set(lock, active);
        self.locks = if next.is_empty() { None } else { Some(next) };
        self.locks != before
    }

    /// Field-level merge of an update onto this line. Interaction state
    /// (locks, highlight) survives as long as the body kind allows it.
    pub(crate) fn merge(&mut self, update: Line, properties: Option<LineProperties>) {
        let highlighted = self.is_highlighted();
        self.id = update.id;
        self.date = update.date;
        self.body = update.body;
        if highlighted {
            self.set_highlighted(true);
        }
        self.reactions.apply(update.reactions);
        if let Some(properties) = properties {
            self.properties = properties;
        }
    }
}

fn serialize_properties<S: Serializer>(
    properties: &LineProperties,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    RawMetas::from_properties(*properties)
        .unwrap_or_default()
        .serialize(serializer)
}

fn serialize_locks<S: Serializer>(locks: &Option<Locks>, serializer: S) -> Result<S::Ok, S::Error> {
    let Some(locks) = locks else {
        return serializer.serialize_none();
    };
    let mut map = serializer.serialize_map(None)?;
    if locks.contains(Locks::REACTIONS) {
        map.serialize_entry("reactions", &true)?;
    }
    if locks.contains(Locks::ACTIONS) {
        map.serialize_entry("actions", &true)?;
    }
    map.end()
}

/// Output of [`transform`]: line bodies plus the metadata shared by all of
/// them. Ids and dates are attached by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub kind: LineKind,
    pub bodies: Vec<LineBody>,
    pub reactions: Reactions,
    pub properties: Option<LineProperties>,
}

impl Transformed {
    pub fn has_files(&self) -> bool {
        self.kind == LineKind::File
    }

    pub fn into_lines(self, id: &str, date: OffsetDateTime) -> Vec<Line> {
        let Transformed {
            bodies,
            reactions,
            properties,
            ..
        } = self;
        bodies
            .into_iter()
            .map(|body| Line {
                reactions: reactions.clone(),
                properties: properties.unwrap_or_default(),
                ..Line::new(id, date, body)
            })
            .collect()
    }
}

/// Fully validated inbound message, ready for injection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMessage {
    pub id: LineId,
    pub date: OffsetDateTime,
    pub user_id: UserId,
    pub lines: Vec<Line>,
}

impl ValidatedMessage {
    pub fn has_files(&self) -> bool {
        self.lines.iter().any(Line::is_file)
    }
}

/// Validated partial update. Only `kind` and `content` are mandatory.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDiff {
    pub id: Option<LineId>,
    /// Checked for well-formedness only; updates keep the stored date.
    pub date: Option<OffsetDateTime>,
    pub user_id: Option<UserId>,
    pub transformed: Transformed,
}

pub fn transform(kind: LineKind, raw: &RawMessage) -> Result<Transformed, ValidationError> {
    let content = raw
        .content
        .as_ref()
        .filter(|content| !content.is_null())
        .ok_or(ValidationError::MissingField { field: "content" })?;
    let bodies = match kind {
        LineKind::Text => {
            let Value::String(text) = content else {
                return Err(ValidationError::InvalidContent {
                    kind,
                    reason: "text content should be a string".into(),
                });
            };
            vec![LineBody::Text {
                text: text.clone(),
                highlighted: false,
            }]
        }
        LineKind::File => parse_files(content)?
            .into_iter()
            .map(|file| LineBody::File { file })
            .collect(),
    };
    Ok(Transformed {
        kind,
        bodies,
        reactions: Reactions::from_raw(raw.reactions.clone()),
        properties: raw.metas.map(RawMetas::to_properties),
    })
}

pub fn validate(raw: &RawMessage) -> Result<ValidatedMessage, ValidationError> {
    let id = required(raw.id.as_deref(), "id")?;
    let kind = LineKind::parse(required(raw.kind.as_deref(), "kind")?)?;
    let date = parse_date(required(raw.date.as_deref(), "date")?)?;
    let user_id = required(
        raw.from.as_ref().and_then(|from| from.user_id.as_deref()),
        "from.userId",
    )?;
    let transformed = transform(kind, raw)?;
    Ok(ValidatedMessage {
        id: id.to_owned(),
        date,
        user_id: user_id.to_owned(),
        lines: transformed.into_lines(id, date),
    })
}

pub fn validate_diff(raw: &RawMessage) -> Result<ValidatedDiff, ValidationError> {
    let kind = LineKind::parse(required(raw.kind.as_deref(), "kind")?)?;
    let transformed = transform(kind, raw)?;
    let date = raw.date.as_deref().map(parse_date).transpose()?;
    Ok(ValidatedDiff {
        id: raw.id.clone().filter(|id| !id.is_empty()),
        date,
        user_id: raw
            .from
            .as_ref()
            .and_then(|from| from.user_id.clone())
            .filter(|user_id| !user_id.is_empty()),
        transformed,
    })
}

pub fn make_separator(id: EntryId, reference: OffsetDateTime, offset: UtcOffset) -> Separator {
    Separator {
        id,
        date: date::beginning_of_day(reference, offset),
        day: date::day_of(reference, offset),
    }
}

pub fn parse_date(raw: &str) -> Result<OffsetDateTime, ValidationError> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|_| ValidationError::InvalidDate {
        raw: raw.to_owned(),
    })
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ValidationError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(ValidationError::MissingField { field })
}

#[derive(Debug, Deserialize)]
struct RawFile {
    name: Option<String>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    url: Option<String>,
    preview: Option<FilePreview>,
}

fn parse_files(content: &Value) -> Result<Vec<FileDescriptor>, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidContent {
        kind: LineKind::File,
        reason,
    };
    let items = match content {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => std::slice::from_ref(content),
        _ => return Err(invalid("file content should be a list of files".into())),
    };
    if items.is_empty() {
        return Err(invalid("file content is empty".into()));
    }
    items
        .iter()
        .map(|item| {
            let file = RawFile::deserialize(item).map_err(|err| invalid(err.to_string()))?;
            let (Some(name), Some(file_type), Some(url)) = (file.name, file.file_type, file.url)
            else {
                return Err(invalid("file should have 'type', 'name' and 'url'".into()));
            };
            let file_type = FileType::from_str(&file_type).map_err(|_| {
                let allowed: Vec<_> = FileType::iter().map(|known| known.to_string()).collect();
                invalid(format!(
                    "file type `{file_type}` is not recognized, allowed values: {}",
                    allowed.join(", ")
                ))
            })?;
            Ok(FileDescriptor {
                name,
                file_type,
                url,
                preview: file.preview,
            })
        })
        .collect()
}
