use std::collections::HashMap;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_with::skip_serializing_none;
use strum::{AsRefStr, Display, EnumString};
use time::{Date, OffsetDateTime};

use crate::date;
use crate::error::FeedError;
use crate::message::{FileDescriptor, Line, LineId, Locks, UserId};

pub type EntryId = String;

pub(crate) fn mint_entry_id() -> EntryId {
    uuid::Uuid::new_v4().to_string()
}

/// Day boundary marker heading a [`Group`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Separator {
    pub id: EntryId,
    /// Beginning of the day in the feed's calendar offset.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(serialize_with = "serialize_day")]
    pub day: Date,
}

fn serialize_day<S: Serializer>(day: &Date, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date::format_day(*day))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub id: EntryId,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub user_id: UserId,
    pub content: Vec<Line>,
    pub inserted_at: u64,
    pub updated_at: u64,
}

impl MessageEntry {
    pub fn lines_for<'a>(&'a self, line_id: &'a str) -> impl Iterator<Item = &'a Line> + 'a {
        self.content.iter().filter(move |line| line.id == line_id)
    }

    pub(crate) fn sync_date(&mut self) {
        if let Some(first) = self.content.first() {
            self.date = first.date;
        }
    }
}

/// Owned entry, as handed to the view layer in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entry {
    Separator(Separator),
    Message(MessageEntry),
}

impl Entry {
    pub fn id(&self) -> &str {
        match self {
            Entry::Separator(separator) => &separator.id,
            Entry::Message(message) => &message.id,
        }
    }

    pub fn date(&self) -> OffsetDateTime {
        match self {
            Entry::Separator(separator) => separator.date,
            Entry::Message(message) => message.date,
        }
    }
}

/// Borrowed entry yielded while walking a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryRef<'a> {
    Separator(&'a Separator),
    Message(&'a MessageEntry),
}

impl EntryRef<'_> {
    pub fn to_owned_entry(self) -> Entry {
        match self {
            EntryRef::Separator(separator) => Entry::Separator(separator.clone()),
            EntryRef::Message(message) => Entry::Message(message.clone()),
        }
    }
}

/// One calendar day of the feed: a separator followed by message entry ids
/// in feed order. The separator is stored inline so a group can never lack
/// one.
#[derive(Debug, Clone)]
pub(crate) struct Group {
    pub(crate) separator: Separator,
    pub(crate) messages: Vec<EntryId>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupView<'a> {
    pub(crate) group: &'a Group,
    pub(crate) entries: &'a HashMap<EntryId, MessageEntry>,
}

impl<'a> GroupView<'a> {
    pub fn separator(&self) -> &'a Separator {
        &self.group.separator
    }

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &'a MessageEntry> + 'a {
        let entries = self.entries;
        self.group
            .messages
            .iter()
            .filter_map(move |entry_id| entries.get(entry_id))
    }

    pub fn entries(&self) -> impl Iterator<Item = EntryRef<'a>> + 'a {
        std::iter::once(EntryRef::Separator(self.separator()))
            .chain(self.messages().map(EntryRef::Message))
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl Identity {
    pub(crate) fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_owned(),
            name: None,
            avatar: None,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LockKind {
    Reactions,
    Actions,
}

impl LockKind {
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        LockKind::from_str(raw).map_err(|_| FeedError::UnknownAction {
            raw: raw.to_owned(),
        })
    }

    pub fn flag(self) -> Locks {
        match self {
            LockKind::Reactions => Locks::REACTIONS,
            LockKind::Actions => Locks::ACTIONS,
        }
    }
}

/// History loaders shown at either end of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LoaderKind {
    Backwards,
    Forwards,
}

impl LoaderKind {
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        LoaderKind::from_str(raw).map_err(|_| FeedError::UnknownLoader {
            raw: raw.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Loaders {
    pub backwards: bool,
    pub forwards: bool,
}

impl Loaders {
    pub fn get(&self, kind: LoaderKind) -> bool {
        match kind {
            LoaderKind::Backwards => self.backwards,
            LoaderKind::Forwards => self.forwards,
        }
    }

    pub(crate) fn slot(&mut self, kind: LoaderKind) -> &mut bool {
        match kind {
            LoaderKind::Backwards => &mut self.backwards,
            LoaderKind::Forwards => &mut self.forwards,
        }
    }

    pub fn any(&self) -> bool {
        self.backwards || self.forwards
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSnapshot {
    pub entries: Vec<Entry>,
}

/// Owned copy of everything the view layer renders from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub groups: Vec<GroupSnapshot>,
    pub identities: IndexMap<UserId, Identity>,
    pub loaders: Loaders,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRef {
    pub id: LineId,
    pub file: FileDescriptor,
}

/// File lines surrounding a file in feed order, used by the file viewer to
/// page through media.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileAdjacents {
    pub before: Vec<FileRef>,
    pub after: Vec<FileRef>,
}
