//! The feed store: day groups of author-nested message entries.
//!
//! Messages enter through [`FeedStore::insert`] (newest history, appended at
//! the tail) or [`FeedStore::restore`] (older history, prepended at the
//! head). Both run the same injection routine, which differs only in which
//! end of the feed acts as the boundary.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::config::FeedConfig;
use crate::date;
use crate::error::{FeedError, Result};
use crate::message::{
    self, LineId, LineKind, RawMessage, RawMetas, RawSender, UserId, ValidatedMessage,
};
use crate::scroll::{ScrollIntent, ScrollIntentScheduler};

mod model;

pub use model::{
    Entry, EntryId, EntryRef, FeedSnapshot, FileAdjacents, FileRef, GroupSnapshot, GroupView,
    Identity, IdentityPatch, LoaderKind, Loaders, LockKind, MessageEntry, Separator,
};

use model::{mint_entry_id, Group};

/// Line kinds that may carry the store-wide highlight.
const HIGHLIGHTABLE_KINDS: &[LineKind] = &[LineKind::Text];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Append,
    Prepend,
}

#[derive(Debug)]
pub struct FeedStore {
    nesting_window: Duration,
    offset: UtcOffset,
    groups: VecDeque<Group>,
    entries_by_id: HashMap<EntryId, MessageEntry>,
    entry_id_for_line_id: HashMap<LineId, EntryId>,
    identities: IndexMap<UserId, Identity>,
    loaders: Loaders,
    revision: u64,
    scroll: ScrollIntentScheduler,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStore {
    pub fn new() -> Self {
        Self::with_config(&FeedConfig::default())
    }

    pub fn with_config(config: &FeedConfig) -> Self {
        Self {
            nesting_window: config.nesting.window(),
            offset: config.calendar.offset(),
            groups: VecDeque::new(),
            entries_by_id: HashMap::new(),
            entry_id_for_line_id: HashMap::new(),
            identities: IndexMap::new(),
            loaders: Loaders::default(),
            revision: 0,
            scroll: ScrollIntentScheduler::new(&config.scroll),
        }
    }

    // --> QUERIES <--

    pub fn exists(&self, message_id: &str) -> bool {
        self.entry_id_for_line_id.contains_key(message_id)
    }

    /// Rebuilds the inbound shape of a stored message, as far as the feed
    /// still knows it.
    pub fn resolve(&self, message_id: &str) -> Option<RawMessage> {
        let entry = self.owning_entry(message_id)?;
        let mut lines = entry.lines_for(message_id).peekable();
        let first = lines.peek().copied()?;
        let kind = first.kind();
        let content = match kind {
            LineKind::Text => Value::String(first.text().unwrap_or_default().to_owned()),
            LineKind::File => Value::Array(
                lines
                    .filter_map(|line| line.file())
                    .filter_map(|file| serde_json::to_value(file).ok())
                    .collect(),
            ),
        };
        Some(RawMessage {
            id: Some(first.id.clone()),
            kind: Some(kind.to_string()),
            date: first.date.format(&Rfc3339).ok(),
            from: Some(RawSender::new(entry.user_id.clone())),
            content: Some(content),
            reactions: first.reactions.to_raw(),
            metas: RawMetas::from_properties(first.properties),
        })
    }

    pub fn groups(&self) -> impl DoubleEndedIterator<Item = GroupView<'_>> + '_ {
        self.groups.iter().map(|group| GroupView {
            group,
            entries: &self.entries_by_id,
        })
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            groups: self
                .groups()
                .map(|group| GroupSnapshot {
                    entries: group.entries().map(EntryRef::to_owned_entry).collect(),
                })
                .collect(),
            identities: self.identities.clone(),
            loaders: self.loaders,
        }
    }

    pub fn entry(&self, entry_id: &str) -> Option<&MessageEntry> {
        self.entries_by_id.get(entry_id)
    }

    pub fn entry_id_for(&self, message_id: &str) -> Option<&EntryId> {
        self.entry_id_for_line_id.get(message_id)
    }

    pub fn identity(&self, user_id: &str) -> Option<&Identity> {
        self.identities.get(user_id)
    }

    pub fn loaders(&self) -> Loaders {
        self.loaders
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.entry_id_for_line_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// File lines around the file `url` of message `message_id`, in feed
    /// order.
    pub fn file_adjacents(&self, message_id: &str, url: &str) -> Option<FileAdjacents> {
        let files: Vec<FileRef> = self
            .groups()
            .flat_map(|group| group.messages())
            .flat_map(|entry| entry.content.iter())
            .filter_map(|line| {
                line.file().map(|file| FileRef {
                    id: line.id.clone(),
                    file: file.clone(),
                })
            })
            .collect();
        let position = files
            .iter()
            .position(|candidate| candidate.id == message_id && candidate.file.url == url)?;
        let mut before = files;
        let after = before.split_off(position + 1);
        before.truncate(position);
        Some(FileAdjacents { before, after })
    }

    /// Next scroll intent whose debounce delay has elapsed.
    pub fn poll_scroll_intent(&mut self) -> Option<ScrollIntent> {
        self.scroll.poll()
    }

    pub fn scroll(&self) -> &ScrollIntentScheduler {
        &self.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollIntentScheduler {
        &mut self.scroll
    }

    // --> MUTATIONS <--

    /// Appends messages at the live end of the feed.
    pub fn insert(&mut self, messages: &[RawMessage]) -> Result<bool> {
        let batch = self.validate_batch(messages)?;
        let Some(last_id) = batch.last().map(|message| message.id.clone()) else {
            return Ok(false);
        };
        let was_empty = self.groups.is_empty();
        for message in batch {
            self.inject_one(Direction::Append, message);
        }
        self.schedule_scroll_to(last_id, was_empty);
        Ok(true)
    }

    /// Prepends older history at the head of the feed.
    pub fn restore(&mut self, messages: &[RawMessage]) -> Result<bool> {
        let batch = self.validate_batch(messages)?;
        if batch.is_empty() {
            return Ok(false);
        }
        for message in batch {
            self.inject_one(Direction::Prepend, message);
        }
        self.schedule_preserve_after_prepend();
        Ok(true)
    }

    /// Applies a partial update to message `message_id`. When the diff
    /// carries a different id, the message is re-keyed under it.
    ///
    /// Lines keep their stored date: a dated diff is validated but never
    /// moves a message to another day group or out of its nesting window.
    pub fn update(&mut self, message_id: &str, diff: &RawMessage) -> Result<bool> {
        let entry_id = self
            .entry_id_for_line_id
            .get(message_id)
            .cloned()
            .ok_or_else(|| FeedError::NotFound {
                id: message_id.to_owned(),
            })?;
        let diff = message::validate_diff(diff)?;
        let target_id = diff.id.clone().unwrap_or_else(|| message_id.to_owned());
        if target_id != message_id && self.entry_id_for_line_id.contains_key(&target_id) {
            return Err(FeedError::DuplicateId { id: target_id });
        }
        let is_last_entry = self.last_entry_id() == Some(&entry_id);
        let revision = self.next_revision();

        let Some(entry) = self.entries_by_id.get_mut(&entry_id) else {
            return Err(FeedError::NotFound {
                id: message_id.to_owned(),
            });
        };
        let Some(start) = entry.content.iter().position(|line| line.id == message_id) else {
            return Err(FeedError::NotFound {
                id: message_id.to_owned(),
            });
        };
        let matched = entry.content[start..]
            .iter()
            .take_while(|line| line.id == message_id)
            .count();

        let previous: Vec<_> = entry.content.drain(start..start + matched).collect();
        let date = previous[0].date;
        let properties = diff.transformed.properties;
        let merged: Vec<_> = diff
            .transformed
            .into_lines(&target_id, date)
            .into_iter()
            .enumerate()
            .map(|(index, update)| {
                let mut line = previous
                    .get(index)
                    .unwrap_or(&previous[previous.len() - 1])
                    .clone();
                line.merge(update, properties);
                line
            })
            .collect();
        let end = start + merged.len();
        entry.content.splice(start..start, merged);
        if let Some(user_id) = diff.user_id {
            entry.user_id = user_id;
        }
        entry.updated_at = revision;
        let touches_tail = is_last_entry && end == entry.content.len();

        if target_id != message_id {
            self.entry_id_for_line_id.remove(message_id);
            self.entry_id_for_line_id
                .insert(target_id.clone(), entry_id.clone());
            tracing::debug!(from = message_id, to = %target_id, "message re-keyed");
        }
        tracing::debug!(id = %target_id, entry = %entry_id, "message updated");
        if touches_tail {
            self.schedule_scroll_to(target_id, false);
        }
        Ok(true)
    }

    /// Removes message `message_id`, pruning its entry, separator and group
    /// when they end up empty.
    pub fn retract(&mut self, message_id: &str) -> bool {
        let Some(entry_id) = self.entry_id_for_line_id.remove(message_id) else {
            return false;
        };
        let revision = self.next_revision();
        let Some(entry) = self.entries_by_id.get_mut(&entry_id) else {
            return false;
        };
        let before = entry.content.len();
        entry.content.retain(|line| line.id != message_id);
        if entry.content.len() == before {
            return false;
        }
        if entry.content.is_empty() {
            self.remove_entry(&entry_id);
        } else {
            entry.sync_date();
            entry.updated_at = revision;
        }
        tracing::debug!(id = message_id, entry = %entry_id, "message retracted");
        true
    }

    /// Empties the store. Returns `false` when there was nothing to clear.
    pub fn flush(&mut self) -> bool {
        let had_state = !self.groups.is_empty()
            || !self.identities.is_empty()
            || self.loaders.any()
            || self.scroll.is_pending();
        self.identities.clear();
        self.loaders = Loaders::default();
        self.groups.clear();
        self.entries_by_id.clear();
        self.entry_id_for_line_id.clear();
        self.scroll.cancel();
        if had_state {
            tracing::debug!("feed flushed");
        }
        had_state
    }

    /// Moves the store-wide highlight to `message_id`, or clears it with
    /// `None`. Returns whether the target got highlighted.
    pub fn highlight(&mut self, message_id: Option<&str>) -> bool {
        let revision = self.next_revision();
        'scan: for group in self.groups.iter().rev() {
            for entry_id in group.messages.iter().rev() {
                let Some(entry) = self.entries_by_id.get_mut(entry_id) else {
                    continue;
                };
                for line in entry.content.iter_mut().rev() {
                    if line.set_highlighted(false) {
                        entry.updated_at = revision;
                        break 'scan;
                    }
                }
            }
        }

        let Some(message_id) = message_id else {
            return false;
        };
        let Some(entry_id) = self.entry_id_for_line_id.get(message_id) else {
            return false;
        };
        let Some(entry) = self.entries_by_id.get_mut(entry_id) else {
            return false;
        };
        let Some(line) = entry
            .content
            .iter_mut()
            .find(|line| line.id == message_id && HIGHLIGHTABLE_KINDS.contains(&line.kind()))
        else {
            return false;
        };
        line.set_highlighted(true);
        entry.updated_at = revision;
        true
    }

    /// Pins (or releases) a popover lock on message `message_id`.
    pub fn interact(&mut self, message_id: &str, action: LockKind, active: bool) -> bool {
        let revision = self.next_revision();
        let Some(entry_id) = self.entry_id_for_line_id.get(message_id) else {
            return false;
        };
        let Some(entry) = self.entries_by_id.get_mut(entry_id) else {
            return false;
        };
        let mut changed = false;
        for line in entry.content.iter_mut().filter(|line| line.id == message_id) {
            changed |= line.set_lock(action.flag(), active);
        }
        if changed {
            entry.updated_at = revision;
        }
        changed
    }

    /// Merges (`Some`) or forgets (`None`) the display identity of
    /// `user_id`. Returns whether the registry changed, including a record
    /// being created or removed. Entries by that user are marked for
    /// re-render only when a visible field changed.
    pub fn identify(&mut self, user_id: &str, identity: Option<IdentityPatch>) -> bool {
        let (changed, visible_changed) = match identity {
            Some(patch) => {
                let created = !self.identities.contains_key(user_id);
                let current = self
                    .identities
                    .entry(user_id.to_owned())
                    .or_insert_with(|| Identity::new(user_id));
                let before = (current.name.clone(), current.avatar.clone());
                if let Some(name) = patch.name {
                    current.name = Some(name);
                }
                if let Some(avatar) = patch.avatar {
                    current.avatar = Some(avatar);
                }
                let visible_changed = before != (current.name.clone(), current.avatar.clone());
                (created || visible_changed, visible_changed)
            }
            None => match self.identities.shift_remove(user_id) {
                Some(removed) => (true, removed.name.is_some() || removed.avatar.is_some()),
                None => (false, false),
            },
        };
        if visible_changed {
            let revision = self.next_revision();
            let mut touched = 0usize;
            for entry in self
                .entries_by_id
                .values_mut()
                .filter(|entry| entry.user_id == user_id)
            {
                entry.updated_at = revision;
                touched += 1;
            }
            tracing::debug!(user = user_id, touched, "identity changed");
        }
        changed
    }

    /// Shows or hides a history loader; `None` flips it.
    pub fn loader(&mut self, kind: LoaderKind, visible: Option<bool>) -> bool {
        let slot = self.loaders.slot(kind);
        let next = visible.unwrap_or(!*slot);
        let changed = *slot != next;
        *slot = next;
        changed
    }

    // --> INJECTION <--

    fn validate_batch(&self, messages: &[RawMessage]) -> Result<Vec<ValidatedMessage>> {
        let mut seen = HashSet::new();
        messages
            .iter()
            .map(|raw| {
                let message = message::validate(raw)?;
                if self.entry_id_for_line_id.contains_key(&message.id)
                    || !seen.insert(message.id.clone())
                {
                    return Err(FeedError::DuplicateId { id: message.id });
                }
                Ok(message)
            })
            .collect()
    }

    fn inject_one(&mut self, direction: Direction, message: ValidatedMessage) {
        let revision = self.next_revision();
        let window = self.nesting_window;
        let group_index = self.boundary_group(direction, message.date);
        let group = &self.groups[group_index];
        let nested_id = match direction {
            Direction::Append => group.messages.last(),
            Direction::Prepend => group.messages.first(),
        }
        .cloned();

        if let Some(nested_id) = nested_id {
            if let Some(nested) = self.entries_by_id.get_mut(&nested_id) {
                let adjacent = match direction {
                    Direction::Append => nested.content.last(),
                    Direction::Prepend => nested.content.first(),
                };
                let within_window = adjacent
                    .map(|line| date::is_within(message.date, line.date, window))
                    .unwrap_or(false);
                if nested.user_id == message.user_id && !message.has_files() && within_window {
                    tracing::trace!(id = %message.id, entry = %nested_id, ?direction, "nesting into entry");
                    match direction {
                        Direction::Append => nested.content.extend(message.lines),
                        Direction::Prepend => {
                            nested.content.splice(0..0, message.lines);
                        }
                    }
                    nested.sync_date();
                    nested.updated_at = revision;
                    self.entry_id_for_line_id.insert(message.id, nested_id);
                    return;
                }
            }
        }

        let entry_id = mint_entry_id();
        tracing::trace!(id = %message.id, entry = %entry_id, ?direction, "new entry");
        let entry = MessageEntry {
            id: entry_id.clone(),
            date: message.date,
            user_id: message.user_id,
            content: message.lines,
            inserted_at: revision,
            updated_at: revision,
        };
        self.entry_id_for_line_id
            .insert(message.id, entry_id.clone());
        self.entries_by_id.insert(entry_id.clone(), entry);
        let group = &mut self.groups[group_index];
        match direction {
            Direction::Append => group.messages.push(entry_id),
            Direction::Prepend => group.messages.insert(0, entry_id),
        }
    }

    /// Index of the group a message dated `at` lands in, creating a fresh
    /// separator and group at the relevant end when the boundary entry is on
    /// another day. Append compares against the tail entry; prepend against
    /// the head separator, which it reuses when the day matches.
    fn boundary_group(&mut self, direction: Direction, at: OffsetDateTime) -> usize {
        let boundary = match direction {
            Direction::Append => self.groups.back().map(|group| {
                group
                    .messages
                    .last()
                    .and_then(|entry_id| self.entries_by_id.get(entry_id))
                    .map(|entry| entry.date)
                    .unwrap_or(group.separator.date)
            }),
            Direction::Prepend => self.groups.front().map(|group| group.separator.date),
        };
        let reusable = boundary
            .map(|boundary| date::are_same_day(boundary, at, self.offset))
            .unwrap_or(false);
        if reusable {
            return match direction {
                Direction::Append => self.groups.len() - 1,
                Direction::Prepend => 0,
            };
        }

        let separator = message::make_separator(mint_entry_id(), at, self.offset);
        tracing::trace!(day = %date::format_day(separator.day), ?direction, "new day group");
        let group = Group {
            separator,
            messages: Vec::new(),
        };
        match direction {
            Direction::Append => {
                self.groups.push_back(group);
                self.groups.len() - 1
            }
            Direction::Prepend => {
                self.groups.push_front(group);
                0
            }
        }
    }

    fn remove_entry(&mut self, entry_id: &str) {
        self.entries_by_id.remove(entry_id);
        let Some(group_index) = self
            .groups
            .iter()
            .position(|group| group.messages.iter().any(|id| id == entry_id))
        else {
            return;
        };
        let group = &mut self.groups[group_index];
        group.messages.retain(|id| id != entry_id);
        if group.messages.is_empty() {
            self.groups.remove(group_index);
        }
    }

    fn owning_entry(&self, message_id: &str) -> Option<&MessageEntry> {
        self.entry_id_for_line_id
            .get(message_id)
            .and_then(|entry_id| self.entries_by_id.get(entry_id))
    }

    fn last_entry_id(&self) -> Option<&EntryId> {
        self.groups.back().and_then(|group| group.messages.last())
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// The store is the scheduler's only client and never trips its
    /// pending-intent check: it cancels the parked intent explicitly and
    /// parks the replacement. A parked forced scroll keeps its `forced` flag.
    fn schedule_scroll_to(&mut self, message_id: LineId, forced: bool) {
        let pending_forced = matches!(
            self.scroll.pending(),
            Some(ScrollIntent::ScrollTo { forced: true, .. })
        );
        let intent = ScrollIntent::ScrollTo {
            message_id,
            forced: forced || pending_forced,
        };
        self.scroll.supersede(intent, false);
    }

    /// Cancels and replaces any parked intent, except a parked scroll-to,
    /// which is kept.
    fn schedule_preserve_after_prepend(&mut self) {
        if matches!(self.scroll.pending(), Some(ScrollIntent::ScrollTo { .. })) {
            return;
        }
        self.scroll
            .supersede(ScrollIntent::PreserveAfterPrepend, false);
    }
}
