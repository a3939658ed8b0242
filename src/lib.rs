//! Feed aggregation engine for chat views.
//!
//! Raw transport messages are validated by [`message`], folded into
//! day-separated, author-nested entries by [`FeedStore`], and scroll requests
//! for the view layer are debounced by [`scroll::ScrollIntentScheduler`].

pub mod config;
pub mod date;
pub mod error;
pub mod feed;
pub mod logging;
pub mod message;
pub mod scroll;

pub use config::{ConfigLoader, ConfigPaths, FeedConfig};
pub use error::{FeedError, Result};
pub use feed::{FeedSnapshot, FeedStore, IdentityPatch, LoaderKind, LockKind};
pub use logging::init_tracing;
pub use message::{RawMessage, ValidationError};
pub use scroll::{ScrollError, ScrollIntent, ScrollIntentScheduler};
