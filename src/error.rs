//! Error types surfaced by the feed engine.
//!
//! Every failure here is a caller bug (bad input, unknown identifier, misuse
//! of the scroll scheduler), never a transient condition. Operations report
//! them before mutating anything, so an `Err` always means "nothing applied".

use thiserror::Error;

use crate::message::ValidationError;
use crate::scroll::ScrollError;

pub type Result<T, E = FeedError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("message `{id}` already exists in the feed")]
    DuplicateId { id: String },

    #[error("message `{id}` does not exist in the feed")]
    NotFound { id: String },

    #[error("interaction action `{raw}` is invalid, allowed values: reactions, actions")]
    UnknownAction { raw: String },

    #[error("loader type `{raw}` is invalid, allowed values: backwards, forwards")]
    UnknownLoader { raw: String },

    #[error(transparent)]
    Scroll(#[from] ScrollError),

    #[error("decoding raw message json")]
    Decode(#[from] serde_json::Error),
}
