//! History query errors
//!
//! Each variant carries a specific reason so callers can tell validation,
//! visibility and lookup failures apart.

use thiserror::Error;

use crate::data::DataError;

/// Coarse outcome class, mapped to an HTTP status by the API layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    NotFound,
    BadRequest,
    Forbidden,
    Internal,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Topic access denied")]
    TopicDenied,

    #[error("Signal access denied")]
    FieldDenied,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field not numeric: {0}")]
    NotNumeric(String),

    #[error("Field name reserved in aggregate queries: {0}")]
    ReservedField(String),

    #[error("Invalid interval")]
    InvalidInterval,

    #[error("Invalid aggregation")]
    InvalidAggregation,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Limit must be between 1 and {max}")]
    InvalidLimit { max: u32 },

    #[error(transparent)]
    Store(#[from] DataError),
}

impl QueryError {
    pub fn kind(&self) -> QueryErrorKind {
        match self {
            Self::UnknownTopic(_) => QueryErrorKind::NotFound,
            Self::TopicDenied | Self::FieldDenied => QueryErrorKind::Forbidden,
            Self::UnknownField(_)
            | Self::NotNumeric(_)
            | Self::ReservedField(_)
            | Self::InvalidInterval
            | Self::InvalidAggregation
            | Self::InvalidTimestamp(_)
            | Self::InvalidLimit { .. } => QueryErrorKind::BadRequest,
            Self::Store(_) => QueryErrorKind::Internal,
        }
    }
}
