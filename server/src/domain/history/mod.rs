//! History and topic listing for the read API
//!
//! Validates caller requests against the registry, the live table layout and
//! the caller's visibility rules, then hands a checked query plan to the
//! store.

mod acl;
mod error;
mod request;
mod service;

pub use acl::AccessControl;
pub use error::{QueryError, QueryErrorKind};
pub use request::HistoryParams;
pub use service::{HistoryResponse, HistoryService, TopicSummary};
