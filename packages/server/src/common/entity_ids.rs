//! Typed ID aliases for the pipeline's entities.

pub use super::id::{Id, V4, V7};

/// Marker type for job postings.
pub struct Posting;

/// Marker type for queue jobs.
pub struct QueueJob;

/// Typed ID for postings.
pub type PostingId = Id<Posting>;

/// Typed ID for queue jobs.
pub type JobId = Id<QueueJob>;

/// User IDs are opaque subjects issued by the account service.
pub type UserId = String;
