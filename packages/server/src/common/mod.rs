// Common types and utilities shared across the pipeline

pub mod entity_ids;
pub mod id;
pub mod vector;

pub use entity_ids::*;
pub use id::{Id, V4, V7};
pub use vector::cosine_similarity;
