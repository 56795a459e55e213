// Job Feed - Pipeline Core
//
// This crate ingests job postings from external boards, embeds them through
// the Gemini API and ranks them against user profile vectors.
//
// Infrastructure lives in kernel/, business logic in domains/*.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
