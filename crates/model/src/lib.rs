//! # Ironloop Model
//!
//! The model adapter: translates sessions into Anthropic Messages API calls
//! and replies back into parts. Two concerns live here:
//!
//! - `convert` — wire rendering plus the ordering repairs the backend
//!   demands (requester-first, strict role alternation)
//! - `anthropic` — the HTTP client with retry, backoff, and cancellation

pub mod anthropic;
pub mod convert;

pub use anthropic::AnthropicClient;
