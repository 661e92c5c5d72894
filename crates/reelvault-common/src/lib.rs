//! ReelVault Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the ReelVault workspace.
//!
//! # Overview
//!
//! - **Types**: the normalized entity records produced by the fetcher and
//!   persisted by the storage backends
//! - **Error Handling**: Common error type and result alias
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use reelvault_common::types::{EntityRecord, User};
//!
//! let user = User {
//!     id: "42".to_string(),
//!     username: "someone".to_string(),
//!     follower_count: 10,
//!     following_count: 3,
//!     video_count: 7,
//!     fetched_at: chrono::Utc::now(),
//! };
//! let record = EntityRecord::User(user);
//! assert_eq!(record.key(), "42");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ReelError, Result};
pub use types::{EntityKind, EntityRecord};
