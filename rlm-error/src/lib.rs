//! # rlm-error
//!
//! Unified error handling for rlm, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., CapabilityDenied, RateLimited)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use rlm_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::RecursionDepthExceeded, "depth 2 exceeds max 1")
//!         .with_operation("engine::dispatch")
//!         .with_context("depth", "2")
//!         .with_context("max_depth", "1"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, rlm_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using rlm Error
pub type Result<T> = std::result::Result<T, Error>;
