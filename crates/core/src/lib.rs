//! # aecflow core
//!
//! Identifiers shared by every aecflow crate.
//!
//! ```rust
//! use aecflow_core::{AecId, RunId, WorkspaceId};
//!
//! let aec = AecId::v4();
//! let workspace = WorkspaceId::v4();
//! let run = RunId::v4();
//! assert_ne!(aec.to_string(), run.to_string());
//! # let _ = workspace;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod id;

pub use id::*;
