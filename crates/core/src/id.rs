//! Unique identifiers for aecflow entities.
//!
//! Every identifier is a [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrapper parameterized by its own domain marker, so an
//! [`AecId`] can never be passed where a [`WorkspaceId`] is expected.
//!
//! All ID types are `Copy` and support:
//! - `v4()` for random UUID generation
//! - `nil()` for zero-valued default
//! - `parse(&str)` for string parsing
//! - serde (serializes as UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(pub AecIdDomain => AecId);
define_uuid!(pub WorkspaceIdDomain => WorkspaceId);
// Random v4 values: a run id doubles as the lock token, so it must not be guessable
// from a neighbouring run.
define_uuid!(pub RunIdDomain => RunId);
