//! Aula Core - Shared Types
//!
//! Query key registry, remote error taxonomy and backend payload types.
//! Every other Aula crate depends on this one; it performs no I/O.

pub mod error;
pub mod identity;
pub mod keys;
pub mod types;

pub use error::{ErrorKind, RemoteError, ValidationError};
pub use identity::{Role, UserId, UserSession};
pub use keys::{key_for, Domain, Entity, KeySegment, QueryKey};
pub use types::*;
