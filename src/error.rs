//! Error types surfaced by handles and the registry.

use crate::registry::HandleId;
use thiserror::Error;

/// Returned when a null handle is dereferenced or compared by value.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
#[error("access through a null handle")]
pub struct NullAccessError;

/// Registry bookkeeping that no correct refcount sequence can produce.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum InvariantViolation {
    #[error("identity {0} is not registered")]
    UnknownIdentity(HandleId),
}
