use thiserror::Error;

use crate::{ObjectRef, PoolId, SymbolId};

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("out of memory: live object limit of {limit} reached")]
    OutOfMemory { limit: usize },
    #[error("pool corruption: {object:?} is not registered in pool {pool:?}")]
    PoolCorruption { pool: PoolId, object: ObjectRef },
    #[error("dangling object reference {0:?}")]
    DanglingReference(ObjectRef),
    #[error("object of class '{class}' has no '{attribute}' attribute")]
    NoSuchAttribute { class: String, attribute: String },
    #[error("assignment to the class attribute is not permitted")]
    ClassAttributeAssignment,
    #[error("type mismatch: expected '{expected}', got '{found}'")]
    TypeMismatch { expected: String, found: String },
    #[error("no method '{name}' applicable to class '{class}'")]
    NoMethod { name: String, class: String },
    #[error("symbol '{name}' is undefined")]
    Undefined { name: String },
    #[error("call to a non-function of class '{class}'")]
    NotCallable { class: String },
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("'{attribute}' is already an attribute of class '{class}'")]
    DuplicateAttribute { class: String, attribute: String },
    #[error("symbol {0:?} is reserved and cannot name an attribute")]
    ReservedSymbol(SymbolId),
    #[error("making '{superclass}' a superclass of '{class}' creates a cycle")]
    CyclicHierarchy { class: String, superclass: String },
    #[error("unknown allocation pool {0:?}")]
    UnknownPool(PoolId),
    #[error("the collector pool lives as long as the runtime")]
    ReleaseGcPool,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("invalid runtime settings: {0}")]
    InvalidSettings(&'static str),
}

impl RuntimeError {
    /// Fatal errors mean the runtime's own bookkeeping can no longer be
    /// trusted; the driver must stop instead of moving to the next
    /// statement.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. }
                | Self::PoolCorruption { .. }
                | Self::DanglingReference(_)
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(RuntimeError::OutOfMemory { limit: 4 }.is_fatal());
        assert!(
            RuntimeError::PoolCorruption {
                pool: PoolId::GC,
                object: ObjectRef::new(3, 0),
            }
            .is_fatal()
        );
        assert!(!RuntimeError::ClassAttributeAssignment.is_fatal());
        assert!(
            !RuntimeError::Undefined {
                name: "x".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn messages_name_the_offender() {
        let err = RuntimeError::NoSuchAttribute {
            class: "real".into(),
            attribute: "dim".into(),
        };
        assert_eq!(
            err.to_string(),
            "object of class 'real' has no 'dim' attribute"
        );
    }
}
