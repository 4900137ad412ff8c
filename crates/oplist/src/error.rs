#![forbid(unsafe_code)]

//! Errors reported by the operation list.
//!
//! Expected control flow never goes through these: an unavailable undo or
//! redo is `None`, not an error. They cover a registration naming an object
//! the model does not know, history scrubbed by the validator right before a
//! replay, and a model refusing one step of a replayed chain.

use thiserror::Error;

use crate::object::{ModelError, ObjectId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The object to register is not present in the model.
    #[error("object {0} not found in model")]
    ObjectNotFound(ObjectId),

    /// The validator dropped records that no longer have restorable state.
    /// Nothing was replayed; the caller may retry on the cleaned history.
    #[error("{dropped} operation(s) invalidated before replay")]
    InvalidatedOperations { dropped: usize },

    /// The model refused one step of a chain. Steps already applied were
    /// compensated and the cursor did not move.
    #[error("chain aborted at operation {position} on object {object}: {source}")]
    ChainAborted {
        position: usize,
        object: ObjectId,
        #[source]
        source: ModelError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            OperationError::ObjectNotFound(ObjectId::new(4)).to_string(),
            "object #4 not found in model"
        );
        assert_eq!(
            OperationError::InvalidatedOperations { dropped: 2 }.to_string(),
            "2 operation(s) invalidated before replay"
        );
        let aborted = OperationError::ChainAborted {
            position: 3,
            object: ObjectId::new(8),
            source: ModelError::NotFound(ObjectId::new(8)),
        };
        assert!(aborted.to_string().starts_with("chain aborted at operation 3"));
    }

    #[test]
    fn aborted_chain_exposes_model_error() {
        use std::error::Error as _;
        let aborted = OperationError::ChainAborted {
            position: 0,
            object: ObjectId::new(1),
            source: ModelError::Duplicate(ObjectId::new(1)),
        };
        let source = aborted.source().expect("model error is the source");
        assert_eq!(source.to_string(), "object #1 already present in model");
    }
}
