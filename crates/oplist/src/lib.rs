#![forbid(unsafe_code)]

//! Operation List
//!
//! Undo/redo history for an editable schema object model. Every mutation is
//! registered before it is applied; the list keeps a snapshot of the
//! pre-mutation state and can replay the history backward and forward.
//!
//! # Key Components
//!
//! - [`OperationList`] - The timeline: registration, cursor, size cap
//! - [`SnapshotPool`] - Reference-counted arena of object snapshots
//! - [`ChainCoordinator`] - Groups consecutive operations into atomic units
//! - [`ProgressSink`] - Per-operation notifications during undo/redo
//! - [`ObjectModel`] / [`ModelObject`] - What a host model must provide
//! - [`MemoryModel`] - In-memory model used by tests and embedders
//!
//! # Example
//!
//! ```
//! use oplist::{
//!     MemoryModel, ObjectId, ObjectModel, ObjectType, OperationKind, OperationList, Placement,
//!     SchemaObject,
//! };
//!
//! let mut model = MemoryModel::new();
//! let users = ObjectId::new(1);
//! model
//!     .insert_object(SchemaObject::new(users, "users", ObjectType::Table), Placement::root())
//!     .unwrap();
//!
//! let mut history = OperationList::new(model);
//! history
//!     .register_object(users, OperationKind::Modified, Placement::root())
//!     .unwrap();
//! history.model_mut().object_mut(users).unwrap().set_comment("accounts");
//!
//! history.undo_operation().unwrap().unwrap();
//! assert_eq!(history.model().object(users).unwrap().comment(), "");
//! ```
//!
//! # Threading
//!
//! Everything is synchronous and single-threaded. The only process-wide
//! state is the default maximum history size in [`config`].

pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod memory;
pub mod object;
pub mod operation;
pub mod pool;
pub mod validate;

pub use chain::{ChainCoordinator, chain_bounds};
pub use config::{
    ConfigError, DEFAULT_MAXIMUM_SIZE, OperationListConfig, maximum_size, set_maximum_size,
};
pub use error::OperationError;
pub use executor::{Direction, NoProgress, ProgressEvent, ProgressSink, Replay};
pub use history::OperationList;
pub use memory::{MemoryModel, SchemaObject};
pub use object::{ModelError, ModelObject, ObjectId, ObjectModel, ObjectType, Placement};
pub use operation::{ChainRole, Operation, OperationInfo, OperationKind};
pub use pool::{PoolIndex, SnapshotPool};
