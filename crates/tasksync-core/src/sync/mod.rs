//! Offline sync: validates client operation batches, applies them in order
//! against a `TaskStore`, and reports conflicts instead of resolving them.

mod engine;
mod operation;
mod policy;
mod result;
mod versioning;

pub use engine::SyncEngine;
pub use operation::{OperationKind, OperationPayload, OperationRequest, SyncOperation, TaskRef};
pub use policy::{MissingDeletePolicy, SyncPolicy};
pub use result::{Conflict, ServerUpdate, SyncOutcome, SyncResult};
pub use versioning::VersionCheck;
