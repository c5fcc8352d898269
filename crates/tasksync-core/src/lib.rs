//! tasksync-core - Core library for tasksync
//!
//! This crate contains the task model, the libSQL-backed task store, and the
//! offline sync engine shared by the API server and the CLI.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{NewTask, Task, TaskChanges, TaskId};
