//! Database layer for tasksync

mod connection;
mod migrations;
mod task_repository;

pub use connection::Database;
pub use task_repository::{LibSqlTaskRepository, TaskStore};
