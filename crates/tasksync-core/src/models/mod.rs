//! Data models for tasksync

mod task;

pub use task::{NewTask, Task, TaskChanges, TaskId};
