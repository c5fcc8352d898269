//! Service wrappers shared by the API and CLI

mod task_service;

pub use task_service::TaskService;
