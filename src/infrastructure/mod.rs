pub mod command_log;
pub mod config;
pub mod error;
pub mod notification;
pub mod session_api_client;
pub mod session_repository;
pub mod storage;
pub mod task_repository;
