pub mod chart;
pub mod config;
pub mod engine;
pub mod entries;
pub mod models;
pub mod postgres_storage;
pub mod sqlite_storage;
pub mod storage;
pub mod sync_log;
pub mod validation;
