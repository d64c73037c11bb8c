pub mod app;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod indexer;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;
