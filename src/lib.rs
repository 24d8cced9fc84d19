pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod logs;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;
