pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod records;
pub mod table;
pub mod time;
