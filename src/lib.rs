pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod models;
pub mod snowflake;
