pub mod client;
pub mod config;
pub mod db;
pub mod http;
pub mod validate;
