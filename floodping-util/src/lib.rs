pub mod config;
pub mod context;
pub mod flood;
pub mod ping;
pub mod shutdown;
