pub mod config;
pub mod models;
pub mod picker;
pub mod pool;
pub mod queries;
