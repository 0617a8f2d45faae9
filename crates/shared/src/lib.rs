pub mod clarify;
pub mod config;
pub mod engine;
pub mod models;
pub mod repos;
