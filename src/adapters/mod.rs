pub mod collectors;
pub mod config;
pub mod emitter;
pub mod export;
pub mod store;
