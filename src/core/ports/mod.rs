pub mod collector;
pub mod emitter;
pub mod store;
