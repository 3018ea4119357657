pub mod ports;
pub mod task;
