pub mod monitor;
pub mod platform;
