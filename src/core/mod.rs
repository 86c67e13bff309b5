pub mod access;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod pool;
pub mod sizing;
pub mod traits;
