pub mod models;
pub mod stats;
pub mod timer;
