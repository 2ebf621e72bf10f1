pub mod bootstrap;
pub mod commands;
pub mod events;
pub mod session_recorder;
pub mod timer_driver;
