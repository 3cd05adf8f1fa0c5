pub mod agent;
pub mod cli;
pub mod config;
pub mod media;
pub mod orchestrator;
pub mod session;
pub mod utils;
