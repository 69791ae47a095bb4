pub mod orchestrator;
pub mod progress;
pub mod strategy;

pub use orchestrator::Orchestrator;
pub use strategy::Strategy;
