pub mod listener;
pub mod orchestrator;
pub mod state;
