pub mod manager;
pub mod state;

pub use manager::TimerManager;
pub use state::{ArmedTimer, TabId, TimerFired};
#[cfg(test)]
pub use state::TimerStatus;
