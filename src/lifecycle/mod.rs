pub mod heartbeat;
pub mod state_machine;

pub use heartbeat::HeartbeatTracker;
pub use state_machine::{AgentStateMachine, LifecycleEvent};
