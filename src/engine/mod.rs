pub mod autoscaler;
pub mod conflict;
pub mod coordinator;
pub mod heartbeat;
pub mod metrics;
pub mod outcomes;
pub mod pool_registry;
pub mod reconcile;
pub mod resource_ledger;
pub mod tasks;
pub mod topology;

pub use autoscaler::{AutoScaler, ScalingHistory};
pub use conflict::{CapacityContext, ConflictContext, ConflictResolver};
pub use coordinator::FleetCoordinator;
pub use outcomes::{
    AutoscaleOutcome, InitializeResult, RebalanceResult, RecoveryResult, RestoreReport,
    ScaleResult, SpawnResult, StatusReport, TaskAssignment, TerminateResult, TopologyChangeResult,
};
pub use pool_registry::{PoolRegistry, SpawnConfirmation, TaskPlacement};
pub use reconcile::{PoolDrift, ReconciliationReport};
pub use resource_ledger::{LedgerCapacity, ResourceLedger};
pub use topology::{connection_profile, ConnectionProfile, TopologyManager};
