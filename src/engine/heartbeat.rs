use tokio::time::MissedTickBehavior;

use super::coordinator::FleetCoordinator;
use crate::types::FleetStatus;

/// Sweeps for stale heartbeats every interval while the fleet is active.
pub(crate) async fn run(coordinator: FleetCoordinator) {
    let interval = coordinator.config().heartbeat.interval();
    let mut status = coordinator.subscribe_status();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::info!("Heartbeat monitor started (interval {:?})", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *status.borrow() != FleetStatus::Active {
            break;
        }

        let results = coordinator.heartbeat_tick().await;
        if !results.is_empty() {
            let recovered = results.iter().filter(|r| r.recovered).count();
            log::info!(
                "Heartbeat sweep handled {} stale agents ({} recovered)",
                results.len(),
                recovered
            );
        }
    }

    log::info!("Heartbeat monitor stopped");
}
