//! Background persistence cadence, available under the `async` feature.
//!
//! The hot evaluation path never awaits disk I/O: [`Engine::flush_audit`]
//! and [`Engine::persist_trust`] are cheap when there is nothing pending
//! and otherwise do a bounded synchronous write. This module just calls
//! them on a timer from a spawned task so a long-lived host doesn't have
//! to remember to do it itself.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::engine::Engine;

/// Spawns a task that flushes the audit log and persists trust state on a
/// fixed interval until the returned handle is dropped or aborted.
///
/// Errors from either operation are logged and do not stop the loop; a
/// single failed flush should not take down the whole timer.
pub fn spawn_persistence_loop(engine: Arc<Engine>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(err) = engine.flush_audit() {
                warn!(error = %err, "periodic audit flush failed");
            }
            if let Err(err) = engine.persist_trust() {
                warn!(error = %err, "periodic trust persist failed");
            }
        }
    })
}
