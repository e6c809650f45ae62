//! Order synchronization engine.
//!
//! Two delivery channels — the WebSocket push listener and the interval
//! poller — race to deliver the same remote orders. Both funnel into one
//! reconciler task, the single writer to the order store, which makes the
//! exactly-once guarantee hold without locking the store itself.

mod checkpoint;
mod engine;
mod health;
mod poller;
mod reconciler;
mod window;

pub use checkpoint::CheckpointWatermark;
pub use engine::{EngineHandle, SyncEngine};
pub use health::{HealthMonitor, HealthSnapshot};
pub use poller::PollScheduler;
pub use reconciler::Reconciler;
pub use window::WindowPolicy;

use serde::{Deserialize, Serialize};
use till_schemas::SyncChannel;

/// Messages broadcast on the engine's event bus.
///
/// `NewOrders` fires only for orders newly inserted by a batch — no-op
/// duplicate observations stay silent so both channels seeing the same
/// order does not double-notify the UI.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    NewOrders {
        count: usize,
        channel: SyncChannel,
    },
    Health(HealthSnapshot),
}
