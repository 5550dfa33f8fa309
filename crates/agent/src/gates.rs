use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use drillbot_core::UserId;

/// Per-user serialization points. One request per user runs the whole
/// admit-complete-record sequence at a time; a second request for the same
/// user queues here instead of interleaving reads and writes with the first.
#[derive(Default)]
pub struct UserGates {
    gates: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `user`'s gate is free and holds it until the guard drops.
    /// Gates materialize on first use and are never removed; the map stays
    /// bounded by the number of distinct users seen since startup.
    pub async fn acquire(&self, user: UserId) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(user).or_default())
        };
        gate.lock_owned().await
    }
}
