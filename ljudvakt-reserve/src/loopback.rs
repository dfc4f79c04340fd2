//! In-process request bus for deployments without a session bus and for
//! tests. Grants are arbitrated locally with the same priority rules a
//! remote arbiter would apply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bus::{BusError, BusNotice, OwnershipReply, ReserveBus};

struct Claim {
    application: String,
    priority: i32,
}

/// A single-process [`ReserveBus`] keeping claims in memory.
pub struct LoopbackBus {
    connected: AtomicBool,
    claims: Mutex<HashMap<String, Claim>>,
    notice_tx: broadcast::Sender<BusNotice>,
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        let (notice_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            connected: AtomicBool::new(true),
            claims: Mutex::new(HashMap::new()),
            notice_tx,
        })
    }

    /// Simulates losing the bus connection.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.claims.lock().clear();
        self.emit(BusNotice::Disconnected);
    }

    /// Injects a notice, as a remote peer would.
    pub fn emit(&self, notice: BusNotice) {
        // Nobody listening is fine; notices are best-effort.
        let _ = self.notice_tx.send(notice);
    }

    /// Current owner of `device`, if any.
    pub fn owner_of(&self, device: &str) -> Option<String> {
        self.claims
            .lock()
            .get(device)
            .map(|claim| claim.application.clone())
    }
}

#[async_trait]
impl ReserveBus for LoopbackBus {
    async fn request_ownership(
        &self,
        device: &str,
        application: &str,
        priority: i32,
    ) -> Result<OwnershipReply, BusError> {
        if !self.is_connected() {
            return Err(BusError::Disconnected);
        }

        let mut claims = self.claims.lock();
        if let Some(current) = claims.get(device) {
            if current.application != application && current.priority >= priority {
                debug!(%device, owner = %current.application, "request denied");
                return Ok(OwnershipReply::Busy {
                    owner: current.application.clone(),
                });
            }
        }
        claims.insert(
            device.to_string(),
            Claim {
                application: application.to_string(),
                priority,
            },
        );
        drop(claims);

        self.emit(BusNotice::OwnerChanged {
            device: device.to_string(),
            owner: Some(application.to_string()),
        });
        Ok(OwnershipReply::Acquired)
    }

    async fn release(&self, device: &str) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::Disconnected);
        }
        if self.claims.lock().remove(device).is_some() {
            self.emit(BusNotice::OwnerChanged {
                device: device.to_string(),
                owner: None,
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn notices(&self) -> broadcast::Receiver<BusNotice> {
        self.notice_tx.subscribe()
    }
}
