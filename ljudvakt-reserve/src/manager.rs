//! The reservation manager plugin: owns the per-device table and routes bus
//! notices to the right state machine.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ljudvakt_core::registry::Plugin;

use crate::bus::{BusNotice, ReserveBus};
use crate::reservation::{Arbitration, ReserveDevice};

/// Name under which the manager registers in the plugin registry.
pub const PLUGIN_NAME: &str = "reserve-device";

/// Creates, looks up and destroys [`ReserveDevice`]s, and keeps them in sync
/// with the request bus.
///
/// When the bus connection drops, every reservation transitions to its
/// terminal state and the table is cleared; the policy layer re-creates
/// reservations after a reconnect.
pub struct ReserveDevicePlugin {
    bus: Arc<dyn ReserveBus>,
    devices: Mutex<HashMap<String, Arc<ReserveDevice>>>,
}

impl ReserveDevicePlugin {
    pub fn new(bus: Arc<dyn ReserveBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            devices: Mutex::new(HashMap::new()),
        })
    }

    /// Spawns the task that consumes bus notices for the manager's lifetime.
    pub fn spawn_notice_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut notices = manager.bus.notices();
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(notice) => manager.handle_notice(notice).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "reservation notices dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle_notice(&self, notice: BusNotice) {
        match notice {
            BusNotice::CompetingRequest {
                device,
                requester,
                priority,
            } => {
                let reservation = self.devices.lock().get(&device).cloned();
                let Some(reservation) = reservation else {
                    trace!(%device, "competing request for unknown device");
                    return;
                };
                match reservation.arbitrate(priority) {
                    Arbitration::Yield => {
                        info!(%device, %requester, priority, "yielding device to higher priority peer");
                        if let Err(error) = self.bus.release(&device).await {
                            warn!(%device, %error, "failed to release yielded device");
                        }
                    }
                    Arbitration::Deny => {
                        debug!(%device, %requester, priority, "denied competing request");
                    }
                    Arbitration::Free => {
                        trace!(%device, "device is free for the taking");
                    }
                }
            }
            BusNotice::OwnerChanged { device, owner } => {
                if let Some(reservation) = self.devices.lock().get(&device) {
                    reservation.note_owner_changed(owner.as_deref());
                }
            }
            BusNotice::Disconnected => self.handle_disconnect(),
        }
    }

    fn handle_disconnect(&self) {
        info!("request bus connection lost, dropping all reservations");
        let mut devices = self.devices.lock();
        for reservation in devices.values() {
            reservation.mark_disconnected();
        }
        devices.clear();
    }

    /// Creates (or replaces) a reservation for `name`.
    ///
    /// Returns `None` with a notice when the bus is down; callers treat that
    /// as a no-op.
    pub fn create_reservation(
        &self,
        name: impl Into<String>,
        application_name: impl Into<String>,
        application_device_name: impl Into<String>,
        priority: i32,
    ) -> Option<Arc<ReserveDevice>> {
        if !self.bus.is_connected() {
            info!("not connected to the request bus");
            return None;
        }
        let name = name.into();
        let reservation = Arc::new(ReserveDevice::new(
            Arc::clone(&self.bus),
            name.clone(),
            application_name,
            application_device_name,
            priority,
        ));
        self.devices.lock().insert(name, Arc::clone(&reservation));
        Some(reservation)
    }

    /// Destroys a reservation, releasing a held claim first.
    pub async fn destroy_reservation(&self, name: &str) {
        if !self.bus.is_connected() {
            info!("not connected to the request bus");
            return;
        }
        let removed = self.devices.lock().remove(name);
        if let Some(reservation) = removed {
            if let Err(error) = reservation.release().await {
                warn!(device = %name, %error, "failed to release destroyed reservation");
            }
        }
    }

    /// Looks up an existing reservation.
    pub fn get_reservation(&self, name: &str) -> Option<Arc<ReserveDevice>> {
        if !self.bus.is_connected() {
            info!("not connected to the request bus");
            return None;
        }
        self.devices.lock().get(name).cloned()
    }

    pub fn reservation_count(&self) -> usize {
        self.devices.lock().len()
    }
}

impl Plugin for ReserveDevicePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
