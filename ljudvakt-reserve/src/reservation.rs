//! Per-device ownership state machine.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::bus::{BusError, OwnershipReply, ReserveBus};

/// Who currently holds the claim on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerState {
    /// Nobody claims the device; peer requests are answered "free".
    Unowned,
    /// This instance holds the claim.
    OwnedLocal,
    /// The named peer holds the claim.
    OwnedRemote(String),
    /// Terminal: the bus connection was lost while the reservation existed.
    Disconnected,
}

/// Decision taken when a peer requests a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arbitration {
    /// The local claim is released in favour of the higher-priority peer.
    Yield,
    /// The local claim stands.
    Deny,
    /// No local claim exists; the peer may take the device.
    Free,
}

/// A claim of exclusive local ownership of one named device.
///
/// Transitions are driven by local [`acquire`](Self::acquire) /
/// [`release`](Self::release) calls and by inbound bus notices routed here
/// by the owning plugin.
pub struct ReserveDevice {
    name: String,
    application_name: String,
    application_device_name: String,
    priority: i32,
    state: Mutex<OwnerState>,
    bus: Arc<dyn ReserveBus>,
}

impl ReserveDevice {
    pub(crate) fn new(
        bus: Arc<dyn ReserveBus>,
        name: impl Into<String>,
        application_name: impl Into<String>,
        application_device_name: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            name: name.into(),
            application_name: application_name.into(),
            application_device_name: application_device_name.into(),
            priority,
            state: Mutex::new(OwnerState::Unowned),
            bus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn application_device_name(&self) -> &str {
        &self.application_device_name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn owner_state(&self) -> OwnerState {
        self.state.lock().clone()
    }

    /// Attempts to take the claim, returning the resulting state.
    ///
    /// Already holding the claim is a no-op. A denial is not an error: the
    /// reservation stays `OwnedRemote` and the caller may retry later.
    pub async fn acquire(&self) -> Result<OwnerState, BusError> {
        match self.owner_state() {
            OwnerState::OwnedLocal => return Ok(OwnerState::OwnedLocal),
            OwnerState::Disconnected => return Err(BusError::Disconnected),
            OwnerState::Unowned | OwnerState::OwnedRemote(_) => {}
        }
        if !self.bus.is_connected() {
            return Err(BusError::Disconnected);
        }

        let reply = self
            .bus
            .request_ownership(&self.name, &self.application_name, self.priority)
            .await?;
        let next = match reply {
            OwnershipReply::Acquired => {
                info!(device = %self.name, "acquired device");
                OwnerState::OwnedLocal
            }
            OwnershipReply::Busy { owner } => {
                debug!(device = %self.name, %owner, "device busy");
                OwnerState::OwnedRemote(owner)
            }
        };
        *self.state.lock() = next.clone();
        Ok(next)
    }

    /// Releases a held claim; a no-op when nothing is held locally.
    pub async fn release(&self) -> Result<(), BusError> {
        let held = matches!(self.owner_state(), OwnerState::OwnedLocal);
        if held {
            self.bus.release(&self.name).await?;
            info!(device = %self.name, "released device");
        }
        let mut state = self.state.lock();
        if *state != OwnerState::Disconnected {
            *state = OwnerState::Unowned;
        }
        Ok(())
    }

    /// Arbitrates a competing request from `priority`.
    ///
    /// A strictly higher priority wins the device; the local claim moves to
    /// `Unowned` and the caller performs the bus release.
    pub(crate) fn arbitrate(&self, priority: i32) -> Arbitration {
        let mut state = self.state.lock();
        match &*state {
            OwnerState::OwnedLocal if priority > self.priority => {
                *state = OwnerState::Unowned;
                Arbitration::Yield
            }
            OwnerState::OwnedLocal => Arbitration::Deny,
            _ => Arbitration::Free,
        }
    }

    /// Records an ownership change observed on the bus.
    pub(crate) fn note_owner_changed(&self, owner: Option<&str>) {
        let mut state = self.state.lock();
        if *state == OwnerState::Disconnected {
            return;
        }
        *state = match owner {
            Some(peer) if peer == self.application_name => OwnerState::OwnedLocal,
            Some(peer) => OwnerState::OwnedRemote(peer.to_string()),
            None => OwnerState::Unowned,
        };
    }

    /// Bus connection lost: the reservation is dead.
    pub(crate) fn mark_disconnected(&self) {
        *self.state.lock() = OwnerState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusNotice;
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::broadcast;

    /// Bus double whose replies are scripted per test.
    pub(crate) struct ScriptedBus {
        pub connected: AtomicBool,
        pub replies: PlMutex<VecDeque<Result<OwnershipReply, BusError>>>,
        pub released: PlMutex<Vec<String>>,
        pub notice_tx: broadcast::Sender<BusNotice>,
    }

    impl ScriptedBus {
        pub fn new() -> Arc<Self> {
            let (notice_tx, _) = broadcast::channel(16);
            Arc::new(Self {
                connected: AtomicBool::new(true),
                replies: PlMutex::new(VecDeque::new()),
                released: PlMutex::new(Vec::new()),
                notice_tx,
            })
        }

        pub fn script(&self, reply: Result<OwnershipReply, BusError>) {
            self.replies.lock().push_back(reply);
        }
    }

    #[async_trait]
    impl ReserveBus for ScriptedBus {
        async fn request_ownership(
            &self,
            _device: &str,
            _application: &str,
            _priority: i32,
        ) -> Result<OwnershipReply, BusError> {
            self.replies
                .lock()
                .pop_front()
                .unwrap_or(Ok(OwnershipReply::Acquired))
        }

        async fn release(&self, device: &str) -> Result<(), BusError> {
            self.released.lock().push(device.to_string());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn notices(&self) -> broadcast::Receiver<BusNotice> {
            self.notice_tx.subscribe()
        }
    }

    fn device(bus: &Arc<ScriptedBus>) -> ReserveDevice {
        ReserveDevice::new(
            Arc::clone(bus) as Arc<dyn ReserveBus>,
            "Audio0",
            "Ljudvakt",
            "hw:0",
            10,
        )
    }

    #[tokio::test]
    async fn acquire_takes_ownership() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        assert_eq!(rd.acquire().await.unwrap(), OwnerState::OwnedLocal);
        assert_eq!(rd.owner_state(), OwnerState::OwnedLocal);
        // Acquiring again is a no-op.
        assert_eq!(rd.acquire().await.unwrap(), OwnerState::OwnedLocal);
    }

    #[tokio::test]
    async fn denied_acquire_tracks_remote_owner() {
        let bus = ScriptedBus::new();
        bus.script(Ok(OwnershipReply::Busy {
            owner: "jack".into(),
        }));
        let rd = device(&bus);
        assert_eq!(
            rd.acquire().await.unwrap(),
            OwnerState::OwnedRemote("jack".into())
        );
        assert_eq!(rd.owner_state(), OwnerState::OwnedRemote("jack".into()));
    }

    #[tokio::test]
    async fn release_returns_to_unowned() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        rd.acquire().await.unwrap();
        rd.release().await.unwrap();
        assert_eq!(rd.owner_state(), OwnerState::Unowned);
        assert_eq!(bus.released.lock().as_slice(), &["Audio0"]);
    }

    #[tokio::test]
    async fn higher_priority_competitor_wins() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        rd.acquire().await.unwrap();
        assert_eq!(rd.arbitrate(20), Arbitration::Yield);
        assert_eq!(rd.owner_state(), OwnerState::Unowned);
    }

    #[tokio::test]
    async fn equal_or_lower_priority_competitor_is_denied() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        rd.acquire().await.unwrap();
        assert_eq!(rd.arbitrate(10), Arbitration::Deny);
        assert_eq!(rd.arbitrate(5), Arbitration::Deny);
        assert_eq!(rd.owner_state(), OwnerState::OwnedLocal);
    }

    #[tokio::test]
    async fn unowned_device_answers_free() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        assert_eq!(rd.arbitrate(1), Arbitration::Free);
    }

    #[tokio::test]
    async fn owner_change_notices_update_state() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        rd.note_owner_changed(Some("jack"));
        assert_eq!(rd.owner_state(), OwnerState::OwnedRemote("jack".into()));
        rd.note_owner_changed(Some("Ljudvakt"));
        assert_eq!(rd.owner_state(), OwnerState::OwnedLocal);
        rd.note_owner_changed(None);
        assert_eq!(rd.owner_state(), OwnerState::Unowned);
    }

    #[tokio::test]
    async fn disconnection_is_terminal() {
        let bus = ScriptedBus::new();
        let rd = device(&bus);
        rd.mark_disconnected();
        assert_eq!(rd.owner_state(), OwnerState::Disconnected);
        rd.note_owner_changed(Some("jack"));
        assert_eq!(rd.owner_state(), OwnerState::Disconnected);
        assert!(matches!(rd.acquire().await, Err(BusError::Disconnected)));
    }
}
