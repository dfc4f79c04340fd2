//! Abstract interface to the device-reservation request bus.
//!
//! The concrete transport (a session-bus object manager in deployments) is
//! external; the session manager only depends on this adapter trait.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Request-bus failure modes.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("request bus is disconnected")]
    Disconnected,
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Outcome of an ownership request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipReply {
    /// The claim is now held by the requester.
    Acquired,
    /// A peer holds the claim and refused to yield.
    Busy {
        /// Application name of the current owner.
        owner: String,
    },
}

/// Inbound notice from the bus.
#[derive(Debug, Clone)]
pub enum BusNotice {
    /// A peer asks for a device; answered by the local arbitration rules.
    CompetingRequest {
        device: String,
        requester: String,
        priority: i32,
    },
    /// Ownership of a device changed hands. `None` means it became free.
    OwnerChanged {
        device: String,
        owner: Option<String>,
    },
    /// The connection to the bus was lost.
    Disconnected,
}

/// Adapter over the external request/response bus.
#[async_trait]
pub trait ReserveBus: Send + Sync {
    /// Asks for exclusive ownership of `device` on behalf of `application`.
    async fn request_ownership(
        &self,
        device: &str,
        application: &str,
        priority: i32,
    ) -> Result<OwnershipReply, BusError>;

    /// Gives up a held claim.
    async fn release(&self, device: &str) -> Result<(), BusError>;

    /// Whether the bus connection is currently usable.
    fn is_connected(&self) -> bool;

    /// Subscribes to inbound notices.
    fn notices(&self) -> broadcast::Receiver<BusNotice>;
}
