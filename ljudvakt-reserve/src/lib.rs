//! # ljudvakt-reserve
//!
//! Exclusive device ownership arbitration for the ljudvakt session manager.
//!
//! A [`ReserveDevice`] advertises a local claim on a named device over an
//! external request bus and arbitrates competing claims by priority. The
//! [`ReserveDevicePlugin`] owns the per-device table, routes inbound bus
//! notices to the right state machine, and drops every claim when the bus
//! connection is lost. [`reserve_device_hook`] wires the whole thing into
//! the event dispatcher as a multi-step async hook.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bus;
mod hook;
mod loopback;
mod manager;
mod reservation;

pub use bus::{BusError, BusNotice, OwnershipReply, ReserveBus};
pub use hook::reserve_device_hook;
pub use loopback::LoopbackBus;
pub use manager::{ReserveDevicePlugin, PLUGIN_NAME};
pub use reservation::{OwnerState, ReserveDevice};
