//! # ljudvakt-core
//!
//! Foundation layer for the ljudvakt session/policy manager.
//! Built with determinism, safety, and maintainability as primary design
//! constraints.
//!
//! ### Key Submodules:
//! - `properties`: reference-shared, copy-on-write string maps
//! - `interest`: constraint predicates and typed object interests
//! - `event`: immutable media-graph event records
//! - `hook`: declarative sync/async event hooks
//! - `dispatcher`: priority queue + topological hook scheduler
//! - `state`: debounced, escaped key-value persistence
//! - `registry`: named plugin lookup for policy modules

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod hook;
pub mod interest;
pub mod properties;
pub mod registry;
pub mod state;

pub use error::Error;

pub mod prelude {
    pub use crate::dispatcher::{EventDispatcher, EventInjector};
    pub use crate::error::Error;
    pub use crate::event::Event;
    pub use crate::hook::{EventHook, HookError, StepHandle};
    pub use crate::interest::{
        Constraint, ConstraintSubject, ConstraintVerb, ObjectInterest, ObjectType,
    };
    pub use crate::properties::Properties;
    pub use crate::registry::{Plugin, PluginRegistry};
    pub use crate::state::State;
}
