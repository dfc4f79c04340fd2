//! The dispatcher hook that claims devices advertising a reservation name.
//!
//! This is the canonical multi-step async hook: step one ensures a
//! reservation object exists for the device, step two performs the
//! acquisition over the request bus, completing from a spawned task once
//! the bus answers.

use std::sync::Arc;

use ljudvakt_core::hook::{EventHook, HookError, StepHandle, INITIAL_STEP};
use ljudvakt_core::interest::{ConstraintSubject, ConstraintVerb, ObjectInterest, ObjectType};

use crate::manager::ReserveDevicePlugin;

const HOOK_NAME: &str = "reserve-device-acquire";
const STEP_ENSURE: &str = "ensure-reservation";
const STEP_ACQUIRE: &str = "acquire";

const KEY_RESERVATION_NAME: &str = "device.reservation.name";
const KEY_RESERVATION_PRIORITY: &str = "device.reservation.priority";
const KEY_DEVICE_NAME: &str = "device.name";

/// Builds the acquisition hook for devices carrying a
/// `device.reservation.name` property on their added event.
///
/// When the request bus is down the hook is a no-op; the manager logs the
/// notice and the event continues through the remaining hooks.
pub fn reserve_device_hook(
    plugin: Arc<ReserveDevicePlugin>,
    application_name: impl Into<String>,
    default_priority: i32,
) -> EventHook {
    let application_name = application_name.into();

    EventHook::stepped(
        HOOK_NAME,
        |_, previous| match previous {
            INITIAL_STEP => Some(STEP_ENSURE.to_string()),
            STEP_ENSURE => Some(STEP_ACQUIRE.to_string()),
            _ => None,
        },
        move |event, step, handle: StepHandle| {
            let props = event.properties();
            let Some(name) = props.get(KEY_RESERVATION_NAME) else {
                handle.fail(HookError::new("device event without a reservation name"));
                return;
            };

            match step {
                STEP_ENSURE => {
                    let priority = props
                        .get(KEY_RESERVATION_PRIORITY)
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(default_priority);
                    let device_name = props.get(KEY_DEVICE_NAME).unwrap_or(name);
                    plugin.create_reservation(
                        name,
                        application_name.clone(),
                        device_name,
                        priority,
                    );
                    handle.succeed();
                }
                STEP_ACQUIRE => {
                    let Some(reservation) = plugin.get_reservation(name) else {
                        handle.succeed();
                        return;
                    };
                    let cancel = handle.cancellation();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => handle.succeed(),
                            result = reservation.acquire() => match result {
                                Ok(_) => handle.succeed(),
                                Err(error) => handle.fail(HookError::new(error.to_string())),
                            },
                        }
                    });
                }
                other => handle.fail(HookError::new(format!("unexpected step '{other}'"))),
            }
        },
    )
    .interest(
        ObjectInterest::builder(ObjectType::Device)
            .constraint(
                ConstraintSubject::Property,
                "event.type",
                ConstraintVerb::Equals("object-added".into()),
            )
            .constraint(
                ConstraintSubject::Property,
                KEY_RESERVATION_NAME,
                ConstraintVerb::IsPresent,
            )
            .build(),
    )
}
