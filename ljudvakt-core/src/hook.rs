//! Declarative event hooks: a matching predicate, ordering constraints, and
//! an executor that is either a single closure or a multi-step state machine.

use std::fmt;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::event::Event;
use crate::interest::ObjectInterest;
use crate::properties::Properties;

/// Failure reported by a hook executor. Logged by the dispatcher, never
/// propagated to the event producer.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The distinguished previous-step name passed to the first `next_step` query.
pub const INITIAL_STEP: &str = "start";

pub type SyncHookFn = Box<dyn Fn(&Event) -> Result<(), HookError> + Send + Sync>;
pub type NextStepFn = Box<dyn Fn(&Event, &str) -> Option<String> + Send + Sync>;
pub type ExecuteStepFn = Box<dyn Fn(&Event, &str, StepHandle) + Send + Sync>;

pub(crate) enum Executor {
    Sync(SyncHookFn),
    Async {
        next_step: NextStepFn,
        execute_step: ExecuteStepFn,
    },
}

/// Completion handle for one async hook step.
///
/// `execute_step` receives the handle by value and must eventually consume it
/// with [`StepHandle::succeed`], [`StepHandle::fail`] or
/// [`StepHandle::complete`] — possibly from a spawned task after external
/// I/O. Dropping the handle without completing counts as failure. The handle
/// also exposes the event's cancellation, which a step should observe to
/// finish promptly when the event is withdrawn.
pub struct StepHandle {
    tx: oneshot::Sender<Result<(), HookError>>,
    cancel: CancellationToken,
}

impl StepHandle {
    pub(crate) fn new(tx: oneshot::Sender<Result<(), HookError>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Reports the step as finished successfully.
    pub fn succeed(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Reports the step as failed; the dispatcher terminates the hook.
    pub fn fail(self, error: HookError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn complete(self, result: Result<(), HookError>) {
        let _ = self.tx.send(result);
    }

    /// Whether the event this step belongs to has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clonable token for awaiting cancellation alongside external I/O.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A named, ordered, matched piece of policy logic.
///
/// Hook names are unique per dispatcher; registering an existing name
/// replaces the prior hook. `before`/`after` name other hooks this one must
/// precede or follow when both match the same event; names that do not match
/// are ignored at scheduling time.
pub struct EventHook {
    name: String,
    before: Vec<String>,
    after: Vec<String>,
    interests: Vec<ObjectInterest>,
    executor: Executor,
}

impl EventHook {
    /// A hook that runs a single closure per matching event.
    pub fn simple(
        name: impl Into<String>,
        run: impl Fn(&Event) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_executor(name.into(), Executor::Sync(Box::new(run)))
    }

    /// A multi-step hook driven by a `next_step`/`execute_step` pair.
    ///
    /// `next_step` is first queried with [`INITIAL_STEP`] and after each
    /// completed step with that step's name; returning `None` terminates the
    /// hook successfully. `execute_step` performs the named step and reports
    /// through the [`StepHandle`].
    pub fn stepped(
        name: impl Into<String>,
        next_step: impl Fn(&Event, &str) -> Option<String> + Send + Sync + 'static,
        execute_step: impl Fn(&Event, &str, StepHandle) + Send + Sync + 'static,
    ) -> Self {
        Self::with_executor(
            name.into(),
            Executor::Async {
                next_step: Box::new(next_step),
                execute_step: Box::new(execute_step),
            },
        )
    }

    fn with_executor(name: String, executor: Executor) -> Self {
        Self {
            name,
            before: Vec::new(),
            after: Vec::new(),
            interests: Vec::new(),
            executor,
        }
    }

    /// Declares hooks this hook must run before.
    pub fn runs_before<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares hooks this hook must run after.
    pub fn runs_after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds an interest; the hook matches an event when any interest does.
    pub fn interest(mut self, interest: ObjectInterest) -> Self {
        self.interests.push(interest);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn before(&self) -> &[String] {
        &self.before
    }

    pub fn after(&self) -> &[String] {
        &self.after
    }

    /// Whether this hook is selected for `event`.
    pub fn runs_for_event(&self, event: &Event) -> bool {
        self.runs_for_event_with_globals(event, None)
    }

    /// [`Self::runs_for_event`] with the daemon-global bag supplied for
    /// `Global`-subject constraints; the dispatcher uses this form.
    pub fn runs_for_event_with_globals(
        &self,
        event: &Event,
        global: Option<&Properties>,
    ) -> bool {
        self.interests
            .iter()
            .any(|i| i.matches_with_globals(event.subject_type(), event.properties(), global))
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Registration-time validation: a hook needs a name and at least one
    /// interest to ever be selected.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::InvalidArgument("hook name must not be empty".into()));
        }
        if self.interests.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "hook '{}' declares no interests",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for EventHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHook")
            .field("name", &self.name)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("interests", &self.interests.len())
            .finish()
    }
}
