//! Priority-ordered, topologically-scheduled event dispatch.
//!
//! The dispatcher owns the hook registry and the pending event queue. Events
//! are processed one at a time in (priority DESC, arrival ASC) order; for
//! each event the set of matching hooks is snapshotted, ordered by their
//! `before`/`after` constraints, and executed sequentially. The whole engine
//! is single-loop cooperative: hooks never run in parallel with each other,
//! and the only suspension points are between hooks, between events, and
//! inside an async hook between a step and its completion.
//!
//! There is no watchdog: an async hook that never completes its step stalls
//! dispatch for that event indefinitely. Hook failures, by contrast, are
//! logged and never abort dispatch; events are fire-and-forget for their
//! producers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::error::Error;
use crate::event::Event;
use crate::hook::{EventHook, Executor, StepHandle, INITIAL_STEP};
use crate::properties::Properties;

/// An event waiting in the pending queue.
struct QueuedEvent {
    event: Event,
    seq: u64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // Max-heap: higher priority first, then earlier arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.event
            .priority()
            .cmp(&other.event.priority())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Clonable handle for pushing events into a dispatcher from transports and
/// from hooks (follow-up events). Injected events enter the pending queue
/// and are dispatched strictly after the event currently in flight.
#[derive(Clone)]
pub struct EventInjector {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventInjector {
    pub fn push(&self, event: Event) -> Result<(), Error> {
        self.tx
            .send(event)
            .map_err(|_| Error::ServiceUnavailable("event dispatcher is gone".into()))
    }
}

/// Counters exposed for observability; the daemon wrapper mirrors them into
/// its metrics recorder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub events_dispatched: u64,
    pub hooks_executed: u64,
    pub hook_failures: u64,
}

/// The event-hook dispatch engine.
///
/// All mutation happens through `&mut self` from the owning loop; hooks
/// registered while an event is in flight only join the selection of
/// subsequent events, never the one being dispatched.
pub struct EventDispatcher {
    hooks: BTreeMap<String, Arc<EventHook>>,
    globals: Properties,
    queue: BinaryHeap<QueuedEvent>,
    next_seq: u64,
    inbox_tx: mpsc::UnboundedSender<Event>,
    inbox_rx: mpsc::UnboundedReceiver<Event>,
    stats: DispatcherStats,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            hooks: BTreeMap::new(),
            globals: Properties::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            inbox_tx,
            inbox_rx,
            stats: DispatcherStats::default(),
        }
    }

    /// Sets the daemon-global bag read by `Global`-subject constraints
    /// during hook selection.
    pub fn set_global_properties(&mut self, props: Properties) {
        self.globals = props;
    }

    pub fn global_properties(&self) -> &Properties {
        &self.globals
    }

    /// Handle for pushing events from outside the dispatch loop.
    pub fn injector(&self) -> EventInjector {
        EventInjector {
            tx: self.inbox_tx.clone(),
        }
    }

    /// Registers a hook. Registration is idempotent on name: an existing
    /// hook with the same name is replaced.
    pub fn register_hook(&mut self, hook: EventHook) -> Result<(), Error> {
        hook.validate()?;
        let name = hook.name().to_string();
        if self.hooks.insert(name.clone(), Arc::new(hook)).is_some() {
            debug!(hook = %name, "replaced existing hook");
        }
        Ok(())
    }

    /// Removes a hook, returning whether it was registered.
    pub fn remove_hook(&mut self, name: &str) -> bool {
        self.hooks.remove(name).is_some()
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    /// Appends an event to the pending queue.
    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(event = %event.event_type(), priority = event.priority(), seq, "event queued");
        self.queue.push(QueuedEvent { event, seq });
    }

    /// Number of events waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    fn drain_inbox(&mut self) {
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.push(event);
        }
    }

    /// Dispatches queued events until both the queue and the injector inbox
    /// are empty.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.drain_inbox();
            let Some(next) = self.queue.pop() else { break };
            self.dispatch(next.event).await;
        }
    }

    /// Drives the dispatcher until `shutdown` is cancelled: dispatches
    /// everything pending, then sleeps until the next injected event.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        loop {
            self.run_until_idle().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.inbox_rx.recv() => match received {
                    Some(event) => self.push(event),
                    None => break,
                },
            }
        }
    }

    /// Runs every matching hook for one event, in topological order.
    #[instrument(skip_all, fields(event = %event.event_type()))]
    async fn dispatch(&mut self, event: Event) {
        let order = self.select_hooks(&event);
        debug!(hooks = order.len(), "dispatching event");
        self.stats.events_dispatched += 1;

        for hook in &order {
            if event.is_cancelled() {
                debug!(hook = hook.name(), "event cancelled, skipping remaining hooks");
                break;
            }
            self.run_hook(hook, &event).await;
        }
        trace!("event released");
    }

    /// Snapshots the matching hook set and topologically orders it.
    fn select_hooks(&self, event: &Event) -> Vec<Arc<EventHook>> {
        let matched: Vec<Arc<EventHook>> = self
            .hooks
            .values()
            .filter(|hook| hook.runs_for_event_with_globals(event, Some(&self.globals)))
            .cloned()
            .collect();
        sort_hooks(matched)
    }

    async fn run_hook(&mut self, hook: &Arc<EventHook>, event: &Event) {
        trace!(hook = hook.name(), "running hook");
        self.stats.hooks_executed += 1;
        match hook.executor() {
            Executor::Sync(run) => {
                if let Err(error) = run(event) {
                    self.stats.hook_failures += 1;
                    warn!(hook = hook.name(), %error, "hook failed");
                }
            }
            Executor::Async {
                next_step,
                execute_step,
            } => {
                let mut previous = INITIAL_STEP.to_string();
                loop {
                    let Some(step) = next_step(event, &previous) else {
                        trace!(hook = hook.name(), "hook finished");
                        break;
                    };
                    let (tx, rx) = oneshot::channel();
                    execute_step(event, &step, StepHandle::new(tx, event.cancellation()));
                    match rx.await {
                        Ok(Ok(())) => previous = step,
                        Ok(Err(error)) => {
                            self.stats.hook_failures += 1;
                            warn!(hook = hook.name(), step = %step, %error, "hook step failed");
                            break;
                        }
                        Err(_) => {
                            self.stats.hook_failures += 1;
                            warn!(
                                hook = hook.name(),
                                step = %step,
                                "hook dropped its completion handle"
                            );
                            break;
                        }
                    }
                    if event.is_cancelled() {
                        debug!(hook = hook.name(), "event cancelled, terminating hook");
                        break;
                    }
                }
            }
        }
    }
}

/// Topologically sorts hooks by their `before`/`after` constraints.
///
/// `hooks` must be in lexicographic name order (the registry iterates a
/// `BTreeMap`); ties among ready nodes are then broken by taking the
/// smallest index, which keeps execution order reproducible. Constraint
/// names that are not in the set are ignored. Hooks stuck in a cycle (or
/// reachable only through one) are skipped with a logged [`Error::Cycle`];
/// the acyclic remainder still runs.
fn sort_hooks(hooks: Vec<Arc<EventHook>>) -> Vec<Arc<EventHook>> {
    if hooks.len() <= 1 {
        return hooks;
    }

    let index: HashMap<&str, usize> = hooks
        .iter()
        .enumerate()
        .map(|(i, hook)| (hook.name(), i))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); hooks.len()];
    let mut indegree = vec![0usize; hooks.len()];
    for (i, hook) in hooks.iter().enumerate() {
        for name in hook.before() {
            if let Some(&j) = index.get(name.as_str()) {
                successors[i].push(j);
                indegree[j] += 1;
            }
        }
        for name in hook.after() {
            if let Some(&j) = index.get(name.as_str()) {
                successors[j].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(hooks.len());
    while let Some(&i) = ready.iter().next() {
        ready.remove(&i);
        order.push(i);
        for &j in &successors[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < hooks.len() {
        let ordered: BTreeSet<usize> = order.iter().copied().collect();
        let skipped: Vec<String> = hooks
            .iter()
            .enumerate()
            .filter(|(i, _)| !ordered.contains(i))
            .map(|(_, hook)| hook.name().to_string())
            .collect();
        warn!(error = %Error::Cycle(skipped), "skipping hooks with unsatisfiable ordering");
    }

    order.into_iter().map(|i| Arc::clone(&hooks[i])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::{ConstraintSubject, ConstraintVerb, ObjectInterest, ObjectType};
    use crate::properties::Properties;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording_hook(name: &str, log: &Log) -> EventHook {
        let log = Arc::clone(log);
        let name_owned = name.to_string();
        EventHook::simple(name, move |_| {
            log.lock().push(name_owned.clone());
            Ok(())
        })
        .interest(ObjectInterest::any(ObjectType::Any))
    }

    fn test_event(event_type: &str, priority: i32) -> Event {
        Event::new(event_type, priority, ObjectType::Node, Properties::new())
    }

    #[tokio::test]
    async fn respects_before_and_after_constraints() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register_hook(recording_hook("a", &log).runs_after(["c"]))
            .unwrap();
        dispatcher
            .register_hook(recording_hook("b", &log).runs_before(["a"]))
            .unwrap();
        dispatcher.register_hook(recording_hook("c", &log)).unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        // `b` and `c` are both unconstrained against each other, so the
        // lexicographic tie-break runs `b` first; `a` waits for both.
        assert_eq!(log.lock().as_slice(), &["b", "c", "a"]);
    }

    #[tokio::test]
    async fn ties_break_lexicographically() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        for name in ["zeta", "alpha", "mid"] {
            dispatcher.register_hook(recording_hook(name, &log)).unwrap();
        }

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn unknown_ordering_names_are_ignored() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register_hook(recording_hook("only", &log).runs_after(["missing"]))
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["only"]);
    }

    #[tokio::test]
    async fn cyclic_hooks_are_skipped_and_dispatcher_survives() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register_hook(recording_hook("a", &log).runs_before(["b"]))
            .unwrap();
        dispatcher
            .register_hook(recording_hook("b", &log).runs_before(["a"]))
            .unwrap();
        dispatcher.register_hook(recording_hook("c", &log)).unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;
        assert_eq!(log.lock().as_slice(), &["c"]);

        // Break the cycle and dispatch again: the engine is still usable.
        assert!(dispatcher.remove_hook("b"));
        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;
        assert_eq!(log.lock().as_slice(), &["c", "a", "c"]);
    }

    #[tokio::test]
    async fn events_run_by_priority_then_arrival() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        let seen = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::simple("record", move |event| {
                    seen.lock().push(event.event_type().to_string());
                    Ok(())
                })
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();

        dispatcher.push(test_event("low-1", 0));
        dispatcher.push(test_event("high", 10));
        dispatcher.push(test_event("low-2", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["high", "low-1", "low-2"]);
    }

    #[tokio::test]
    async fn hook_runs_at_most_once_even_with_multiple_interests() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register_hook(
                recording_hook("multi", &log)
                    .interest(ObjectInterest::any(ObjectType::Node))
                    .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn global_constraints_read_the_daemon_bag() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.set_global_properties(
            Properties::from_pairs([("daemon.profile", "main")]).unwrap(),
        );
        let seen = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::simple("profiled", move |_| {
                    seen.lock().push("profiled".into());
                    Ok(())
                })
                .interest(
                    ObjectInterest::builder(ObjectType::Any)
                        .constraint(
                            ConstraintSubject::Global,
                            "daemon.profile",
                            ConstraintVerb::Equals("main".into()),
                        )
                        .build(),
                ),
            )
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;
        assert_eq!(log.lock().as_slice(), &["profiled"]);

        // A different profile no longer selects the hook.
        dispatcher.set_global_properties(
            Properties::from_pairs([("daemon.profile", "video")]).unwrap(),
        );
        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn registration_replaces_same_name() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        let first = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::simple("dup", move |_| {
                    first.lock().push("first".into());
                    Ok(())
                })
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();
        let second = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::simple("dup", move |_| {
                    second.lock().push("second".into());
                    Ok(())
                })
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["second"]);
    }

    #[tokio::test]
    async fn failing_hook_does_not_stop_the_chain() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register_hook(
                EventHook::simple("bad", |_| Err(crate::hook::HookError::new("boom")))
                    .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();
        dispatcher
            .register_hook(recording_hook("good", &log).runs_after(["bad"]))
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["good"]);
        assert_eq!(dispatcher.stats().hook_failures, 1);
    }

    #[tokio::test]
    async fn async_hook_completes_before_successor_starts() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();

        let steps = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::stepped(
                    "x",
                    |_, previous| match previous {
                        INITIAL_STEP => Some("s1".to_string()),
                        "s1" => Some("s2".to_string()),
                        _ => None,
                    },
                    move |_, step, handle| {
                        let steps = Arc::clone(&steps);
                        let step = step.to_string();
                        tokio::spawn(async move {
                            tokio::task::yield_now().await;
                            steps.lock().push(format!("x:{step}"));
                            handle.succeed();
                        });
                    },
                )
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();
        dispatcher
            .register_hook(recording_hook("y", &log).runs_after(["x"]))
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["x:s1", "x:s2", "y"]);
    }

    #[tokio::test]
    async fn failing_step_terminates_hook_but_not_dispatch() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register_hook(
                EventHook::stepped(
                    "flaky",
                    |_, previous| match previous {
                        INITIAL_STEP => Some("s1".to_string()),
                        "s1" => Some("never-reached".to_string()),
                        _ => None,
                    },
                    |_, _, handle| handle.fail(crate::hook::HookError::new("step boom")),
                )
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();
        dispatcher
            .register_hook(recording_hook("after", &log).runs_after(["flaky"]))
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["after"]);
        assert_eq!(dispatcher.stats().hook_failures, 1);
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_hooks() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        let cancelling = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::simple("canceller", move |event| {
                    cancelling.lock().push("canceller".into());
                    event.cancel();
                    Ok(())
                })
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();
        dispatcher
            .register_hook(recording_hook("skipped", &log).runs_after(["canceller"]))
            .unwrap();

        let event = test_event("object-removed", 0);
        dispatcher.push(event);
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["canceller"]);
    }

    #[tokio::test]
    async fn queued_events_survive_cancellation_of_another() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_hook(recording_hook("record", &log)).unwrap();

        let doomed = test_event("doomed", 10);
        doomed.cancel();
        dispatcher.push(doomed);
        dispatcher.push(test_event("kept", 0));
        dispatcher.run_until_idle().await;

        assert_eq!(log.lock().as_slice(), &["record"]);
    }

    #[tokio::test]
    async fn follow_up_events_run_after_current_event_completes() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        let injector = dispatcher.injector();

        let first = Arc::clone(&log);
        dispatcher
            .register_hook(
                EventHook::simple("chaining", move |event| {
                    first.lock().push(format!("hook:{}", event.event_type()));
                    if event.event_type() == "object-added" {
                        let follow_up = Event::new(
                            "select-target",
                            100,
                            ObjectType::SessionItem,
                            Properties::new(),
                        );
                        injector.push(follow_up).map_err(|e| {
                            crate::hook::HookError::new(e.to_string())
                        })?;
                    }
                    Ok(())
                })
                .interest(ObjectInterest::any(ObjectType::Any)),
            )
            .unwrap();
        dispatcher
            .register_hook(recording_hook("tail", &log).runs_after(["chaining"]))
            .unwrap();

        dispatcher.push(test_event("object-added", 0));
        dispatcher.run_until_idle().await;

        // The follow-up (higher priority) still runs only after every hook of
        // the current event has completed.
        assert_eq!(
            log.lock().as_slice(),
            &["hook:object-added", "tail", "hook:select-target", "tail"]
        );
    }

    #[tokio::test]
    async fn run_drains_injected_events_until_shutdown() {
        let log: Log = Log::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_hook(recording_hook("record", &log)).unwrap();

        let injector = dispatcher.injector();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();

        injector.push(test_event("object-added", 0)).unwrap();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            stop.cancel();
        });
        dispatcher.run(shutdown).await;

        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn queue_orders_by_priority_then_sequence() {
        let mut queue = BinaryHeap::new();
        queue.push(QueuedEvent {
            event: test_event("b", 1),
            seq: 0,
        });
        queue.push(QueuedEvent {
            event: test_event("a", 5),
            seq: 1,
        });
        queue.push(QueuedEvent {
            event: test_event("c", 1),
            seq: 2,
        });

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|q| q.event.event_type().to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }
}
