//! Immutable event records describing changes in the media graph.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::interest::ObjectType;
use crate::properties::Properties;

/// Opaque reference to the object an event is about.
pub type Subject = Arc<dyn Any + Send + Sync>;

/// An immutable record of something observable that happened.
///
/// Events are cheap to clone; all clones share the same record and the same
/// cancellation token. The dispatcher never mutates an event, it only reads
/// `event_type`, `priority`, `subject_type` and `properties`.
#[derive(Clone)]
pub struct Event {
    inner: Arc<Inner>,
}

struct Inner {
    event_type: String,
    priority: i32,
    subject_type: ObjectType,
    subject: Option<Subject>,
    properties: Properties,
    cancel: CancellationToken,
}

impl Event {
    /// Creates an event without a subject reference.
    pub fn new(
        event_type: impl Into<String>,
        priority: i32,
        subject_type: ObjectType,
        properties: Properties,
    ) -> Self {
        Self::build(event_type.into(), priority, subject_type, None, properties)
    }

    /// Creates an event carrying an opaque subject reference.
    pub fn with_subject(
        event_type: impl Into<String>,
        priority: i32,
        subject_type: ObjectType,
        subject: Subject,
        properties: Properties,
    ) -> Self {
        Self::build(
            event_type.into(),
            priority,
            subject_type,
            Some(subject),
            properties,
        )
    }

    fn build(
        event_type: String,
        priority: i32,
        subject_type: ObjectType,
        subject: Option<Subject>,
        properties: Properties,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                event_type,
                priority,
                subject_type,
                subject,
                properties,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.inner.event_type
    }

    /// Scheduling priority; higher is dispatched earlier.
    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn subject_type(&self) -> ObjectType {
        self.inner.subject_type
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.inner.subject.as_ref()
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// Cancels the event: remaining hooks are skipped and the currently
    /// executing async hook is asked to finish as quickly as possible.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Token observed by async hook steps through their completion handle.
    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.inner.event_type)
            .field("priority", &self.inner.priority)
            .field("subject_type", &self.inner.subject_type)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
