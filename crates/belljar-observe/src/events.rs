//! Observable events over a sandbox session's lifetime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// How one run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The code body resolved with a value.
    Resolved,
    /// The code body was not syntactically valid.
    CompileFailed,
    /// The code body threw or a suspension rejected.
    RuntimeFailed,
    /// The session was disposed while the run was pending.
    Disposed,
}

impl RunOutcome {
    /// Check if the outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Resolved)
    }
}

/// Events that can be observed during a session's lifetime.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session finished construction.
    SessionCreated {
        /// Session debug name.
        name: String,
        /// Number of capabilities in the dispatch table.
        capability_count: usize,
    },
    /// A run was submitted.
    RunStarted {
        /// Length of the submitted code text.
        code_len: usize,
    },
    /// A run reached its terminal state.
    RunCompleted {
        /// How it ended.
        outcome: RunOutcome,
        /// Time from submission to settlement.
        duration: Duration,
    },
    /// A capability was invoked from sandboxed code.
    CapabilityInvoked {
        /// Dotted path of the capability in the exposed graph.
        name: String,
        /// Dispatch duration, including the host function itself.
        duration: Duration,
    },
    /// An invoke arrived carrying a token outside the table.
    UnknownTokenInvoked {
        /// The raw token value.
        token: u32,
    },
    /// The session was disposed.
    SessionDisposed {
        /// Session debug name.
        name: String,
    },
    /// An error occurred outside any single run.
    Error {
        /// Error message.
        message: String,
    },
}

impl SessionEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SessionCreated { .. } => "session_created",
            SessionEvent::RunStarted { .. } => "run_started",
            SessionEvent::RunCompleted { .. } => "run_completed",
            SessionEvent::CapabilityInvoked { .. } => "capability_invoked",
            SessionEvent::UnknownTokenInvoked { .. } => "unknown_token_invoked",
            SessionEvent::SessionDisposed { .. } => "session_disposed",
            SessionEvent::Error { .. } => "error",
        }
    }
}

/// Subscriber for session events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);

    /// Filter for event types this subscriber is interested in.
    /// Returns `None` to receive all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that logs events through `tracing`.
#[derive(Default)]
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SessionCreated {
                name,
                capability_count,
            } => {
                tracing::info!(
                    event = "session_created",
                    name = name,
                    capabilities = capability_count,
                    "Session created"
                );
            }
            SessionEvent::RunStarted { code_len } => {
                tracing::debug!(event = "run_started", code_len = code_len, "Run started");
            }
            SessionEvent::RunCompleted { outcome, duration } => {
                tracing::info!(
                    event = "run_completed",
                    success = outcome.is_success(),
                    duration_ms = duration.as_millis(),
                    "Run completed"
                );
            }
            SessionEvent::CapabilityInvoked { name, duration } => {
                tracing::trace!(
                    event = "capability_invoked",
                    name = name,
                    duration_us = duration.as_micros(),
                    "Capability invoked"
                );
            }
            SessionEvent::UnknownTokenInvoked { token } => {
                tracing::warn!(
                    event = "unknown_token_invoked",
                    token = token,
                    "Unknown token invoked"
                );
            }
            SessionEvent::SessionDisposed { name } => {
                tracing::info!(event = "session_disposed", name = name, "Session disposed");
            }
            SessionEvent::Error { message } => {
                tracing::error!(event = "error", message = message, "Error occurred");
            }
        }
    }
}

/// A subscriber that collects events for later analysis.
pub struct CollectingSubscriber {
    events: RwLock<Vec<(Instant, SessionEvent)>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a new collecting subscriber.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<(Instant, SessionEvent)> {
        self.events.read().clone()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &SessionEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push((Instant::now(), event.clone()));
        }
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = SessionEvent::SessionCreated {
            name: "s".to_string(),
            capability_count: 2,
        };
        assert_eq!(event.event_type(), "session_created");
    }

    #[test]
    fn test_collecting_subscriber() {
        let subscriber = CollectingSubscriber::new(100);

        subscriber.on_event(&SessionEvent::RunStarted { code_len: 8 });
        assert_eq!(subscriber.len(), 1);

        match &subscriber.events()[0].1 {
            SessionEvent::RunStarted { code_len } => assert_eq!(*code_len, 8),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_collecting_subscriber_cap() {
        let subscriber = CollectingSubscriber::new(2);
        for _ in 0..5 {
            subscriber.on_event(&SessionEvent::RunStarted { code_len: 1 });
        }
        assert_eq!(subscriber.len(), 2);
    }

    #[test]
    fn test_dispatcher_fans_out() {
        let dispatcher = EventDispatcher::new();
        let collector = Arc::new(CollectingSubscriber::new(10));
        dispatcher.subscribe(Arc::clone(&collector) as Arc<dyn EventSubscriber>);

        dispatcher.emit(SessionEvent::SessionDisposed {
            name: "s".to_string(),
        });
        assert_eq!(collector.len(), 1);
    }

    struct FilteredSubscriber(CollectingSubscriber);

    impl EventSubscriber for FilteredSubscriber {
        fn on_event(&self, event: &SessionEvent) {
            self.0.on_event(event);
        }

        fn event_filter(&self) -> Option<Vec<&'static str>> {
            Some(vec!["run_completed"])
        }
    }

    #[test]
    fn test_event_filter() {
        let dispatcher = EventDispatcher::new();
        let filtered = Arc::new(FilteredSubscriber(CollectingSubscriber::new(10)));
        dispatcher.subscribe(Arc::clone(&filtered) as Arc<dyn EventSubscriber>);

        dispatcher.emit(SessionEvent::RunStarted { code_len: 1 });
        dispatcher.emit(SessionEvent::RunCompleted {
            outcome: RunOutcome::Resolved,
            duration: Duration::ZERO,
        });

        assert_eq!(filtered.0.len(), 1);
    }
}
