//! Belljar Observability
//!
//! This crate provides observability features for the Belljar script
//! sandbox:
//!
//! - [`EventDispatcher`]: observable session lifecycle and invocation events
//! - [`MetricsCollector`]: per-session run/invoke metrics
//!
//! # Event Subscription
//!
//! ```
//! use std::sync::Arc;
//! use belljar_observe::{CollectingSubscriber, EventDispatcher, EventSubscriber, SessionEvent};
//!
//! let dispatcher = EventDispatcher::new();
//! let collector = Arc::new(CollectingSubscriber::new(1024));
//! dispatcher.subscribe(Arc::clone(&collector) as Arc<dyn EventSubscriber>);
//!
//! dispatcher.emit(SessionEvent::RunStarted { code_len: 12 });
//! assert_eq!(collector.len(), 1);
//! ```
//!
//! # Metrics
//!
//! ```
//! use std::time::Duration;
//! use belljar_observe::MetricsCollector;
//!
//! let metrics = MetricsCollector::new();
//! metrics.record_run(true, Duration::from_millis(7));
//! assert_eq!(metrics.snapshot().runs.total, 1);
//! ```

pub mod events;
pub mod metrics;

// Re-export main types
pub use events::{
    CollectingSubscriber, EventDispatcher, EventSubscriber, LoggingSubscriber, RunOutcome,
    SessionEvent,
};
pub use metrics::{InvokeMetrics, MetricsCollector, MetricsSnapshot, RunMetrics};
