//! Capability dispatch: the host side of the `invoke` bridge.
//!
//! An invoke carrying a token outside the table, an unrecognized method,
//! or parameters that do not parse: all resolve silently to null.
//! Malformed traffic gets "no value", never an error: an internal indexing
//! detail must not become an observable signal about the table's shape.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use belljar_bridge::channel::RequestHandler;
use belljar_bridge::protocol::{InvokeParams, METHOD_INVOKE, WireFault};
use belljar_capability::CapabilityTable;
use belljar_observe::{EventDispatcher, MetricsCollector, SessionEvent};

/// Serves `invoke` requests against one session's capability table.
pub(crate) struct TableDispatcher {
    table: Arc<CapabilityTable>,
    events: Arc<EventDispatcher>,
    metrics: Arc<MetricsCollector>,
}

impl TableDispatcher {
    pub(crate) fn new(
        table: Arc<CapabilityTable>,
        events: Arc<EventDispatcher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            table,
            events,
            metrics,
        }
    }
}

impl RequestHandler for TableDispatcher {
    fn handle(
        &self,
        method: String,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, WireFault>> + Send>> {
        let table = Arc::clone(&self.table);
        let events = Arc::clone(&self.events);
        let metrics = Arc::clone(&self.metrics);

        Box::pin(async move {
            if method != METHOD_INVOKE {
                trace!(method, "Unrecognized inbound method");
                return Ok(serde_json::Value::Null);
            }

            let invoke: InvokeParams = match serde_json::from_value(params) {
                Ok(params) => params,
                Err(err) => {
                    trace!(error = %err, "Malformed invoke parameters");
                    return Ok(serde_json::Value::Null);
                }
            };

            let Some(function) = table.get(invoke.token) else {
                metrics.record_unknown_token();
                events.emit(SessionEvent::UnknownTokenInvoked {
                    token: invoke.token.0,
                });
                return Ok(serde_json::Value::Null);
            };

            let name = table.name_of(invoke.token).unwrap_or_default().to_string();
            trace!(token = %invoke.token, name = %name, "Dispatching capability");

            let start = Instant::now();
            let result = function.call(invoke.args).await;
            let duration = start.elapsed();

            metrics.record_invoke(&name, duration);
            events.emit(SessionEvent::CapabilityInvoked { name, duration });

            // A host function error rejects the awaiting proxy.
            result.map_err(|err| WireFault::runtime(err.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use belljar_capability::HostFunction;
    use serde_json::json;

    fn dispatcher(table: CapabilityTable) -> TableDispatcher {
        TableDispatcher::new(
            Arc::new(table),
            Arc::new(EventDispatcher::new()),
            Arc::new(MetricsCollector::new()),
        )
    }

    #[tokio::test]
    async fn test_dispatch_invokes_with_exact_args() {
        let mut table = CapabilityTable::new();
        table.push("echo", HostFunction::from_sync(|args| Ok(json!(args))));
        let dispatcher = dispatcher(table);

        let result = dispatcher
            .handle(
                METHOD_INVOKE.to_string(),
                json!({ "token": 0, "args": ["a", 1, null] }),
            )
            .await
            .unwrap();
        assert_eq!(result, json!(["a", 1, null]));
    }

    #[tokio::test]
    async fn test_out_of_range_token_is_silent_null() {
        let dispatcher = dispatcher(CapabilityTable::new());

        let result = dispatcher
            .handle(METHOD_INVOKE.to_string(), json!({ "token": 99, "args": [] }))
            .await
            .unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_unrecognized_method_is_silent_null() {
        let dispatcher = dispatcher(CapabilityTable::new());

        let result = dispatcher
            .handle("unknown".to_string(), json!({}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_params_are_silent_null() {
        let dispatcher = dispatcher(CapabilityTable::new());

        let result = dispatcher
            .handle(METHOD_INVOKE.to_string(), json!("not an object"))
            .await
            .unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_host_error_becomes_runtime_fault() {
        let mut table = CapabilityTable::new();
        table.push(
            "bad",
            HostFunction::from_sync(|_| Err(anyhow::anyhow!("it broke"))),
        );
        let dispatcher = dispatcher(table);

        let fault = dispatcher
            .handle(METHOD_INVOKE.to_string(), json!({ "token": 0, "args": [] }))
            .await
            .unwrap_err();
        assert!(fault.message.contains("it broke"));
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let mut table = CapabilityTable::new();
        table.push("f", HostFunction::from_sync(|_| Ok(json!(1))));
        let metrics = Arc::new(MetricsCollector::new());
        let dispatcher = TableDispatcher::new(
            Arc::new(table),
            Arc::new(EventDispatcher::new()),
            Arc::clone(&metrics),
        );

        dispatcher
            .handle(METHOD_INVOKE.to_string(), json!({ "token": 0, "args": [] }))
            .await
            .unwrap();
        dispatcher
            .handle(METHOD_INVOKE.to_string(), json!({ "token": 5, "args": [] }))
            .await
            .unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.invokes.total, 1);
        assert_eq!(snapshot.invokes.unknown_tokens, 1);
        assert_eq!(snapshot.invokes.call_counts["f"], 1);
    }
}
