//! The guest runtime: one isolated execution context on its own thread.
//!
//! The engine context is `!Send`, so everything engine-related lives on a
//! dedicated thread that pulls messages off the port. Between messages the
//! context idles; during a `run` the loop alternates between draining the
//! engine's job queue and blocking on the port for invoke responses, which
//! is exactly the cooperative suspension model the execution contract asks
//! for. The context is long-lived: global state survives across runs until
//! the session goes away and the port closes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::JsPromise;
use boa_engine::{Context, JsError, JsNativeError, JsValue, Source};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};

use belljar_bridge::port::{Port, RelayMessage};
use belljar_bridge::protocol::{
    CallResult, Frame, InstallParams, METHOD_INSTALL, METHOD_RUN, RunParams, WireFault,
};
use belljar_bridge::relay::{GuestBoot, InnerSpawn};

use crate::convert;
use crate::install::{GuestShared, PendingInvoke, install};
use crate::limits::GuestLimits;

/// Start a guest runtime on a dedicated thread.
///
/// The thread evaluates the boot program, then serves `install`/`run`
/// requests until the port closes.
pub fn spawn(
    port: Port,
    boot: GuestBoot,
    limits: GuestLimits,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("belljar-guest-{}", boot.name))
        .spawn(move || run_guest(port, boot, limits))
}

/// Build the inner-context factory wired into a
/// [`ThreadContainer`](belljar_bridge::ThreadContainer).
pub fn inner_spawn(limits: GuestLimits) -> Arc<InnerSpawn> {
    Arc::new(move |port, boot| spawn(port, boot, limits).map(|_| ()))
}

fn run_guest(port: Port, boot: GuestBoot, limits: GuestLimits) {
    let (tx, rx) = port.split();

    let mut context = Context::default();
    context.set_runtime_limits(limits.engine_limits());

    let shared = Rc::new(RefCell::new(GuestShared {
        tx,
        next_invoke: 0,
        pending: HashMap::new(),
    }));

    let mut guest = Guest {
        context,
        shared,
        rx,
        installed: false,
        boot_error: None,
        name: boot.name,
    };

    if !boot.source.is_empty() {
        if let Err(err) = guest.context.eval(Source::from_bytes(boot.source.as_bytes())) {
            warn!(name = %guest.name, error = %err, "Guest startup program failed");
            guest.boot_error = Some(err.to_string());
        }
    }

    debug!(name = %guest.name, "Guest runtime ready");
    guest.serve();
    debug!(name = %guest.name, "Guest runtime stopped");
}

struct Guest {
    context: Context,
    shared: Rc<RefCell<GuestShared>>,
    rx: UnboundedReceiver<RelayMessage>,
    installed: bool,
    boot_error: Option<String>,
    name: String,
}

impl Guest {
    fn serve(&mut self) {
        while let Some(message) = self.rx.blocking_recv() {
            self.handle(message);
        }
    }

    fn handle(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Init { name, .. } => {
                warn!(name, "Ignoring duplicate init envelope");
            }
            RelayMessage::Payload { body } => match Frame::decode(&body) {
                Ok(Frame::Request { id, method, params }) => self.handle_request(id, method, params),
                Ok(Frame::Response { id, result }) => self.settle_invoke(id, result),
                Err(err) => warn!(error = %err, "Discarding undecodable payload"),
            },
        }
    }

    fn handle_request(&mut self, id: u64, method: String, params: serde_json::Value) {
        if let Some(message) = &self.boot_error {
            let message = format!("guest context failed to start: {message}");
            self.respond(id, Err(WireFault::internal(message)));
            return;
        }

        match method.as_str() {
            METHOD_INSTALL => {
                let outcome = self.handle_install(params);
                self.respond(id, outcome);
            }
            METHOD_RUN => match serde_json::from_value::<RunParams>(params) {
                Ok(run) => self.execute(id, &run.code),
                Err(err) => self.respond(
                    id,
                    Err(WireFault::internal(format!("malformed run request: {err}"))),
                ),
            },
            // Unrecognized methods have no observable effect beyond "no
            // value".
            other => {
                trace!(method = other, "Unrecognized method");
                self.respond(id, Ok(serde_json::Value::Null));
            }
        }
    }

    fn handle_install(&mut self, params: serde_json::Value) -> Result<serde_json::Value, WireFault> {
        if self.installed {
            return Err(WireFault::internal("globals already installed"));
        }
        let params: InstallParams = serde_json::from_value(params)
            .map_err(|err| WireFault::internal(format!("malformed install request: {err}")))?;

        install(&mut self.context, &self.shared, params)
            .map_err(|err| WireFault::internal(format!("install failed: {err}")))?;
        self.installed = true;
        Ok(serde_json::Value::Null)
    }

    /// Execute one code body and answer the pending `run` request.
    fn execute(&mut self, id: u64, code: &str) {
        if !self.installed {
            self.respond(
                id,
                Err(WireFault::internal("code submitted before installation")),
            );
            return;
        }

        // The body compiles as an implicitly-asynchronous function taking no
        // arguments; an explicit `return` supplies the value, falling off
        // the end yields none.
        let wrapped = format!("(async () => {{\n{code}\n}})");
        let function = match self.context.eval(Source::from_bytes(wrapped.as_bytes())) {
            Ok(value) => value,
            Err(err) => {
                self.respond(id, Err(WireFault::compile(err.to_string())));
                return;
            }
        };

        let Some(function) = function.as_object().cloned() else {
            self.respond(
                id,
                Err(WireFault::internal("compiled body is not callable")),
            );
            return;
        };

        let outcome = match function.call(&JsValue::undefined(), &[], &mut self.context) {
            Ok(value) => value,
            // An async function converts throws into rejections; anything
            // surfacing here is an engine-level abort (e.g. a resource
            // limit).
            Err(err) => {
                self.respond(id, Err(WireFault::runtime(err.to_string())));
                return;
            }
        };

        let promise = match outcome.as_object().cloned().map(JsPromise::from_object) {
            Some(Ok(promise)) => promise,
            _ => {
                self.respond(
                    id,
                    Err(WireFault::internal("execution did not produce a promise")),
                );
                return;
            }
        };

        loop {
            self.context.run_jobs();

            match promise.state() {
                PromiseState::Fulfilled(value) => {
                    let result = match convert::json_from_value(&value, &mut self.context) {
                        Ok(json) => Ok(json),
                        Err(err) => Err(WireFault::runtime(format!(
                            "result cannot cross the sandbox boundary: {err}"
                        ))),
                    };
                    self.respond(id, result);
                    return;
                }
                PromiseState::Rejected(value) => {
                    let message = convert::error_message(&value, &mut self.context);
                    self.respond(id, Err(WireFault::runtime(message)));
                    return;
                }
                PromiseState::Pending => {
                    // Suspended on at least one outstanding invoke (or on a
                    // promise only the host can settle). Block for traffic;
                    // a closed port means the session is being disposed and
                    // the host has already failed the run on its side.
                    match self.rx.blocking_recv() {
                        None => {
                            debug!(name = %self.name, "Port closed during run");
                            return;
                        }
                        Some(RelayMessage::Payload { body }) => match Frame::decode(&body) {
                            Ok(Frame::Response { id, result }) => self.settle_invoke(id, result),
                            Ok(Frame::Request { id: request_id, method, .. }) => self.respond(
                                request_id,
                                Err(WireFault::internal(format!(
                                    "{method} rejected: a run is in flight"
                                ))),
                            ),
                            Err(err) => warn!(error = %err, "Discarding undecodable payload"),
                        },
                        Some(RelayMessage::Init { name, .. }) => {
                            warn!(name, "Ignoring init envelope during run");
                        }
                    }
                }
            }
        }
    }

    /// Settle the proxy promise waiting on an invoke response.
    fn settle_invoke(&mut self, id: u64, result: CallResult) {
        let pending = self.shared.borrow_mut().pending.remove(&id);
        let Some(PendingInvoke { resolve, reject }) = pending else {
            trace!(id, "Discarding stray invoke response");
            return;
        };

        let settled = match result {
            CallResult::Ok { value } => match JsValue::from_json(&value, &mut self.context) {
                Ok(value) => resolve.call(&JsValue::undefined(), &[value], &mut self.context),
                Err(err) => {
                    let opaque = err.to_opaque(&mut self.context);
                    reject.call(&JsValue::undefined(), &[opaque], &mut self.context)
                }
            },
            CallResult::Err { fault } => {
                let error = JsError::from_native(
                    JsNativeError::error().with_message(fault.message.clone()),
                );
                let opaque = error.to_opaque(&mut self.context);
                reject.call(&JsValue::undefined(), &[opaque], &mut self.context)
            }
        };

        if let Err(err) = settled {
            warn!(id, error = %err, "Failed to settle proxy promise");
        }
    }

    /// Answer a host request. Send failures mean the session is gone and the
    /// response has nowhere to go.
    fn respond(&self, id: u64, result: Result<serde_json::Value, WireFault>) {
        let frame = match result {
            Ok(value) => Frame::ok(id, value),
            Err(fault) => Frame::fault(id, fault),
        };
        let body = match frame.encode() {
            Ok(body) => body,
            Err(err) => {
                warn!(id, error = %err, "Failed to encode response");
                return;
            }
        };
        let shared = self.shared.borrow();
        if shared.tx.send(RelayMessage::Payload { body }).is_err() {
            trace!(id, "Dropping response for closed port");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use belljar_bridge::channel::{Channel, ChannelError, RequestHandler};
    use belljar_bridge::protocol::{FaultKind, InvokeParams, METHOD_INVOKE};
    use belljar_capability::Token;

    use crate::scrub;

    /// Host-side stand-in serving `invoke` with canned behavior.
    struct TestDispatcher {
        calls: Arc<Mutex<Vec<InvokeParams>>>,
    }

    impl TestDispatcher {
        fn new() -> (Self, Arc<Mutex<Vec<InvokeParams>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl RequestHandler for TestDispatcher {
        fn handle(
            &self,
            method: String,
            params: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, WireFault>> + Send>> {
            let calls = Arc::clone(&self.calls);
            Box::pin(async move {
                assert_eq!(method, METHOD_INVOKE);
                let invoke: InvokeParams = serde_json::from_value(params).unwrap();
                calls.lock().unwrap().push(invoke.clone());
                match invoke.token {
                    // Echo the arguments back.
                    Token(0) => Ok(json!(invoke.args)),
                    // Asynchronous result.
                    Token(1) => {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(json!("late"))
                    }
                    // Host-side failure.
                    Token(2) => Err(WireFault::runtime("host function failed")),
                    _ => Ok(serde_json::Value::Null),
                }
            })
        }
    }

    fn boot() -> GuestBoot {
        GuestBoot {
            name: "test".to_string(),
            source: scrub::startup_source(),
        }
    }

    fn install_params(methods: &[(&str, u32)], constants: serde_json::Value) -> serde_json::Value {
        let methods: std::collections::BTreeMap<String, serde_json::Value> = methods
            .iter()
            .map(|(name, token)| (name.to_string(), json!(token)))
            .collect();
        json!({ "constants": constants, "methods": methods })
    }

    async fn guest_channel(methods: &[(&str, u32)], constants: serde_json::Value) -> Channel {
        let (host_port, guest_port) = Port::pair();
        spawn(guest_port, boot(), GuestLimits::default()).unwrap();

        let (dispatcher, _calls) = TestDispatcher::new();
        let channel = Channel::new(host_port, Arc::new(dispatcher));
        channel
            .call(METHOD_INSTALL, install_params(methods, constants))
            .await
            .unwrap();
        channel
    }

    async fn run(channel: &Channel, code: &str) -> Result<serde_json::Value, ChannelError> {
        channel.call(METHOD_RUN, json!({ "code": code })).await
    }

    fn fault_kind(error: &ChannelError) -> Option<FaultKind> {
        match error {
            ChannelError::Fault(fault) => Some(fault.kind),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_constant_round_trip() {
        let channel = guest_channel(&[], json!({ "answer": 42, "cfg": { "deep": [1, 2] } })).await;

        assert_eq!(run(&channel, "return answer").await.unwrap(), json!(42));
        assert_eq!(
            run(&channel, "return cfg.deep").await.unwrap(),
            json!([1, 2])
        );
    }

    #[tokio::test]
    async fn test_no_return_yields_null() {
        let channel = guest_channel(&[], json!({})).await;
        assert_eq!(
            run(&channel, "const x = 1;").await.unwrap(),
            serde_json::Value::Null
        );
    }

    #[tokio::test]
    async fn test_compile_error() {
        let channel = guest_channel(&[], json!({})).await;
        let error = run(&channel, "return {").await.unwrap_err();
        assert_eq!(fault_kind(&error), Some(FaultKind::Compile));

        // The session survives a compile failure.
        assert_eq!(run(&channel, "return 1").await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_runtime_throw() {
        let channel = guest_channel(&[], json!({})).await;
        let error = run(&channel, "throw new Error('boom')").await.unwrap_err();
        assert_eq!(fault_kind(&error), Some(FaultKind::Runtime));
        match error {
            ChannelError::Fault(fault) => assert!(fault.message.contains("boom")),
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_runtime_error() {
        let channel = guest_channel(&[], json!({})).await;
        let error = run(&channel, "return nonexistent").await.unwrap_err();
        assert_eq!(fault_kind(&error), Some(FaultKind::Runtime));
        match error {
            ChannelError::Fault(fault) => {
                assert!(fault.message.contains("not defined"), "{}", fault.message);
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_proxy_invocation_with_args() {
        let channel = guest_channel(&[("echo", 0)], json!({})).await;
        let result = run(&channel, "return await echo('a', 2, [3])").await.unwrap();
        assert_eq!(result, json!(["a", 2, [3]]));
    }

    #[tokio::test]
    async fn test_async_host_function_suspends_and_resumes() {
        let channel = guest_channel(&[("slow", 1)], json!({})).await;
        let result = run(&channel, "const v = await slow(); return v + '!'")
            .await
            .unwrap();
        assert_eq!(result, json!("late!"));
    }

    #[tokio::test]
    async fn test_host_fault_rejects_proxy_call() {
        let channel = guest_channel(&[("bad", 2)], json!({})).await;
        let result = run(
            &channel,
            "try { await bad(); return 'unreachable' } catch (e) { return String(e) }",
        )
        .await
        .unwrap();
        assert!(
            result.as_str().unwrap().contains("host function failed"),
            "got {result}"
        );
    }

    #[tokio::test]
    async fn test_state_persists_across_runs() {
        let channel = guest_channel(&[], json!({})).await;
        run(&channel, "globalThis.counter = 1").await.unwrap();
        run(&channel, "globalThis.counter += 9").await.unwrap();
        assert_eq!(
            run(&channel, "return globalThis.counter").await.unwrap(),
            json!(10)
        );
    }

    #[tokio::test]
    async fn test_scrubbed_surface_is_inert() {
        let channel = guest_channel(&[], json!({})).await;
        assert_eq!(
            run(&channel, "return typeof eval").await.unwrap(),
            json!("undefined")
        );
        assert_eq!(
            run(&channel, "return typeof Function").await.unwrap(),
            json!("undefined")
        );
        assert_eq!(
            run(&channel, "return typeof (function () {}).constructor")
                .await
                .unwrap(),
            json!("undefined")
        );
        assert_eq!(
            run(&channel, "return typeof (async () => {}).constructor")
                .await
                .unwrap(),
            json!("undefined")
        );
    }

    #[tokio::test]
    async fn test_nested_namespace_proxies() {
        let (host_port, guest_port) = Port::pair();
        spawn(guest_port, boot(), GuestLimits::default()).unwrap();
        let (dispatcher, calls) = TestDispatcher::new();
        let channel = Channel::new(host_port, Arc::new(dispatcher));

        channel
            .call(
                METHOD_INSTALL,
                json!({
                    "constants": { "store": { "region": "eu" } },
                    "methods": { "store": { "get": 0 } }
                }),
            )
            .await
            .unwrap();

        let result = run(&channel, "return [store.region, await store.get('k')]")
            .await
            .unwrap();
        assert_eq!(result, json!(["eu", ["k"]]));
        assert_eq!(calls.lock().unwrap()[0].token, Token(0));
    }

    #[tokio::test]
    async fn test_run_before_install_is_internal_fault() {
        let (host_port, guest_port) = Port::pair();
        spawn(guest_port, boot(), GuestLimits::default()).unwrap();
        let (dispatcher, _) = TestDispatcher::new();
        let channel = Channel::new(host_port, Arc::new(dispatcher));

        let error = run(&channel, "return 1").await.unwrap_err();
        assert_eq!(fault_kind(&error), Some(FaultKind::Internal));
    }

    #[tokio::test]
    async fn test_failed_boot_program_fails_requests() {
        let (host_port, guest_port) = Port::pair();
        spawn(
            guest_port,
            GuestBoot {
                name: "broken".to_string(),
                source: "this is not a program {".to_string(),
            },
            GuestLimits::default(),
        )
        .unwrap();
        let (dispatcher, _) = TestDispatcher::new();
        let channel = Channel::new(host_port, Arc::new(dispatcher));

        let error = channel
            .call(METHOD_INSTALL, install_params(&[], json!({})))
            .await
            .unwrap_err();
        assert_eq!(fault_kind(&error), Some(FaultKind::Internal));
    }

    #[tokio::test]
    async fn test_loop_limit_surfaces_as_runtime_fault() {
        let (host_port, guest_port) = Port::pair();
        spawn(
            guest_port,
            boot(),
            GuestLimits::default().with_loop_iteration_limit(10_000),
        )
        .unwrap();
        let (dispatcher, _) = TestDispatcher::new();
        let channel = Channel::new(host_port, Arc::new(dispatcher));
        channel
            .call(METHOD_INSTALL, install_params(&[], json!({})))
            .await
            .unwrap();

        let error = run(&channel, "while (true) {}").await.unwrap_err();
        assert_eq!(fault_kind(&error), Some(FaultKind::Runtime));
    }
}
