//! Reconstruction of the exposed globals inside the guest context.
//!
//! The constants tree arrives as plain data and is rebuilt with the engine's
//! JSON conversion. The methods tree is then merged into it in place: every
//! token position becomes a proxy closure that forwards its call across the
//! channel and settles a promise with the eventual response. Finally each
//! top-level key of the merged tree is bound as a global identifier.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use boa_engine::builtins::promise::ResolvingFunctions;
use boa_engine::object::builtins::{JsFunction, JsPromise};
use boa_engine::object::{FunctionObjectBuilder, JsObject};
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsNativeError, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace, empty_trace};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use belljar_bridge::port::RelayMessage;
use belljar_bridge::protocol::{Frame, InstallParams, InvokeParams, METHOD_INVOKE};
use belljar_capability::{MethodNode, Token};

/// Resolvers of one in-flight proxy invocation.
pub(crate) struct PendingInvoke {
    pub(crate) resolve: JsFunction,
    pub(crate) reject: JsFunction,
}

/// Guest-side state shared between the event loop and proxy closures.
pub(crate) struct GuestShared {
    /// Outbound half of the port.
    pub(crate) tx: UnboundedSender<RelayMessage>,
    /// Correlation counter for guest-originated calls.
    pub(crate) next_invoke: u64,
    /// In-flight proxy invocations awaiting a response.
    pub(crate) pending: HashMap<u64, PendingInvoke>,
}

#[derive(Finalize)]
struct ProxyCapture {
    shared: Rc<RefCell<GuestShared>>,
    token: Token,
}

// The capture holds no engine-heap values of its own; promise resolvers are
// rooted through the shared pending map.
unsafe impl Trace for ProxyCapture {
    empty_trace!();
}

/// Install the split globals into the context. Called exactly once.
pub(crate) fn install(
    context: &mut Context,
    shared: &Rc<RefCell<GuestShared>>,
    params: InstallParams,
) -> boa_engine::JsResult<()> {
    let mut bound: BTreeMap<String, JsValue> = BTreeMap::new();

    for (key, value) in &params.constants {
        bound.insert(key.clone(), JsValue::from_json(value, context)?);
    }

    for (key, node) in &params.methods {
        match node {
            MethodNode::Token(token) => {
                let proxy = proxy_function(context, Rc::clone(shared), *token, key);
                bound.insert(key.clone(), proxy.into());
            }
            MethodNode::Branch(children) => {
                let target = match bound.get(key).and_then(JsValue::as_object) {
                    Some(object) => object.clone(),
                    // No constants landed at this key; merge into a fresh
                    // object.
                    None => {
                        let object = JsObject::with_object_proto(context.intrinsics());
                        bound.insert(key.clone(), object.clone().into());
                        object
                    }
                };
                merge_branch(context, shared, &target, children)?;
            }
        }
    }

    let count = bound.len();
    for (key, value) in bound {
        context.register_global_property(JsString::from(key.as_str()), value, Attribute::all())?;
    }
    debug!(globals = count, "Installed exposed globals");

    Ok(())
}

fn merge_branch(
    context: &mut Context,
    shared: &Rc<RefCell<GuestShared>>,
    target: &JsObject,
    children: &BTreeMap<String, MethodNode>,
) -> boa_engine::JsResult<()> {
    for (key, node) in children {
        match node {
            MethodNode::Token(token) => {
                let proxy = proxy_function(context, Rc::clone(shared), *token, key);
                target.set(JsString::from(key.as_str()), proxy, false, context)?;
            }
            MethodNode::Branch(grandchildren) => {
                let existing = target.get(JsString::from(key.as_str()), context)?;
                let child = match existing.as_object() {
                    Some(object) => object.clone(),
                    None => {
                        let object = JsObject::with_object_proto(context.intrinsics());
                        target.set(
                            JsString::from(key.as_str()),
                            object.clone(),
                            false,
                            context,
                        )?;
                        object
                    }
                };
                merge_branch(context, shared, &child, grandchildren)?;
            }
        }
    }
    Ok(())
}

/// Build the proxy closure standing in for one capability token.
///
/// Invoking the proxy serializes its arguments, issues a single outbound
/// `invoke(token, args)` call, and returns a promise that the event loop
/// settles when the response frame arrives.
fn proxy_function(
    context: &mut Context,
    shared: Rc<RefCell<GuestShared>>,
    token: Token,
    name: &str,
) -> JsFunction {
    let capture = ProxyCapture { shared, token };
    let native = unsafe {
        NativeFunction::from_closure_with_captures(
            |_this, args, captures, context| {
                let mut call_args = Vec::with_capacity(args.len());
                for arg in args {
                    call_args.push(crate::convert::json_from_value(arg, context)?);
                }

                let params = serde_json::to_value(InvokeParams {
                    token: captures.token,
                    args: call_args,
                })
                .map_err(|err| {
                    JsNativeError::error().with_message(format!("invoke encoding failed: {err}"))
                })?;

                let (promise, resolvers) = JsPromise::new_pending(context);
                let ResolvingFunctions { resolve, reject } = resolvers;

                let mut shared = captures.shared.borrow_mut();
                let id = shared.next_invoke;
                shared.next_invoke += 1;
                let frame = Frame::request(id, METHOD_INVOKE, params);
                let body = frame.encode().map_err(|err| {
                    JsNativeError::error().with_message(format!("invoke encoding failed: {err}"))
                })?;

                if shared.tx.send(RelayMessage::Payload { body }).is_ok() {
                    shared.pending.insert(id, PendingInvoke { resolve, reject });
                } else {
                    // The host is gone; settle the call now instead of
                    // leaving it pending forever.
                    drop(shared);
                    let error = JsError::from_native(
                        JsNativeError::error().with_message("sandbox channel closed"),
                    );
                    let opaque = error.to_opaque(context);
                    reject.call(&JsValue::undefined(), &[opaque], context)?;
                }

                Ok(promise.into())
            },
            capture,
        )
    };

    FunctionObjectBuilder::new(context.realm(), native)
        .name(JsString::from(name))
        .length(0)
        .constructor(false)
        .build()
}
