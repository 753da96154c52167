//! Wire protocol spoken between the host orchestrator and the guest runtime.
//!
//! # Protocol Format
//!
//! - **Transport**: an ordered [`Port`](crate::port::Port) link
//! - **Encoding**: JSON, wrapped as opaque relay payloads
//! - **Correlation**: caller-assigned `id`, scoped per direction
//!
//! # Request/Response Flow
//!
//! ```text
//! Host                                  Guest
//!   |                                     |
//!   |  {"frame":"request","method":       |
//!   |   "install",...}                    |
//!   |------------------------------------>|
//!   |  {"frame":"response","id":0,...}    |
//!   |<------------------------------------|
//!   |                                     |
//!   |  run ------------------------------>|
//!   |          <-- invoke(token, args) -- |   (zero or more, nested
//!   |          --- response ------------> |    under the pending run)
//!   |  <-------------------- response     |
//! ```
//!
//! # Methods
//!
//! | Method    | Direction    | Description                                |
//! |-----------|--------------|--------------------------------------------|
//! | `install` | host → guest | Push the constants and methods trees, once |
//! | `run`     | host → guest | Execute one code body                      |
//! | `invoke`  | guest → host | Call the host function behind a token      |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use belljar_capability::{MethodNode, Token};

/// Method name for pushing the split globals to the guest.
pub const METHOD_INSTALL: &str = "install";

/// Method name for executing one code body.
pub const METHOD_RUN: &str = "run";

/// Method name for dispatching a capability token to its host function.
pub const METHOD_INVOKE: &str = "invoke";

// =============================================================================
// Frames
// =============================================================================

/// One message of the call/response protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    /// A call, awaiting exactly one response with the same id.
    Request {
        /// Correlation id, assigned by the calling side.
        id: u64,
        /// Method name; see the module table.
        method: String,
        /// Method parameters.
        params: serde_json::Value,
    },
    /// The terminal outcome of a request.
    Response {
        /// Correlation id of the request being answered.
        id: u64,
        /// Success or fault.
        result: CallResult,
    },
}

impl Frame {
    /// Build a request frame.
    pub fn request(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Frame::Request {
            id,
            method: method.into(),
            params,
        }
    }

    /// Build a success response.
    pub fn ok(id: u64, value: serde_json::Value) -> Self {
        Frame::Response {
            id,
            result: CallResult::Ok { value },
        }
    }

    /// Build a fault response.
    pub fn fault(id: u64, fault: WireFault) -> Self {
        Frame::Response {
            id,
            result: CallResult::Err { fault },
        }
    }

    /// Encode as an opaque payload body.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from an opaque payload body.
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Outcome carried by a response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallResult {
    /// The call completed with a value.
    Ok {
        /// The result value; null means "no value".
        value: serde_json::Value,
    },
    /// The call failed.
    Err {
        /// What went wrong.
        fault: WireFault,
    },
}

// =============================================================================
// Faults
// =============================================================================

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The submitted code is not syntactically valid.
    Compile,
    /// The code (or a host function it invoked) threw.
    Runtime,
    /// The bridge itself misbehaved; not attributable to submitted code.
    Internal,
}

/// A failure crossing the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFault {
    /// Failure class.
    pub kind: FaultKind,
    /// Human-readable description.
    pub message: String,
}

impl WireFault {
    /// A compile-class fault.
    pub fn compile(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Compile,
            message: message.into(),
        }
    }

    /// A runtime-class fault.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Runtime,
            message: message.into(),
        }
    }

    /// An internal fault.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Internal,
            message: message.into(),
        }
    }
}

impl fmt::Display for WireFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FaultKind::Compile => "compile",
            FaultKind::Runtime => "runtime",
            FaultKind::Internal => "internal",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

// =============================================================================
// Method parameters
// =============================================================================

/// Parameters of an `install` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallParams {
    /// Pass-by-value tree, keyed by global identifier.
    pub constants: serde_json::Map<String, serde_json::Value>,
    /// Parallel token tree; keys without capabilities below are absent.
    pub methods: BTreeMap<String, MethodNode>,
}

/// Parameters of a `run` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    /// Source text compiled as an implicitly-asynchronous function body.
    pub code: String,
}

/// Parameters of an `invoke` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeParams {
    /// The capability being called.
    pub token: Token,
    /// Call arguments, passed by value.
    pub args: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let frame = Frame::request(7, METHOD_RUN, json!({ "code": "return 1" }));
        let body = frame.encode().unwrap();
        match Frame::decode(&body).unwrap() {
            Frame::Request { id, method, params } => {
                assert_eq!(id, 7);
                assert_eq!(method, METHOD_RUN);
                assert_eq!(params["code"], "return 1");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_fault_response_shape() {
        let frame = Frame::fault(3, WireFault::compile("unexpected token"));
        let body = frame.encode().unwrap();
        assert!(body.contains(r#""status":"err""#));
        assert!(body.contains(r#""kind":"compile""#));

        match Frame::decode(&body).unwrap() {
            Frame::Response {
                id,
                result: CallResult::Err { fault },
            } => {
                assert_eq!(id, 3);
                assert_eq!(fault.kind, FaultKind::Compile);
            }
            other => panic!("expected fault response, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke_params_token_is_bare_number() {
        let params = InvokeParams {
            token: Token(2),
            args: vec![json!("a"), json!(1)],
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"token":2,"args":["a",1]}"#);
    }

    #[test]
    fn test_install_params_round_trip() {
        let mut methods = BTreeMap::new();
        methods.insert("f".to_string(), MethodNode::Token(Token(0)));
        let mut constants = serde_json::Map::new();
        constants.insert("n".to_string(), json!(5));

        let params = InstallParams { constants, methods };
        let value = serde_json::to_value(&params).unwrap();
        let back: InstallParams = serde_json::from_value(value).unwrap();

        assert_eq!(back.constants["n"], json!(5));
        assert_eq!(back.methods["f"], MethodNode::Token(Token(0)));
    }

    #[test]
    fn test_wire_fault_display() {
        let fault = WireFault::runtime("x is not defined");
        assert_eq!(fault.to_string(), "runtime: x is not defined");
    }
}
