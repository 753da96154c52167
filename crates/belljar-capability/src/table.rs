//! Capability tokens and the per-session dispatch table.
//!
//! A [`Token`] is an integer handle standing in for a host function. The
//! isolated side only ever holds tokens; the functions themselves live in the
//! session's [`CapabilityTable`], an ordered arena indexed by token value.
//! The table is append-only: tokens are assigned at split time, in traversal
//! order, and are never reused. It is dropped together with its session.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result type for host function invocations.
///
/// Host functions receive already-deserialized JSON arguments and return a
/// JSON value; any error they produce is carried back across the boundary as
/// a rejection of the calling proxy.
pub type HostResult = Result<serde_json::Value, anyhow::Error>;

/// Boxed future returned by a [`HostFunction`] invocation.
pub type HostFuture = Pin<Box<dyn Future<Output = HostResult> + Send>>;

/// Integer handle for a host function, unique per sandbox session.
///
/// Tokens index into the session's [`CapabilityTable`]. Identity is the
/// position in the table, so tokens from one session are meaningless in any
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub u32);

impl Token {
    /// Get the token's table index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A callable exposed to sandboxed code.
///
/// The function runs in host context. It may be synchronous or asynchronous;
/// either way the sandboxed caller observes a single suspension that settles
/// when the function completes.
///
/// # Example
///
/// ```
/// use belljar_capability::HostFunction;
/// use serde_json::json;
///
/// let double = HostFunction::from_sync(|args| {
///     let n = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(json!(n * 2))
/// });
/// ```
#[derive(Clone)]
pub struct HostFunction {
    inner: Arc<dyn Fn(Vec<serde_json::Value>) -> HostFuture + Send + Sync>,
}

impl HostFunction {
    /// Wrap a synchronous function.
    pub fn from_sync<F>(func: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> HostResult + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |args| {
                let result = func(args);
                Box::pin(async move { result })
            }),
        }
    }

    /// Wrap an asynchronous function.
    pub fn from_async<F, Fut>(func: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HostResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |args| Box::pin(func(args))),
        }
    }

    /// Invoke the function with the given arguments.
    pub fn call(&self, args: Vec<serde_json::Value>) -> HostFuture {
        (self.inner)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction").finish_non_exhaustive()
    }
}

/// One entry of a [`CapabilityTable`].
#[derive(Debug, Clone)]
struct TableEntry {
    /// Dotted path of the callable in the exposed graph (for logs/metrics).
    name: String,
    function: HostFunction,
}

/// Ordered table mapping tokens to host functions, owned by one session.
///
/// The far side of the channel never holds a function reference, only an
/// index into this table. Lookups with out-of-range tokens return `None`;
/// what that means to a caller is the dispatcher's decision, not the
/// table's.
#[derive(Debug, Default)]
pub struct CapabilityTable {
    entries: Vec<TableEntry>,
}

impl CapabilityTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a function, returning its token.
    pub fn push(&mut self, name: impl Into<String>, function: HostFunction) -> Token {
        let token = Token(self.entries.len() as u32);
        let name = name.into();
        debug!(token = %token, name = %name, "Registered capability");
        self.entries.push(TableEntry { name, function });
        token
    }

    /// Look up a function by token.
    pub fn get(&self, token: Token) -> Option<&HostFunction> {
        self.entries.get(token.index()).map(|e| &e.function)
    }

    /// Get the dotted path name recorded for a token.
    pub fn name_of(&self, token: Token) -> Option<&str> {
        self.entries.get(token.index()).map(|e| e.name.as_str())
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the recorded names in token order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> HostFunction {
        HostFunction::from_sync(|_| Ok(serde_json::Value::Null))
    }

    #[test]
    fn test_tokens_are_sequential() {
        let mut table = CapabilityTable::new();
        assert_eq!(table.push("a", noop()), Token(0));
        assert_eq!(table.push("b", noop()), Token(1));
        assert_eq!(table.push("c", noop()), Token(2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_out_of_range_lookup() {
        let mut table = CapabilityTable::new();
        table.push("only", noop());

        assert!(table.get(Token(0)).is_some());
        assert!(table.get(Token(1)).is_none());
        assert!(table.name_of(Token(7)).is_none());
    }

    #[test]
    fn test_name_of() {
        let mut table = CapabilityTable::new();
        let token = table.push("net.fetch", noop());
        assert_eq!(table.name_of(token), Some("net.fetch"));
    }

    #[tokio::test]
    async fn test_sync_function_call() {
        let f = HostFunction::from_sync(|args| {
            let n = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(n + 1))
        });
        let result = f.call(vec![json!(41)]).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn test_async_function_call() {
        let f = HostFunction::from_async(|args| async move {
            tokio::task::yield_now().await;
            Ok(json!(args.len()))
        });
        let result = f.call(vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(result, json!(2));
    }

    #[test]
    fn test_token_serializes_as_number() {
        let json = serde_json::to_string(&Token(5)).unwrap();
        assert_eq!(json, "5");
        let token: Token = serde_json::from_str("5").unwrap();
        assert_eq!(token, Token(5));
    }
}
