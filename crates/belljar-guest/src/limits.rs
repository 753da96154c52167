//! Engine resource limits for the guest context.

use boa_engine::vm::RuntimeLimits;

/// Resource limits applied to a guest execution context at startup.
///
/// These bound the script engine itself: recursion depth, loop iterations,
/// and interpreter stack size. They are per-session and fixed once the
/// context exists.
#[derive(Debug, Clone, Copy)]
pub struct GuestLimits {
    /// Maximum call recursion depth.
    ///
    /// Defaults to 512.
    pub recursion_limit: usize,

    /// Maximum iterations of any single loop; `u64::MAX` disables the check.
    ///
    /// Defaults to disabled.
    pub loop_iteration_limit: u64,

    /// Maximum interpreter stack size in bytes.
    ///
    /// Defaults to 1MB.
    pub stack_size_limit: usize,
}

impl Default for GuestLimits {
    fn default() -> Self {
        Self {
            recursion_limit: 512,
            loop_iteration_limit: u64::MAX,
            stack_size_limit: 1024 * 1024,
        }
    }
}

impl GuestLimits {
    /// Create limits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recursion limit.
    pub fn with_recursion_limit(mut self, depth: usize) -> Self {
        self.recursion_limit = depth;
        self
    }

    /// Set the loop iteration limit.
    pub fn with_loop_iteration_limit(mut self, iterations: u64) -> Self {
        self.loop_iteration_limit = iterations;
        self
    }

    /// Set the interpreter stack size limit.
    pub fn with_stack_size_limit(mut self, bytes: usize) -> Self {
        self.stack_size_limit = bytes;
        self
    }

    /// Convert to the engine's limit representation.
    pub(crate) fn engine_limits(&self) -> RuntimeLimits {
        let mut limits = RuntimeLimits::default();
        limits.set_recursion_limit(self.recursion_limit);
        limits.set_loop_iteration_limit(self.loop_iteration_limit);
        limits.set_stack_size_limit(self.stack_size_limit);
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = GuestLimits::default();
        assert_eq!(limits.recursion_limit, 512);
        assert_eq!(limits.loop_iteration_limit, u64::MAX);
    }

    #[test]
    fn test_builder() {
        let limits = GuestLimits::new()
            .with_recursion_limit(64)
            .with_loop_iteration_limit(10_000)
            .with_stack_size_limit(256 * 1024);

        assert_eq!(limits.recursion_limit, 64);
        assert_eq!(limits.loop_iteration_limit, 10_000);
        assert_eq!(limits.stack_size_limit, 256 * 1024);
    }
}
