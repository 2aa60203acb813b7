//! Read and write hooks attached to register ranges.
//!
//! A hook is a plain function `(address, value) -> value`. It is registered
//! once per range and receives the absolute address being accessed, so a
//! single hook can branch per register inside a multi-register range.
//!
//! - On read, the hook gets the stored value and its result is reported to
//!   the client. The stored cell is left as is.
//! - On write, the hook gets the incoming value and its result is what gets
//!   stored.
//!
//! Hooks run on the request path while the server state is locked. Keep them
//! short; anything slower than the configured budget is logged.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::HookError;

/// Shared hook function.
pub type Hook = Arc<dyn Fn(u16, u16) -> u16 + Send + Sync>;

/// Wrap a closure as a [`Hook`].
pub fn hook<F>(f: F) -> Hook
where
    F: Fn(u16, u16) -> u16 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which access a hook observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Read,
    Write,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Read => "on_read",
            HookKind::Write => "on_write",
        }
    }
}

/// The optional hooks of one register range.
#[derive(Clone, Default)]
pub struct HookSet {
    pub on_read: Option<Hook>,
    pub on_write: Option<Hook>,
}

impl HookSet {
    /// Get the hook for an access kind.
    pub fn get(&self, kind: HookKind) -> Option<&Hook> {
        match kind {
            HookKind::Read => self.on_read.as_ref(),
            HookKind::Write => self.on_write.as_ref(),
        }
    }

    /// Replace the hook for an access kind.
    pub fn set(&mut self, kind: HookKind, hook: Hook) {
        match kind {
            HookKind::Read => self.on_read = Some(hook),
            HookKind::Write => self.on_write = Some(hook),
        }
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("on_read", &self.on_read.is_some())
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

/// Invokes hooks, isolating panics and timing each call.
#[derive(Debug, Clone, Copy)]
pub struct HookRunner {
    budget: Duration,
}

impl Default for HookRunner {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(5),
        }
    }
}

impl HookRunner {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `hook` for `address`.
    ///
    /// A panic inside the hook is caught and returned as [`HookError::Panicked`].
    pub fn run(
        &self,
        kind: HookKind,
        hook: &Hook,
        address: u16,
        value: u16,
    ) -> Result<u16, HookError> {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| hook(address, value)));
        let elapsed = started.elapsed();

        if elapsed > self.budget {
            tracing::warn!(
                hook = kind.as_str(),
                address,
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.budget.as_micros() as u64,
                "Slow register hook"
            );
        }

        result.map_err(|payload| {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            tracing::warn!(hook = kind.as_str(), address, %message, "Register hook panicked");
            HookError::Panicked { address, message }
        })
    }
}
