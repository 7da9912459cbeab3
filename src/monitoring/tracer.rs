/*!
 * Syscall Tracing
 * Structured tracing for syscalls and kernel operations using the tracing crate
 *
 * Features:
 * - Trace id per syscall for correlating its events
 * - JSON-formatted logs for structured parsing
 * - `log` records from the process table routed into the same subscriber
 * - Slow-syscall warnings
 */

use crate::core::limits::SLOW_SYSCALL_THRESHOLD;
use crate::core::types::Pid;
use std::time::{Duration, Instant};
use tracing::{debug, span, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
///
/// Also installs the `log` bridge. Returns false if a global subscriber was
/// already set, in which case nothing changes.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Generate a unique trace ID for request correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span for syscall tracing with structured fields
pub struct SyscallSpan {
    span: Span,
    start: Instant,
    syscall_name: &'static str,
    trace_id: String,
    slow_threshold: Option<Duration>,
}

impl SyscallSpan {
    pub fn new(syscall_name: &'static str, pid: Pid) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "syscall",
            trace_id = %trace_id,
            syscall = syscall_name,
            pid = pid,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
            return_value = tracing::field::Empty,
        );

        span.in_scope(|| debug!(syscall = syscall_name, pid = pid, "syscall started"));

        Self {
            span,
            start: Instant::now(),
            syscall_name,
            trace_id,
            slow_threshold: Some(SLOW_SYSCALL_THRESHOLD),
        }
    }

    /// Span for a syscall allowed to block indefinitely; never reported slow
    pub fn blocking(syscall_name: &'static str, pid: Pid) -> Self {
        let mut span = Self::new(syscall_name, pid);
        span.slow_threshold = None;
        span
    }

    /// Get the trace ID for this syscall
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Record the syscall result
    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    /// Record an error
    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }

    /// Record the return value
    pub fn record_return(&self, value: i64) {
        self.span.record("return_value", value);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        match self.slow_threshold {
            Some(threshold) if duration > threshold => {
                warn!(
                    trace_id = %self.trace_id,
                    syscall = self.syscall_name,
                    duration_ms = duration.as_millis() as u64,
                    slow = true,
                    "slow syscall detected"
                );
            }
            _ => {
                debug!(
                    trace_id = %self.trace_id,
                    syscall = self.syscall_name,
                    duration_us = duration.as_micros() as u64,
                    "syscall completed"
                );
            }
        }
    }
}

/// Span for kernel-level operations (boot, program start, drain)
pub struct OperationSpan {
    span: Span,
    start: Instant,
    trace_id: String,
}

impl OperationSpan {
    pub fn new(operation: &'static str) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::INFO,
            "operation",
            trace_id = %trace_id,
            operation = operation,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        self.span.in_scope(|| {
            debug!(
                trace_id = %self.trace_id,
                duration_us = duration.as_micros() as u64,
                "operation completed"
            )
        });
    }
}

/// Helper to create a syscall span
#[inline]
pub fn span_syscall(name: &'static str, pid: Pid) -> SyscallSpan {
    SyscallSpan::new(name, pid)
}

/// Helper to create an operation span
#[inline]
pub fn span_operation(name: &'static str) -> OperationSpan {
    OperationSpan::new(name)
}
