/*!
 * Monitoring
 * Structured logging and syscall tracing
 */

mod tracer;

pub use tracer::{
    generate_trace_id, init_tracing, span_operation, span_syscall, OperationSpan, SyscallSpan,
};
