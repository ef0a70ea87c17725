//! Trace protocol: event schema, the wrapper runtime, and output
//! sanitization.

pub mod events;
pub mod sanitize;
pub mod wrapper;

pub use events::{Envelope, HandlerKind, InvocationKey, TraceEvent, TRACE_EVENT_TYPE};
pub use sanitize::{sanitize, sanitize_with_depth, Captured, SharedNode, ToCaptured};
pub use wrapper::{invoke, ClassifyError, HandlerInvocation, Redirect, RequestSnapshot};
