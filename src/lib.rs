#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod bus;
pub mod trace;
pub mod transform;

pub use aggregate::Aggregator;
pub use bus::{DevtoolsState, EventBus, Subscription};
pub use trace::{Envelope, HandlerKind, TraceEvent};
pub use transform::{transform, TransformConfig, TransformOutput};
