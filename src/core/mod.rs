//! Capability traits the scanner is built on, with their default
//! network-backed implementations. Test doubles implement the same traits.

pub mod resolver;
pub mod scanner_trait;

pub use resolver::{SystemResolver, TargetResolver};
pub use scanner_trait::{NetworkProbeEngine, ProbeEngine};
