//! The protocol workflow engine: lifecycle, transitions and the
//! authorization policy sitting in front of them.

pub mod lifecycle;
pub mod policy;
pub mod transition;

pub use lifecycle::{NewProtocol, ProtocolService};
pub use transition::TransitionEngine;
