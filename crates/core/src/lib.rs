//! Attach negotiation engine.
//!
//! Decides which process of an Android application (the parent, or one of its
//! helper children) a remote gdbserver should attach to, launches the server
//! under a privilege-escalation fallback chain, and recovers its listening
//! port from captured output. Device access goes through
//! [`agdb_bridge::DeviceBridge`]; the host debugger and operator input are
//! behind the [`debugger::HostDebugger`] and [`prompt::Prompt`] seams.

pub mod debugger;
pub mod error;
pub mod launcher;
pub mod negotiator;
pub mod prompt;
pub mod roster;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, LaunchError, Result};
pub use launcher::{DebugServerHandle, DebugServerLauncher, LaunchMode, OutputMode};
pub use negotiator::{AttachConfig, AttachNegotiator, AttachTarget, Role};
pub use roster::{ProcState, ProcessRow, RoleSet};
