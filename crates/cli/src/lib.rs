//! Library surface of the `agdb` binary, exposed so integration tests can
//! drive the session controller with scripted collaborators.

pub mod cli;
pub mod commands;
pub mod device;
pub mod gdb;
pub mod logging;
pub mod prompt;
pub mod session;
