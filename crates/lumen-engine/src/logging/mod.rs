//! Logging utilities.
//!
//! The engine logs through the `log` facade only. Binaries call
//! [`init_logging`] early in `main` to install `env_logger`; libraries and
//! tests embedding the engine may install any other backend instead.

mod init;

pub use init::{LoggingConfig, init_logging};
