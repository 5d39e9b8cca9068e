//! AIR780E SMS engine
//!
//! Drives the modem's AT interface over a serial port: frames the line
//! protocol, correlates commands with their result codes, dispatches
//! unsolicited `+CMTI` notifications and serialises callers on one session.
//! The listener forwards every incoming message to a JSONL log.

pub mod arbiter;
pub mod client;
pub mod codec;
pub mod commands;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod forwarder;
pub mod frame;
pub mod framer;
pub mod listener;
pub mod ports;
pub mod session;
pub mod sms;
pub mod transport;

pub use error::{Error, Result};
