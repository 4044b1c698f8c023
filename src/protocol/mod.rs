//! Control and datagram wire protocol
//!
//! This module provides:
//! - The control-channel opcode set and reply encoders
//! - Registration-datagram parsing
//! - Shared protocol constants (ports, payload sizing, liveness timing)

pub mod command;
pub mod constants;

pub use command::{
    decode_registration, encode_format_reply, encode_heartbeat, encode_play_reply, Command,
};
pub use constants::*;
