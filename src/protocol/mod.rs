//! # Bus Protocol Module
//!
//! Framing for the two protocols that share the node's serial line.
//!
//! This module handles:
//! - Node frame encoding/decoding (double start byte, fixed 4-byte payload, double end byte)
//! - Actuator instruction encoding and status reply decoding
//! - Additive one's-complement checksum for actuator frames
//! - Start byte confirmation when reading straight off a receiver

pub mod constants;
pub mod encoder;
pub mod decoder;
pub mod checksum;
