//! # Frame Decoder
//!
//! Decodes node frames and actuator replies, either from a complete byte
//! slice or straight off a transceiver receiver.
//!
//! The receiver decoders mirror how the node reads the bus: one non-blocking
//! read looks for the first start byte, and only once it is seen do they block
//! for the second start byte and the fixed payload. Anything else is "not
//! ready" and the bytes consumed so far are dropped.

use tracing::debug;

use super::checksum::checksum;
use super::constants::*;
use crate::error::{NodeError, Result};
use crate::serial::port_trait::{Port, Transceiver};

/// Decode a complete node frame
///
/// # Arguments
///
/// * `frame` - Frame bytes (start, start, source, destination, type, parameter, end, end)
///
/// # Returns
///
/// * `Result<NodeCommand>` - Decoded command, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame is shorter than 8 bytes
/// - Either start byte is incorrect
/// - Either end byte is incorrect
pub fn decode_node_frame(frame: &[u8]) -> Result<NodeCommand> {
    if frame.len() < NODE_FRAME_LEN {
        return Err(NodeError::Protocol(format!(
            "Node frame too short: expected {} bytes, got {}",
            NODE_FRAME_LEN,
            frame.len()
        )));
    }

    if frame[0] != START_TRANSMIT || frame[1] != START_TRANSMIT {
        return Err(NodeError::Protocol(format!(
            "Invalid start bytes: 0x{:02X} 0x{:02X}",
            frame[0], frame[1]
        )));
    }

    if frame[6] != END_TRANSMIT || frame[7] != END_TRANSMIT {
        return Err(NodeError::Protocol(format!(
            "Invalid end bytes: 0x{:02X} 0x{:02X}",
            frame[6], frame[7]
        )));
    }

    Ok(NodeCommand {
        source: frame[2],
        destination: frame[3],
        kind: frame[4],
        parameter: frame[5],
    })
}

/// Decode a complete actuator reply
///
/// # Arguments
///
/// * `frame` - Reply bytes (start, start, id, length, error, params..., checksum)
///
/// # Returns
///
/// * `Result<ActuatorReply>` - Decoded reply
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short for its length field
/// - Start bytes are incorrect
/// - Checksum does not match
pub fn decode_actuator_reply(frame: &[u8]) -> Result<ActuatorReply> {
    // Minimum reply: start(2) + id + length + error + checksum
    if frame.len() < 6 {
        return Err(NodeError::Protocol("Actuator reply too short".to_string()));
    }

    if frame[0] != SERVO_START || frame[1] != SERVO_START {
        return Err(NodeError::Protocol(format!(
            "Invalid actuator start bytes: 0x{:02X} 0x{:02X}",
            frame[0], frame[1]
        )));
    }

    // The length field counts error + params + checksum
    let length = frame[3] as usize;
    if length < 2 || frame.len() < 4 + length {
        return Err(NodeError::Protocol(format!(
            "Actuator reply truncated: length field {}, got {} bytes",
            length,
            frame.len()
        )));
    }

    let received = frame[3 + length];
    let calculated = checksum(&frame[2..3 + length]);
    if calculated != received {
        return Err(NodeError::Protocol(format!(
            "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
            calculated, received
        )));
    }

    Ok(ActuatorReply {
        source: frame[2],
        length: frame[3],
        error: frame[4],
        parameter: frame[5],
    })
}

/// Read a node command from a receiver if one is starting
///
/// Returns `Ok(None)` when no start byte is waiting, when the second byte is
/// not a start byte, or when the line goes quiet mid-frame.
pub fn read_node_command<T: Transceiver + ?Sized>(transceiver: &mut T, port: Port) -> Result<Option<NodeCommand>> {
    let payload = read_framed::<T, 4>(transceiver, port, START_TRANSMIT)?;

    Ok(payload.map(|[source, destination, kind, parameter]| NodeCommand {
        source,
        destination,
        kind,
        parameter,
    }))
}

/// Read an actuator reply from a receiver if one is starting
///
/// Same readiness rules as [`read_node_command`]. The checksum is not
/// verified here: the reply's error flags are what the caller acts on.
pub fn read_actuator_reply<T: Transceiver + ?Sized>(transceiver: &mut T, port: Port) -> Result<Option<ActuatorReply>> {
    let payload = read_framed::<T, 4>(transceiver, port, SERVO_START)?;

    Ok(payload.map(|[source, length, error, parameter]| ActuatorReply {
        source,
        length,
        error,
        parameter,
    }))
}

fn read_framed<T: Transceiver + ?Sized, const N: usize>(
    transceiver: &mut T,
    port: Port,
    start: u8,
) -> Result<Option<[u8; N]>> {
    if transceiver.read_char(port)? != Some(start) {
        return Ok(None);
    }

    match read_confirmed(transceiver, port, start) {
        Err(NodeError::Starved(port)) => {
            debug!("Dropped partial frame on {}", port);
            Ok(None)
        }
        other => other,
    }
}

fn read_confirmed<T: Transceiver + ?Sized, const N: usize>(
    transceiver: &mut T,
    port: Port,
    start: u8,
) -> Result<Option<[u8; N]>> {
    let second = transceiver.get_char(port)?;
    if second != start {
        debug!("Single start byte followed by 0x{:02X} on {}", second, port);
        return Ok(None);
    }

    let mut payload = [0u8; N];
    for byte in payload.iter_mut() {
        *byte = transceiver.get_char(port)?;
    }
    Ok(Some(payload))
}
