//! # Frame Encoder
//!
//! Builds node frames and actuator instruction frames. Encoding is pure.

use super::checksum::instruction_checksum;
use super::constants::*;

/// Encode a node frame
///
/// # Arguments
///
/// * `source` - Address of the sending node
/// * `destination` - Address of the receiving node (0 for the master)
/// * `kind` - Command type
/// * `parameter` - Command parameter (child port for hellos, new address for assignments)
///
/// # Returns
///
/// * `[u8; 8]` - Complete frame: start(2) + source + destination + type + parameter + end(2)
///
/// # Examples
///
/// ```
/// use revolute_node::protocol::constants::*;
/// use revolute_node::protocol::encoder::encode_node_frame;
///
/// let frame = encode_node_frame(DEFAULT_ID, MASTER_ID, CommandType::Hello, 0);
/// assert_eq!(frame, [248, 248, 251, 0, 200, 0, 85, 85]);
/// ```
pub fn encode_node_frame(source: u8, destination: u8, kind: CommandType, parameter: u8) -> [u8; NODE_FRAME_LEN] {
    [
        START_TRANSMIT,
        START_TRANSMIT,
        source,
        destination,
        kind.code(),
        parameter,
        END_TRANSMIT,
        END_TRANSMIT,
    ]
}

/// Encode an actuator instruction frame
///
/// # Arguments
///
/// * `id` - Target actuator id (254 to address every actuator on the line)
/// * `instruction` - Instruction and its operands
///
/// # Returns
///
/// * `Vec<u8>` - 6 bytes for ping/reset, 8 bytes for read/write
///
/// # Examples
///
/// ```
/// use revolute_node::protocol::constants::*;
/// use revolute_node::protocol::encoder::encode_instruction;
///
/// let frame = encode_instruction(BROADCAST_ID, Instruction::Ping);
/// assert_eq!(frame, vec![255, 255, 254, 2, 1, 254]);
/// ```
pub fn encode_instruction(id: u8, instruction: Instruction) -> Vec<u8> {
    let length = instruction.length();
    let code = instruction.code();
    let (address, value) = instruction.operands().unwrap_or((0, 0));

    let mut frame = Vec::with_capacity(8);
    frame.push(SERVO_START);
    frame.push(SERVO_START);
    frame.push(id);
    frame.push(length);
    frame.push(code);
    if instruction.operands().is_some() {
        frame.push(address);
        frame.push(value);
    }
    frame.push(instruction_checksum(id, length, code, address, value));

    frame
}
