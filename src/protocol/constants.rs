//! # Bus Protocol Constants and Types
//!
//! Core definitions for the two wire formats that share the node's bus: the
//! node-to-node command frame and the actuator instruction frame.

use serde::Deserialize;

use crate::error::{NodeError, Result};

/// Node frame start byte (sent twice)
pub const START_TRANSMIT: u8 = 248;

/// Node frame end byte (sent twice)
pub const END_TRANSMIT: u8 = 85;

/// Node frame size: start(2) + source + destination + type + parameter + end(2)
pub const NODE_FRAME_LEN: usize = 8;

/// Address of the chain master
pub const MASTER_ID: u8 = 0;

/// Address every node boots with until the master assigns one
pub const DEFAULT_ID: u8 = 251;

/// Address meaning "every node"; also the actuator broadcast id
pub const BROADCAST_ID: u8 = 254;

/// Actuator frame start byte (sent twice)
pub const SERVO_START: u8 = 255;

/// Lowest valid actuator id
pub const SERVO_ID_MIN: u8 = 0;

/// Highest valid actuator id
pub const SERVO_ID_MAX: u8 = 253;

/// Length field of read instructions
pub const READ_LENGTH: u8 = 4;
/// Length field of write instructions
pub const WRITE_LENGTH: u8 = 4;
/// Length field of ping instructions
pub const PING_LENGTH: u8 = 2;
/// Length field of reset instructions
pub const RESET_LENGTH: u8 = 2;

/// Actuator register holding its id
pub const ID_ADDRESS: u8 = 3;
/// Actuator register holding its status return level
pub const STATUS_RET_ADDRESS: u8 = 16;

pub const INSTRUCTION_PING: u8 = 1;
pub const INSTRUCTION_READ: u8 = 2;
pub const INSTRUCTION_WRITE: u8 = 3;
pub const INSTRUCTION_RESET: u8 = 6;

/// Round trips attempted per bring-up round before starting over
pub const SERVO_COMM_ATTEMPTS: u8 = 10;

/// Command type byte of a node frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// Master probing for new nodes
    Hello = 200,
    /// Master assigning an address
    IdAssignment = 201,
    /// Node acknowledging an address assignment
    IdAssignOk = 202,
    /// Liveness check (and its answer)
    Ping = 203,
    /// Master asking one or all nodes to forget their configuration
    ClearConfig = 204,
    /// Node acknowledging a configuration clear
    ConfigCleared = 205,
}

impl CommandType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandType {
    type Error = NodeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            200 => Ok(CommandType::Hello),
            201 => Ok(CommandType::IdAssignment),
            202 => Ok(CommandType::IdAssignOk),
            203 => Ok(CommandType::Ping),
            204 => Ok(CommandType::ClearConfig),
            205 => Ok(CommandType::ConfigCleared),
            other => Err(NodeError::Protocol(format!("Unknown command type: {}", other))),
        }
    }
}

/// Decoded node frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCommand {
    pub source: u8,
    pub destination: u8,
    /// Raw command type byte
    pub kind: u8,
    pub parameter: u8,
}

impl NodeCommand {
    /// Command type, if the type byte is one this node understands
    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::try_from(self.kind).ok()
    }
}

/// Decoded actuator status reply
///
/// Only the fields the bring-up protocol inspects are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorReply {
    pub source: u8,
    pub length: u8,
    /// Actuator error bit field, zero when healthy
    pub error: u8,
    /// First parameter byte (the checksum for parameterless replies)
    pub parameter: u8,
}

/// Actuator instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping,
    /// Read `count` bytes starting at `address`
    Read { address: u8, count: u8 },
    /// Write one byte at `address`
    Write { address: u8, value: u8 },
    /// Restore factory settings
    Reset,
}

impl Instruction {
    pub fn code(&self) -> u8 {
        match self {
            Instruction::Ping => INSTRUCTION_PING,
            Instruction::Read { .. } => INSTRUCTION_READ,
            Instruction::Write { .. } => INSTRUCTION_WRITE,
            Instruction::Reset => INSTRUCTION_RESET,
        }
    }

    /// Value of the frame's length field
    pub fn length(&self) -> u8 {
        match self {
            Instruction::Ping => PING_LENGTH,
            Instruction::Read { .. } => READ_LENGTH,
            Instruction::Write { .. } => WRITE_LENGTH,
            Instruction::Reset => RESET_LENGTH,
        }
    }

    /// Address/value operand pair, absent for ping and reset
    pub fn operands(&self) -> Option<(u8, u8)> {
        match *self {
            Instruction::Read { address, count } => Some((address, count)),
            Instruction::Write { address, value } => Some((address, value)),
            Instruction::Ping | Instruction::Reset => None,
        }
    }
}

/// Actuator status return level: which instructions it answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[repr(u8)]
pub enum ResponseVerbosity {
    /// Only answers pings
    #[serde(rename = "never")]
    Never = 0,
    /// Answers pings and reads
    #[serde(rename = "read")]
    OnReadOnly = 1,
    /// Answers every instruction
    #[serde(rename = "all")]
    Always = 2,
}

impl ResponseVerbosity {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ResponseVerbosity {
    type Error = NodeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ResponseVerbosity::Never),
            1 => Ok(ResponseVerbosity::OnReadOnly),
            2 => Ok(ResponseVerbosity::Always),
            other => Err(NodeError::Protocol(format!("Invalid status return level: {}", other))),
        }
    }
}
