//! # Actuator Bring-up
//!
//! Locates the servo attached to this node, makes it answer reads, and moves
//! it to the node's own address once the master assigns one.
//!
//! Every round trip is: load `TalkToActuator`, send the instruction, load
//! `Initialize`, then wait for an error-free reply or the reply timer. The
//! loops here retry forever; an actuator that never answers keeps the node
//! in bring-up.

use tracing::{debug, info, warn};

use super::{Inbound, Node, Role};
use crate::error::Result;
use crate::pins::HardwareBus;
use crate::protocol::constants::*;
use crate::protocol::encoder::encode_instruction;
use crate::serial::port_trait::{Port, Transceiver};
use crate::timeout::TimerHardware;

/// Fallbacks for actuators that do not behave; all off by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryStrategies {
    /// Broadcast a factory reset once if a full discovery round goes unanswered
    pub flash_reset_on_silence: bool,
    /// Write the desired status return level after each failed normalization round
    pub force_status_level: bool,
}

/// Bring-up tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorSettings {
    /// Round trips per retry round
    pub comm_attempts: u8,
    /// Status return level the actuator must report
    pub desired_verbosity: ResponseVerbosity,
    pub recovery: RecoveryStrategies,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            comm_attempts: SERVO_COMM_ATTEMPTS,
            desired_verbosity: ResponseVerbosity::OnReadOnly,
            recovery: RecoveryStrategies::default(),
        }
    }
}

/// What the node knows about its local actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorBinding {
    pub address: Option<u8>,
    /// Status return level last read back
    pub verbosity: Option<ResponseVerbosity>,
}

impl<T: Transceiver, H: TimerHardware, B: HardwareBus> Node<T, H, B> {
    /// Broadcast pings until the local actuator answers
    ///
    /// # Returns
    ///
    /// * `Result<u8>` - Actuator address
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver fails
    pub fn find_actuator(&mut self) -> Result<u8> {
        if let Some(address) = self.actuator.address {
            return Ok(address);
        }

        let mut round: u32 = 0;
        loop {
            round = round.wrapping_add(1);
            for _ in 0..self.settings.comm_attempts {
                match self.actuator_exchange(BROADCAST_ID, Instruction::Ping)? {
                    Some(reply) if (SERVO_ID_MIN..=SERVO_ID_MAX).contains(&reply.source) => {
                        info!("Local actuator found at {}", reply.source);
                        self.actuator.address = Some(reply.source);
                        self.switch_role(Role::WaitForMaster)?;
                        return Ok(reply.source);
                    }
                    Some(reply) => debug!("Ignoring ping reply from invalid id {}", reply.source),
                    None => {}
                }
            }

            warn!("No actuator answered discovery round {}", round);
            if self.settings.recovery.flash_reset_on_silence && !self.flash_reset_sent {
                warn!("Broadcasting actuator factory reset");
                self.flash_reset_sent = true;
                self.actuator_exchange(BROADCAST_ID, Instruction::Reset)?;
            }
        }
    }

    /// Read the actuator's status return level until it is the desired one
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver fails
    pub fn normalize_verbosity(&mut self) -> Result<()> {
        let desired = self.settings.desired_verbosity;
        let read_level = Instruction::Read {
            address: STATUS_RET_ADDRESS,
            count: 1,
        };

        while self.actuator.verbosity != Some(desired) {
            let id = self.find_actuator()?;

            for _ in 0..self.settings.comm_attempts {
                if let Some(reply) = self.actuator_exchange(id, read_level)? {
                    self.actuator.verbosity = ResponseVerbosity::try_from(reply.parameter).ok();
                    if self.actuator.verbosity == Some(desired) {
                        break;
                    }
                }
            }

            if self.actuator.verbosity != Some(desired) && self.settings.recovery.force_status_level {
                warn!("Forcing actuator {} status return level to {:?}", id, desired);
                let write_level = Instruction::Write {
                    address: STATUS_RET_ADDRESS,
                    value: desired.code(),
                };
                self.actuator_exchange(id, write_level)?;
            }
        }

        debug!("Actuator status return level is {:?}", desired);
        self.switch_role(Role::WaitForMaster)
    }

    /// Move the actuator to the node's own address
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver fails
    pub fn adopt_actuator_address(&mut self) -> Result<()> {
        let target = self.address;

        while self.actuator.address != Some(target) {
            let current = self.actuator.address.unwrap_or(BROADCAST_ID);
            self.actuator_exchange(
                current,
                Instruction::Write {
                    address: ID_ADDRESS,
                    value: target,
                },
            )?;

            for _ in 0..self.settings.comm_attempts {
                let Some(reply) = self.actuator_exchange(BROADCAST_ID, Instruction::Ping)? else {
                    continue;
                };
                if reply.source == target {
                    info!("Local actuator moved to {}", target);
                    self.actuator.address = Some(target);
                    break;
                }
            }
        }

        self.switch_role(Role::WaitForMaster)
    }

    /// Send `instruction` to actuator `id` and leave the reply receiver loaded
    pub fn send_instruction(&mut self, id: u8, instruction: Instruction) -> Result<()> {
        self.switch_role(Role::TalkToActuator)?;
        let frame = encode_instruction(id, instruction);
        self.transmit(&frame, &[Port::Upstream])?;
        self.switch_role(Role::Initialize)
    }

    /// One round trip with the actuator
    ///
    /// # Returns
    ///
    /// * `Result<Option<ActuatorReply>>` - First error-free reply, or `None` on timeout
    pub fn actuator_exchange(&mut self, id: u8, instruction: Instruction) -> Result<Option<ActuatorReply>> {
        self.send_instruction(id, instruction)?;

        loop {
            match self.await_inbound()? {
                Some(Inbound::ActuatorReply(reply)) if reply.error == 0 => return Ok(Some(reply)),
                Some(Inbound::ActuatorReply(reply)) => {
                    debug!("Discarding reply from {} with error flags 0x{:02X}", reply.source, reply.error);
                }
                Some(other) => debug!("Ignoring {:?} while waiting for the actuator", other),
                None => return Ok(None),
            }
        }
    }
}
