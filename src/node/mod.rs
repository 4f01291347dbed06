//! # Node State Machine
//!
//! One node of the daisy chain: identity, child link, local actuator binding
//! and the role currently loaded on the hardware.
//!
//! The node is driven by repeatedly polling the active role for something to
//! act on. Every wait is a busy-poll loop over the active receiver and the
//! timeout flag; nothing blocks the main context.

pub mod actuator;
pub mod chain;
pub mod role;

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::Result;
use crate::pins::HardwareBus;
use crate::protocol::constants::{ActuatorReply, NodeCommand, DEFAULT_ID, END_TRANSMIT, START_TRANSMIT};
use crate::protocol::decoder::{read_actuator_reply, read_node_command};
use crate::serial::port_trait::{ChildPort, Port, Transceiver};
use crate::timeout::{TimeoutService, TimerHardware};

pub use actuator::{ActuatorBinding, ActuatorSettings, RecoveryStrategies};
pub use role::Role;

/// Something the active role picked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Complete command frame from the master (or relayed by a parent)
    Command(NodeCommand),
    /// Start byte heard on a child port while listening for hellos
    ChildHello(ChildPort),
    /// End byte heard from the child being listened to
    ChildDone,
    /// Reply from the local actuator
    ActuatorReply(ActuatorReply),
}

/// Protocol engine of a single node
pub struct Node<T, H, B> {
    transceiver: T,
    timeouts: TimeoutService<H>,
    pins: B,
    address: u8,
    configured: bool,
    child: Option<ChildPort>,
    role: Role,
    actuator: ActuatorBinding,
    settings: ActuatorSettings,
    flash_reset_sent: bool,
}

impl<T, H, B> std::fmt::Debug for Node<T, H, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("configured", &self.configured)
            .field("child", &self.child)
            .field("role", &self.role)
            .field("actuator", &self.actuator)
            .finish_non_exhaustive()
    }
}

impl<T: Transceiver, H: TimerHardware, B: HardwareBus> Node<T, H, B> {
    /// Create an unassigned node
    ///
    /// Nothing touches the hardware until [`Node::boot`] or the first role
    /// switch.
    pub fn new(transceiver: T, timeouts: TimeoutService<H>, pins: B, settings: ActuatorSettings) -> Self {
        Self {
            transceiver,
            timeouts,
            pins,
            address: DEFAULT_ID,
            configured: false,
            child: None,
            role: Role::Uninitialized,
            actuator: ActuatorBinding::default(),
            settings,
            flash_reset_sent: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn child(&self) -> Option<ChildPort> {
        self.child
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn actuator(&self) -> ActuatorBinding {
        self.actuator
    }

    pub fn pins(&self) -> &B {
        &self.pins
    }

    /// Load the listening role and bring the local actuator up
    ///
    /// Retries until the actuator answers, so this only returns once its
    /// address is known and its status return level is normalized.
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver fails
    pub fn boot(&mut self) -> Result<()> {
        self.switch_role(Role::WaitForMaster)?;
        let address = self.find_actuator()?;
        self.normalize_verbosity()?;
        info!("Node ready, local actuator at {}", address);
        Ok(())
    }

    /// Check the active role once for something to act on
    ///
    /// # Returns
    ///
    /// * `Result<Option<Inbound>>` - What was heard, or `None` if nothing is ready
    pub fn poll(&mut self) -> Result<Option<Inbound>> {
        match self.role {
            Role::WaitForMaster => {
                let command = read_node_command(&mut self.transceiver, Port::Upstream)?;
                Ok(command.map(Inbound::Command))
            }
            Role::ListenForHellos => {
                for child in ChildPort::ALL {
                    if self.transceiver.read_char(Port::Child(child))? == Some(START_TRANSMIT) {
                        return Ok(Some(Inbound::ChildHello(child)));
                    }
                }
                Ok(None)
            }
            Role::ListenChild(child) => {
                let byte = self.transceiver.read_char(Port::Child(child))?;
                Ok((byte == Some(END_TRANSMIT)).then_some(Inbound::ChildDone))
            }
            Role::Initialize => {
                let reply = read_actuator_reply(&mut self.transceiver, Port::Upstream)?;
                Ok(reply.map(Inbound::ActuatorReply))
            }
            Role::Uninitialized | Role::RespondToMaster | Role::TalkToActuator => Ok(None),
        }
    }

    /// Poll once and act on any master command
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - Whether a command was handled
    pub fn step(&mut self) -> Result<bool> {
        match self.poll()? {
            Some(Inbound::Command(command)) => {
                debug!("Command {:?}", command);
                self.take_action(command)?;
                Ok(true)
            }
            Some(other) => {
                debug!("Ignoring {:?} in {:?}", other, self.role);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Boot, then serve master commands until `stop` is set
    ///
    /// # Errors
    ///
    /// Returns the first transceiver failure
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        self.boot()?;

        while !stop.load(Ordering::Acquire) {
            if !self.step()? {
                hint::spin_loop();
            }
        }

        info!("Node loop stopped");
        Ok(())
    }

    /// Poll the active role until it hears something or its timer fires
    ///
    /// Only meaningful for roles that arm a timer.
    pub(crate) fn await_inbound(&mut self) -> Result<Option<Inbound>> {
        loop {
            if let Some(inbound) = self.poll()? {
                return Ok(Some(inbound));
            }
            if self.timeouts.poll_and_clear() {
                return Ok(None);
            }
            hint::spin_loop();
        }
    }

    /// Queue `frame` on every port in `ports` and wait for it to leave
    pub(crate) fn transmit(&mut self, frame: &[u8], ports: &[Port]) -> Result<()> {
        for &port in ports {
            self.transceiver.put_all(port, frame)?;
        }
        for &port in ports {
            while !self.transceiver.is_transmit_complete(port)? {
                hint::spin_loop();
            }
        }
        Ok(())
    }
}
