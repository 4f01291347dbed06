//! # Chain Discovery and Relay
//!
//! Master command dispatch. A node answers commands addressed to it, waits
//! for its child to answer commands addressed further down the chain, and
//! finds its child while answering the master's hello probes.
//!
//! Addresses grow away from the master, so "further down" is simply
//! `destination > address`.

use tracing::{debug, info, warn};

use super::{Inbound, Node, Role};
use crate::error::Result;
use crate::pins::HardwareBus;
use crate::protocol::constants::{CommandType, NodeCommand, BROADCAST_ID, DEFAULT_ID, MASTER_ID};
use crate::protocol::encoder::encode_node_frame;
use crate::serial::port_trait::{ChildPort, Port, Transceiver};
use crate::timeout::TimerHardware;

impl<T: Transceiver, H: TimerHardware, B: HardwareBus> Node<T, H, B> {
    /// Dispatch one master command
    ///
    /// # Arguments
    ///
    /// * `command` - Decoded command frame
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver fails. Commands this node cannot act
    /// on are ignored.
    pub fn take_action(&mut self, command: NodeCommand) -> Result<()> {
        let Some(kind) = command.command_type() else {
            debug!("Ignoring unknown command type {}", command.kind);
            return Ok(());
        };

        match kind {
            CommandType::Hello => self.on_hello(),
            CommandType::IdAssignment => self.on_id_assignment(command),
            CommandType::Ping => self.on_ping(command),
            CommandType::ClearConfig => self.on_clear_config(command),
            CommandType::IdAssignOk | CommandType::ConfigCleared => {
                debug!("Ignoring {:?} from {}", kind, command.source);
                Ok(())
            }
        }
    }

    fn on_hello(&mut self) -> Result<()> {
        if !self.configured {
            return self.say_hello();
        }

        if self.child.is_none() {
            if let Some(child) = self.child_listen()? {
                info!("Child found on port {:?}", child);
                self.child = Some(child);
                self.say_hello()?;
            }
            return Ok(());
        }

        self.child_response()?;
        Ok(())
    }

    fn on_id_assignment(&mut self, command: NodeCommand) -> Result<()> {
        if command.destination == self.address {
            let proposed = command.parameter;
            if proposed <= MASTER_ID || proposed >= DEFAULT_ID {
                warn!("Rejected address assignment {}", proposed);
                return Ok(());
            }

            info!("Address assigned: {} -> {}", self.address, proposed);
            self.address = proposed;
            self.configured = true;
            self.respond(CommandType::IdAssignOk, &Port::ALL)?;
            self.adopt_actuator_address()
        } else if command.destination > self.address {
            self.child_response()?;
            Ok(())
        } else {
            Ok(())
        }
    }

    fn on_ping(&mut self, command: NodeCommand) -> Result<()> {
        if command.destination == self.address {
            self.respond(CommandType::Ping, &Port::ALL)
        } else if command.destination > self.address {
            self.child_response()?;
            Ok(())
        } else {
            Ok(())
        }
    }

    /// Forget this node's identity when it or anything upstream of it is cleared
    ///
    /// Clears aimed further down the chain are not relayed.
    fn on_clear_config(&mut self, command: NodeCommand) -> Result<()> {
        if command.destination == self.address {
            self.respond(CommandType::ConfigCleared, &Port::ALL)?;
        }

        let reset = command.destination <= self.address || command.destination == BROADCAST_ID;
        if reset {
            info!("Configuration cleared (was address {})", self.address);
            self.address = DEFAULT_ID;
            self.configured = false;
            self.child = None;
        }

        self.pins.set_presence(false);
        if reset {
            self.apply_bus_participation(self.role);
        }
        Ok(())
    }

    /// Announce this node and its child port upstream
    pub fn say_hello(&mut self) -> Result<()> {
        let child = self.child.map_or(0, ChildPort::wire_code);
        self.send_response(CommandType::Hello, child, &[Port::Upstream])
    }

    /// Listen on every child port for one hello window
    ///
    /// # Returns
    ///
    /// * `Result<Option<ChildPort>>` - Port a hello start byte was heard on
    pub fn child_listen(&mut self) -> Result<Option<ChildPort>> {
        self.switch_role(Role::ListenForHellos)?;
        let heard = match self.await_inbound()? {
            Some(Inbound::ChildHello(child)) => Some(child),
            _ => None,
        };
        self.switch_role(Role::WaitForMaster)?;
        Ok(heard)
    }

    /// Wait for the known child to finish answering a relayed command
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - Whether the child answered before its timer fired;
    ///   always `false` without a child
    pub fn child_response(&mut self) -> Result<bool> {
        let Some(child) = self.child else {
            debug!("No child to relay to, command dropped");
            return Ok(false);
        };

        self.switch_role(Role::ListenChild(child))?;
        let answered = matches!(self.await_inbound()?, Some(Inbound::ChildDone));
        self.switch_role(Role::WaitForMaster)?;

        if !answered {
            debug!("Child on port {:?} did not answer", child);
        }
        Ok(answered)
    }

    fn respond(&mut self, kind: CommandType, ports: &[Port]) -> Result<()> {
        self.send_response(kind, 0, ports)
    }

    fn send_response(&mut self, kind: CommandType, parameter: u8, ports: &[Port]) -> Result<()> {
        let frame = encode_node_frame(self.address, MASTER_ID, kind, parameter);

        self.switch_role(Role::RespondToMaster)?;
        self.transmit(&frame, ports)?;
        debug!("Sent {:?} on {} port(s)", kind, ports.len());
        self.switch_role(Role::WaitForMaster)
    }
}

#[cfg(test)]
mod tests {
    use crate::node::harness::*;
    use crate::node::Role;
    use crate::pins::PortMask;
    use crate::protocol::constants::*;
    use crate::protocol::encoder::{encode_instruction, encode_node_frame};
    use crate::serial::port_trait::{ChildPort, Port};
    use crate::timeout::TimerId;

    fn command(destination: u8, kind: CommandType, parameter: u8) -> [u8; NODE_FRAME_LEN] {
        encode_node_frame(MASTER_ID, destination, kind, parameter)
    }

    fn broadcast_to_all(frame: [u8; NODE_FRAME_LEN]) -> Vec<(Port, Vec<u8>)> {
        Port::ALL.iter().map(|port| (*port, frame.to_vec())).collect()
    }

    #[test]
    fn test_unconfigured_node_says_hello() {
        let (mut node, fake, _) = booted(1);

        assert!(deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0)));
        assert_eq!(
            fake.transmissions(),
            vec![(Port::Upstream, vec![248, 248, 251, 0, 200, 0, 85, 85])]
        );
        assert_eq!(node.role(), Role::WaitForMaster);
    }

    #[test]
    fn test_hello_discovers_child() {
        let (mut node, fake, timer) = configured(3, None);
        fake.push_inbound(Port::Child(ChildPort::C), &[START_TRANSMIT]);

        deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0));

        assert_eq!(node.child(), Some(ChildPort::C));
        assert!(timer.started().contains(&TimerId::Hello));
        assert_eq!(
            fake.transmissions(),
            vec![(Port::Upstream, encode_node_frame(3, MASTER_ID, CommandType::Hello, b'C').to_vec())]
        );
    }

    #[test]
    fn test_relay_after_discovery_with_silent_child_times_out() {
        let (mut node, fake, _) = configured(3, None);
        let hello = encode_node_frame(DEFAULT_ID, MASTER_ID, CommandType::Hello, 0);
        fake.push_inbound(Port::Child(ChildPort::C), &hello);

        deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0));
        assert_eq!(node.child(), Some(ChildPort::C));
        assert_eq!(fake.inbound_len(Port::Child(ChildPort::C)), 0);
        assert_eq!(
            fake.node_frames_sent(),
            vec![(
                Port::Upstream,
                NodeCommand { source: 3, destination: MASTER_ID, kind: CommandType::Hello.code(), parameter: b'C' }
            )]
        );

        // The rest of the child's hello must not pass for an answer
        assert!(!node.child_response().unwrap());
        assert_eq!(node.role(), Role::WaitForMaster);
    }

    #[test]
    fn test_hello_window_expires_quietly() {
        let (mut node, fake, _) = configured(3, None);

        deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0));

        assert_eq!(node.child(), None);
        assert!(fake.transmissions().is_empty());
        assert_eq!(node.role(), Role::WaitForMaster);
    }

    #[test]
    fn test_hello_with_child_listens_to_child() {
        let (mut node, fake, timer) = configured(3, Some(ChildPort::A));
        fake.push_inbound(Port::Child(ChildPort::A), &[END_TRANSMIT]);

        deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0));

        assert!(fake.transmissions().is_empty());
        assert!(timer.started().contains(&TimerId::Child(ChildPort::A)));
        assert_eq!(fake.inbound_len(Port::Child(ChildPort::A)), 0);
    }

    #[test]
    fn test_id_assignment_rejects_reserved_values() {
        for proposed in [0u8, 251, 252, 253, 254, 255] {
            let (mut node, fake, _) = booted(1);

            deliver(&mut node, &fake, &command(DEFAULT_ID, CommandType::IdAssignment, proposed));

            assert_eq!(node.address(), DEFAULT_ID, "{} should be rejected", proposed);
            assert!(!node.is_configured());
            assert!(fake.transmissions().is_empty());
        }
    }

    #[test]
    fn test_id_assignment_accepts_node_range() {
        for proposed in 1u8..=250 {
            let (mut node, fake, _) = booted(1);

            deliver(&mut node, &fake, &command(DEFAULT_ID, CommandType::IdAssignment, proposed));

            assert_eq!(node.address(), proposed);
            assert!(node.is_configured());
            assert_eq!(node.actuator().address, Some(proposed));
            assert_eq!(fake.actuator().unwrap().id, proposed);
        }
    }

    #[test]
    fn test_id_assignment_for_other_node_is_ignored() {
        let (mut node, fake, _) = configured(5, Some(ChildPort::B));

        deliver(&mut node, &fake, &command(2, CommandType::IdAssignment, 9));

        assert_eq!(node.address(), 5);
        assert!(fake.transmissions().is_empty());
    }

    #[test]
    fn test_end_to_end_enumeration() {
        let (mut node, fake, _) = booted(1);

        // Hello
        deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0));
        assert_eq!(
            fake.transmissions(),
            vec![(Port::Upstream, vec![248, 248, 251, 0, 200, 0, 85, 85])]
        );
        fake.clear_transmissions();

        // Assignment, acknowledgement, actuator readdressing
        deliver(&mut node, &fake, &command(DEFAULT_ID, CommandType::IdAssignment, 7));
        let mut expected = broadcast_to_all(encode_node_frame(7, MASTER_ID, CommandType::IdAssignOk, 0));
        expected.push((Port::Upstream, vec![255, 255, 1, 4, 3, 3, 7, 237]));
        expected.push((Port::Upstream, encode_instruction(BROADCAST_ID, Instruction::Ping)));
        assert_eq!(fake.transmissions(), expected);

        assert_eq!(node.address(), 7);
        assert!(node.is_configured());
        assert_eq!(node.actuator().address, Some(7));
        assert_eq!(node.role(), Role::WaitForMaster);
        assert_eq!(node.pins().connected(), PortMask::ALL);
        assert!(node.pins().presence());
        fake.clear_transmissions();

        // The new address answers pings
        deliver(&mut node, &fake, &command(7, CommandType::Ping, 0));
        assert_eq!(
            fake.transmissions(),
            broadcast_to_all(encode_node_frame(7, MASTER_ID, CommandType::Ping, 0))
        );
    }

    #[test]
    fn test_ping_for_this_node_answers_locally_even_with_child() {
        let (mut node, fake, timer) = configured(4, Some(ChildPort::B));
        let started_before = timer.started().len();

        deliver(&mut node, &fake, &command(4, CommandType::Ping, 0));

        assert_eq!(
            fake.transmissions(),
            broadcast_to_all(encode_node_frame(4, MASTER_ID, CommandType::Ping, 0))
        );
        let started: Vec<TimerId> = timer.started().split_off(started_before);
        assert_eq!(started, vec![TimerId::Settle]);
    }

    #[test]
    fn test_ping_relayed_to_answering_child() {
        let (mut node, fake, _) = configured(4, Some(ChildPort::B));
        fake.push_inbound(Port::Child(ChildPort::B), &encode_node_frame(6, MASTER_ID, CommandType::Ping, 0));

        deliver(&mut node, &fake, &command(6, CommandType::Ping, 0));

        assert!(fake.transmissions().is_empty());
        assert_eq!(node.role(), Role::WaitForMaster);
        // Listening stops at the first end byte; the second goes with the role
        assert_eq!(fake.inbound_len(Port::Child(ChildPort::B)), 0);
    }

    #[test]
    fn test_child_response_reports_outcome() {
        let (mut node, fake, _) = configured(4, Some(ChildPort::D));

        fake.push_inbound(Port::Child(ChildPort::D), &[END_TRANSMIT]);
        assert!(node.child_response().unwrap());

        assert!(!node.child_response().unwrap());
        assert_eq!(node.role(), Role::WaitForMaster);
    }

    #[test]
    fn test_relay_without_child_is_dropped() {
        let (mut node, fake, timer) = configured(4, None);
        let started_before = timer.started().len();

        assert!(!node.child_response().unwrap());
        deliver(&mut node, &fake, &command(9, CommandType::Ping, 0));

        assert!(fake.transmissions().is_empty());
        assert_eq!(timer.started().len(), started_before);
        assert_eq!(node.role(), Role::WaitForMaster);
    }

    #[test]
    fn test_ping_for_upstream_node_is_ignored() {
        let (mut node, fake, timer) = configured(4, Some(ChildPort::A));
        let started_before = timer.started().len();

        deliver(&mut node, &fake, &command(2, CommandType::Ping, 0));

        assert!(fake.transmissions().is_empty());
        assert_eq!(timer.started().len(), started_before);
    }

    #[test]
    fn test_clear_config_broadcast_resets_any_node() {
        for address in [1u8, 5, 250] {
            let (mut node, fake, _) = configured(address, Some(ChildPort::C));

            deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::ClearConfig, 0));

            assert_eq!(node.address(), DEFAULT_ID);
            assert!(!node.is_configured());
            assert_eq!(node.child(), None);
            assert!(!node.pins().presence());
            assert_eq!(node.pins().connected(), PortMask::UPSTREAM);
            assert!(fake.transmissions().is_empty());
        }
    }

    #[test]
    fn test_clear_config_addressed_to_node_acknowledges_first() {
        let (mut node, fake, _) = configured(5, None);

        deliver(&mut node, &fake, &command(5, CommandType::ClearConfig, 0));

        assert_eq!(
            fake.transmissions(),
            broadcast_to_all(encode_node_frame(5, MASTER_ID, CommandType::ConfigCleared, 0))
        );
        assert_eq!(node.address(), DEFAULT_ID);
        assert!(!node.is_configured());
    }

    #[test]
    fn test_clear_config_resets_from_destination_downstream() {
        let (mut downstream, fake, _) = configured(9, Some(ChildPort::A));
        deliver(&mut downstream, &fake, &command(5, CommandType::ClearConfig, 0));
        assert_eq!(downstream.address(), DEFAULT_ID);
        assert!(!downstream.is_configured());
        assert!(fake.transmissions().is_empty());

        let (mut upstream, fake, timer) = configured(3, Some(ChildPort::A));
        let started_before = timer.started().len();
        deliver(&mut upstream, &fake, &command(5, CommandType::ClearConfig, 0));
        assert_eq!(upstream.address(), 3);
        assert!(upstream.is_configured());
        assert_eq!(upstream.child(), Some(ChildPort::A));
        // Indicator goes off regardless; not relayed to the child
        assert!(!upstream.pins().presence());
        assert_eq!(timer.started().len(), started_before);
    }

    #[test]
    fn test_unknown_command_type_ignored() {
        let (mut node, fake, timer) = configured(2, Some(ChildPort::A));
        let started_before = timer.started().len();
        let mut frame = command(2, CommandType::Ping, 0);
        frame[4] = 42;

        assert!(deliver(&mut node, &fake, &frame));
        assert!(fake.transmissions().is_empty());
        assert_eq!(timer.started().len(), started_before);
    }

    #[test]
    fn test_say_hello_advertises_child() {
        let (mut node, fake, _) = configured(8, Some(ChildPort::D));

        node.say_hello().unwrap();
        assert_eq!(
            fake.transmissions(),
            vec![(Port::Upstream, vec![248, 248, 8, 0, 200, 68, 85, 85])]
        );
    }

    #[test]
    fn test_node_frames_do_not_disturb_actuator() {
        let (mut node, fake, _) = booted(1);
        let heard_before = fake.actuator().unwrap().received.len();

        deliver(&mut node, &fake, &command(BROADCAST_ID, CommandType::Hello, 0));

        assert_eq!(fake.transmissions().len(), 1);
        assert_eq!(fake.actuator().unwrap().received.len(), heard_before);
    }
}
