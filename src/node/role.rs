//! # Role Switching
//!
//! A role is the single hardware configuration loaded on the node at any
//! instant: which receivers and transmitters run, which timer is armed, and
//! which ports are tied onto the shared bus.

use std::hint;

use tracing::debug;

use super::Node;
use crate::error::Result;
use crate::pins::{diagnostic_pattern, HardwareBus, PortMask};
use crate::serial::port_trait::{ChildPort, Link, Parity, Port, Transceiver};
use crate::timeout::{TimerHardware, TimerId};

/// Hardware configuration of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Nothing loaded yet (boot)
    Uninitialized,
    /// Listening upstream for master commands
    WaitForMaster,
    /// Transmitting a response on every port
    RespondToMaster,
    /// Waiting for a known child to finish answering
    ListenChild(ChildPort),
    /// Listening on every child port for a new neighbour
    ListenForHellos,
    /// Transmitting an instruction to the local actuator
    TalkToActuator,
    /// Listening for the local actuator's reply
    Initialize,
}

impl Role {
    /// Every role that owns hardware
    pub const LOADABLE: [Role; 9] = [
        Role::WaitForMaster,
        Role::RespondToMaster,
        Role::ListenChild(ChildPort::A),
        Role::ListenChild(ChildPort::B),
        Role::ListenChild(ChildPort::C),
        Role::ListenChild(ChildPort::D),
        Role::ListenForHellos,
        Role::TalkToActuator,
        Role::Initialize,
    ];

    /// Receivers and transmitters the role runs
    pub fn links(self) -> Vec<Link> {
        match self {
            Role::Uninitialized => Vec::new(),
            Role::WaitForMaster | Role::Initialize => vec![Link::Receiver(Port::Upstream)],
            Role::RespondToMaster => Port::ALL.iter().map(|port| Link::Transmitter(*port)).collect(),
            Role::ListenChild(child) => vec![Link::Receiver(Port::Child(child))],
            Role::ListenForHellos => ChildPort::ALL
                .iter()
                .map(|child| Link::Receiver(Port::Child(*child)))
                .collect(),
            Role::TalkToActuator => vec![Link::Transmitter(Port::Upstream)],
        }
    }

    /// Timer armed while the role is loaded
    pub fn timer(self) -> Option<TimerId> {
        match self {
            Role::RespondToMaster => Some(TimerId::Settle),
            Role::ListenChild(child) => Some(TimerId::Child(child)),
            Role::ListenForHellos => Some(TimerId::Hello),
            Role::Initialize => Some(TimerId::ActuatorReply),
            Role::Uninitialized | Role::WaitForMaster | Role::TalkToActuator => None,
        }
    }
}

impl<T: Transceiver, H: TimerHardware, B: HardwareBus> Node<T, H, B> {
    /// Tear down the active role and load `target`
    ///
    /// # Arguments
    ///
    /// * `target` - Role to load
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver fails to start or stop a link
    ///
    /// # Panics
    ///
    /// Panics if a timer is still armed that no loaded role owns.
    pub fn switch_role(&mut self, target: Role) -> Result<()> {
        self.pins.release();

        if self.role == Role::Uninitialized {
            for role in Role::LOADABLE {
                self.unload(role)?;
            }
        } else {
            self.unload(self.role)?;
        }

        self.load(target)?;
        self.apply_bus_participation(target);

        debug!("Role {:?} -> {:?}", self.role, target);
        self.role = target;
        Ok(())
    }

    fn unload(&mut self, role: Role) -> Result<()> {
        for link in role.links() {
            self.transceiver.stop(link)?;
        }
        if let Some(timer) = role.timer() {
            self.timeouts.disarm(timer);
        }
        Ok(())
    }

    fn load(&mut self, role: Role) -> Result<()> {
        for link in role.links() {
            self.transceiver.start(link, Parity::None)?;
        }

        match role.timer() {
            Some(TimerId::Settle) => {
                // Let the line go quiet before anyone talks
                self.timeouts.arm(TimerId::Settle);
                while !self.timeouts.poll_and_clear() {
                    hint::spin_loop();
                }
                self.timeouts.disarm(TimerId::Settle);
            }
            Some(timer) => self.timeouts.arm(timer),
            None => {}
        }
        Ok(())
    }

    /// Reconnect the ports this node is entitled to and refresh the indicators
    pub(crate) fn apply_bus_participation(&mut self, role: Role) {
        if role == Role::TalkToActuator {
            // Actuator traffic must not leak downstream
            self.pins.connect(PortMask::UPSTREAM);
        } else if self.configured {
            self.pins.connect(PortMask::ALL);
            self.pins.set_presence(true);
            self.pins.show_diagnostic(diagnostic_pattern(self.actuator.address));
        } else {
            self.pins.connect(PortMask::UPSTREAM);
            self.pins.set_presence(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::harness::*;
    use crate::pins::MockHardwareBus;
    use crate::serial::port_trait::mocks::FakeTransceiver;
    use crate::timeout::mocks::FakeTimer;
    use crate::timeout::{TimeoutFlag, TimeoutService, TimerPeriods};
    use crate::node::actuator::ActuatorSettings;

    #[test]
    fn test_role_links() {
        assert_eq!(Role::Uninitialized.links(), vec![]);
        assert_eq!(Role::WaitForMaster.links(), vec![Link::Receiver(Port::Upstream)]);
        assert_eq!(Role::Initialize.links(), vec![Link::Receiver(Port::Upstream)]);
        assert_eq!(Role::TalkToActuator.links(), vec![Link::Transmitter(Port::Upstream)]);
        assert_eq!(Role::RespondToMaster.links().len(), 5);
        assert_eq!(
            Role::ListenChild(ChildPort::C).links(),
            vec![Link::Receiver(Port::Child(ChildPort::C))]
        );
        assert_eq!(Role::ListenForHellos.links().len(), 4);
        assert!(!Role::ListenForHellos.links().contains(&Link::Receiver(Port::Upstream)));
    }

    #[test]
    fn test_role_timers() {
        assert_eq!(Role::WaitForMaster.timer(), None);
        assert_eq!(Role::TalkToActuator.timer(), None);
        assert_eq!(Role::RespondToMaster.timer(), Some(TimerId::Settle));
        assert_eq!(Role::ListenForHellos.timer(), Some(TimerId::Hello));
        assert_eq!(Role::Initialize.timer(), Some(TimerId::ActuatorReply));
        assert_eq!(Role::ListenChild(ChildPort::D).timer(), Some(TimerId::Child(ChildPort::D)));
    }

    #[test]
    fn test_switch_to_wait_for_master_twice() {
        let (mut node, fake, _) = node_with(None);

        node.switch_role(Role::WaitForMaster).unwrap();
        node.switch_role(Role::WaitForMaster).unwrap();

        assert_eq!(fake.active_links(), vec![Link::Receiver(Port::Upstream)]);
        assert_eq!(fake.double_starts(), 0);
        assert_eq!(node.role(), Role::WaitForMaster);
        assert_eq!(node.timeouts.armed(), None);
    }

    #[test]
    fn test_switch_replaces_previous_devices() {
        let (mut node, fake, timer) = node_with(None);

        node.switch_role(Role::ListenForHellos).unwrap();
        assert_eq!(fake.active_links().len(), 4);
        assert_eq!(timer.running(), Some(TimerId::Hello));

        node.switch_role(Role::TalkToActuator).unwrap();
        assert_eq!(fake.active_links(), vec![Link::Transmitter(Port::Upstream)]);
        assert_eq!(timer.running(), None);
        assert_eq!(node.timeouts.armed(), None);
    }

    #[test]
    fn test_respond_waits_for_settle_and_disarms() {
        let (mut node, fake, timer) = node_with(None);

        node.switch_role(Role::RespondToMaster).unwrap();

        assert_eq!(timer.started(), vec![TimerId::Settle]);
        assert_eq!(timer.running(), None);
        assert_eq!(node.timeouts.armed(), None);
        assert_eq!(fake.active_links().len(), 5);
    }

    #[test]
    fn test_listen_child_arms_child_timer() {
        let (mut node, _, timer) = node_with(None);

        node.switch_role(Role::ListenChild(ChildPort::B)).unwrap();
        assert_eq!(timer.running(), Some(TimerId::Child(ChildPort::B)));

        node.switch_role(Role::ListenChild(ChildPort::B)).unwrap();
        assert_eq!(
            timer.started(),
            vec![TimerId::Child(ChildPort::B), TimerId::Child(ChildPort::B)]
        );
    }

    #[test]
    fn test_bus_participation_unconfigured() {
        let (mut node, _, _) = node_with(None);
        node.switch_role(Role::WaitForMaster).unwrap();

        assert_eq!(node.pins().connected(), PortMask::UPSTREAM);
        assert!(!node.pins().presence());
    }

    #[test]
    fn test_bus_participation_configured() {
        let (mut node, _, _) = node_with(None);
        node.address = 4;
        node.configured = true;
        node.actuator.address = Some(4);

        node.switch_role(Role::WaitForMaster).unwrap();
        assert_eq!(node.pins().connected(), PortMask::ALL);
        assert!(node.pins().presence());
        assert_eq!(node.pins().diagnostic(), 4);

        node.switch_role(Role::TalkToActuator).unwrap();
        assert_eq!(node.pins().connected(), PortMask::UPSTREAM);
    }

    #[test]
    fn test_switch_drives_pins_in_order() {
        let flag = TimeoutFlag::new();
        let fake = FakeTransceiver::new().expire_on_silence(flag.clone());
        let timeouts = TimeoutService::new(FakeTimer::new(flag.clone()), flag, TimerPeriods::default());

        let mut pins = MockHardwareBus::new();
        let mut sequence = mockall::Sequence::new();
        pins.expect_release()
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
        pins.expect_connect()
            .withf(|mask| *mask == PortMask::UPSTREAM)
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
        pins.expect_set_presence()
            .withf(|on| !*on)
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
        pins.expect_show_diagnostic().never();

        let mut node = crate::node::Node::new(fake, timeouts, pins, ActuatorSettings::default());
        node.switch_role(Role::WaitForMaster).unwrap();
    }
}
