//! # Revolute Node Library
//!
//! Firmware core for one node of a self-enumerating chain of actuator
//! modules.
//!
//! Each node bridges a shared multi-drop serial bus to its local servo. The
//! master walks the chain with hello probes, hands out addresses, and then
//! talks to any node by address. Nodes find their downstream neighbour on
//! their own and wait for it whenever a command is addressed past them.

pub mod config;
pub mod error;
pub mod node;
pub mod pins;
pub mod protocol;
pub mod serial;
pub mod timeout;
