//! # Actuator Checksum
//!
//! Additive one's-complement checksum used by the actuator protocol.
//!
//! **Formula**: `255 - (sum of fields mod 256)`, over every byte between the
//! two start bytes and the checksum itself.

/// Calculate the checksum over a run of frame fields
///
/// # Arguments
///
/// * `fields` - Id, length, instruction (or error) and operand bytes
///
/// # Returns
///
/// * `u8` - Checksum byte
///
/// # Examples
///
/// ```
/// use revolute_node::protocol::checksum::checksum;
///
/// // Broadcast ping: id 254, length 2, instruction 1
/// assert_eq!(checksum(&[254, 2, 1]), 254);
/// ```
pub fn checksum(fields: &[u8]) -> u8 {
    let sum = fields.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
    !sum
}

/// Calculate the checksum of an instruction from its five wire fields
///
/// Ping and reset instructions pass zero for `address` and `value`, which
/// leaves the sum unchanged.
pub fn instruction_checksum(id: u8, length: u8, instruction: u8, address: u8, value: u8) -> u8 {
    checksum(&[id, length, instruction, address, value])
}
