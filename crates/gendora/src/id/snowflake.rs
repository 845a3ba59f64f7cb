use core::fmt;

use crate::{id::Metadata, time::EPOCH_MILLIS};

/// A 64-bit Snowflake ID packing a timestamp, the owning slot and a sequence.
///
/// - 1 bit reserved (always zero for generated ids)
/// - 41 bits timestamp (ms since [`EPOCH_MILLIS`])
/// - 10 bits slot (the instance's leased slot)
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            22 21         12 11             0
///              +--------------+----------------+-------------+---------------+
///  Field:      | reserved (1) | timestamp (41) |  slot (10)  | sequence (12) |
///              +--------------+----------------+-------------+---------------+
///              |<----------- MSB -------- 64 bits --------- LSB ------------>|
/// ```
///
/// Ordering of `SnowflakeId` values follows the raw integer, so ids from one
/// slot sort by (timestamp, sequence).
///
/// # Example
///
/// ```
/// use gendora::SnowflakeId;
///
/// let id = SnowflakeId::from_components(1000, 2, 1);
/// assert_eq!(id.timestamp(), 1000);
/// assert_eq!(id.slot(), 2);
/// assert_eq!(id.sequence(), 1);
/// assert_eq!(SnowflakeId::from_raw(id.to_raw()), id);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    /// Bitmask for the 41-bit timestamp field. Occupies bits 22 through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for the 10-bit slot field. Occupies bits 12 through 21.
    pub const SLOT_MASK: u64 = (1 << 10) - 1;

    /// Bitmask for the 12-bit sequence field. Occupies bits 0 through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its position.
    pub const TIMESTAMP_SHIFT: u64 = 22;

    /// Number of bits to shift the slot to its position.
    pub const SLOT_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field.
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Largest encodable timestamp delta (`2^41 - 1` ms, roughly 69.7 years).
    pub const MAX_TIMESTAMP: u64 = Self::TIMESTAMP_MASK;

    /// Largest encodable slot index.
    pub const MAX_SLOT: u16 = Self::SLOT_MASK as u16;

    /// Largest sequence value within one millisecond.
    pub const MAX_SEQUENCE: u16 = Self::SEQUENCE_MASK as u16;

    /// Packs the three fields into an id.
    ///
    /// Each component is masked to its field width, so out-of-range inputs
    /// never bleed into neighbouring fields. Callers that must reject
    /// out-of-range values (the encoder does) check before packing.
    pub const fn from_components(timestamp: u64, slot: u16, sequence: u16) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let slot = ((slot as u64) & Self::SLOT_MASK) << Self::SLOT_SHIFT;
        let sequence = ((sequence as u64) & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | slot | sequence,
        }
    }

    /// Wraps a raw 64-bit value without validation.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Returns the raw 64-bit value.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Extracts the timestamp delta (ms since [`EPOCH_MILLIS`]).
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the slot index.
    pub const fn slot(&self) -> u16 {
        ((self.id >> Self::SLOT_SHIFT) & Self::SLOT_MASK) as u16
    }

    /// Extracts the sequence number.
    pub const fn sequence(&self) -> u16 {
        ((self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK) as u16
    }

    /// Returns `true` if the reserved top bit is clear.
    pub const fn is_reserved_clear(&self) -> bool {
        self.id >> 63 == 0
    }

    /// Decodes the bit fields into [`Metadata`].
    pub const fn metadata(&self) -> Metadata {
        Metadata {
            timestamp_delta: self.timestamp(),
            epoch: EPOCH_MILLIS,
            slot: self.slot(),
            sequence: self.sequence(),
            algorithm: Metadata::ALGORITHM,
        }
    }

    /// Returns the ID as a zero-padded 20-digit string.
    pub fn to_padded_string(&self) -> String {
        format!("{:020}", self.id)
    }
}

impl From<u64> for SnowflakeId {
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_raw()
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("id", &format_args!("{:#018x}", self.id))
            .field("timestamp", &self.timestamp())
            .field("slot", &self.slot())
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Decodes any 64-bit value into its fields.
///
/// This is pure bit extraction: it always succeeds and does not check that the
/// value was ever produced by an encoder. The reserved top bit is ignored.
pub const fn decode(id: u64) -> Metadata {
    SnowflakeId::from_raw(id).metadata()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_components_encode_to_zero() {
        assert_eq!(SnowflakeId::from_components(0, 0, 0).to_raw(), 0);
    }

    #[test]
    fn fields_land_in_their_bit_ranges() {
        let id = SnowflakeId::from_components(1, 0, 0);
        assert_eq!(id.to_raw(), 1 << 22);

        let id = SnowflakeId::from_components(0, 1, 0);
        assert_eq!(id.to_raw(), 1 << 12);

        let id = SnowflakeId::from_components(0, 0, 1);
        assert_eq!(id.to_raw(), 1);

        let id = SnowflakeId::from_components(
            SnowflakeId::MAX_TIMESTAMP,
            SnowflakeId::MAX_SLOT,
            SnowflakeId::MAX_SEQUENCE,
        );
        assert_eq!(id.to_raw(), u64::MAX >> 1);
        assert!(id.is_reserved_clear());
    }

    #[test]
    fn oversized_components_are_masked() {
        let id = SnowflakeId::from_components(SnowflakeId::MAX_TIMESTAMP + 1, 1024, 4096);
        assert_eq!(id.to_raw(), 0);
    }

    #[test]
    fn decode_then_encode_reproduces_value() {
        let samples = [
            0_u64,
            1,
            4095,
            4096,
            (1 << 22) - 1,
            1 << 22,
            0x1234_5678_9abc_def0,
            u64::MAX >> 1,
        ];
        for raw in samples {
            let id = SnowflakeId::from_raw(raw);
            let rebuilt = SnowflakeId::from_components(id.timestamp(), id.slot(), id.sequence());
            assert_eq!(rebuilt.to_raw(), raw, "raw = {raw:#x}");
        }
    }

    #[test]
    fn decode_ignores_reserved_bit() {
        let raw = (1 << 63) | SnowflakeId::from_components(7, 3, 9).to_raw();
        let meta = decode(raw);
        assert_eq!(meta.timestamp_delta, 7);
        assert_eq!(meta.slot, 3);
        assert_eq!(meta.sequence, 9);
        assert!(!SnowflakeId::from_raw(raw).is_reserved_clear());
    }

    #[test]
    fn decode_reports_epoch_and_algorithm() {
        let meta = decode(SnowflakeId::from_components(1234, 42, 10).to_raw());
        assert_eq!(meta.timestamp_delta, 1234);
        assert_eq!(meta.epoch, EPOCH_MILLIS);
        assert_eq!(meta.slot, 42);
        assert_eq!(meta.sequence, 10);
        assert_eq!(meta.algorithm, "snowflake");
    }

    #[test]
    fn ordering_follows_timestamp_then_sequence() {
        let a = SnowflakeId::from_components(10, 5, 4095);
        let b = SnowflakeId::from_components(11, 5, 0);
        let c = SnowflakeId::from_components(11, 5, 1);
        assert!(a < b && b < c);
    }

    #[test]
    fn padded_string_is_twenty_digits() {
        assert_eq!(SnowflakeId::from_raw(42).to_padded_string(), "00000000000000000042");
    }
}
