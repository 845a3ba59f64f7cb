/// Fields decoded from a [`SnowflakeId`].
///
/// With the `serde` feature enabled this serializes in camelCase:
///
/// ```json
/// {"timestampDelta":1234,"epoch":1759276800000,"slot":42,"sequence":10,"algorithm":"snowflake"}
/// ```
///
/// [`SnowflakeId`]: crate::SnowflakeId
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// Milliseconds since [`epoch`](Self::epoch).
    pub timestamp_delta: u64,
    /// The custom epoch, in milliseconds since the Unix epoch.
    pub epoch: u64,
    /// Slot of the instance that produced the id.
    pub slot: u16,
    /// Intra-millisecond sequence number.
    pub sequence: u16,
    /// Always [`Metadata::ALGORITHM`].
    pub algorithm: &'static str,
}

impl Metadata {
    /// Name reported for the id layout.
    pub const ALGORITHM: &'static str = "snowflake";

    /// Absolute timestamp of the id, in milliseconds since the Unix epoch.
    pub const fn unix_millis(&self) -> u64 {
        self.epoch + self.timestamp_delta
    }
}
