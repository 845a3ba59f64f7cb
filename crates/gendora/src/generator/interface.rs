use crate::{
    generator::GenerateError,
    id::{Metadata, SnowflakeId, decode},
};

/// The operation surface exposed to a request layer.
///
/// Front ends hold a `dyn IdGenerator` so they can be exercised against any
/// encoder configuration (fixed slot, leased slot, mocked clock).
pub trait IdGenerator: Send + Sync {
    /// Produces the next id.
    ///
    /// # Errors
    ///
    /// See [`GenerateError`]; every variant fails only the current call.
    fn generate(&self) -> Result<SnowflakeId, GenerateError>;

    /// Returns the slot currently embedded in new ids, if any.
    fn current_slot(&self) -> Option<u16>;

    /// Produces the next id as a raw integer.
    ///
    /// # Errors
    ///
    /// Same as [`IdGenerator::generate`].
    fn generate_id(&self) -> Result<u64, GenerateError> {
        self.generate().map(|id| id.to_raw())
    }

    /// Decodes any 64-bit value into its fields.
    fn metadata(&self, id: u64) -> Metadata {
        decode(id)
    }
}
