use core::fmt;

use uuid::Uuid;

/// An opaque identifier, unique per running instance, stored as the value of
/// every slot key this instance claims.
///
/// Generated ids look like `<hostname>-<uuid v4>`, so an operator inspecting
/// the store can tell which host holds which slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    /// Generates a fresh owner id for this process.
    pub fn generate() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_owned());
        Self(format!("{host}-{}", Uuid::new_v4()))
    }

    /// Returns the id as stored in the coordination store.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_carry_a_uuid() {
        let a = OwnerId::generate();
        let b = OwnerId::generate();
        assert_ne!(a, b);

        let (_, uuid) = a.as_str().split_at(a.as_str().len() - 36);
        assert!(Uuid::parse_str(uuid).is_ok());
        assert_eq!(&a.as_str()[a.as_str().len() - 37..a.as_str().len() - 36], "-");
    }
}
