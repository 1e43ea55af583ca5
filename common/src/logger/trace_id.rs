use std::fmt;

use uuid::Uuid;

/// Correlation ID that follows a single booking run across every task it spawns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self(Uuid::new_v4().as_hyphenated().to_string())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ids_are_unique_uuids() {
        let a = TraceId::default();
        let b = TraceId::default();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn explicit_id_is_kept_verbatim() {
        let id = TraceId::new("run-42");
        assert_eq!(id.as_str(), "run-42");
        assert_eq!(id.to_string(), "run-42");
    }
}
