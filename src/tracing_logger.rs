//! Request correlation ids, threaded through tracing spans so a single
//! request's log lines (and, for scheduler ticks, a single scan's) can be
//! grepped together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::new(),
        }
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_a_generated_id_when_header_absent() {
        let a = CorrelationId::from_header(None);
        let b = CorrelationId::from_header(Some(""));
        assert_ne!(a.0, "");
        assert_ne!(b.0, "");
    }

    #[test]
    fn reuses_a_supplied_header_value() {
        let id = CorrelationId::from_header(Some("req-123"));
        assert_eq!(id.0, "req-123");
    }
}
