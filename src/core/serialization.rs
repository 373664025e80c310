//! JSON payload helpers for the engine boundary.
//!
//! Reporting, table, and PDF collaborators consume the simulation result as a
//! stable camelCase JSON document; these helpers keep the encoding in one place.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serializes a boundary payload to compact JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

/// Serializes a boundary payload to human-readable JSON.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Deserializes a boundary payload from JSON.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CashflowEvent;

    #[test]
    fn cashflow_event_round_trips_through_json() {
        let event = CashflowEvent {
            month_index: 12,
            amount: 45_000.0,
            target: Some("pillar3a".to_string()),
        };
        let json = to_json(&event).unwrap();
        assert!(json.contains("\"monthIndex\":12"));
        let decoded: CashflowEvent = from_json(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
