//! Score-breakdown decoding
//!
//! The API delivers a season-specific breakdown keyed by alliance colour,
//! sometimes as a JSON object and sometimes as a string holding one. Both
//! are normalised here into [`MatchBreakdown`] before any scoring strategy
//! sees them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AceError, AllianceColor, Match, Result};

/// One alliance's breakdown for one match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreBreakdown(Map<String, Value>);

impl ScoreBreakdown {
    pub fn new(fields: Map<String, Value>) -> Self {
        ScoreBreakdown(fields)
    }

    /// Numeric field; missing keys and non-numeric values read as zero
    pub fn number(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Sum of several numeric fields
    pub fn sum(&self, keys: &[&str]) -> f64 {
        keys.iter().map(|k| self.number(k)).sum()
    }

    /// Text field; missing keys read as ""
    pub fn text(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Per-robot field such as `endGameRobot2`, for a 0-based alliance index
    pub fn robot_text(&self, prefix: &str, index: usize) -> &str {
        self.text(&format!("{}{}", prefix, index + 1))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Both alliances' breakdowns for one match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchBreakdown {
    pub red: Option<ScoreBreakdown>,
    pub blue: Option<ScoreBreakdown>,
}

impl MatchBreakdown {
    /// Decode a raw payload. A string is parsed as JSON first; the result
    /// must be an object, and each alliance entry that is present must be an
    /// object too.
    pub fn decode(payload: &Value) -> std::result::Result<Self, String> {
        match payload {
            Value::String(text) => {
                let inner: Value = serde_json::from_str(text)
                    .map_err(|e| format!("breakdown string is not JSON: {}", e))?;
                if inner.is_string() {
                    return Err("breakdown is doubly string-encoded".to_string());
                }
                Self::decode(&inner)
            }
            Value::Object(obj) => Ok(MatchBreakdown {
                red: Self::alliance_entry(obj, AllianceColor::Red)?,
                blue: Self::alliance_entry(obj, AllianceColor::Blue)?,
            }),
            Value::Null => Err("no score breakdown".to_string()),
            other => Err(format!("unexpected breakdown type: {}", type_name(other))),
        }
    }

    fn alliance_entry(
        obj: &Map<String, Value>,
        color: AllianceColor,
    ) -> std::result::Result<Option<ScoreBreakdown>, String> {
        match obj.get(color.code()) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(fields)) => Ok(Some(ScoreBreakdown::new(fields.clone()))),
            Some(other) => Err(format!(
                "{} breakdown is {}, expected object",
                color.code(),
                type_name(other)
            )),
        }
    }

    pub fn alliance(&self, color: AllianceColor) -> Option<&ScoreBreakdown> {
        match color {
            AllianceColor::Red => self.red.as_ref(),
            AllianceColor::Blue => self.blue.as_ref(),
        }
    }
}

/// Decode a match's payload and pull out one alliance's half
pub fn alliance_breakdown(record: &Match, color: AllianceColor) -> Result<ScoreBreakdown> {
    let malformed = |message: String| AceError::Breakdown {
        match_key: record.key.clone(),
        message,
    };
    let payload = record
        .score_breakdown
        .as_ref()
        .ok_or_else(|| malformed("no score breakdown".to_string()))?;
    let decoded = MatchBreakdown::decode(payload).map_err(malformed)?;
    decoded
        .alliance(color)
        .cloned()
        .ok_or_else(|| malformed(format!("missing {} alliance", color.code())))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_odd_fields_read_as_zero() {
        let bd: ScoreBreakdown = serde_json::from_value(json!({
            "autoPoints": 12,
            "teleopPoints": "30",
            "rp": true,
            "endGameRobot1": "Parked",
            "nested": {"x": 1}
        }))
        .unwrap();

        assert_eq!(bd.number("autoPoints"), 12.0);
        assert_eq!(bd.number("teleopPoints"), 30.0);
        assert_eq!(bd.number("rp"), 1.0);
        assert_eq!(bd.number("nested"), 0.0);
        assert_eq!(bd.number("missing"), 0.0);
        assert_eq!(bd.robot_text("endGameRobot", 0), "Parked");
        assert_eq!(bd.robot_text("endGameRobot", 2), "");
        assert_eq!(bd.sum(&["autoPoints", "teleopPoints", "missing"]), 42.0);
    }

    #[test]
    fn test_decode_object_and_string_forms_agree() {
        let object = json!({"red": {"autoPoints": 7}, "blue": {"autoPoints": 3}});
        let string = Value::String(object.to_string());

        let a = MatchBreakdown::decode(&object).unwrap();
        let b = MatchBreakdown::decode(&string).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.alliance(AllianceColor::Red).unwrap().number("autoPoints"), 7.0);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(MatchBreakdown::decode(&Value::String("{not json".to_string())).is_err());
        assert!(MatchBreakdown::decode(&json!([1, 2])).is_err());
        assert!(MatchBreakdown::decode(&json!({"red": 5})).is_err());
        assert!(MatchBreakdown::decode(&Value::Null).is_err());
    }

    #[test]
    fn test_missing_alliance_is_none() {
        let decoded = MatchBreakdown::decode(&json!({"red": {"autoPoints": 1}})).unwrap();
        assert!(decoded.alliance(AllianceColor::Blue).is_none());
    }
}
