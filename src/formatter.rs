use chrono::Utc;
use serde_json::Value;

use crate::models::{CheckResult, CheckStatus};

pub const DEFAULT_MAX_SCORE: u32 = 5;

/// Turns a checker's raw outcome into a scored record.
///
/// `raw["status"] == true` earns `max_score`; `false` is a failed check and
/// anything else (missing, text, null) is an errored check. Both of the latter
/// score zero.
pub fn format_result(
    category: &str,
    step_code: &str,
    step_name: &str,
    raw: Value,
    max_score: u32,
) -> CheckResult {
    let (status, score) = match raw.get("status") {
        Some(Value::Bool(true)) => (CheckStatus::Success, max_score),
        Some(Value::Bool(false)) => (CheckStatus::Failed, 0),
        _ => (CheckStatus::Error, 0),
    };
    let message = raw.get("message").and_then(|value| match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    });

    CheckResult {
        id: uuid::Uuid::new_v4().to_string(),
        category: category.to_string(),
        step_code: step_code.to_string(),
        step_name: step_name.to_string(),
        status,
        score,
        max_score,
        message,
        raw,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::{format_result, DEFAULT_MAX_SCORE};
    use crate::models::CheckStatus;
    use serde_json::json;

    #[test]
    fn maps_tri_state_status_to_score() {
        let success = format_result("php", "PHP-01", "Validate PHP Binary", json!({"status": true}), DEFAULT_MAX_SCORE);
        assert_eq!(success.status, CheckStatus::Success);
        assert_eq!(success.score, 5);

        let failed = format_result("php", "PHP-01", "Validate PHP Binary", json!({"status": false}), DEFAULT_MAX_SCORE);
        assert_eq!(failed.status, CheckStatus::Failed);
        assert_eq!(failed.score, 0);
        assert_eq!(failed.max_score, 5);

        let errored = format_result("php", "PHP-01", "Validate PHP Binary", json!({"status": "boom"}), DEFAULT_MAX_SCORE);
        assert_eq!(errored.status, CheckStatus::Error);
        assert_eq!(errored.score, 0);
    }

    #[test]
    fn keeps_message_and_raw_and_stamps_fresh_ids() {
        let raw = json!({"status": false, "message": "Nginx service not running"});
        let first = format_result("web", "WEB-02", "Validate Nginx Service", raw.clone(), 5);
        let second = format_result("web", "WEB-02", "Validate Nginx Service", raw.clone(), 5);
        assert_eq!(first.message.as_deref(), Some("Nginx service not running"));
        assert_eq!(first.raw, raw);
        assert_ne!(first.id, second.id);
    }
}
