use crate::models::NodeUpsertPayload;

pub fn validate_node_payload(payload: &NodeUpsertPayload) -> Result<(), String> {
    if payload.host.trim().is_empty() {
        return Err("Node host cannot be empty".to_string());
    }
    if payload.user.trim().is_empty() {
        return Err("Node user cannot be empty".to_string());
    }
    if payload.password.is_empty() {
        return Err("Node password cannot be empty".to_string());
    }
    if payload.port == 0 {
        return Err("Node port must be greater than 0".to_string());
    }
    Ok(())
}

/// Trimmed leaderboard identity, or `None` when blank.
pub fn normalize_identity(identity: Option<String>) -> Option<String> {
    identity
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
