use chrono::Utc;
use tracing::info;

use crate::auth::validate_node_payload;
use crate::db::Database;
use crate::models::{LeaderboardEntry, NodeRecord, NodeUpsertPayload};

pub fn node_add(database: &Database, payload: NodeUpsertPayload) -> Result<NodeRecord, String> {
    validate_node_payload(&payload)?;
    let node_id = uuid::Uuid::new_v4().to_string();
    let node = database.insert_node(&node_id, &payload, Utc::now())?;
    info!(node_id = %node.id, host = %node.host, "hypervisor node registered");
    Ok(node)
}

pub fn node_list(database: &Database) -> Result<Vec<NodeRecord>, String> {
    database.list_nodes()
}

pub fn node_remove(database: &Database, node_id: &str) -> Result<(), String> {
    if !database.delete_node(node_id)? {
        return Err(format!("Node `{node_id}` not found"));
    }
    info!(node_id, "hypervisor node removed");
    Ok(())
}

pub fn leaderboard_list(database: &Database) -> Result<Vec<LeaderboardEntry>, String> {
    database.list_leaderboard()
}

#[cfg(test)]
mod tests {
    use super::{node_add, node_list, node_remove};
    use crate::db::Database;
    use crate::models::NodeUpsertPayload;

    #[test]
    fn nodes_round_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(&dir.path().join("grader.sqlite")).unwrap();

        let node = node_add(
            &database,
            NodeUpsertPayload {
                host: "10.0.0.2".into(),
                user: "root".into(),
                password: "pw".into(),
                port: 22,
            },
        )
        .unwrap();
        assert_eq!(node_list(&database).unwrap().len(), 1);

        node_remove(&database, &node.id).unwrap();
        assert_eq!(
            node_remove(&database, &node.id).unwrap_err(),
            format!("Node `{}` not found", node.id)
        );
    }

    #[test]
    fn serialized_nodes_hide_the_password() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(&dir.path().join("grader.sqlite")).unwrap();
        let node = node_add(
            &database,
            NodeUpsertPayload {
                host: "10.0.0.2".into(),
                user: "root".into(),
                password: "hunter2".into(),
                port: 22,
            },
        )
        .unwrap();
        let text = serde_json::to_string(&node).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("createdAt"));
    }
}
