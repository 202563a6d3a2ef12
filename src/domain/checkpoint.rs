use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named snapshot of the persisted high-water mark, used as a replay cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    /// Highest `sequence_id` durably committed when the checkpoint was taken
    pub last_sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// Fresh, unique checkpoint id; lexicographic order follows creation time
pub fn new_checkpoint_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_ids_are_unique_and_sortable() {
        let ids: Vec<String> = (0..64).map(|_| new_checkpoint_id()).collect();

        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, ids);
    }
}
