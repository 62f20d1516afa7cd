use super::AppState;
use crate::types::*;

impl AppState {
    /// Append a new bingo entry for `user` and return it.
    ///
    /// With a history limit configured the oldest entries are dropped once the
    /// list grows past it.
    pub async fn add_bingo(&self, board: serde_json::Value, user: UserInfo) -> BingoEntry {
        let entry = BingoEntry::new(board, user);
        let mut bingos = self.bingos.write().await;
        bingos.push_back(entry.clone());

        if let Some(limit) = self.registry_config.bingo_history_limit {
            while bingos.len() > limit {
                if let Some(evicted) = bingos.pop_front() {
                    tracing::debug!(bingo_id = %evicted.id, "Evicted bingo entry");
                }
            }
        }

        entry
    }

    /// Full copy of the bingo list, oldest first
    pub async fn bingos_snapshot(&self) -> Vec<BingoEntry> {
        self.bingos.read().await.iter().cloned().collect()
    }

    pub async fn bingo_count(&self) -> usize {
        self.bingos.read().await.len()
    }
}
