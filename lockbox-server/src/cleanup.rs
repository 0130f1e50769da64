//! Background cleanup: prune expired refresh tokens.

use crate::error::ServerError;
use crate::storage::{refresh_tokens, ServerStorage};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

pub fn spawn_cleanup_task(storage: ServerStorage, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup(&storage) {
                tracing::error!("Cleanup error: {}", e);
            }
        }
    })
}

pub fn run_cleanup(storage: &ServerStorage) -> Result<usize, ServerError> {
    let conn = storage.conn()?;
    let now = chrono::Utc::now().timestamp();

    let pruned = refresh_tokens::delete_expired(&conn, now)?;
    tracing::debug!("Cleanup completed, {} refresh tokens pruned", pruned);
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::users;

    #[test]
    fn test_prunes_only_expired() {
        let storage = ServerStorage::in_memory().unwrap();
        let alice = {
            let conn = storage.conn().unwrap();
            let alice = users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();
            refresh_tokens::insert(&conn, "stale", alice, 1).unwrap();
            refresh_tokens::insert(&conn, "live", alice, i64::MAX).unwrap();
            alice
        };

        assert_eq!(run_cleanup(&storage).unwrap(), 1);
        assert_eq!(run_cleanup(&storage).unwrap(), 0);

        let conn = storage.conn().unwrap();
        assert_eq!(refresh_tokens::count_for_user(&conn, alice).unwrap(), 1);
    }
}
