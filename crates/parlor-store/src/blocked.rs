use rusqlite::params;

use crate::database::Store;
use crate::error::Result;

impl Store {
    /// Idempotent: blocking an already-blocked key is a no-op.
    pub fn block_user(&self, public_key: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO blocked_keys (pub_key) VALUES (?1)",
            params![public_key],
        )?;
        Ok(())
    }

    pub fn is_blocked(&self, public_key: &str) -> Result<bool> {
        let conn = self.lock();
        let blocked: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocked_keys WHERE pub_key = ?1)",
            params![public_key],
            |row| row.get(0),
        )?;
        Ok(blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.is_blocked("aa").unwrap());
        store.block_user("aa").unwrap();
        store.block_user("aa").unwrap();
        assert!(store.is_blocked("aa").unwrap());
        assert!(!store.is_blocked("bb").unwrap());
    }
}
