use crate::Database;
use crate::models::{TokenRow, UserRow};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

const USER_COLS: &str = "id, email, username, password, first_name, last_name, role, phone, \
                         avatar_url, is_verified, is_active, created_at, updated_at";

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        role: row.get(6)?,
        phone: row.get(7)?,
        avatar_url: row.get(8)?,
        is_verified: row.get(9)?,
        is_active: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        username: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        role: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, password, first_name, last_name, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, email, username, password_hash, first_name, last_name, role],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], user_from_row).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
        })
    }

    /// Batch-fetch users for a set of ids (inbox and card rendering).
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

            let rows = stmt
                .query_map(bind.as_slice(), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn username_taken_by_other(&self, username: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1 AND id <> ?2",
                params![username, user_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        username: &str,
        first_name: &str,
        last_name: &str,
        phone: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET username = ?2, first_name = ?3, last_name = ?4, phone = ?5,
                     avatar_url = ?6, updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, username, first_name, last_name, phone, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn set_avatar(&self, id: &str, avatar_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET avatar_url = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, avatar_url],
            )?;
            Ok(())
        })
    }

    // -- Email verification --

    pub fn create_verification_token(&self, token: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO email_verification_tokens (token, user_id) VALUES (?1, ?2)",
                params![token, user_id],
            )?;
            Ok(())
        })
    }

    pub fn get_verification_token(&self, token: &str) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT token, user_id, expires_at < datetime('now')
                     FROM email_verification_tokens WHERE token = ?1",
                    [token],
                    |row| {
                        Ok(TokenRow {
                            token: row.get(0)?,
                            user_id: row.get(1)?,
                            is_used: false,
                            is_expired: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Flip the user to verified and consume the token in one transaction.
    pub fn consume_verification_token(&self, token: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET is_verified = 1, updated_at = datetime('now') WHERE id = ?1",
                [user_id],
            )?;
            tx.execute(
                "DELETE FROM email_verification_tokens WHERE token = ?1",
                [token],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Password reset --

    pub fn create_reset_token(&self, token: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO password_reset_tokens (token, user_id) VALUES (?1, ?2)",
                params![token, user_id],
            )?;
            Ok(())
        })
    }

    pub fn get_reset_token(&self, token: &str) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT token, user_id, is_used, expires_at < datetime('now')
                     FROM password_reset_tokens WHERE token = ?1",
                    [token],
                    |row| {
                        Ok(TokenRow {
                            token: row.get(0)?,
                            user_id: row.get(1)?,
                            is_used: row.get(2)?,
                            is_expired: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Set the new password and mark the token used, atomically.
    pub fn consume_reset_token(&self, token: &str, user_id: &str, new_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET password = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![user_id, new_hash],
            )?;
            tx.execute(
                "UPDATE password_reset_tokens SET is_used = 1 WHERE token = ?1",
                [token],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Refresh token blacklist --

    pub fn revoke_jti(&self, jti: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO revoked_tokens (jti) VALUES (?1)",
                [jti],
            )?;
            Ok(())
        })
    }

    pub fn is_jti_revoked(&self, jti: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM revoked_tokens WHERE jti = ?1",
                [jti],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn user(db: &Database, id: &str, email: &str, username: &str, role: &str) {
        db.create_user(id, email, username, "hash", "", "", role).unwrap();
    }

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "u1", "a@example.com", "alice", "buyer");

        let row = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(row.id, "u1");
        assert_eq!(row.role, "buyer");
        assert!(row.is_active);
        assert!(!row.is_verified);

        assert!(db.get_user_by_email("missing@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "u1", "a@example.com", "alice", "buyer");
        assert!(db.create_user("u2", "a@example.com", "bob", "h", "", "", "buyer").is_err());
    }

    #[test]
    fn username_collision_check_excludes_self() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "u1", "a@example.com", "alice", "buyer");
        user(&db, "u2", "b@example.com", "bob", "buyer");

        assert!(db.username_taken_by_other("alice", "u2").unwrap());
        assert!(!db.username_taken_by_other("alice", "u1").unwrap());
    }

    #[test]
    fn verification_token_flow() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "u1", "a@example.com", "alice", "buyer");
        db.create_verification_token("t1", "u1").unwrap();

        let tok = db.get_verification_token("t1").unwrap().unwrap();
        assert!(!tok.is_expired);
        db.consume_verification_token("t1", "u1").unwrap();

        assert!(db.get_user_by_id("u1").unwrap().unwrap().is_verified);
        assert!(db.get_verification_token("t1").unwrap().is_none());
    }

    #[test]
    fn reset_token_is_single_use() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "u1", "a@example.com", "alice", "buyer");
        db.create_reset_token("r1", "u1").unwrap();

        db.consume_reset_token("r1", "u1", "newhash").unwrap();
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().password, "newhash");
        assert!(db.get_reset_token("r1").unwrap().unwrap().is_used);
    }

    #[test]
    fn jti_blacklist() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_jti_revoked("j1").unwrap());
        db.revoke_jti("j1").unwrap();
        db.revoke_jti("j1").unwrap(); // idempotent
        assert!(db.is_jti_revoked("j1").unwrap());
    }
}
