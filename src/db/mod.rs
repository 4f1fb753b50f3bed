mod token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use token::BlacklistStore;
pub use user::{NewUser, User, UserStore, unique_violation};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let (url, max_connections) = if path == ":memory:" {
            // Every connection to `sqlite::memory:` is a separate database
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    is_staff INTEGER NOT NULL DEFAULT 0,
                    email_verified INTEGER NOT NULL DEFAULT 0,
                    date_joined TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_username ON users(username)",
                "CREATE INDEX idx_users_email ON users(email)",
                // Revoked refresh tokens, keyed by JTI
                "CREATE TABLE blacklisted_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    jti TEXT UNIQUE NOT NULL,
                    user_uuid TEXT NOT NULL,
                    expires_at INTEGER NOT NULL,
                    blacklisted_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_blacklisted_tokens_expires_at ON blacklisted_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh token blacklist.
    pub fn blacklist(&self) -> BlacklistStore {
        BlacklistStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(uuid: &'a str, username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            uuid,
            username,
            email,
            password_hash: "hash",
            is_staff: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(new_user("uuid-123", "alice", "alice@example.com"))
            .await
            .unwrap();

        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.email_verified);

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_lookups_are_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(new_user("uuid-1", "Alice", "Alice@Example.com"))
            .await
            .unwrap();

        assert!(db.users().get_by_username("alice").await.unwrap().is_some());
        assert!(
            db.users()
                .get_by_email("alice@example.com")
                .await
                .unwrap()
                .is_some()
        );
        assert!(db.users().is_username_taken("ALICE", None).await.unwrap());
        assert!(db.users().is_email_taken("ALICE@EXAMPLE.COM").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(new_user("uuid-1", "alice", "a@example.com"))
            .await
            .unwrap();
        let err = db
            .users()
            .create(new_user("uuid-2", "ALICE", "b@example.com"))
            .await
            .unwrap_err();
        assert_eq!(unique_violation(&err), Some("username"));

        let err = db
            .users()
            .create(new_user("uuid-3", "bob", "A@example.com"))
            .await
            .unwrap_err();
        assert_eq!(unique_violation(&err), Some("email"));
    }

    #[tokio::test]
    async fn test_username_taken_ignores_self() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(new_user("uuid-1", "alice", "a@example.com"))
            .await
            .unwrap();

        assert!(!db.users().is_username_taken("alice", Some(id)).await.unwrap());
        assert!(db.users().is_username_taken("alice", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_profile_and_flags() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(new_user("uuid-1", "alice", "a@example.com"))
            .await
            .unwrap();

        db.users()
            .update_profile(id, "alicia", "Alice", "Liddell")
            .await
            .unwrap();
        db.users().set_active(id, false).await.unwrap();
        db.users().mark_email_verified(id).await.unwrap();

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.username, "alicia");
        assert_eq!(user.first_name, "Alice");
        assert_eq!(user.last_name, "Liddell");
        assert!(!user.is_active);
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn test_blacklist_add_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();

        assert!(!db.blacklist().is_blacklisted("jti-1").await.unwrap());
        assert!(db.blacklist().add("jti-1", "uuid-1", 100).await.unwrap());
        assert!(!db.blacklist().add("jti-1", "uuid-1", 100).await.unwrap());
        assert!(db.blacklist().is_blacklisted("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_blacklist_delete_expired() {
        let db = Database::open(":memory:").await.unwrap();

        db.blacklist().add("old", "uuid-1", 100).await.unwrap();
        db.blacklist().add("new", "uuid-1", 10_000).await.unwrap();

        assert_eq!(db.blacklist().delete_expired(5_000).await.unwrap(), 1);
        assert!(!db.blacklist().is_blacklisted("old").await.unwrap());
        assert!(db.blacklist().is_blacklisted("new").await.unwrap());
    }
}
