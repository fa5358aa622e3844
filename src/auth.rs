//! User verification: `verify_user(name, pwd, is_login) -> bool`.
//!
//! Grounded on `UserVerify` in the source's `httprequest.cpp`, corrected per the
//! design notes: the query is parameterized (the source interpolates raw strings
//! into SQL), and the registration branch reports the true outcome of the insert
//! rather than forcing `true` unconditionally.

use rusqlite::{params, Connection};

use crate::pool::ConnPool;

/// External collaborator the parser consults for `/login.html` and
/// `/register.html` submissions.
pub trait UserVerifier: Send + Sync {
    /// Returns true if `name`/`pwd` authenticate successfully (`is_login == true`)
    /// or if registration of a new `name`/`pwd` succeeds (`is_login == false`).
    fn verify_user(&self, name: &str, pwd: &str, is_login: bool) -> bool;
}

/// A [`UserVerifier`] backed by a pool of SQLite connections.
#[derive(Debug)]
pub struct SqlUserVerifier {
    pool: ConnPool<Connection>,
}

impl SqlUserVerifier {
    /// Opens `pool_size` connections to the database at `db_path`, creating the
    /// `user` table if it doesn't already exist.
    pub fn open(db_path: &str, pool_size: usize) -> rusqlite::Result<Self> {
        let mut conns = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = Connection::open(db_path)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS user (
                    username TEXT PRIMARY KEY,
                    password TEXT NOT NULL
                )",
                [],
            )?;
            conns.push(conn);
        }
        Ok(SqlUserVerifier {
            pool: ConnPool::new(conns),
        })
    }

    /// Builds a verifier around an already-populated pool (primarily for testing).
    pub fn from_pool(pool: ConnPool<Connection>) -> Self {
        SqlUserVerifier { pool }
    }
}

impl UserVerifier for SqlUserVerifier {
    fn verify_user(&self, name: &str, pwd: &str, is_login: bool) -> bool {
        if name.is_empty() || pwd.is_empty() {
            return false;
        }

        let Some(conn) = self.pool.acquire() else {
            tracing::warn!("sql pool exhausted; denying auth for {name}");
            return false;
        };

        let stored: Option<String> = conn
            .query_row(
                "SELECT password FROM user WHERE username = ?1 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .ok();

        match (is_login, stored) {
            (true, Some(stored_pwd)) => stored_pwd == pwd,
            (true, None) => false,
            (false, Some(_)) => false, // username taken
            (false, None) => conn
                .execute(
                    "INSERT INTO user (username, password) VALUES (?1, ?2)",
                    params![name, pwd],
                )
                .map(|rows| rows == 1)
                .unwrap_or(false),
        }
    }
}

/// An in-memory [`UserVerifier`], useful for tests and for running the reactor
/// without a SQLite dependency wired up.
#[derive(Debug, Default)]
pub struct InMemoryUserVerifier {
    users: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl UserVerifier for InMemoryUserVerifier {
    fn verify_user(&self, name: &str, pwd: &str, is_login: bool) -> bool {
        if name.is_empty() || pwd.is_empty() {
            return false;
        }
        let mut users = self.users.lock().unwrap();
        if is_login {
            users.get(name).is_some_and(|stored| stored == pwd)
        } else if users.contains_key(name) {
            false
        } else {
            users.insert(name.to_string(), pwd.to_string());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_or_password_is_rejected() {
        let v = InMemoryUserVerifier::default();
        assert!(!v.verify_user("", "pwd", true));
        assert!(!v.verify_user("name", "", false));
    }

    #[test]
    fn register_then_login_succeeds() {
        let v = InMemoryUserVerifier::default();
        assert!(v.verify_user("foo", "bar", false));
        assert!(v.verify_user("foo", "bar", true));
    }

    #[test]
    fn login_with_wrong_password_fails() {
        let v = InMemoryUserVerifier::default();
        assert!(v.verify_user("foo", "bar", false));
        assert!(!v.verify_user("foo", "wrong", true));
    }

    #[test]
    fn registering_existing_username_fails_honestly() {
        let v = InMemoryUserVerifier::default();
        assert!(v.verify_user("foo", "bar", false));
        assert!(!v.verify_user("foo", "other", false));
    }

    #[test]
    fn sql_verifier_register_then_login() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE user (username TEXT PRIMARY KEY, password TEXT NOT NULL)",
            [],
        )
        .unwrap();
        let pool = ConnPool::new(vec![conn]);
        let v = SqlUserVerifier::from_pool(pool);
        assert!(v.verify_user("alice", "secret", false));
        assert!(v.verify_user("alice", "secret", true));
        assert!(!v.verify_user("alice", "wrong", true));
    }
}
