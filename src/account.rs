//! Account store - R2 credentials and the selected account, persisted in a
//! local turso database
//!
//! Secrets go in and never come back out through the public API: listing
//! returns [`AccountInfo`], and only the storage backend can resolve an
//! account id to [`AccountCredentials`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use turso::{Builder, Connection};

use crate::error::AccountError;

pub type AccountResult<T> = Result<T, AccountError>;

const SELECTED_ACCOUNT_KEY: &str = "selected_account_id";

/// Account as entered by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Cloudflare account id, part of the R2 endpoint
    pub account_id: String,
    pub access_key_id: String,
    #[serde(skip_serializing, default)]
    pub secret_access_key: String,
}

/// Account as listed back to the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub account_id: String,
    pub access_key_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Key pair for talking to R2
#[derive(Clone, Deserialize)]
pub struct AccountCredentials {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Get SQL for creating the account tables
pub fn get_table_sql() -> &'static str {
    "
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        account_id TEXT NOT NULL,
        access_key_id TEXT NOT NULL,
        secret_key_encoded TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS app_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "
}

fn encode_secret(secret: &str) -> String {
    BASE64.encode(secret.as_bytes())
}

fn decode_secret(id: &str, encoded: &str) -> AccountResult<String> {
    BASE64
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AccountError::CorruptSecret(id.to_string()))
}

// Serialize database access through one connection
pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    /// Open (or create) the database at `db_path`
    pub async fn open(db_path: &Path) -> AccountResult<Self> {
        let path = db_path
            .to_str()
            .ok_or_else(|| AccountError::Database("Database path is not valid UTF-8".to_string()))?;
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(AccountError::database)?;
        let conn = db.connect().map_err(AccountError::database)?;
        conn.execute_batch(get_table_sql())
            .await
            .map_err(AccountError::database)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace an account
    pub async fn save_account(&self, account: &Account) -> AccountResult<()> {
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO accounts
             (id, name, account_id, access_key_id, secret_key_encoded, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                name = ?2, account_id = ?3, access_key_id = ?4,
                secret_key_encoded = ?5, updated_at = ?7",
            turso::params![
                account.id.clone(),
                account.name.clone(),
                account.account_id.clone(),
                account.access_key_id.clone(),
                encode_secret(&account.secret_access_key),
                now,
                now,
            ],
        )
        .await
        .map_err(AccountError::database)?;
        Ok(())
    }

    /// List all accounts, oldest first, without secrets
    pub async fn get_accounts(&self) -> AccountResult<Vec<AccountInfo>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, name, account_id, access_key_id, created_at, updated_at
                 FROM accounts ORDER BY created_at, id",
                (),
            )
            .await
            .map_err(AccountError::database)?;

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await.map_err(AccountError::database)? {
            accounts.push(AccountInfo {
                id: row.get(0).map_err(AccountError::database)?,
                name: row.get(1).map_err(AccountError::database)?,
                account_id: row.get(2).map_err(AccountError::database)?,
                access_key_id: row.get(3).map_err(AccountError::database)?,
                created_at: row.get(4).map_err(AccountError::database)?,
                updated_at: row.get(5).map_err(AccountError::database)?,
            });
        }
        Ok(accounts)
    }

    /// Delete an account; clears the selection if it pointed at it
    pub async fn delete_account(&self, id: &str) -> AccountResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM accounts WHERE id = ?1", turso::params![id])
            .await
            .map_err(AccountError::database)?;
        conn.execute(
            "DELETE FROM app_state WHERE key = ?1 AND value = ?2",
            turso::params![SELECTED_ACCOUNT_KEY, id],
        )
        .await
        .map_err(AccountError::database)?;
        Ok(())
    }

    /// Resolve an account id to its key pair
    pub(crate) async fn credentials(&self, id: &str) -> AccountResult<Option<AccountCredentials>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT account_id, access_key_id, secret_key_encoded FROM accounts WHERE id = ?1",
                turso::params![id],
            )
            .await
            .map_err(AccountError::database)?;

        if let Some(row) = rows.next().await.map_err(AccountError::database)? {
            let encoded: String = row.get(2).map_err(AccountError::database)?;
            Ok(Some(AccountCredentials {
                account_id: row.get(0).map_err(AccountError::database)?,
                access_key_id: row.get(1).map_err(AccountError::database)?,
                secret_access_key: decode_secret(id, &encoded)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn selected_account(&self) -> AccountResult<Option<String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT value FROM app_state WHERE key = ?1",
                turso::params![SELECTED_ACCOUNT_KEY],
            )
            .await
            .map_err(AccountError::database)?;

        if let Some(row) = rows.next().await.map_err(AccountError::database)? {
            Ok(Some(row.get(0).map_err(AccountError::database)?))
        } else {
            Ok(None)
        }
    }

    pub async fn set_selected_account(&self, id: Option<&str>) -> AccountResult<()> {
        let conn = self.conn.lock().await;
        match id {
            Some(id) => conn
                .execute(
                    "INSERT INTO app_state (key, value) VALUES (?1, ?2)
                     ON CONFLICT (key) DO UPDATE SET value = ?2",
                    turso::params![SELECTED_ACCOUNT_KEY, id],
                )
                .await
                .map_err(AccountError::database)?,
            None => conn
                .execute(
                    "DELETE FROM app_state WHERE key = ?1",
                    turso::params![SELECTED_ACCOUNT_KEY],
                )
                .await
                .map_err(AccountError::database)?,
        };
        Ok(())
    }
}
