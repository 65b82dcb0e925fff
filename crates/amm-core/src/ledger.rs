//! Installation ledger: which (bundle, profile) pairs are installed.
//!
//! SQLite via sqlx, stored under the XDG state directory
//! (`~/.local/state/amm/installed.db`). At most one row per pair.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One installed (bundle, profile) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationRecord {
    pub bundle_id: String,
    pub profile: String,
    /// Unix seconds.
    pub installed_at: i64,
}

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Current time as Unix seconds.
fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Clone)]
pub struct InstallLedger {
    pool: Pool<Sqlite>,
}

impl InstallLedger {
    /// Open (or create) the default ledger under the XDG state dir.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("amm")?;
        let db_path = xdg_dirs.get_state_home().join("amm").join("installed.db");
        Self::open_at(&db_path).await
    }

    /// Open (or create) the ledger at `path`, creating parent dirs.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await
            .with_context(|| format!("open ledger {}", path.display()))?;
        let ledger = InstallLedger { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    /// In-memory ledger; nothing survives the handle.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let ledger = InstallLedger { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS installations (
                bundle_id TEXT NOT NULL,
                profile TEXT NOT NULL,
                installed_at INTEGER NOT NULL,
                PRIMARY KEY (bundle_id, profile)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create installations table")?;
        Ok(())
    }

    /// All records, oldest first.
    pub async fn list_installed(&self) -> Result<Vec<InstallationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT bundle_id, profile, installed_at
            FROM installations
            ORDER BY installed_at ASC, bundle_id ASC, profile ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list installations")?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn get(&self, bundle_id: &str, profile: &str) -> Result<Option<InstallationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT bundle_id, profile, installed_at
            FROM installations
            WHERE bundle_id = ?1 AND profile = ?2
            "#,
        )
        .bind(bundle_id)
        .bind(profile)
        .fetch_optional(&self.pool)
        .await
        .context("get installation")?;
        Ok(row.as_ref().map(record_from_row))
    }

    /// Record an installation. Re-installing a pair refreshes its timestamp.
    pub async fn append(&self, bundle_id: &str, profile: &str) -> Result<InstallationRecord> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO installations (bundle_id, profile, installed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (bundle_id, profile) DO UPDATE SET installed_at = excluded.installed_at
            "#,
        )
        .bind(bundle_id)
        .bind(profile)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("record installation")?;
        Ok(InstallationRecord {
            bundle_id: bundle_id.to_string(),
            profile: profile.to_string(),
            installed_at: now,
        })
    }

    /// Delete the record for a pair. Returns whether one existed.
    pub async fn remove(&self, bundle_id: &str, profile: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM installations
            WHERE bundle_id = ?1 AND profile = ?2
            "#,
        )
        .bind(bundle_id)
        .bind(profile)
        .execute(&self.pool)
        .await
        .context("remove installation")?;
        Ok(result.rows_affected() > 0)
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> InstallationRecord {
    InstallationRecord {
        bundle_id: row.get("bundle_id"),
        profile: row.get("profile"),
        installed_at: row.get("installed_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_uri_escapes_special_chars() {
        assert_eq!(
            path_to_sqlite_uri(Path::new("/tmp/my state/#1.db")),
            "sqlite:///tmp/my%20state/%231.db"
        );
    }

    #[tokio::test]
    async fn append_list_remove() {
        let ledger = InstallLedger::open_memory().await.unwrap();
        assert!(ledger.list_installed().await.unwrap().is_empty());

        ledger.append("sdxl", "nvidia").await.unwrap();
        ledger.append("sdxl", "cpu").await.unwrap();
        ledger.append("flux", "nvidia").await.unwrap();
        let all = ledger.list_installed().await.unwrap();
        assert_eq!(all.len(), 3);

        assert!(ledger.remove("sdxl", "cpu").await.unwrap());
        assert!(!ledger.remove("sdxl", "cpu").await.unwrap());
        let all = ledger.list_installed().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| !(r.bundle_id == "sdxl" && r.profile == "cpu")));
    }

    #[tokio::test]
    async fn append_is_unique_per_pair() {
        let ledger = InstallLedger::open_memory().await.unwrap();
        ledger.append("sdxl", "nvidia").await.unwrap();
        let again = ledger.append("sdxl", "nvidia").await.unwrap();
        let all = ledger.list_installed().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], again);
        assert_eq!(
            ledger.get("sdxl", "nvidia").await.unwrap().map(|r| r.profile),
            Some("nvidia".to_string())
        );
        assert!(ledger.get("sdxl", "amd").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/installed.db");
        {
            let ledger = InstallLedger::open_at(&path).await.unwrap();
            ledger.append("wan", "default").await.unwrap();
        }
        let ledger = InstallLedger::open_at(&path).await.unwrap();
        let all = ledger.list_installed().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].bundle_id, "wan");
    }
}
