use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::entities::{SessionRecord, StoreSnapshot, Theme, TotalsMap};

/// Interface for abstracting durable aggregate state.
///
/// The engine is the only writer of the totals and the session log, while the
/// limits map and theme are owned by outside collaborators (the dashboard
/// commands here), so mutations are expressed per concern instead of as one
/// whole-state setter.
pub trait AggregateStore: Send + Sync + 'static {
    /// Reads the whole persisted state. Missing state loads as empty.
    fn load(&self) -> impl Future<Output = Result<StoreSnapshot>> + Send;

    /// Writes the three engine-owned records (daily, lifetime, session log)
    /// in a single store write. Externally owned keys are left untouched.
    fn persist_totals(
        &self,
        daily: &TotalsMap,
        lifetime: &TotalsMap,
        sessions: &[SessionRecord],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clears daily totals and stamps the given date as the last reset.
    fn reset_daily(&self, today: NaiveDate) -> impl Future<Output = Result<()>> + Send;

    fn set_limit(&self, domain: &str, seconds: u64) -> impl Future<Output = Result<()>> + Send;

    fn clear_limit(&self, domain: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_theme(&self, theme: Theme) -> impl Future<Output = Result<()>> + Send;
}

const STATE_FILE: &str = "state.json";

/// The main realization of [AggregateStore]: one json file under the
/// application directory, read and rewritten in place under file locks.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join(STATE_FILE),
        })
    }

    fn parse_snapshot(raw: &str, path: &Path) -> StoreSnapshot {
        if raw.trim().is_empty() {
            return StoreSnapshot::default();
        }
        match serde_json::from_str::<StoreSnapshot>(raw) {
            Ok(v) => v,
            Err(e) => {
                // Might happen after a shutdown cut a write short. Aggregates
                // restart from empty rather than refusing to run.
                warn!("State file {path:?} is corrupted, starting fresh: {e}");
                StoreSnapshot::default()
            }
        }
    }

    /// Read-modify-write of the state file under an exclusive lock, so only
    /// the keys touched by `apply` change.
    async fn update(&self, apply: impl FnOnce(&mut StoreSnapshot)) -> Result<()> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = self.update_with_file(&mut file, apply).await;
        file.unlock_async().await?;
        result
    }

    async fn update_with_file(
        &self,
        file: &mut File,
        apply: impl FnOnce(&mut StoreSnapshot),
    ) -> Result<()> {
        let mut raw = String::new();
        file.read_to_string(&mut raw).await?;
        let mut snapshot = Self::parse_snapshot(&raw, &self.path);

        apply(&mut snapshot);

        let buffer = serde_json::to_vec(&snapshot)?;
        file.set_len(0).await?;
        file.seek(std::io::SeekFrom::Start(0)).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_inner(&self) -> std::result::Result<String, std::io::Error> {
        debug!("Loading state from {:?}", self.path);
        let mut file = File::open(&self.path).await?;
        file.lock_shared()?;
        let mut raw = String::new();
        let result = file.read_to_string(&mut raw).await;
        file.unlock_async().await?;
        result?;
        Ok(raw)
    }
}

impl AggregateStore for JsonStore {
    async fn load(&self) -> Result<StoreSnapshot> {
        match self.load_inner().await {
            Ok(raw) => Ok(Self::parse_snapshot(&raw, &self.path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreSnapshot::default()),
            Err(e) => Err(e)?,
        }
    }

    async fn persist_totals(
        &self,
        daily: &TotalsMap,
        lifetime: &TotalsMap,
        sessions: &[SessionRecord],
    ) -> Result<()> {
        self.update(|snapshot| {
            snapshot.daily = daily.clone();
            snapshot.lifetime = lifetime.clone();
            snapshot.sessions = sessions.to_vec();
        })
        .await
    }

    async fn reset_daily(&self, today: NaiveDate) -> Result<()> {
        self.update(|snapshot| {
            snapshot.daily.clear();
            snapshot.last_reset_date = Some(today);
        })
        .await
    }

    async fn set_limit(&self, domain: &str, seconds: u64) -> Result<()> {
        self.update(|snapshot| {
            snapshot.limits.insert(domain.into(), seconds);
        })
        .await
    }

    async fn clear_limit(&self, domain: &str) -> Result<()> {
        self.update(|snapshot| {
            snapshot.limits.remove(domain);
        })
        .await
    }

    async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.update(|snapshot| {
            snapshot.theme = theme;
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    fn record() -> SessionRecord {
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        SessionRecord {
            id: "abc".into(),
            domain: "example.com".into(),
            tab_id: 3,
            start,
            end: start + chrono::Duration::seconds(4),
            duration_secs: 4,
            date: start.date_naive(),
        }
    }

    #[tokio::test]
    async fn missing_state_loads_as_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonStore::new(dir.path().to_owned())?;
        assert_eq!(store.load().await?, StoreSnapshot::default());
        Ok(())
    }

    #[tokio::test]
    async fn corrupted_state_loads_as_empty() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(STATE_FILE), "{\"dailyData\": tru")?;
        let store = JsonStore::new(dir.path().to_owned())?;
        assert_eq!(store.load().await?, StoreSnapshot::default());
        Ok(())
    }

    #[tokio::test]
    async fn persisted_totals_survive_reopen() -> Result<()> {
        let dir = tempdir()?;
        {
            let store = JsonStore::new(dir.path().to_owned())?;
            let mut daily = TotalsMap::new();
            daily.insert("example.com".into(), 12);
            let mut lifetime = TotalsMap::new();
            lifetime.insert("example.com".into(), 340);
            store
                .persist_totals(&daily, &lifetime, &[record()])
                .await?;
        }

        let store = JsonStore::new(dir.path().to_owned())?;
        let snapshot = store.load().await?;
        assert_eq!(snapshot.daily.get("example.com"), Some(&12));
        assert_eq!(snapshot.lifetime.get("example.com"), Some(&340));
        assert_eq!(snapshot.sessions, vec![record()]);
        Ok(())
    }

    #[tokio::test]
    async fn totals_write_keeps_external_keys() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonStore::new(dir.path().to_owned())?;
        store.set_limit("x.com", 60).await?;
        store.set_theme(Theme::Dark).await?;

        let mut daily = TotalsMap::new();
        daily.insert("x.com".into(), 5);
        store.persist_totals(&daily, &daily, &[]).await?;

        let snapshot = store.load().await?;
        assert_eq!(snapshot.limits.get("x.com"), Some(&60));
        assert_eq!(snapshot.theme, Theme::Dark);
        assert_eq!(snapshot.daily.get("x.com"), Some(&5));
        Ok(())
    }

    #[tokio::test]
    async fn daily_reset_leaves_lifetime_untouched() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonStore::new(dir.path().to_owned())?;
        let mut totals = TotalsMap::new();
        totals.insert("example.com".into(), 100);
        store.persist_totals(&totals, &totals, &[]).await?;

        let today = NaiveDate::from_ymd_opt(2025, 3, 16).unwrap();
        store.reset_daily(today).await?;

        let snapshot = store.load().await?;
        assert!(snapshot.daily.is_empty());
        assert_eq!(snapshot.lifetime.get("example.com"), Some(&100));
        assert_eq!(snapshot.last_reset_date, Some(today));
        Ok(())
    }

    #[tokio::test]
    async fn limits_can_be_set_and_cleared() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonStore::new(dir.path().to_owned())?;
        store.set_limit("x.com", 60).await?;
        store.set_limit("news.ycombinator.com", 1800).await?;
        store.clear_limit("x.com").await?;

        let snapshot = store.load().await?;
        assert_eq!(snapshot.limits.get("x.com"), None);
        assert_eq!(snapshot.limits.get("news.ycombinator.com"), Some(&1800));
        Ok(())
    }
}
