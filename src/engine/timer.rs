use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    browser::{blocked_page_url, BrowserHost, TabId, TabInfo, WindowId},
    storage::{
        entities::{SessionRecord, TotalsMap, TrackingKey},
        store::AggregateStore,
    },
    utils::clock::Clock,
};

use super::domain::resolve;

/// The single in-progress tracked interval. The timer never holds more than
/// one of these, which is what keeps time from being counted twice.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub domain: TrackingKey,
    pub tab_id: TabId,
    pub started_at: DateTime<Utc>,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// A session is now running for the tab's domain.
    Started,
    /// The tab's URL doesn't resolve to a trackable domain; the timer is idle.
    Untracked,
}

/// Owns the active-session state machine and converts elapsed wall time into
/// persisted aggregates.
///
/// Every transition that replaces or drops the active session flushes it
/// first, so accumulated time is settled at the moment of the switch.
pub struct SessionTimer<S> {
    store: S,
    browser: Arc<dyn BrowserHost>,
    clock: Box<dyn Clock>,
    active: Option<ActiveSession>,
    focused: bool,
}

impl<S: AggregateStore> SessionTimer<S> {
    pub fn new(store: S, browser: Arc<dyn BrowserHost>, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            browser,
            clock,
            active: None,
            // The browser window is assumed focused until told otherwise.
            focused: true,
        }
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_tracking_tab(&self, tab_id: TabId) -> bool {
        self.active.as_ref().is_some_and(|s| s.tab_id == tab_id)
    }

    /// Closes out any running session and opens a new one for the tab. A tab
    /// whose URL doesn't resolve leaves the timer idle.
    pub async fn start_tracking(&mut self, tab: &TabInfo) -> TrackOutcome {
        self.flush().await;

        match resolve(&tab.url) {
            Some(domain) => {
                debug!("Started tracking {domain} in tab {}", tab.id);
                self.active = Some(ActiveSession {
                    domain,
                    tab_id: tab.id,
                    started_at: self.clock.time(),
                    session_id: Uuid::new_v4().to_string(),
                });
                TrackOutcome::Started
            }
            None => {
                self.active = None;
                TrackOutcome::Untracked
            }
        }
    }

    /// Flushes and clears the active session.
    pub async fn stop_tracking(&mut self) {
        self.flush().await;
        self.active = None;
    }

    /// Driven by the periodic tick: settles accumulated time and restarts the
    /// interval so the same logical session keeps running.
    pub async fn periodic_flush(&mut self) {
        if !self.focused || self.active.is_none() {
            return;
        }
        self.flush().await;
        if let Some(session) = self.active.as_mut() {
            session.started_at = self.clock.time();
        }
    }

    pub async fn window_focus_lost(&mut self) {
        self.focused = false;
        self.flush().await;
    }

    /// Focus came back to a window: re-resolve its active tab and restart
    /// tracking from it.
    pub async fn window_focus_gained(&mut self, window_id: WindowId) {
        self.focused = true;
        match self.browser.active_tab(window_id).await {
            Ok(Some(tab)) => {
                self.start_tracking(&tab).await;
            }
            Ok(None) => {}
            Err(e) => error!("Failed to query active tab of window {window_id}: {e:?}"),
        }
    }

    /// Converts the active session's elapsed time into durable increments.
    /// Safe to call when idle. Storage failures are logged and swallowed, the
    /// interval's time is simply lost.
    pub async fn flush(&mut self) {
        if let Err(e) = self.flush_inner().await {
            error!("Failed to persist tracked time: {e:?}");
        }
    }

    async fn flush_inner(&mut self) -> Result<()> {
        let (domain, tab_id, started_at, session_id) = match &self.active {
            Some(s) if self.focused => {
                (s.domain.clone(), s.tab_id, s.started_at, s.session_id.clone())
            }
            _ => return Ok(()),
        };

        let now = self.clock.time();
        let elapsed_ms = (now - started_at).num_milliseconds();

        // A clock that moved backwards yields a zero-effect tick.
        if elapsed_ms <= 0 {
            return Ok(());
        }

        // Sub-second slivers are dropped instead of accumulating across rapid
        // tab switches; the interval restarts from now.
        if elapsed_ms < 1000 {
            if let Some(session) = self.active.as_mut() {
                session.started_at = now;
            }
            return Ok(());
        }

        let elapsed = (elapsed_ms / 1000) as u64;

        let mut snapshot = self.store.load().await?;
        *snapshot.daily.entry(domain.clone()).or_default() += elapsed;
        *snapshot.lifetime.entry(domain.clone()).or_default() += elapsed;
        snapshot.sessions.push(SessionRecord {
            id: session_id,
            domain: domain.clone(),
            tab_id,
            start: started_at,
            end: now,
            duration_secs: elapsed,
            date: now.date_naive(),
        });
        snapshot.trim_sessions();

        self.store
            .persist_totals(&snapshot.daily, &snapshot.lifetime, &snapshot.sessions)
            .await?;
        debug!("Accounted {elapsed}s to {domain}");

        let spent = snapshot.daily.get(&domain).copied().unwrap_or(0);
        self.enforce_limit(&domain, spent, &snapshot.limits, tab_id)
            .await;
        Ok(())
    }

    /// Pre-navigation limit check: blocks a tab whose destination domain is
    /// already over its daily budget.
    pub async fn check_and_block(&self, tab_id: TabId, url: &str) {
        let Some(domain) = resolve(url) else {
            return;
        };
        match self.store.load().await {
            Ok(snapshot) => {
                let spent = snapshot.daily.get(&domain).copied().unwrap_or(0);
                self.enforce_limit(&domain, spent, &snapshot.limits, tab_id)
                    .await;
            }
            Err(e) => error!("Failed to read totals for limit check: {e:?}"),
        }
    }

    async fn enforce_limit(&self, domain: &str, spent: u64, limits: &TotalsMap, tab_id: TabId) {
        let Some(&limit) = limits.get(domain) else {
            return;
        };
        // A zero limit means unset.
        if limit == 0 || spent < limit {
            return;
        }
        info!("Daily limit reached for {domain} ({spent}s of {limit}s), blocking tab {tab_id}");
        let target = blocked_page_url(domain, spent, limit);
        if let Err(e) = self.browser.navigate(tab_id, &target).await {
            error!("Failed to redirect tab {tab_id} to blocked page: {e:?}");
        }
    }

    /// Daily rollover: when the stored reset date isn't today, daily totals
    /// restart from empty. Lifetime totals are never reset.
    pub async fn run_reset_check(&self) {
        if let Err(e) = self.reset_check_inner().await {
            error!("Failed to run daily reset check: {e:?}");
        }
    }

    async fn reset_check_inner(&self) -> Result<()> {
        let today = self.clock.today();
        let snapshot = self.store.load().await?;
        if snapshot.last_reset_date != Some(today) {
            self.store.reset_daily(today).await?;
            info!("Daily totals reset for new day {today}");
        }
        Ok(())
    }
}
