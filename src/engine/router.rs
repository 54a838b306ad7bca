use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    browser::{BrowserHost, TabId, TabInfo, WindowId},
    storage::store::AggregateStore,
    utils::{clock::Clock, time::until_next_midnight},
};

use super::timer::SessionTimer;

/// Host-browser lifecycle notifications the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    TabActivated { tab_id: TabId },
    TabUpdated { tab_id: TabId, url: String },
    /// `None` means every browser window lost focus.
    WindowFocusChanged { window_id: Option<WindowId> },
}

/// How often accumulated time is settled while a session keeps running.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// How often the daily rollover condition is re-checked.
pub const RESET_CHECK_INTERVAL: Duration = Duration::from_secs(60);

enum Wake {
    Event(Option<BrowserEvent>),
    Flush,
    ResetCheck,
    Midnight,
    Shutdown,
}

/// Translates browser events and timer ticks into [SessionTimer] transitions.
/// All transitions run on one event loop, so timer state never sees parallel
/// mutation; overlapping store accesses are the accepted soft spot.
pub struct EventRouter<S> {
    events: mpsc::Receiver<BrowserEvent>,
    timer: SessionTimer<S>,
    browser: Arc<dyn BrowserHost>,
    clock: Box<dyn Clock>,
    shutdown: CancellationToken,
}

impl<S: AggregateStore> EventRouter<S> {
    pub fn new(
        events: mpsc::Receiver<BrowserEvent>,
        timer: SessionTimer<S>,
        browser: Arc<dyn BrowserHost>,
        clock: Box<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            timer,
            browser,
            clock,
            shutdown,
        }
    }

    /// Executes the router event loop until shutdown or until all event
    /// producers hang up. In-flight time is settled on the way out.
    pub async fn run(mut self) -> Result<()> {
        self.timer.run_reset_check().await;
        self.adopt_current_tab().await;

        let mut flush_point = self.clock.instant() + FLUSH_INTERVAL;
        let mut reset_point = self.clock.instant() + RESET_CHECK_INTERVAL;
        let mut midnight_point = self.clock.instant() + until_next_midnight(self.clock.time());

        loop {
            let wake = tokio::select! {
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                event = self.events.recv() => Wake::Event(event),
                _ = self.clock.sleep_until(flush_point) => Wake::Flush,
                _ = self.clock.sleep_until(reset_point) => Wake::ResetCheck,
                _ = self.clock.sleep_until(midnight_point) => Wake::Midnight,
            };

            match wake {
                Wake::Shutdown => {
                    info!("Shutting down, settling the active session");
                    self.timer.stop_tracking().await;
                    return Ok(());
                }
                Wake::Event(Some(event)) => self.dispatch(event).await,
                Wake::Event(None) => {
                    debug!("Event producers hung up, settling the active session");
                    self.timer.stop_tracking().await;
                    return Ok(());
                }
                Wake::Flush => {
                    flush_point += FLUSH_INTERVAL;
                    self.timer.periodic_flush().await;
                }
                Wake::ResetCheck => {
                    reset_point += RESET_CHECK_INTERVAL;
                    self.timer.run_reset_check().await;
                }
                Wake::Midnight => {
                    midnight_point =
                        self.clock.instant() + until_next_midnight(self.clock.time());
                    self.timer.run_reset_check().await;
                }
            }
        }
    }

    /// Picks up whatever tab is already active when the engine starts.
    async fn adopt_current_tab(&mut self) {
        match self.browser.focused_tab().await {
            Ok(Some(tab)) => {
                self.timer.start_tracking(&tab).await;
            }
            Ok(None) => {}
            Err(e) => error!("Failed to query the startup tab: {e:?}"),
        }
    }

    async fn dispatch(&mut self, event: BrowserEvent) {
        debug!("Routing event {event:?}");
        match event {
            BrowserEvent::TabActivated { tab_id } => {
                let tab = match self.browser.tab(tab_id).await {
                    Ok(Some(tab)) => tab,
                    Ok(None) => return,
                    Err(e) => {
                        error!("Failed to look up activated tab {tab_id}: {e:?}");
                        return;
                    }
                };
                self.timer.check_and_block(tab_id, &tab.url).await;
                if self.timer.is_focused() {
                    self.timer.start_tracking(&tab).await;
                }
            }
            BrowserEvent::TabUpdated { tab_id, url } => {
                self.timer.check_and_block(tab_id, &url).await;
                // Only a navigation inside the currently tracked tab restarts
                // the session; background tabs don't accumulate.
                if self.timer.is_tracking_tab(tab_id) && self.timer.is_focused() {
                    self.timer.start_tracking(&TabInfo { id: tab_id, url }).await;
                }
            }
            BrowserEvent::WindowFocusChanged { window_id } => match window_id {
                None => self.timer.window_focus_lost().await,
                Some(window_id) => self.timer.window_focus_gained(window_id).await,
            },
        }
    }
}
