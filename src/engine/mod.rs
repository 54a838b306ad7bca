use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use router::{BrowserEvent, EventRouter};
use timer::SessionTimer;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    browser::BrowserHost,
    storage::store::{AggregateStore, JsonStore},
    utils::clock::{Clock, DefaultClock},
};

pub mod domain;
pub mod router;
pub mod timer;

/// Enough slack for a burst of tab switches; the router drains quickly.
pub const EVENT_BUFFER: usize = 16;

/// Runs the time-accounting engine against state in `dir` until the token is
/// cancelled or every event sender hangs up.
pub async fn run_engine(
    dir: PathBuf,
    browser: Arc<dyn BrowserHost>,
    events: mpsc::Receiver<BrowserEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    let store = JsonStore::new(dir)?;
    let router = create_router(store, browser, events, shutdown, DefaultClock);
    router.run().await
}

fn create_router<S: AggregateStore>(
    store: S,
    browser: Arc<dyn BrowserHost>,
    events: mpsc::Receiver<BrowserEvent>,
    shutdown: CancellationToken,
    clock: impl Clock + Clone,
) -> EventRouter<S> {
    let timer = SessionTimer::new(store, browser.clone(), Box::new(clock.clone()));
    EventRouter::new(events, timer, browser, Box::new(clock), shutdown)
}

/// Cancels the token once the process receives ctrl-c.
pub async fn detect_shutdown(cancellation: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            cancellation.cancel();
        },
    };
}
