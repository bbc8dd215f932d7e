pub mod block;
pub mod clock;
pub mod db;
pub mod ledger;
pub mod matcher;
pub mod models;
pub mod session;
pub mod settings;
pub mod sites;
pub mod stdio_bridge;
pub mod storage;
pub mod timer;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{error, info};
use tokio::{io::BufReader, sync::mpsc};

use clock::SystemClock;
use db::Database;
use ledger::UsageLedger;
use session::SessionController;
use settings::{EngineSettings, SettingsStore};
use stdio_bridge::{forward_events, StdioBrowser, TabRegistry};

const EVENT_QUEUE_DEPTH: usize = 256;

/// Opened data directory: settings plus the site database.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: SettingsStore,
    pub db: Database,
}

impl AppState {
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::open_in(&data_dir)?;
        let db_path = data_dir.join(&settings.get().database_file);
        let db = Database::new(db_path)?;

        Ok(Self {
            data_dir,
            settings,
            db,
        })
    }

    pub fn ledger(&self) -> UsageLedger<Database> {
        UsageLedger::new(self.db.clone())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        self.settings.get()
    }
}

/// Runs the engine against browser events on stdin until stdin closes.
pub async fn watch(state: &AppState) -> Result<()> {
    let settings = state.engine_settings();
    let tabs = TabRegistry::new();
    let browser = StdioBrowser::new(tabs.clone(), settings.blocked_page_url, tokio::io::stdout());
    let controller = SessionController::new(state.db.clone(), browser, SystemClock);

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let reader = tokio::spawn(async move {
        if let Err(err) = forward_events(BufReader::new(tokio::io::stdin()), tabs, events_tx).await {
            error!("Event reader stopped: {err:#}");
        }
    });

    info!("Watching browser events from stdin");
    controller.run(events_rx).await?;
    reader.await.context("event reader task failed to join")?;
    Ok(())
}
