use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::BookingError;
use crate::services::effects::DeadLetters;
use crate::services::scheduler::Scheduler;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub scheduler: Scheduler,
    pub dead_letters: DeadLetters,
}

impl AppState {
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, BookingError> {
        self.db
            .lock()
            .map_err(|_| BookingError::Persistence(anyhow::anyhow!("database lock poisoned")))
    }
}
