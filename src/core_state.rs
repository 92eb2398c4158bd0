//! Shared application state: configuration, the risk oracle, and the
//! email worker. Every request opens its own store connection.

use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;

use crate::config::AppConfig;
use crate::db::{self, DatabaseError};
use crate::notifications::{EmailChannel, HttpMailRelay, LogTransport, MailTransport};
use crate::pipeline::{HttpRiskOracle, RiskOracle};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct CoreState {
    config: AppConfig,
    oracle: Arc<dyn RiskOracle>,
    email: EmailChannel,
}

impl CoreState {
    /// Wires the HTTP oracle and the configured mail transport.
    pub fn new(config: AppConfig) -> Self {
        let oracle = Arc::new(HttpRiskOracle::new(&config.oracle_url, config.oracle_timeout));
        let transport: Box<dyn MailTransport> = match &config.mail_relay_url {
            Some(url) => Box::new(HttpMailRelay::new(url, config.oracle_timeout)),
            None => {
                tracing::info!("No mail relay configured, emails will only be logged");
                Box::new(LogTransport)
            }
        };
        Self::with_parts(config, oracle, transport)
    }

    pub fn with_parts(
        config: AppConfig,
        oracle: Arc<dyn RiskOracle>,
        transport: Box<dyn MailTransport>,
    ) -> Self {
        let email = EmailChannel::start(transport, &config.mail_from, config.mail_queue_capacity);
        Self {
            config,
            oracle,
            email,
        }
    }

    /// Creates the data directories and brings the schema up to date.
    pub fn initialize(&self) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.config.uploads_dir)?;
        self.open_db()?;
        tracing::info!(
            db_path = %self.config.db_path.display(),
            uploads_dir = %self.config.uploads_dir.display(),
            "Store ready"
        );
        Ok(())
    }

    /// Opens a fresh connection for one unit of work.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        db::open_database(&self.config.db_path, self.config.store_timeout).map_err(CoreError::Database)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn oracle(&self) -> &dyn RiskOracle {
        self.oracle.as_ref()
    }

    pub fn email(&self) -> &EmailChannel {
        &self.email
    }
}
