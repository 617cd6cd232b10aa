//! Application state for the push agent.
//!
//! Built once in `main` and shared by the push loop and the subcommands.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use crate::collectors::{CollectorContext, CollectorRegistry};
use crate::config::{resolve_instance, Config};
use crate::exposition::{render_text, ExpositionError};
use crate::node::{NodeCollector, Scrape};
use crate::push::{PushClient, PushError};

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Exposition(#[from] ExpositionError),

    #[error(transparent)]
    Push(#[from] PushError),
}

pub struct AppState {
    pub node: NodeCollector,
    pub pusher: PushClient,
    pub config: Arc<Config>,
    /// Agent start time for uptime logging.
    pub start_time: Instant,
}

impl AppState {
    /// Builds collectors and the push client from an already validated config.
    pub fn from_config(
        config: Config,
        registry: &CollectorRegistry,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let ctx = CollectorContext::from_config(&config);
        let node = NodeCollector::from_registry(registry, &config.enabled_collectors(), &ctx)?;

        let mut pusher = PushClient::new(config.gateway())?;
        pusher.set_job(config.job());
        pusher.set_instance(resolve_instance(&config));

        Ok(Self {
            node,
            pusher,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }

    /// Scrapes all collectors and renders the result.
    pub async fn gather(&self) -> Result<(Scrape, String), ExpositionError> {
        let scrape = self.node.scrape().await;
        let body = render_text(&scrape.samples)?;
        Ok((scrape, body))
    }

    /// One full cycle: scrape, render, push.
    #[instrument(skip(self))]
    pub async fn push_once(&self) -> Result<(), CycleError> {
        let begin = Instant::now();
        let (scrape, body) = self.gather().await?;
        self.pusher.push(body).await?;
        debug!(
            samples = scrape.samples.len(),
            elapsed_ms = begin.elapsed().as_millis() as u64,
            "Push cycle completed"
        );
        Ok(())
    }
}
