//! Agent pipeline: poll, store, report.
//!
//! Three concurrent loops share one local store:
//! - the poll loop samples every [`Poller`] each poll interval and hands the
//!   batches over to the store loop through a rendezvous [`handoff`]
//! - the store loop writes each batch into the local store
//! - the report loop (the caller's task) pushes a signed snapshot every
//!   report interval
//!
//! Failures inside a loop are logged and the loop carries on. A panic in the
//! poll or store task is logged and shuts the agent down the same way a
//! cancellation does: stop polling, drain the hand-off, report one last time,
//! release the client.

pub mod handoff;

use crate::client::{self, MetricsClient};
use crate::core::{AgentConfig, Metric, Result};
use crate::crypto::{self, Signer};
use crate::pollers::{self, Poller};
use crate::storage::{MemoryStorage, MetricsStorage};
use handoff::{HandoffReceiver, HandoffSender};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Metrics agent.
pub struct Agent {
    config: AgentConfig,
    storage: Arc<dyn MetricsStorage>,
    client: Box<dyn MetricsClient>,
    signer: Signer,
    pollers: Arc<[Box<dyn Poller>]>,
}

impl Agent {
    /// Assemble an agent from its parts.
    pub fn new(
        config: AgentConfig,
        storage: Arc<dyn MetricsStorage>,
        client: Box<dyn MetricsClient>,
        signer: Signer,
        pollers: Vec<Box<dyn Poller>>,
    ) -> Self {
        Self {
            config,
            storage,
            client,
            signer,
            pollers: pollers.into(),
        }
    }

    /// Build the default agent: memory store, default pollers and the
    /// configured transport.
    pub async fn from_config(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let public_key = crypto::load_public_key(config.crypto_key.as_deref()).await?;
        let client = client::new_client(&config, public_key).await?;
        let signer = Signer::new(config.key());

        Ok(Self::new(
            config,
            Arc::new(MemoryStorage::new()),
            client,
            signer,
            pollers::default_pollers(),
        ))
    }

    /// Local store
    pub fn storage(&self) -> &Arc<dyn MetricsStorage> {
        &self.storage
    }

    /// Push one signed snapshot of the local store.
    ///
    /// In batch mode the snapshot goes out as one request and its failure is
    /// returned. Otherwise metrics are sent one by one and individual failures
    /// are logged and skipped.
    pub async fn report(&self) -> Result<()> {
        let mut metrics = self.storage.get_all_metrics().await?;
        if metrics.is_empty() {
            tracing::debug!("Nothing to report");
            return Ok(());
        }
        self.signer.sign_batch(&mut metrics)?;

        tracing::info!("Sending {} metrics", metrics.len());
        if self.config.batch_mode {
            return self.client.send_batch(&metrics).await;
        }

        for metric in &metrics {
            if let Err(e) = self.client.send_metric(metric).await {
                tracing::error!(category = e.category(), "Failed to report {} metric: {}", metric.id, e);
            }
        }
        Ok(())
    }

    /// Run until `cancel` fires or an internal task dies.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!("{} agent started", self.config.protocol);

        let (tx, rx) = handoff::channel();
        let poll_task = tokio::spawn(poll_loop(
            Arc::clone(&self.pollers),
            self.config.poll_interval,
            tx,
            cancel.clone(),
        ));
        let store_task = tokio::spawn(store_loop(Arc::clone(&self.storage), rx));

        let poll_watch = tokio::spawn(supervise("poll", poll_task, cancel.clone()));
        let store_watch = tokio::spawn(supervise("store", store_task, cancel.clone()));

        let period = self.config.report_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.report() => {
                            if let Err(e) = result {
                                tracing::error!(category = e.category(), "Failed to report metrics: {}", e);
                            }
                        }
                        _ = cancel.cancelled() => tracing::debug!("Report interrupted by shutdown"),
                    }
                }
            }
        }

        self.shut_down(poll_watch, store_watch).await
    }

    async fn shut_down(&self, poll_watch: JoinHandle<()>, store_watch: JoinHandle<()>) -> Result<()> {
        tracing::info!("Stopping agent");

        // The poll loop exits on cancellation and drops its sender, which
        // lets the store loop drain and finish.
        poll_watch.await?;
        store_watch.await?;

        if let Err(e) = self.report().await {
            tracing::error!(category = e.category(), "Final report failed: {}", e);
        }

        if let Err(e) = self.client.shut_down().await {
            tracing::error!("Error while stopping client: {}", e);
        }
        self.storage.shut_down().await
    }
}

/// Wait for a loop task. A panic is logged and cancels the agent.
async fn supervise(name: &'static str, task: JoinHandle<()>, cancel: CancellationToken) {
    match task.await {
        Ok(()) => tracing::debug!("{} loop finished", name),
        Err(e) => {
            tracing::error!("{} loop failed: {}", name, e);
            cancel.cancel();
        },
    }
}

async fn poll_loop(
    pollers: Arc<[Box<dyn Poller>]>,
    period: Duration,
    tx: HandoffSender<Vec<Metric>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        for poller in pollers.iter() {
            let batch = match poller.poll().await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Failed to poll metrics from {} poller: {}", poller.name(), e);
                    continue;
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = tx.send(batch) => {
                    if sent.is_err() {
                        tracing::warn!("Store loop is gone, stopping poll loop");
                        return;
                    }
                }
            }
        }
    }
}

async fn store_loop(storage: Arc<dyn MetricsStorage>, mut rx: HandoffReceiver<Vec<Metric>>) {
    while let Some(batch) = rx.recv().await {
        if let Err(e) = storage.set_metrics(&batch).await {
            tracing::error!("Failed to store metrics: {}", e);
        }
    }
}
