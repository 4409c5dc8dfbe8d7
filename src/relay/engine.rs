//! Main relay loop moving envelopes between chains

use crate::chain::{Chain, DeliveryOutcome};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::external::{Envelope, Environment};
use crate::metrics;
use crate::types::ChainId;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Delivery results of one relay round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayRound {
    pub delivered: usize,
    pub retained: usize,
    pub dropped: usize,
    /// Envelopes addressed to a chain the engine does not know
    pub undeliverable: usize,
}

impl RelayRound {
    pub fn total(&self) -> usize {
        self.delivered + self.retained + self.dropped + self.undeliverable
    }

    fn absorb(&mut self, other: RelayRound) {
        self.delivered += other.delivered;
        self.retained += other.retained;
        self.dropped += other.dropped;
        self.undeliverable += other.undeliverable;
    }
}

/// Totals of a `run_until_idle` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub rounds: u32,
    pub totals: RelayRound,
}

/// Multi-chain relay
pub struct RelayEngine<E> {
    /// Chains indexed by chain ID
    chains: DashMap<ChainId, Arc<Mutex<Chain<E>>>>,
    /// Configuration
    config: RelayConfig,
    /// Shutdown flag
    shutdown: Arc<RwLock<bool>>,
}

impl<E: Environment + Send + 'static> RelayEngine<E> {
    /// Create a new relay engine
    pub fn new(config: RelayConfig) -> Self {
        Self {
            chains: DashMap::new(),
            config,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a chain, returning its shared handle
    pub fn add_chain(&self, chain: Chain<E>) -> Arc<Mutex<Chain<E>>> {
        let chain_id = chain.chain_id();
        let handle = Arc::new(Mutex::new(chain));
        self.chains.insert(chain_id, handle.clone());
        info!("Chain {} registered with relay", chain_id);
        handle
    }

    /// Get a chain by ID
    pub fn chain(&self, chain_id: ChainId) -> RelayResult<Arc<Mutex<Chain<E>>>> {
        self.chains
            .get(&chain_id)
            .map(|c| c.clone())
            .ok_or(RelayError::ChainNotFound { chain_id })
    }

    /// All registered chain IDs, ascending
    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self.chains.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Drain every outbox, grouping envelopes by destination
    async fn collect_outbound(&self) -> BTreeMap<ChainId, Vec<Envelope>> {
        let mut batches: BTreeMap<ChainId, Vec<Envelope>> = BTreeMap::new();

        for chain_id in self.chain_ids() {
            let Ok(chain) = self.chain(chain_id) else {
                continue;
            };
            let outbound = chain.lock().await.take_outbox();
            for envelope in outbound {
                batches.entry(envelope.dst_chain_id).or_default().push(envelope);
            }
        }

        batches
    }

    /// Run one relay round
    pub async fn pump(&self) -> RelayResult<RelayRound> {
        let batches = self.collect_outbound().await;
        let mut round = RelayRound::default();
        let mut handles = Vec::new();

        for (dst_chain_id, envelopes) in batches {
            let chain = match self.chain(dst_chain_id) {
                Ok(chain) => chain,
                Err(e) => {
                    error!("Dropping {} envelopes: {}", envelopes.len(), e);
                    round.undeliverable += envelopes.len();
                    continue;
                }
            };

            metrics::record_relay_batch(dst_chain_id, envelopes.len());
            debug!(
                "Delivering {} envelopes to chain {}",
                envelopes.len(),
                dst_chain_id
            );

            handles.push(tokio::spawn(async move {
                let mut chain = chain.lock().await;
                let mut batch = RelayRound::default();
                for envelope in envelopes {
                    match chain.deliver(envelope) {
                        DeliveryOutcome::Delivered => batch.delivered += 1,
                        DeliveryOutcome::Retained { .. } => batch.retained += 1,
                        DeliveryOutcome::Dropped { .. } => batch.dropped += 1,
                    }
                }
                batch
            }));
        }

        for result in futures::future::join_all(handles).await {
            round.absorb(result?);
        }

        Ok(round)
    }

    /// Pump until no chain has anything left to send
    pub async fn run_until_idle(&self) -> RelayResult<RelayStats> {
        let mut stats = RelayStats::default();

        loop {
            let round = self.pump().await?;
            if round.total() == 0 {
                break;
            }

            stats.rounds += 1;
            stats.totals.absorb(round);
            debug!("Relay round {}: {:?}", stats.rounds, round);

            if stats.rounds >= self.config.max_rounds {
                return Err(RelayError::Stalled {
                    rounds: stats.rounds,
                });
            }
        }

        info!(
            "Relay idle after {} rounds: {} delivered, {} retained, {} dropped",
            stats.rounds, stats.totals.delivered, stats.totals.retained, stats.totals.dropped
        );
        Ok(stats)
    }

    /// Main relay loop
    pub async fn run(&self) -> RelayResult<()> {
        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));

        info!("Relay engine started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            poll_interval.tick().await;
            match self.pump().await {
                Ok(round) if round.total() > 0 => debug!("Relay round: {:?}", round),
                Ok(_) => {}
                Err(e) => warn!("Relay round failed: {}", e),
            }
        }

        info!("Relay engine stopped");
        Ok(())
    }

    /// Stop the relay engine
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Relay engine shutdown initiated");
    }
}
