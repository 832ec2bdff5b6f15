//! Bounded fan-out over many resolvers.

use crate::config::ScanConfig;
use crate::error::ScanConfigError;
use crate::hosts::ResolverTarget;
use crate::probe::{Prober, UdpProber};
use crate::result::ResolverScanResult;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Resolver scanner
///
/// Every target gets its own task; a semaphore caps how many of them are
/// past admission at once. Results arrive on a [`ScanStream`] in
/// completion order.
pub struct ResolverScanner {
    config: ScanConfig,
}

impl ResolverScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Probe `targets` over UDP
    ///
    /// Must be called from within a Tokio runtime.
    pub fn scan(&self, targets: Vec<ResolverTarget>) -> Result<ScanStream, ScanConfigError> {
        self.config.validate()?;
        let prober = UdpProber::new(self.config.test_domain.clone(), self.config.timeout())?;
        Ok(self.scan_with(Arc::new(prober), targets))
    }

    /// Probe `targets` with any prober
    pub fn scan_with<P: Prober>(&self, prober: Arc<P>, targets: Vec<ResolverTarget>) -> ScanStream {
        let targets = dedup(targets);
        let concurrency = self.config.concurrency.max(1);
        info!("Scanning {} resolvers ({} at a time)", targets.len(), concurrency);

        let semaphore = Arc::new(Semaphore::new(concurrency));
        // One slot per target, so senders never wait on the consumer
        let (tx, rx) = mpsc::channel(targets.len().max(1));
        let mut tasks = JoinSet::new();

        for target in &targets {
            let target = target.clone();
            let prober = prober.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();

            tasks.spawn(async move {
                let Ok(permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = prober.probe(&target).await;
                drop(permit);

                if tx.send(result).await.is_err() {
                    debug!("Scan consumer gone, dropping result for {}", target);
                }
            });
        }

        ScanStream {
            rx,
            tasks,
            remaining: targets.len(),
        }
    }
}

fn dedup(targets: Vec<ResolverTarget>) -> Vec<ResolverTarget> {
    let mut seen = HashSet::new();
    let before = targets.len();
    let unique: Vec<_> = targets.into_iter().filter(|t| seen.insert(t.clone())).collect();
    if unique.len() != before {
        warn!("Dropped {} duplicate resolvers", before - unique.len());
    }
    unique
}

/// Results of one scan, in completion order
///
/// Yields exactly one result per unique target. Dropping the stream aborts
/// every probe still waiting or running, which releases its permit and
/// socket.
pub struct ScanStream {
    rx: mpsc::Receiver<ResolverScanResult>,
    tasks: JoinSet<()>,
    remaining: usize,
}

impl ScanStream {
    /// Next finished probe, or `None` once all have reported
    pub async fn next(&mut self) -> Option<ResolverScanResult> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.rx.recv().await;
        match result {
            Some(_) => self.remaining -= 1,
            None => {
                // Only reachable if a probe task panicked
                warn!("Scan ended with {} results missing", self.remaining);
                self.remaining = 0;
            }
        }
        result
    }

    /// Results not yet yielded
    pub fn len_hint(&self) -> usize {
        self.remaining
    }

    /// Drain everything that is left
    pub async fn collect_all(mut self) -> Vec<ResolverScanResult> {
        let mut results = Vec::with_capacity(self.remaining);
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    /// Abort outstanding probes now
    pub fn cancel(&mut self) {
        if self.remaining > 0 {
            debug!("Cancelling scan with {} probes outstanding", self.remaining);
        }
        self.tasks.abort_all();
        self.rx.close();
        self.remaining = 0;
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.cancel();
    }
}
