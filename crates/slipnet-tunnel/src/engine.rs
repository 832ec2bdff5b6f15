//! Tunnel Engine
//!
//! The tunnel engine implements the DNS tunneling protocol and exposes a
//! local proxy endpoint once started. The protocol itself is opaque here:
//! the orchestrator only needs [`TunnelEngine::start`] and
//! [`TunnelEngine::stop`].
//!
//! [`EngineHost`] is the stock implementation. It runs an [`EngineRunner`]
//! on a dedicated thread with its own current-thread runtime, so the
//! engine's I/O never competes with the host's executor.
//!
//! ```text
//!  start() ──▶ spawn "tunnel-engine" thread ──▶ runner.run(config)
//!                     │                               │
//!                     └──── shutdown oneshot ─────────┘ (select!)
//! ```

use crate::config::{CongestionControl, ResolverConfig, ServerProfile};
use crate::protect::ProtectHandle;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Everything the tunnel engine needs for one session
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tunnel domain
    pub domain: String,
    /// Resolvers with their mode
    pub resolvers: Vec<ResolverConfig>,
    /// Congestion control (engine default when `None`)
    pub congestion_control: Option<CongestionControl>,
    /// Keep-alive interval in milliseconds
    pub keep_alive_ms: u32,
    /// Local proxy listen host
    pub listen_host: String,
    /// Local proxy listen port
    pub listen_port: u16,
    /// Generic segmentation offload
    pub gso_enabled: bool,
    /// Log DNS polling
    pub debug_poll: bool,
    /// Log stream activity
    pub debug_streams: bool,
    /// Socket protection for the engine's upstream sockets
    pub protect: ProtectHandle,
}

impl EngineConfig {
    pub fn from_profile(profile: &ServerProfile, protect: ProtectHandle) -> Self {
        Self {
            domain: profile.domain.clone(),
            resolvers: profile.resolvers.clone(),
            congestion_control: profile.congestion_control,
            keep_alive_ms: profile.keep_alive_ms,
            listen_host: profile.listen_host.clone(),
            listen_port: profile.listen_port,
            gso_enabled: profile.gso_enabled,
            debug_poll: profile.debug_poll,
            debug_streams: profile.debug_streams,
            protect,
        }
    }

    /// Local proxy address as `host:port`
    pub fn listen_addr(&self) -> String {
        if self.listen_host.contains(':') {
            format!("[{}]:{}", self.listen_host, self.listen_port)
        } else {
            format!("{}:{}", self.listen_host, self.listen_port)
        }
    }

    fn log_summary(&self) {
        info!("Starting tunnel engine:");
        info!("  Domain: {}", self.domain);
        info!("  Listen: {}", self.listen_addr());
        info!("  Resolvers: {}", self.resolvers.len());
        for (i, resolver) in self.resolvers.iter().enumerate() {
            info!("  Resolver {}: {}", i, resolver);
        }
        info!(
            "  Congestion control: {}",
            self.congestion_control.map_or("default", |cc| cc.as_str())
        );
        info!("  Keep-alive: {}ms", self.keep_alive_ms);
        info!("  GSO: {}", self.gso_enabled);
        debug!("  Debug poll: {}, debug streams: {}", self.debug_poll, self.debug_streams);
    }
}

/// Tunnel engine contract used by the orchestrator
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    /// Start the engine; on success its local proxy endpoint is listening
    async fn start(&self, config: EngineConfig) -> anyhow::Result<()>;

    /// Stop the engine. Must be idempotent.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// The tunnel protocol driven by [`EngineHost`]
#[async_trait]
pub trait EngineRunner: Send + Sync + 'static {
    /// Run until the tunnel exits, returning its exit code
    async fn run(&self, config: EngineConfig) -> anyhow::Result<i32>;
}

/// Engine host errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Tunnel engine already running")]
    AlreadyRunning,

    #[error("Tunnel engine exited during startup")]
    ExitedDuringStartup,

    #[error("Failed to build engine runtime: {0}")]
    Runtime(String),

    #[error("Failed to spawn engine thread: {0}")]
    Spawn(String),
}

/// Clears the running flag when the engine thread ends, panics included
struct ClearOnDrop(Arc<AtomicBool>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct RunHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Thread-hosted tunnel engine
pub struct EngineHost<R: EngineRunner> {
    runner: Arc<R>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<RunHandle>>,
    startup_grace: Duration,
    stop_timeout: Duration,
}

impl<R: EngineRunner> EngineHost<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            startup_grace: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(3),
        }
    }

    /// How long `start` waits before confirming the runner is still alive
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// How long `stop` waits for the engine thread to exit
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn store_handle(&self, handle: RunHandle) {
        *self.handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    fn take_handle(&self) -> Option<RunHandle> {
        self.handle.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    async fn join(&self, thread: JoinHandle<()>) {
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => info!("Engine thread joined"),
            Ok(Err(_)) => warn!("Engine thread panicked"),
            Err(e) => warn!("Failed to join engine thread: {}", e),
        }
    }
}

fn run_engine_thread<R: EngineRunner>(
    runner: Arc<R>,
    config: EngineConfig,
    ready_tx: oneshot::Sender<Result<(), String>>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create engine runtime: {}", e);
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    rt.block_on(async {
        tokio::select! {
            result = runner.run(config) => match result {
                Ok(code) => info!("Engine exited with code: {}", code),
                Err(e) => error!("Engine error: {:#}", e),
            },
            _ = shutdown_rx => info!("Engine shutdown requested"),
        }
    });
}

#[async_trait]
impl<R: EngineRunner> TunnelEngine for EngineHost<R> {
    async fn start(&self, config: EngineConfig) -> anyhow::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Tunnel engine already running");
            return Err(EngineError::AlreadyRunning.into());
        }

        config.log_summary();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let runner = self.runner.clone();
        let running = self.running.clone();

        let spawned = std::thread::Builder::new()
            .name("tunnel-engine".to_string())
            .spawn(move || {
                let _running = ClearOnDrop(running);
                run_engine_thread(runner, config, ready_tx, shutdown_rx);
                info!("Engine thread exited");
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(EngineError::Spawn(e.to_string()).into());
            }
        };

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                self.join(thread).await;
                return Err(EngineError::Runtime(reason).into());
            }
            Err(_) => {
                // Thread died before reporting
                self.join(thread).await;
                return Err(EngineError::ExitedDuringStartup.into());
            }
        }

        self.store_handle(RunHandle {
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        });

        // Give the runner a moment to fail fast (bind errors, bad resolvers)
        tokio::time::sleep(self.startup_grace).await;

        if !self.is_running() {
            error!("Tunnel engine failed to start");
            if let Some(mut handle) = self.take_handle() {
                if let Some(thread) = handle.thread.take() {
                    self.join(thread).await;
                }
            }
            return Err(EngineError::ExitedDuringStartup.into());
        }

        info!("Tunnel engine started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let Some(mut handle) = self.take_handle() else {
            debug!("No tunnel engine running to stop");
            return Ok(());
        };

        if let Some(tx) = handle.shutdown_tx.take() {
            let _ = tx.send(());
            info!("Engine stop signal sent");
        }

        let deadline = Instant::now() + self.stop_timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                warn!("Timeout waiting for engine thread to exit");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Some(thread) = handle.thread.take() {
            if self.is_running() {
                warn!("Engine thread still running, detaching it");
            } else {
                self.join(thread).await;
            }
        }

        info!("Tunnel engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PendingRunner;

    #[async_trait]
    impl EngineRunner for PendingRunner {
        async fn run(&self, _config: EngineConfig) -> anyhow::Result<i32> {
            std::future::pending::<()>().await;
            Ok(0)
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl EngineRunner for FailingRunner {
        async fn run(&self, config: EngineConfig) -> anyhow::Result<i32> {
            anyhow::bail!("cannot listen on {}", config.listen_addr())
        }
    }

    fn config() -> EngineConfig {
        let profile = ServerProfile::new(
            "p1",
            "t.example.com",
            vec![ResolverConfig::new("8.8.8.8")],
        );
        EngineConfig::from_profile(&profile, ProtectHandle::new())
    }

    #[test]
    fn test_engine_config_from_profile() {
        let config = config();
        assert_eq!(config.domain, "t.example.com");
        assert_eq!(config.listen_addr(), "127.0.0.1:1080");
        assert!(config.congestion_control.is_none());

        let v6 = EngineConfig { listen_host: "::1".into(), ..config };
        assert_eq!(v6.listen_addr(), "[::1]:1080");
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let host = EngineHost::new(PendingRunner).with_startup_grace(Duration::from_millis(20));

        host.start(config()).await.unwrap();
        assert!(host.is_running());

        host.stop().await.unwrap();
        assert!(!host.is_running());

        // Idempotent
        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let host = EngineHost::new(PendingRunner).with_startup_grace(Duration::from_millis(20));

        host.start(config()).await.unwrap();
        let err = host.start(config()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<EngineError>(), Some(&EngineError::AlreadyRunning));

        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_runner_exit_during_startup() {
        let host = EngineHost::new(FailingRunner).with_startup_grace(Duration::from_millis(100));

        let err = host.start(config()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::ExitedDuringStartup)
        );
        assert!(!host.is_running());

        // Nothing left to stop, and a fresh start is allowed
        host.stop().await.unwrap();
    }

    struct PanickingRunner;

    #[async_trait]
    impl EngineRunner for PanickingRunner {
        async fn run(&self, _config: EngineConfig) -> anyhow::Result<i32> {
            panic!("engine blew up");
        }
    }

    #[tokio::test]
    async fn test_runner_panic_does_not_wedge_host() {
        let host = EngineHost::new(PanickingRunner)
            .with_startup_grace(Duration::from_millis(100))
            .with_stop_timeout(Duration::from_millis(500));

        for _ in 0..2 {
            let err = host.start(config()).await.unwrap_err();
            assert_eq!(
                err.downcast_ref::<EngineError>(),
                Some(&EngineError::ExitedDuringStartup)
            );
            assert!(!host.is_running());
        }

        host.stop().await.unwrap();
        assert!(!host.is_running());
    }
}
