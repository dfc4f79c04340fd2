//! The daemon run loop: configuration, plugin bring-up, signals, and the
//! transport → dispatcher wiring.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ljudvakt_config::LjudvaktConfig;
use ljudvakt_core::dispatcher::{DispatcherStats, EventDispatcher};
use ljudvakt_core::properties::Properties;
use ljudvakt_core::registry::{Plugin, PluginRegistry};
use ljudvakt_reserve::{reserve_device_hook, LoopbackBus, ReserveBus, ReserveDevicePlugin};
use ljudvakt_telemetry::{EventLogger, MetricsRecorder};

use crate::cli::Args;
use crate::exit;
use crate::transport::{ChannelTransport, MediaTransport};

/// Binary entry point after flag parsing: loads configuration, assembles a
/// [`Daemon`] and drives it to completion.
pub async fn run(args: Args) -> i32 {
    let file_present = args.config_file.exists();
    let config = if file_present {
        LjudvaktConfig::load_from_path(&args.config_file)
    } else {
        LjudvaktConfig::load_defaults()
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return exit::CONFIG;
        }
    };

    EventLogger::init_with_filter(&config.telemetry.log_filter);
    info!(
        profile = %args.profile,
        config = %args.config_file.display(),
        "starting session manager"
    );
    if !file_present {
        info!("configuration file not found, using defaults");
    }

    // The media-server adapter is pluggable; the stock binary runs with the
    // channel transport and stays up until a signal arrives.
    let (_event_tx, transport) = ChannelTransport::pair("media-server");
    let mut daemon = Daemon::new(config, Box::new(transport));
    let mut globals = Properties::new();
    globals
        .set("daemon.profile", args.profile.as_str())
        .expect("valid property key");
    daemon.set_global_properties(globals);
    daemon.run().await
}

/// The assembled session manager: dispatcher, plugin registry, transport.
pub struct Daemon {
    config: LjudvaktConfig,
    dispatcher: EventDispatcher,
    registry: PluginRegistry,
    transport: Box<dyn MediaTransport>,
    metrics: Option<MetricsRecorder>,
    shutdown: CancellationToken,
    last_stats: DispatcherStats,
}

impl Daemon {
    pub fn new(config: LjudvaktConfig, transport: Box<dyn MediaTransport>) -> Self {
        let metrics = config.telemetry.metrics.then(MetricsRecorder::new);
        Self {
            config,
            dispatcher: EventDispatcher::new(),
            registry: PluginRegistry::new(),
            transport,
            metrics,
            shutdown: CancellationToken::new(),
            last_stats: DispatcherStats::default(),
        }
    }

    /// Token that stops [`Self::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sets the daemon-global properties visible to `Global`-subject
    /// interest constraints.
    pub fn set_global_properties(&mut self, props: Properties) {
        self.dispatcher.set_global_properties(props);
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Option<&MetricsRecorder> {
        self.metrics.as_ref()
    }

    /// Brings up the reservation plugin on the given bus and registers its
    /// acquisition hook. Must run inside the event loop.
    pub fn install_reserve(&mut self, bus: Arc<dyn ReserveBus>) -> Arc<ReserveDevicePlugin> {
        let plugin = ReserveDevicePlugin::new(bus);
        let _notice_loop = plugin.spawn_notice_loop();

        if let Err(err) = self.registry.register(Arc::clone(&plugin) as Arc<dyn Plugin>) {
            warn!(error = %err, "reservation plugin not registered");
        }
        let hook = reserve_device_hook(
            Arc::clone(&plugin),
            self.config.reserve.application_name.clone(),
            self.config.reserve.priority,
        );
        if let Err(err) = self.dispatcher.register_hook(hook) {
            warn!(error = %err, "reservation hook not registered");
        }
        plugin
    }

    /// Runs until a shutdown signal or the media server goes away.
    pub async fn run(mut self) -> i32 {
        if let Err(err) = self.transport.connect().await {
            error!(error = %err, "cannot reach the media server");
            return exit::UNAVAILABLE;
        }

        if self.config.reserve.enabled
            && self.registry.find(ljudvakt_reserve::PLUGIN_NAME).is_none()
        {
            self.install_reserve(LoopbackBus::new());
        }

        let shutdown = self.shutdown.clone();
        spawn_signal_watcher(shutdown.clone());
        info!(endpoint = %self.transport.endpoint(), "session manager running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("stopping on request");
                    break;
                }
                event = self.transport.next_event() => match event {
                    Some(event) => {
                        self.dispatcher.push(event);
                        if self.dispatcher.pending() > self.config.core.queue_warning_threshold {
                            warn!(
                                pending = self.dispatcher.pending(),
                                "event queue is backing up"
                            );
                        }
                        let started = Instant::now();
                        self.dispatcher.run_until_idle().await;
                        self.observe(started);
                    }
                    None => {
                        info!("disconnected from media server");
                        break;
                    }
                }
            }
        }
        exit::OK
    }

    fn observe(&mut self, started: Instant) {
        let stats = self.dispatcher.stats();
        if let Some(metrics) = &self.metrics {
            metrics
                .dispatched_events
                .inc_by((stats.events_dispatched - self.last_stats.events_dispatched) as f64);
            metrics
                .hook_failures
                .inc_by((stats.hook_failures - self.last_stats.hook_failures) as f64);
            metrics
                .dispatch_latency
                .observe(started.elapsed().as_nanos() as f64);
        }
        self.last_stats = stats;
    }
}

#[cfg(unix)]
fn spawn_signal_watcher(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (Ok(mut interrupt), Ok(mut terminate), Ok(mut hangup)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        ) else {
            warn!("signal handlers unavailable");
            return;
        };
        let received = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
        };
        info!(signal = received, "stopped by signal");
        shutdown.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stopped by ctrl-c");
            shutdown.cancel();
        }
    });
}
