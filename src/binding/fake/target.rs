// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! In-process gRPC target simulating a device

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::lock::Mutex;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::Routes;
use tonic::transport::Server;

const LOOPBACK_ADDRESS: &str = "127.0.0.1:0";
const CLOCK_INTERVAL: Duration = Duration::from_secs(1);
const LOG_INTERVAL: Duration = Duration::from_secs(5);
const MAX_MESSAGES: usize = 64;

const SEVERITIES: [&str; 4] = ["DEBUG", "INFORMATIONAL", "NOTICE", "WARNING"];
const MESSAGES: [&str; 4] = [
    "interface counters polled",
    "configuration checkpoint written",
    "fan speed adjusted",
    "session keepalive received",
];

/// A simulated syslog message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Time the message was emitted
    pub timestamp: DateTime<Utc>,

    /// Syslog severity name
    pub severity: String,

    /// Message text
    pub message: String,
}

#[derive(Debug)]
struct CollectorState {
    current_datetime: Option<DateTime<Utc>>,
    messages: VecDeque<LogMessage>,
    sequence: u64,
}

/// Telemetry values of a fake target, kept up to date by the target's periodic tasks
#[derive(Clone)]
pub struct Collector {
    target: String,
    boot_time: DateTime<Utc>,
    state: Arc<Mutex<CollectorState>>,
}

impl Collector {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_owned(),
            boot_time: Utc::now(),
            state: Arc::new(Mutex::new(CollectorState {
                current_datetime: None,
                messages: VecDeque::with_capacity(MAX_MESSAGES),
                sequence: 0,
            })),
        }
    }

    /// Name of the simulated device
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Time the target was started
    #[must_use]
    pub const fn boot_time(&self) -> DateTime<Utc> {
        self.boot_time
    }

    /// Last value of the simulated device clock
    pub async fn current_datetime(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.current_datetime
    }

    /// Most recent simulated log messages, oldest first
    pub async fn messages(&self) -> Vec<LogMessage> {
        self.state.lock().await.messages.iter().cloned().collect()
    }

    async fn tick_clock(&self, now: DateTime<Utc>) {
        self.state.lock().await.current_datetime = Some(now);
    }

    async fn emit_message(&self, now: DateTime<Utc>) {
        let (severity, text) = {
            let mut rng = rand::thread_rng();
            (
                SEVERITIES.choose(&mut rng).copied().unwrap_or("NOTICE"),
                MESSAGES.choose(&mut rng).copied().unwrap_or_default(),
            )
        };

        let mut state = self.state.lock().await;
        state.sequence += 1;
        let message = LogMessage {
            timestamp: now,
            severity: severity.to_owned(),
            message: format!("{}: {text} (seq {})", self.target, state.sequence),
        };
        if state.messages.len() >= MAX_MESSAGES {
            state.messages.pop_front();
        }
        state.messages.push_back(message);
    }
}

/// A running fake target
///
/// The gRPC server answers every call with `UNIMPLEMENTED`, which is sufficient to
/// establish connections. No gNMI service is provided, so the simulated clock and
/// syslog values can not be read over the connection. They are only available
/// in-process via [`Self::collector`] or [`crate::binding::FakeBinding::collector`].
///
/// Clock and log simulation run as independent tasks until the target is stopped
/// or dropped.
pub struct FakeTarget {
    address: SocketAddr,
    collector: Collector,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeTarget {
    /// Start a target for the device `name` on a free loopback port
    ///
    /// # Errors
    ///
    /// Will return `Err` if no listening socket could be opened.
    pub async fn start(name: &str) -> Result<Self> {
        let listener = TcpListener::bind(LOOPBACK_ADDRESS)
            .await
            .with_context(|| format!("Binding fake target {name} to {LOOPBACK_ADDRESS} failed"))?;
        let address = listener
            .local_addr()
            .context("Reading address of fake target failed")?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let collector = Collector::new(name);

        let tasks = vec![
            tokio::spawn(serve(listener, shutdown_rx.clone())),
            tokio::spawn(run_clock(collector.clone(), shutdown_rx.clone())),
            tokio::spawn(run_log(collector.clone(), shutdown_rx)),
        ];

        info!("Started fake target {name} on {address}");

        Ok(Self {
            address,
            collector,
            shutdown,
            tasks,
        })
    }

    /// Address the gRPC server listens on
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Telemetry collected by the target
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Signal the server and all periodic tasks to terminate
    pub fn stop(&self) {
        if self.shutdown.send(true).is_err() {
            debug!("Fake target {} already stopped", self.collector.target);
        }
    }

    /// True as long as any of the target's tasks is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }
}

async fn serve(listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    let result = Server::builder()
        .add_routes(Routes::default())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.changed().await.ok();
        })
        .await;

    if let Err(e) = result {
        warn!("Fake target server terminated: {e}");
    }
}

async fn run_clock(collector: Collector, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(CLOCK_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => collector.tick_clock(Utc::now()).await,
            _ = shutdown.changed() => break,
        }
    }
    debug!("Clock of fake target {} stopped", collector.target);
}

async fn run_log(collector: Collector, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(LOG_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => collector.emit_message(Utc::now()).await,
            _ = shutdown.changed() => break,
        }
    }
    debug!("Log of fake target {} stopped", collector.target);
}
