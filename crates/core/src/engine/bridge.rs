//! UCI engine process bridge
//!
//! Spawns the engine (Stockfish or any UCI engine) as a subprocess, runs the
//! handshake, and turns its output stream into settlements for the request
//! currently held by the [`RequestCorrelator`].

use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::analysis::{AnalysisPreferences, AnalysisRequest, AnalysisResult, MoveToken};
use super::capabilities::EngineCapabilities;
use super::correlator::RequestCorrelator;
use super::protocol::{Command, EngineMessage, SearchLimit};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Lifecycle of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BridgeState {
    Uninitialized,
    Negotiating,
    Ready,
    Analyzing,
    Terminated,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeState::Uninitialized => "uninitialized",
            BridgeState::Negotiating => "negotiating",
            BridgeState::Ready => "ready",
            BridgeState::Analyzing => "analyzing",
            BridgeState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of the connection plus the MultiPV value last sent on it
struct Outbound {
    writer: BoxedWriter,
    multipv: u32,
}

impl Outbound {
    async fn send(&mut self, command: &Command) -> Result<()> {
        debug!(command = %command, "engine <");
        let line = format!("{}\n", command);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// State shared with the output reader task
struct Shared {
    state: Mutex<BridgeState>,
    correlator: Arc<RequestCorrelator>,
}

impl Shared {
    fn state(&self) -> BridgeState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: BridgeState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }

    /// Moves `from` to `to` unless the bridge was terminated in between
    fn transition(&self, from: BridgeState, to: BridgeState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == from {
            *state = to;
        }
    }

    fn dispatch(&self, line: &str) {
        match EngineMessage::parse(line) {
            EngineMessage::Info(info) => self.correlator.record_progress(info),
            EngineMessage::BestMove { best, .. } => {
                if self.correlator.complete(best) {
                    self.transition(BridgeState::Analyzing, BridgeState::Ready);
                }
            }
            _ => {}
        }
    }

    fn terminate(&self, reason: &str) {
        self.set_state(BridgeState::Terminated);
        self.correlator.close(reason);
    }
}

/// Owns one analysis engine process and is the only component that talks to it
pub struct EngineProcessBridge {
    config: EngineConfig,
    shared: Arc<Shared>,
    outbound: tokio::sync::Mutex<Option<Outbound>>,
    capabilities: EngineCapabilities,
    reader_task: Option<JoinHandle<()>>,
}

impl EngineProcessBridge {
    /// Creates a bridge in the `Uninitialized` state; call [`start`](Self::start)
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::Uninitialized),
                correlator: Arc::new(RequestCorrelator::new()),
            }),
            outbound: tokio::sync::Mutex::new(None),
            capabilities: EngineCapabilities::default(),
            reader_task: None,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawns the engine binary and negotiates until it reports ready
    pub async fn start(&mut self) -> Result<()> {
        let mut child = ProcessCommand::new(&self.config.path)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.shared.terminate("spawn failed");
                Error::EngineUnavailable(format!("failed to start '{}': {}", self.config.path, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::EngineUnavailable("failed to open engine stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::EngineUnavailable("failed to open engine stdout".into()))?;

        info!(path = %self.config.path, "engine process spawned");
        self.connect(BufReader::new(stdout), stdin, Some(child)).await
    }

    /// Negotiates with an engine reachable through an arbitrary stream pair
    /// instead of a spawned process.
    pub async fn attach<R, W>(&mut self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.connect(reader, writer, None).await
    }

    async fn connect<R, W>(&mut self, reader: R, writer: W, child: Option<Child>) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.shared.set_state(BridgeState::Negotiating);

        let mut lines = reader.lines();
        let mut outbound = Outbound {
            writer: Box::new(writer),
            multipv: self.config.multipv.max(1),
        };

        let negotiated = timeout(
            self.config.handshake_timeout(),
            negotiate(&mut lines, &mut outbound, &self.config),
        )
        .await;

        let capabilities = match negotiated {
            Ok(Ok(caps)) => caps,
            Ok(Err(e)) => {
                self.shared.terminate("handshake failed");
                return Err(match e {
                    Error::EngineUnavailable(_) => e,
                    other => Error::EngineUnavailable(other.to_string()),
                });
            }
            Err(_) => {
                self.shared.terminate("handshake timed out");
                return Err(Error::EngineUnavailable(format!(
                    "no handshake acknowledgment within {:?}",
                    self.config.handshake_timeout()
                )));
            }
        };

        info!(
            engine = capabilities.name.as_deref().unwrap_or("unknown"),
            options = capabilities.options.len(),
            threads = capabilities.threads_supported,
            "engine ready"
        );

        self.capabilities = capabilities;
        *self.outbound.lock().await = Some(outbound);
        self.shared.correlator.reopen();
        self.shared.set_state(BridgeState::Ready);
        self.reader_task = Some(tokio::spawn(read_output(
            lines,
            Arc::clone(&self.shared),
            child,
        )));

        Ok(())
    }

    /// Runs one analysis to completion.
    ///
    /// Fails immediately with [`Error::EngineBusy`] if another request is
    /// outstanding. A search that produces no terminal line within the hard
    /// timeout is stopped and reported as [`Error::AnalysisTimeout`]; the
    /// bridge is ready for the next request straight away.
    pub async fn submit_analysis(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let mut ticket = self.shared.correlator.acquire()?;
        let request_id = ticket.id();
        let deadline = Instant::now() + self.config.hard_timeout();
        self.shared.transition(BridgeState::Ready, BridgeState::Analyzing);

        if let Err(e) = self.dispatch(request, request_id).await {
            error!(request_id, error = %e, "failed to send analysis request");
            self.shared.terminate("engine input closed");
            return Err(Error::EngineUnavailable(e.to_string()));
        }

        let waited = tokio::time::timeout_at(deadline, ticket.settled()).await;
        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(_) => {
                let timeout_error = Error::AnalysisTimeout(self.config.hard_timeout());
                if self.shared.correlator.expire(request_id, timeout_error) {
                    warn!(request_id, moves = request.moves.len(), "analysis timed out, stopping search");
                    if let Some(outbound) = self.outbound.lock().await.as_mut() {
                        let _ = outbound.send(&Command::Stop).await;
                    }
                }
                // Either the timeout or a just-arrived terminal line settled it
                ticket.settled().await
            }
        };

        self.shared.transition(BridgeState::Analyzing, BridgeState::Ready);
        outcome
    }

    /// Sends stop, position, and go for one request
    async fn dispatch(&self, request: &AnalysisRequest, request_id: u64) -> Result<()> {
        let mut guard = self.outbound.lock().await;
        let outbound = guard
            .as_mut()
            .ok_or_else(|| Error::EngineUnavailable("engine not started".into()))?;

        outbound.send(&Command::Stop).await?;
        sleep(self.config.settle_delay()).await;

        let multipv = request.preferences.multipv.max(1);
        if multipv != outbound.multipv && self.capabilities.option("MultiPV").is_some() {
            outbound
                .send(&Command::SetOption {
                    name: "MultiPV".into(),
                    value: multipv.to_string(),
                })
                .await?;
            outbound.multipv = multipv;
        }

        outbound.send(&Command::Position(request.moves.clone())).await?;
        outbound
            .send(&Command::Go(SearchLimit::from(&request.preferences)))
            .await?;
        self.shared.correlator.mark_dispatched(request_id);
        debug!(request_id, moves = request.moves.len(), "search dispatched");
        Ok(())
    }

    /// Convenience wrapper building the request from parts
    pub async fn analyze_moves(
        &self,
        moves: &[MoveToken],
        preferences: &AnalysisPreferences,
    ) -> Result<AnalysisResult> {
        let request = AnalysisRequest {
            moves: moves.to_vec(),
            preferences: preferences.clone(),
        };
        self.submit_analysis(&request).await
    }

    /// Quits the engine and reaps the process
    pub async fn shutdown(&mut self) {
        if let Some(mut outbound) = self.outbound.lock().await.take() {
            let _ = outbound.send(&Command::Quit).await;
        }

        if let Some(mut task) = self.reader_task.take() {
            // Give it a moment to exit after quit
            if timeout(Duration::from_millis(500), &mut task).await.is_err() {
                task.abort();
            }
        }

        self.shared.terminate("engine shut down");
        info!("engine shut down");
    }

    /// Shuts down any running process and starts a fresh one
    pub async fn restart(&mut self) -> Result<()> {
        self.shutdown().await;
        self.capabilities = EngineCapabilities::default();
        self.start().await
    }
}

impl Drop for EngineProcessBridge {
    fn drop(&mut self) {
        // Dropping the task drops the child, which kills the process
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

async fn next_message<R>(lines: &mut Lines<R>) -> Result<EngineMessage>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await? {
        Some(line) => {
            debug!(line = %line, "engine >");
            Ok(EngineMessage::parse(&line))
        }
        None => Err(Error::EngineUnavailable(
            "engine closed its output during handshake".into(),
        )),
    }
}

/// uci → options … uciok → setoption … → isready → readyok
async fn negotiate<R>(
    lines: &mut Lines<R>,
    outbound: &mut Outbound,
    config: &EngineConfig,
) -> Result<EngineCapabilities>
where
    R: AsyncBufRead + Unpin,
{
    let mut capabilities = EngineCapabilities::default();

    outbound.send(&Command::Uci).await?;
    loop {
        match next_message(lines).await? {
            EngineMessage::IdName(name) => capabilities.name = Some(name),
            EngineMessage::Option { name, option } => capabilities.record_option(name, option),
            EngineMessage::UciOk => break,
            _ => {}
        }
    }

    for (name, value) in capabilities.startup_settings(outbound.multipv, config.hash_mb, config.max_threads) {
        outbound.send(&Command::SetOption { name, value }).await?;
    }

    outbound.send(&Command::IsReady).await?;
    loop {
        if next_message(lines).await? == EngineMessage::ReadyOk {
            break;
        }
    }

    Ok(capabilities)
}

/// Forwards engine output to the correlator until the stream ends
async fn read_output<R>(mut lines: Lines<R>, shared: Arc<Shared>, child: Option<Child>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(line = %line, "engine >");
                shared.dispatch(&line);
            }
            Ok(None) => {
                warn!("engine closed its output stream");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read engine output");
                break;
            }
        }
    }

    shared.terminate("engine process exited");

    if let Some(mut child) = child {
        match child.wait().await {
            Ok(status) => info!(%status, "engine process exited"),
            Err(e) => warn!(error = %e, "failed to reap engine process"),
        }
    }
}
