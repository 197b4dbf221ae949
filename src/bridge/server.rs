// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Lifecycle controller for one embedded language server.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

use super::events::{EventKind, ServerEvent};
use super::hub::{Hub, ListenerResult, Subscription};
use super::lock;
use super::program::{Program, ProgramCallbacks, ProgramEnv};
use super::stdin::StdinSource;
use crate::config::BridgeOptions;
use crate::error::{BridgeError, Result, StartupError};
use crate::lsp::protocol::Frame;
use crate::lsp::state::LifecycleState;

type StartupResult = std::result::Result<(), StartupError>;

/// Per-run outbound channel and startup bookkeeping.
#[derive(Default)]
struct RunSlot {
    /// A run was launched and has not reached readiness or a terminal state.
    starting: bool,
    /// `close_stdin` was called for the current run.
    input_closed: bool,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

struct Shared {
    options: BridgeOptions,
    hub: Hub<ServerEvent>,
    state: watch::Sender<LifecycleState>,
    /// Incremented per run; callbacks of older runs are ignored.
    generation: AtomicU64,
    slot: Mutex<RunSlot>,
}

/// Resolves the pending `run` call exactly once.
///
/// Shared only by the three lifecycle signals: once all of them are dropped
/// without resolving, the waiting `run` sees the channel close.
pub(crate) struct Startup {
    sender: Mutex<Option<oneshot::Sender<StartupResult>>>,
}

impl Startup {
    fn resolve(&self, result: StartupResult) {
        if let Some(sender) = lock(&self.sender).take() {
            // The receiver is gone if `run` was cancelled; nothing to report.
            let _ = sender.send(result);
        }
    }
}

impl fmt::Debug for Startup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Startup")
            .field("pending", &lock(&self.sender).is_some())
            .finish()
    }
}

/// Handle through which one run's callbacks reach the bridge.
#[derive(Clone)]
pub(crate) struct RunContext {
    generation: u64,
    shared: Arc<Shared>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    /// Broadcasts an event unless this run has been superseded.
    pub(crate) fn broadcast(&self, event: &ServerEvent) {
        if self.is_current() {
            self.shared.hub.broadcast(event);
        } else {
            trace!("Dropping {:?} from stale run {}", event.kind(), self.generation);
        }
    }

    /// Records byte traffic. Returns true once no further transition can be
    /// caused by traffic, so callers can stop reporting it.
    pub(crate) fn mark_running(&self) -> bool {
        if !self.is_current() {
            return true;
        }
        if *self.shared.state.borrow() == LifecycleState::NotInitialized {
            return false;
        }

        let promoted = self.shared.state.send_if_modified(|state| {
            if *state == LifecycleState::Initialized {
                *state = LifecycleState::Running;
                true
            } else {
                false
            }
        });
        if promoted {
            debug!("Language server running");
        }
        true
    }

    pub(crate) fn ready(&self, env: &mut ProgramEnv, startup: &Startup) {
        if !self.is_current() {
            debug!("Ignoring readiness from stale run {}", self.generation);
            return;
        }

        self.shared.options.apply(env);

        let became_ready = self.shared.state.send_if_modified(|state| {
            if *state == LifecycleState::NotInitialized {
                *state = LifecycleState::Initialized;
                true
            } else {
                false
            }
        });
        lock(&self.shared.slot).starting = false;

        if !became_ready {
            warn!(
                "Ignoring readiness signal, language server is {}",
                *self.shared.state.borrow()
            );
            return;
        }

        info!("Language server initialized");
        self.shared.hub.broadcast(&ServerEvent::Start);
        startup.resolve(Ok(()));
    }

    pub(crate) fn exit(&self, code: i32, startup: &Startup) {
        self.finish(LifecycleState::Exited(code), startup);
    }

    pub(crate) fn abort(&self, reason: String, startup: &Startup) {
        self.finish(LifecycleState::Aborted(reason), startup);
    }

    fn finish(&self, terminal: LifecycleState, startup: &Startup) {
        if !self.is_current() {
            debug!("Ignoring {terminal} from stale run {}", self.generation);
            return;
        }

        let mut previous = None;
        let changed = self.shared.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                previous = Some(std::mem::replace(state, terminal.clone()));
                true
            }
        });
        if !changed {
            warn!(
                "Ignoring {terminal}, language server already {}",
                *self.shared.state.borrow()
            );
            return;
        }

        {
            let mut slot = lock(&self.shared.slot);
            slot.starting = false;
            slot.input_closed = false;
            slot.outbound = None;
        }

        let event = match &terminal {
            LifecycleState::Exited(code) => {
                if *code == 0 {
                    info!("Language server exited");
                } else {
                    warn!("Language server exited with code {code}");
                }
                ServerEvent::Exit(*code)
            }
            LifecycleState::Aborted(reason) => {
                error!("Language server aborted: {reason}");
                ServerEvent::Abort(reason.clone())
            }
            _ => return,
        };
        self.shared.hub.broadcast(&event);

        if previous == Some(LifecycleState::NotInitialized) {
            startup.resolve(Err(match terminal {
                LifecycleState::Exited(code) => StartupError::Exited(code),
                LifecycleState::Aborted(reason) => StartupError::Aborted(reason),
                _ => StartupError::Abandoned,
            }));
        }
    }
}

/// An embedded language server and the bridge around it.
///
/// Cloning yields another handle to the same bridge.
#[derive(Clone)]
pub struct LanguageServer {
    program: Arc<dyn Program>,
    shared: Arc<Shared>,
}

impl fmt::Debug for LanguageServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageServer")
            .field("state", &*self.shared.state.borrow())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl LanguageServer {
    /// Creates a bridge for `program`. Nothing is started until [`run`](Self::run).
    #[must_use]
    pub fn new(program: impl Program, options: BridgeOptions) -> Self {
        let (state, _) = watch::channel(LifecycleState::NotInitialized);
        Self {
            program: Arc::new(program),
            shared: Arc::new(Shared {
                options,
                hub: Hub::new(),
                state,
                generation: AtomicU64::new(0),
                slot: Mutex::new(RunSlot::default()),
            }),
        }
    }

    /// Startup options applied at readiness.
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.shared.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state.borrow().clone()
    }

    /// A receiver notified on every lifecycle transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state.subscribe()
    }

    /// Waits until the program exits or aborts and returns that state.
    pub async fn wait_for_exit(&self) -> LifecycleState {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `self.shared`, so the channel cannot close here.
        match state.wait_for(LifecycleState::is_terminal).await {
            Ok(terminal) => (*terminal).clone(),
            Err(_) => self.state(),
        }
    }

    /// Listener registry for every event of this bridge.
    #[must_use]
    pub fn hub(&self) -> &Hub<ServerEvent> {
        &self.shared.hub
    }

    /// Registers a listener for every event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription<ServerEvent>
    where
        F: Fn(&ServerEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.hub.subscribe(listener)
    }

    /// Registers a listener for events of one kind.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Subscription<ServerEvent>
    where
        F: Fn(&ServerEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.hub.subscribe(move |event: &ServerEvent| {
            if event.kind() == kind {
                listener(event)
            } else {
                Ok(())
            }
        })
    }

    /// Serializes `message` as JSON and queues it for the program.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or no run is accepting input.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.send_raw(&text)
    }

    /// Queues an already serialized message for the program.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotRunning`] if no run is starting or active,
    /// and [`BridgeError::InputClosed`] after [`close_stdin`](Self::close_stdin)
    /// or once the program dropped its input.
    pub fn send_raw(&self, message: &str) -> Result<()> {
        let slot = lock(&self.shared.slot);
        if slot.input_closed {
            return Err(BridgeError::InputClosed);
        }
        let outbound = slot.outbound.as_ref().ok_or(BridgeError::NotRunning)?;

        trace!("Sending LSP message: {}", message);
        outbound
            .send(Frame::encode(message))
            .map_err(|_| BridgeError::InputClosed)
    }

    /// Closes the program's input. Queued frames are still delivered, then
    /// the program reads end of stream.
    pub fn close_stdin(&self) {
        let mut slot = lock(&self.shared.slot);
        if slot.outbound.take().is_some() {
            slot.input_closed = true;
            debug!("Closed language server input");
        }
    }

    /// Launches the program and waits until it signals readiness.
    ///
    /// Each call creates a fresh input queue and decoder. A run after the
    /// previous one exited or aborted starts over from `NotInitialized`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyRunning`] if a run is starting or
    /// active, and [`BridgeError::Startup`] if the program cannot be
    /// launched or exits, aborts or goes silent before becoming ready.
    pub async fn run(&self) -> Result<()> {
        let (generation, callbacks, startup) = self.begin_run()?;
        info!("Starting language server (run {generation})");

        if let Err(e) = self.program.launch(callbacks) {
            error!("Failed to launch language server: {e:#}");
            self.abandon_run(generation, &format!("launch failed: {e:#}"));
            return Err(StartupError::Launch(e).into());
        }

        match startup.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!("Language server dropped its callbacks before becoming ready");
                self.abandon_run(generation, "callbacks dropped");
                Err(StartupError::Abandoned.into())
            }
        }
    }

    fn begin_run(&self) -> Result<(u64, ProgramCallbacks, oneshot::Receiver<StartupResult>)> {
        let mut slot = lock(&self.shared.slot);
        if slot.starting || self.shared.state.borrow().is_active() {
            return Err(BridgeError::AlreadyRunning);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        slot.starting = true;
        slot.input_closed = false;
        slot.outbound = Some(frames_tx);
        drop(slot);

        self.shared.state.send_replace(LifecycleState::NotInitialized);

        let (startup_tx, startup_rx) = oneshot::channel();
        let startup = Arc::new(Startup {
            sender: Mutex::new(Some(startup_tx)),
        });
        let context = RunContext {
            generation,
            shared: self.shared.clone(),
        };
        let stdin = StdinSource::new(frames_rx, context.clone());
        let callbacks = ProgramCallbacks::new(stdin, &context, &startup);

        Ok((generation, callbacks, startup_rx))
    }

    /// Retires a run whose launch failed. A run that already signalled
    /// readiness is reported as aborted so a later `run` is accepted.
    fn abandon_run(&self, generation: u64, reason: &str) {
        if self
            .shared
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        {
            let mut slot = lock(&self.shared.slot);
            slot.starting = false;
            slot.input_closed = false;
            slot.outbound = None;
        }

        let aborted = self.shared.state.send_if_modified(|state| {
            if state.is_active() {
                *state = LifecycleState::Aborted(reason.to_string());
                true
            } else {
                false
            }
        });
        if aborted {
            self.shared
                .hub
                .broadcast(&ServerEvent::Abort(reason.to_string()));
        }
    }
}
