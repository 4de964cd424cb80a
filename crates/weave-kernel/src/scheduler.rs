//! Per-kernel command scheduling.
//!
//! Each scheduling scope gets its own FIFO queue drained by a worker task.
//! Workers for different scopes contend for the kernel lock, so commands from
//! different scopes may interleave but a kernel still handles at most one
//! command at a time.
//!
//! A kernel that issues a command to another kernel keeps its slot while it
//! waits. Those waits are tracked as edges between schedulers, and a request
//! that would close a cycle of waiting kernels fails before it is enqueued.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use log::{debug, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use weave_commands::{
    CommandId, CommandKind, Event, KernelCommand, KernelCommandResult, KernelEvent, KernelInfo,
    SchedulingScope, ValueProduced,
};

use crate::context::{KernelClient, KernelInvocationContext};
use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::relay::EventRelay;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

struct Scheduled {
    command: Arc<KernelCommand>,
    cancellation: CancellationToken,
    completion: oneshot::Sender<KernelCommandResult>,
}

type ScopeQueues = HashMap<Option<SchedulingScope>, mpsc::UnboundedSender<Scheduled>>;

tokio::task_local! {
    /// Scheduler whose command the current task is handling.
    static HANDLING: Weak<SchedulerShared>;
}

struct SchedulerShared {
    name: String,
    kernel: tokio::sync::Mutex<Box<dyn Kernel>>,
    info: RwLock<KernelInfo>,
    relay: Arc<EventRelay>,
    client: RwLock<KernelClient>,
    state: watch::Sender<SchedulerState>,
    running: Mutex<Option<CommandId>>,
    /// Kernels the running command is waiting on.
    waits: Mutex<Vec<Weak<SchedulerShared>>>,
}

/// Owner-facing handle to a scheduled kernel. Clones share the same kernel
/// and queues; the worker tasks stop once every clone is dropped.
#[derive(Clone)]
pub struct KernelHandle {
    shared: Arc<SchedulerShared>,
    queues: Arc<Mutex<ScopeQueues>>,
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl KernelHandle {
    /// Schedule a standalone kernel with its own event relay.
    pub fn new(kernel: impl Kernel + 'static) -> Self {
        Self::from_boxed(Box::new(kernel), None)
    }

    pub(crate) fn from_boxed(kernel: Box<dyn Kernel>, relay: Option<Arc<EventRelay>>) -> Self {
        let info = kernel.info().clone();
        let relay = relay.unwrap_or_else(|| EventRelay::new(info.name.clone()));
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            shared: Arc::new(SchedulerShared {
                name: info.name.clone(),
                kernel: tokio::sync::Mutex::new(kernel),
                info: RwLock::new(info),
                relay,
                client: RwLock::new(KernelClient::detached()),
                state,
                running: Mutex::new(None),
                waits: Mutex::new(Vec::new()),
            }),
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn info(&self) -> KernelInfo {
        self.shared
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Advertise an additional command kind, e.g. one handled by a frontend
    /// behind a proxy.
    pub fn add_supported_command(&self, kind: CommandKind) {
        self.shared
            .info
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .supported_commands
            .insert(kind);
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.shared.state.subscribe()
    }

    /// Events from this kernel; see [`EventRelay::subscribe`] for how a
    /// lagging subscriber behaves.
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.shared.relay.subscribe()
    }

    /// Submit directly to this kernel. The command's target, if set, must
    /// name this kernel.
    pub async fn send(&self, command: KernelCommand) -> KernelCommandResult {
        self.send_with_cancellation(command, CancellationToken::new())
            .await
    }

    pub async fn send_with_cancellation(
        &self,
        mut command: KernelCommand,
        cancellation: CancellationToken,
    ) -> KernelCommandResult {
        if let Some(target) = command.target_kernel_name() {
            if target != self.name() {
                let err = KernelError::KernelNotFound(target.to_string());
                return self.shared.relay.complete_unscheduled(
                    Arc::new(command),
                    Vec::new(),
                    Event::failed(err.to_string()),
                );
            }
        }
        command.set_target_if_unset(&self.shared.name);
        self.dispatch(Arc::new(command), cancellation).await
    }

    /// Fetch a value by name in its native form, or `None` if the kernel
    /// reports a failure.
    pub async fn try_request_value(&self, name: &str) -> Option<ValueProduced> {
        let result = self.send(KernelCommand::request_value(name, None)).await;
        result.value_produced().cloned()
    }

    pub(crate) fn relay(&self) -> &Arc<EventRelay> {
        &self.shared.relay
    }

    pub(crate) fn set_client(&self, client: KernelClient) {
        *self
            .shared
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner) = client;
    }

    /// Enqueue `command` and wait for its result. Enqueueing happens on the
    /// first poll, before anything is awaited, so callers that build several
    /// of these futures and join them keep submission order.
    pub(crate) async fn dispatch(
        &self,
        command: Arc<KernelCommand>,
        cancellation: CancellationToken,
    ) -> KernelCommandResult {
        let scheduled = self.record_wait().and_then(|wait| {
            let completion = self.schedule(command.clone(), cancellation)?;
            Ok((wait, completion))
        });
        let (_wait, completion) = match scheduled {
            Ok(scheduled) => scheduled,
            Err(err) => {
                debug!("kernel '{}' rejected {}: {}", self.name(), command, err);
                return self.shared.relay.complete_unscheduled(
                    command,
                    Vec::new(),
                    Event::failed(err.to_string()),
                );
            }
        };
        match completion.await {
            Ok(result) => result,
            Err(_) => {
                let err = KernelError::SchedulerStopped(self.name().to_string());
                warn!("{err}");
                self.shared.relay.complete_unscheduled(
                    command,
                    Vec::new(),
                    Event::failed(err.to_string()),
                )
            }
        }
    }

    /// Note that the kernel handling the current task, if any, now waits on
    /// this one. Fails if this kernel is already waiting on it, directly or
    /// through other kernels.
    fn record_wait(&self) -> Result<Option<WaitEdge>, KernelError> {
        let Some(issuer) = HANDLING.try_with(Weak::upgrade).ok().flatten() else {
            return Ok(None);
        };
        if Arc::ptr_eq(&issuer, &self.shared) {
            return Err(KernelError::Reentrant(self.name().to_string()));
        }
        // Record first, then look for a cycle: of two kernels racing to wait
        // on each other, at least the later one sees the other's edge.
        let edge = WaitEdge::record(issuer, &self.shared);
        if waits_on(&self.shared, &edge.from) {
            return Err(KernelError::WaitCycle {
                kernel: self.name().to_string(),
                issuer: edge.from.name.clone(),
            });
        }
        Ok(Some(edge))
    }

    fn schedule(
        &self,
        command: Arc<KernelCommand>,
        cancellation: CancellationToken,
    ) -> Result<oneshot::Receiver<KernelCommandResult>, KernelError> {
        let kind = command.kind();
        if !self.info().supports(kind) {
            return Err(KernelError::UnsupportedCommand {
                kernel: self.name().to_string(),
                kind,
            });
        }
        let running = *self
            .shared
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if running.is_some() && running == command.parent() {
            return Err(KernelError::Reentrant(self.name().to_string()));
        }

        let (completion, rx) = oneshot::channel();
        let scheduled = Scheduled {
            command,
            cancellation,
            completion,
        };
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let scope = scheduled.command.scheduling_scope().cloned();
        let queue = queues
            .entry(scope)
            .or_insert_with(|| spawn_worker(&self.shared));
        if queue.is_closed() {
            warn!("worker for kernel '{}' exited; restarting it", self.name());
            *queue = spawn_worker(&self.shared);
        }
        queue
            .send(scheduled)
            .map_err(|_| KernelError::SchedulerStopped(self.name().to_string()))?;
        Ok(rx)
    }
}

fn spawn_worker(shared: &Arc<SchedulerShared>) -> mpsc::UnboundedSender<Scheduled> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(drain_queue(shared.clone(), rx));
    tx
}

async fn drain_queue(shared: Arc<SchedulerShared>, mut queue: mpsc::UnboundedReceiver<Scheduled>) {
    while let Some(scheduled) = queue.recv().await {
        let Scheduled {
            command,
            cancellation,
            completion,
        } = scheduled;
        let result = shared.run(command, cancellation).await;
        let _ = completion.send(result);
    }
}

impl SchedulerShared {
    async fn run(
        self: &Arc<Self>,
        command: Arc<KernelCommand>,
        cancellation: CancellationToken,
    ) -> KernelCommandResult {
        if cancellation.is_cancelled() {
            return self.withdraw(command);
        }
        let mut kernel = self.kernel.lock().await;
        // Another scope may have held the kernel while this command waited.
        if cancellation.is_cancelled() {
            return self.withdraw(command);
        }

        debug!("kernel '{}' handling {}", self.name, command);
        self.state.send_replace(SchedulerState::Running);
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(command.id());

        let client = self
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let info = self
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut ctx = KernelInvocationContext::new(
            command.clone(),
            info,
            self.relay.clone(),
            client,
            cancellation,
        );
        let outcome = HANDLING
            .scope(Arc::downgrade(self), kernel.handle(&mut ctx))
            .await;
        if let Err(err) = &outcome {
            debug!("kernel '{}' failed {}: {}", self.name, command, err);
        }
        let result = ctx.complete(outcome);

        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(SchedulerState::Idle);
        result
    }

    fn waiting_on(&self) -> Vec<Arc<SchedulerShared>> {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn withdraw(&self, command: Arc<KernelCommand>) -> KernelCommandResult {
        debug!("kernel '{}' withdrew cancelled {}", self.name, command);
        self.relay.complete_unscheduled(
            command,
            Vec::new(),
            Event::cancelled(KernelError::Cancelled.to_string()),
        )
    }
}

/// `from` is blocked on a command it issued to `to`. Dropping the edge
/// removes it.
struct WaitEdge {
    from: Arc<SchedulerShared>,
    to: Weak<SchedulerShared>,
}

impl WaitEdge {
    fn record(from: Arc<SchedulerShared>, to: &Arc<SchedulerShared>) -> Self {
        let to = Arc::downgrade(to);
        from.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(to.clone());
        Self { from, to }
    }
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        let mut waits = self.from.waits.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = waits.iter().position(|w| w.ptr_eq(&self.to)) {
            waits.swap_remove(index);
        }
    }
}

/// Whether `start` transitively waits on `target`.
fn waits_on(start: &Arc<SchedulerShared>, target: &Arc<SchedulerShared>) -> bool {
    let mut seen = HashSet::new();
    let mut pending = start.waiting_on();
    while let Some(kernel) = pending.pop() {
        if Arc::ptr_eq(&kernel, target) {
            return true;
        }
        if seen.insert(Arc::as_ptr(&kernel)) {
            pending.extend(kernel.waiting_on());
        }
    }
    false
}
