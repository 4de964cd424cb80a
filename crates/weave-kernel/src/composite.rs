//! Composite kernels: named children behind one routing surface.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use log::debug;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use weave_commands::{
    Command, CommandKind, Event, KernelCommand, KernelCommandResult, KernelEvent, KernelInfo,
    SubmissionType, SubmitCode, ValueProduced,
};

use crate::context::KernelClient;
use crate::directive::{self, KernelSection};
use crate::error::KernelError;
use crate::handler::{CommandHandler, HandlerKernel, HandlerTable};
use crate::kernel::Kernel;
use crate::relay::EventRelay;
use crate::scheduler::KernelHandle;

#[derive(Clone)]
enum ChildKernel {
    Leaf(KernelHandle),
    Composite(CompositeKernel),
}

impl ChildKernel {
    fn info(&self) -> KernelInfo {
        match self {
            ChildKernel::Leaf(handle) => handle.info(),
            ChildKernel::Composite(composite) => composite.info(),
        }
    }
}

enum Route {
    Child(ChildKernel),
    Local,
}

pub(crate) struct RouterShared {
    name: String,
    children: RwLock<IndexMap<String, ChildKernel>>,
    default_targets: RwLock<HashMap<CommandKind, String>>,
    handlers: HandlerTable,
    local: KernelHandle,
    relay: Arc<EventRelay>,
    parent: RwLock<Weak<RouterShared>>,
}

/// Owns child kernels and routes each command to exactly one of them, or to
/// a handler registered on the composite itself.
///
/// Resolution order: explicit target, the default-target table, a local
/// handler for the command kind, then the sole child if there is only one.
#[derive(Clone)]
pub struct CompositeKernel {
    shared: Arc<RouterShared>,
}

impl CompositeKernel {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let relay = EventRelay::new(name.clone());
        let handlers: HandlerTable = Arc::default();
        let shared = Arc::new_cyclic(|router: &Weak<RouterShared>| {
            let local = KernelHandle::from_boxed(
                Box::new(HandlerKernel::new(&name, handlers.clone())),
                Some(relay.clone()),
            );
            local.set_client(KernelClient::attached(router.clone()));
            RouterShared {
                name,
                children: RwLock::new(IndexMap::new()),
                default_targets: RwLock::new(HashMap::new()),
                handlers,
                local,
                relay,
                parent: RwLock::new(Weak::new()),
            }
        });
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Union of the children's capabilities and the local handlers.
    pub fn info(&self) -> KernelInfo {
        self.shared.info()
    }

    /// Schedule `kernel` as a child. Its events are republished on this
    /// composite's relay and its client routes through this composite.
    pub fn add(&self, kernel: impl Kernel + 'static) -> Result<KernelHandle, KernelError> {
        let name = kernel.info().name.clone();
        self.ensure_available(&name)?;
        let handle = KernelHandle::from_boxed(Box::new(kernel), None);
        handle.relay().attach(self.shared.relay.clone());
        handle.set_client(KernelClient::attached(Arc::downgrade(&self.shared)));
        self.insert_child(name, ChildKernel::Leaf(handle.clone()));
        Ok(handle)
    }

    /// Nest another composite. Its children become reachable by name through
    /// this one, and targets it cannot resolve are delegated here.
    pub fn add_composite(&self, child: CompositeKernel) -> Result<(), KernelError> {
        let name = child.name().to_string();
        self.ensure_available(&name)?;
        {
            let mut parent = child
                .shared
                .parent
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if parent.upgrade().is_some() || !child.shared.relay.attach(self.shared.relay.clone())
            {
                return Err(KernelError::AlreadyAttached(name));
            }
            *parent = Arc::downgrade(&self.shared);
        }
        self.insert_child(name, ChildKernel::Composite(child));
        Ok(())
    }

    /// Handle to a leaf kernel anywhere below this composite.
    pub fn kernel(&self, name: &str) -> Option<KernelHandle> {
        self.shared.find_leaf(name)
    }

    pub fn child_names(&self) -> Vec<String> {
        self.shared.children().keys().cloned().collect()
    }

    pub fn set_default_target_kernel_name_for_command(
        &self,
        kind: CommandKind,
        kernel_name: impl Into<String>,
    ) {
        self.shared
            .default_targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, kernel_name.into());
    }

    pub fn default_target_kernel_name_for_command(&self, kind: CommandKind) -> Option<String> {
        self.shared.default_target(kind)
    }

    /// Handle `kind` on the composite itself. Replaces any earlier handler
    /// for the same kind.
    pub fn register_command_handler(&self, kind: CommandKind, handler: impl CommandHandler + 'static) {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(handler));
        self.shared.local.add_supported_command(kind);
    }

    /// Events from this kernel; see [`EventRelay::subscribe`] for how a
    /// lagging subscriber behaves.
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.shared.relay.subscribe()
    }

    pub async fn send(&self, command: KernelCommand) -> KernelCommandResult {
        self.send_with_cancellation(command, CancellationToken::new())
            .await
    }

    pub async fn send_with_cancellation(
        &self,
        command: KernelCommand,
        cancellation: CancellationToken,
    ) -> KernelCommandResult {
        self.shared.clone().route(command, cancellation, false).await
    }

    /// Fetch a value from the named kernel in its native form.
    pub async fn try_request_value(&self, kernel_name: &str, name: &str) -> Option<ValueProduced> {
        let command = KernelCommand::request_value(name, None).with_target(kernel_name);
        self.send(command).await.value_produced().cloned()
    }

    fn ensure_available(&self, name: &str) -> Result<(), KernelError> {
        if name == self.shared.name || self.shared.children().contains_key(name) {
            return Err(KernelError::DuplicateKernel(name.to_string()));
        }
        Ok(())
    }

    fn insert_child(&self, name: String, child: ChildKernel) {
        debug!("composite '{}' registered kernel '{}'", self.shared.name, name);
        self.shared
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, child);
    }
}

impl RouterShared {
    fn children(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, ChildKernel>> {
        self.children.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn parent(&self) -> Option<Arc<RouterShared>> {
        self.parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    fn has_handler(&self, kind: CommandKind) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
    }

    fn default_target(&self, kind: CommandKind) -> Option<String> {
        self.default_targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    pub(crate) fn inherited_default_target(&self, kind: CommandKind) -> Option<String> {
        self.default_target(kind)
            .or_else(|| self.parent()?.inherited_default_target(kind))
    }

    fn info(&self) -> KernelInfo {
        let mut info = self.local.info();
        for child in self.children().values() {
            info.supported_commands
                .extend(child.info().supported_commands);
        }
        info
    }

    fn contains(&self, name: &str) -> bool {
        self.children().iter().any(|(child_name, child)| {
            child_name == name
                || matches!(child, ChildKernel::Composite(c) if c.shared.contains(name))
        })
    }

    fn find_leaf(&self, name: &str) -> Option<KernelHandle> {
        self.children().values().find_map(|child| match child {
            ChildKernel::Leaf(handle) if handle.name() == name => Some(handle.clone()),
            ChildKernel::Leaf(_) => None,
            ChildKernel::Composite(c) => c.shared.find_leaf(name),
        })
    }

    /// Describe a kernel reachable from this composite, searching below it
    /// first and then up through its ancestors.
    pub(crate) fn find_info(&self, name: &str) -> Option<KernelInfo> {
        self.find_info_below(name)
            .or_else(|| self.parent()?.find_info(name))
    }

    fn find_info_below(&self, name: &str) -> Option<KernelInfo> {
        if name == self.name {
            return Some(self.info());
        }
        self.children().values().find_map(|child| match child {
            ChildKernel::Leaf(handle) if handle.name() == name => Some(handle.info()),
            ChildKernel::Leaf(_) => None,
            ChildKernel::Composite(c) => c.shared.find_info_below(name),
        })
    }

    /// The direct child through which `name` is reachable.
    fn route_to(&self, name: &str) -> Option<Route> {
        let children = self.children();
        if let Some(child) = children.get(name) {
            return Some(Route::Child(child.clone()));
        }
        children
            .values()
            .find(|child| matches!(child, ChildKernel::Composite(c) if c.shared.contains(name)))
            .map(|child| Route::Child(child.clone()))
    }

    fn resolve(&self, command: &KernelCommand) -> Result<Route, KernelError> {
        let kind = command.kind();
        if let Some(target) = command.target_kernel_name() {
            if target != self.name {
                return self
                    .route_to(target)
                    .ok_or_else(|| KernelError::KernelNotFound(target.to_string()));
            }
            if self.has_handler(kind) {
                return Ok(Route::Local);
            }
            // Addressed to this composite without a local handler: pick a
            // child as if no target had been given.
        }
        if let Some(default) = self.default_target(kind) {
            if default == self.name {
                return Ok(Route::Local);
            }
            return self
                .route_to(&default)
                .ok_or(KernelError::KernelNotFound(default));
        }
        if self.has_handler(kind) {
            return Ok(Route::Local);
        }
        let children = self.children();
        match children.len() {
            1 => Ok(Route::Child(children[0].clone())),
            _ => Err(KernelError::NoTargetKernel(kind)),
        }
    }

    /// Route `command` to one kernel. With `delegate` set, targets this
    /// composite cannot resolve are retried by the parent composite.
    pub(crate) fn route(
        self: Arc<Self>,
        command: KernelCommand,
        cancellation: CancellationToken,
        delegate: bool,
    ) -> BoxFuture<'static, KernelCommandResult> {
        Box::pin(async move {
            if let Some(sections) = self.selector_sections(&command) {
                return self.route_sections(command, sections, cancellation).await;
            }
            match self.resolve(&command) {
                Ok(route) => self.dispatch(route, command, cancellation).await,
                Err(err) => {
                    let unresolved = matches!(
                        err,
                        KernelError::KernelNotFound(_) | KernelError::NoTargetKernel(_)
                    );
                    if delegate && unresolved {
                        if let Some(parent) = self.parent() {
                            return parent.route(command, cancellation, true).await;
                        }
                    }
                    debug!("composite '{}' could not route {}: {}", self.name, command, err);
                    self.relay.complete_unscheduled(
                        Arc::new(command),
                        Vec::new(),
                        Event::failed(err.to_string()),
                    )
                }
            }
        })
    }

    async fn dispatch(
        self: Arc<Self>,
        route: Route,
        mut command: KernelCommand,
        cancellation: CancellationToken,
    ) -> KernelCommandResult {
        match route {
            Route::Local => {
                command.set_target_if_unset(&self.name);
                self.local.dispatch(Arc::new(command), cancellation).await
            }
            Route::Child(ChildKernel::Leaf(handle)) => {
                command.set_target_if_unset(handle.name());
                handle.dispatch(Arc::new(command), cancellation).await
            }
            Route::Child(ChildKernel::Composite(child)) => {
                let kind = command.kind();
                if !child.info().supports(kind) {
                    let err = KernelError::UnsupportedCommand {
                        kernel: child.name().to_string(),
                        kind,
                    };
                    return self.relay.complete_unscheduled(
                        Arc::new(command),
                        Vec::new(),
                        Event::failed(err.to_string()),
                    );
                }
                command.set_target_if_unset(child.name());
                child
                    .shared
                    .clone()
                    .route(command, cancellation, false)
                    .await
            }
        }
    }

    /// Split untargeted code on `#!<kernel>` selector lines.
    fn selector_sections(&self, command: &KernelCommand) -> Option<Vec<KernelSection>> {
        let Command::SubmitCode(submit) = command.command() else {
            return None;
        };
        match command.target_kernel_name() {
            Some(target) if target != self.name => return None,
            _ => {}
        }
        directive::split_by_kernel(&submit.code, |name| name != self.name && self.contains(name))
    }

    /// Run each section as its own sub-command, in order, stopping at the
    /// first failure.
    async fn route_sections(
        self: Arc<Self>,
        command: KernelCommand,
        sections: Vec<KernelSection>,
        cancellation: CancellationToken,
    ) -> KernelCommandResult {
        let submission_type = match command.command() {
            Command::SubmitCode(submit) => submit.submission_type,
            _ => SubmissionType::Run,
        };
        let parent = Arc::new(command);
        let mut events = Vec::new();
        for section in sections {
            let mut sub = KernelCommand::new(Command::SubmitCode(SubmitCode {
                code: section.code,
                submission_type,
            }))
            .with_parent(parent.id())
            .with_scope(parent.scheduling_scope().cloned());
            if let Some(kernel_name) = section.kernel_name {
                sub = sub.with_target(kernel_name);
            }
            let result = self
                .clone()
                .route(sub, cancellation.clone(), false)
                .await;
            let failure = result.failure().cloned();
            events.extend(result.into_events().into_iter().filter(|e| !e.is_terminal()));
            if let Some(failure) = failure {
                let terminal = if failure.cancelled {
                    Event::cancelled(failure.message)
                } else {
                    Event::failed(failure.message)
                };
                return self.relay.complete_unscheduled(parent, events, terminal);
            }
        }
        self.relay
            .complete_unscheduled(parent, events, Event::CommandSucceeded)
    }
}
