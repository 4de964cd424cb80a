use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use weave_commands::value::DEFAULT_MIME_TYPE;
use weave_commands::{
    Command, CommandKind, Event, KernelInfo, ReturnValueProduced, SendValue,
    StandardOutputProduced, SubmissionType, SubmitCode, ValueInfosProduced, Value, format_value,
};

use crate::context::KernelInvocationContext;
use crate::directive::{self, DirectiveError, SubmissionNode};
use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::set_directive::{self, SET_DIRECTIVE, SetOptions, ValueSource};
use crate::value_store::{StoredValue, ValueStore};

/// Error raised by user code, reported as `kind: message`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    /// Value of a trailing expression, if any.
    pub value: Option<Value>,
    pub output: Vec<String>,
}

/// Executes one language against a kernel's variables.
#[async_trait]
pub trait ExecutionEngine: Send {
    fn language_name(&self) -> &str;

    /// Kernels with equal runtime identifiers may exchange native values.
    fn runtime(&self) -> &str;

    async fn run(&mut self, code: &str, values: &mut ValueStore) -> Result<RunOutcome, ExecutionError>;

    /// Check `code` without executing it.
    fn diagnose(&self, code: &str) -> Result<(), ExecutionError>;
}

enum Step {
    Run(String),
    Set {
        options: SetOptions,
        code: Option<String>,
    },
}

/// A kernel that executes code through an [`ExecutionEngine`], keeps a
/// variable store, and understands the `#!set` directive.
pub struct LanguageKernel<E> {
    info: KernelInfo,
    engine: E,
    values: ValueStore,
}

impl<E: ExecutionEngine> LanguageKernel<E> {
    pub fn new(name: impl Into<String>, engine: E) -> Self {
        let info = KernelInfo::new(name)
            .with_language(engine.language_name())
            .with_runtime(engine.runtime())
            .with_commands([
                CommandKind::SubmitCode,
                CommandKind::RequestValue,
                CommandKind::RequestValueInfos,
                CommandKind::SendValue,
            ]);
        Self {
            info,
            engine,
            values: ValueStore::new(),
        }
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// Turn parsed nodes into steps, rejecting bad directives before any code
    /// runs.
    fn plan(&self, nodes: Vec<SubmissionNode>) -> Result<Vec<Step>, DirectiveError> {
        let mut steps = Vec::new();
        let mut nodes = nodes.into_iter().peekable();
        while let Some(node) = nodes.next() {
            match node {
                SubmissionNode::Language(code) => steps.push(Step::Run(code)),
                SubmissionNode::Directive(d) if d.name == SET_DIRECTIVE => {
                    let options = SetOptions::parse(&d.args)?;
                    // --from-result consumes the code that follows.
                    let code = match options.source {
                        ValueSource::Result => nodes
                            .next_if(|n| matches!(n, SubmissionNode::Language(_)))
                            .and_then(|n| match n {
                                SubmissionNode::Language(code) => Some(code),
                                SubmissionNode::Directive(_) => None,
                            }),
                        _ => None,
                    };
                    steps.push(Step::Set { options, code });
                }
                // A selector naming this kernel is a no-op.
                SubmissionNode::Directive(d) if d.name == self.info.name && d.args.is_empty() => {}
                SubmissionNode::Directive(d) => {
                    return Err(DirectiveError::UnknownDirective(d.name));
                }
            }
        }
        Ok(steps)
    }

    async fn submit_code(
        &mut self,
        submit: &SubmitCode,
        ctx: &mut KernelInvocationContext,
    ) -> Result<(), KernelError> {
        let steps = self.plan(directive::parse_submission(&submit.code)?)?;
        if submit.submission_type == SubmissionType::Diagnose {
            for step in &steps {
                match step {
                    Step::Run(code) | Step::Set { code: Some(code), .. } => {
                        self.engine.diagnose(code)?
                    }
                    Step::Set { code: None, .. } => {}
                }
            }
            return Ok(());
        }

        for step in steps {
            if ctx.is_cancelled() {
                return Err(KernelError::Cancelled);
            }
            match step {
                Step::Run(code) => {
                    if let Some(value) = self.execute(&code, ctx).await? {
                        let formatted = format_value(&value, DEFAULT_MIME_TYPE)?;
                        ctx.publish(Event::ReturnValueProduced(ReturnValueProduced {
                            value,
                            formatted,
                        }));
                    }
                }
                // Bound immediately; code after the directive reads it.
                Step::Set { options, code } => self.apply_set(options, code, ctx).await?,
            }
        }
        Ok(())
    }

    async fn apply_set(
        &mut self,
        options: SetOptions,
        code: Option<String>,
        ctx: &mut KernelInvocationContext,
    ) -> Result<(), KernelError> {
        let stored = match &options.source {
            ValueSource::Result => {
                let code = code.ok_or(KernelError::NoReturnValue)?;
                let value = self
                    .execute(&code, ctx)
                    .await?
                    .ok_or(KernelError::NoReturnValue)?;
                StoredValue::native(value)
            }
            _ => set_directive::resolve_value(&options, ctx, &self.values).await?,
        };
        debug!("kernel '{}' set '{}'", self.info.name, options.name);
        self.values.set(options.name, stored);
        Ok(())
    }

    async fn execute(
        &mut self,
        code: &str,
        ctx: &mut KernelInvocationContext,
    ) -> Result<Option<Value>, KernelError> {
        let outcome = self.engine.run(code, &mut self.values).await?;
        for text in outcome.output {
            ctx.publish(Event::StandardOutputProduced(StandardOutputProduced { text }));
        }
        Ok(outcome.value)
    }

    fn send_value(&mut self, send: &SendValue) {
        let stored = match &send.value {
            Some(value) => StoredValue::native(value.clone()),
            None => StoredValue::formatted(send.formatted.clone()),
        };
        self.values.set(send.name.clone(), stored);
    }
}

#[async_trait]
impl<E: ExecutionEngine> Kernel for LanguageKernel<E> {
    fn info(&self) -> &KernelInfo {
        &self.info
    }

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        let command = ctx.command().clone();
        match command.command() {
            Command::SubmitCode(submit) => self.submit_code(submit, ctx).await,
            Command::RequestValue(request) => {
                let produced = self
                    .values
                    .produce(&request.name, request.mime_type.as_deref())?
                    .ok_or_else(|| KernelError::ValueNotFound {
                        kernel: self.info.name.clone(),
                        name: request.name.clone(),
                    })?;
                ctx.publish(Event::ValueProduced(produced));
                Ok(())
            }
            Command::RequestValueInfos(_) => {
                let infos = self.values.infos();
                ctx.publish(Event::ValueInfosProduced(ValueInfosProduced { infos }));
                Ok(())
            }
            Command::SendValue(send) => {
                self.send_value(send);
                Ok(())
            }
            other => Err(KernelError::UnsupportedCommand {
                kernel: self.info.name.clone(),
                kind: other.kind(),
            }),
        }
    }
}
