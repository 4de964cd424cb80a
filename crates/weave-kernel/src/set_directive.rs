//! `#!set`: bind a variable from a literal, another kernel's value, user
//! input, or the return value of the code that follows the directive.

use log::debug;
use weave_commands::{CommandKind, InputType, KernelCommand, Value};

use crate::context::KernelInvocationContext;
use crate::directive::DirectiveError;
use crate::error::KernelError;
use crate::value_store::{StoredValue, ValueStore};

pub const SET_DIRECTIVE: &str = "set";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// `--from-result`: the return value of the following code.
    Result,
    /// `--from-value text`
    Literal(String),
    /// `--from-value @kernel:name` or `@name`.
    Reference { kernel: Option<String>, name: String },
    /// `--from-value @input:prompt` or `@password:prompt`.
    Input { prompt: String, input_type: InputType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    pub name: String,
    pub source: ValueSource,
    pub mime_type: Option<String>,
}

impl SetOptions {
    pub fn parse(args: &[String]) -> Result<Self, DirectiveError> {
        let mut name = None;
        let mut from_result = false;
        let mut from_value = None;
        let mut mime_type = None;

        let mut args = args.iter();
        while let Some(option) = args.next() {
            match option.as_str() {
                "--name" => name = Some(required(option, args.next())?),
                "--from-result" => from_result = true,
                "--from-value" => from_value = Some(required(option, args.next())?),
                "--mime-type" => mime_type = Some(required(option, args.next())?),
                _ => {
                    return Err(DirectiveError::UnknownOption {
                        directive: SET_DIRECTIVE.to_string(),
                        option: option.clone(),
                    });
                }
            }
        }

        let source = match (from_result, from_value) {
            (true, Some(_)) => return Err(DirectiveError::ConflictingSources),
            (false, None) => return Err(DirectiveError::MissingSource),
            (true, None) => ValueSource::Result,
            (false, Some(raw)) => parse_value_source(&raw)?,
        };
        let name = name.ok_or(DirectiveError::MissingName)?;
        Ok(Self {
            name,
            source,
            mime_type,
        })
    }
}

const OPTIONS: [&str; 4] = ["--name", "--from-result", "--from-value", "--mime-type"];

/// The argument after `option`. Another option name in that position means
/// the argument was left out; any other text, dashes included, is the value.
fn required(option: &str, value: Option<&String>) -> Result<String, DirectiveError> {
    value
        .filter(|v| !OPTIONS.contains(&v.as_str()))
        .cloned()
        .ok_or_else(|| DirectiveError::MissingArgument(option.to_string()))
}

pub fn parse_value_source(raw: &str) -> Result<ValueSource, DirectiveError> {
    let Some(reference) = raw.strip_prefix('@') else {
        return Ok(ValueSource::Literal(raw.to_string()));
    };
    let invalid = || DirectiveError::InvalidReference(raw.to_string());
    match reference.split_once(':') {
        Some(("input", prompt)) => Ok(ValueSource::Input {
            prompt: prompt.to_string(),
            input_type: InputType::Text,
        }),
        Some(("password", prompt)) => Ok(ValueSource::Input {
            prompt: prompt.to_string(),
            input_type: InputType::Password,
        }),
        Some((_, "")) => Err(invalid()),
        Some((kernel, name)) => Ok(ValueSource::Reference {
            kernel: (!kernel.is_empty()).then(|| kernel.to_string()),
            name: name.to_string(),
        }),
        None if reference.is_empty() => Err(invalid()),
        None => Ok(ValueSource::Reference {
            kernel: None,
            name: reference.to_string(),
        }),
    }
}

/// Produce the value for every source except [`ValueSource::Result`], which
/// needs the kernel's engine. Nothing is bound here, so a failure leaves the
/// store untouched.
pub(crate) async fn resolve_value(
    options: &SetOptions,
    ctx: &mut KernelInvocationContext,
    local: &ValueStore,
) -> Result<StoredValue, KernelError> {
    match &options.source {
        ValueSource::Result => Err(KernelError::NoReturnValue),
        ValueSource::Literal(text) => Ok(StoredValue::native(Value::String(text.clone()))),
        ValueSource::Input { prompt, input_type } => request_input(ctx, prompt, *input_type).await,
        ValueSource::Reference { kernel, name } => {
            let kernel = kernel
                .clone()
                .or_else(|| ctx.client().default_target_for(CommandKind::RequestInput));
            if kernel.as_deref() == Some(ctx.kernel_name()) {
                return local.get(name).cloned().ok_or_else(|| KernelError::ValueNotFound {
                    kernel: ctx.kernel_name().to_string(),
                    name: name.clone(),
                });
            }
            request_value(ctx, kernel, name, options.mime_type.as_deref()).await
        }
    }
}

async fn request_input(
    ctx: &mut KernelInvocationContext,
    prompt: &str,
    input_type: InputType,
) -> Result<StoredValue, KernelError> {
    let request = KernelCommand::request_input(prompt, input_type).with_parent(ctx.command().id());
    let result = ctx
        .client()
        .send_with_cancellation(request, ctx.cancellation().child_token())
        .await?;
    if let Some(message) = result.failure_message() {
        return Err(KernelError::Remote(message.to_string()));
    }
    let input = result.input_produced().ok_or(KernelError::InputNotProduced)?;
    Ok(StoredValue::native(Value::String(input.to_string())))
}

async fn request_value(
    ctx: &mut KernelInvocationContext,
    kernel: Option<String>,
    name: &str,
    mime_type: Option<&str>,
) -> Result<StoredValue, KernelError> {
    let mut request = KernelCommand::request_value(name, mime_type.map(str::to_string))
        .with_parent(ctx.command().id());
    if let Some(kernel) = kernel {
        request = request.with_target(kernel);
    }
    let result = ctx
        .client()
        .send_with_cancellation(request, ctx.cancellation().child_token())
        .await?;
    if let Some(message) = result.failure_message() {
        return Err(KernelError::Remote(message.to_string()));
    }
    let source = result.command().target_kernel_name().unwrap_or_default().to_string();
    let produced = result
        .value_produced()
        .cloned()
        .ok_or_else(|| KernelError::ValueNotFound {
            kernel: source.clone(),
            name: name.to_string(),
        })?;

    if mime_type.is_some() {
        return Ok(StoredValue::formatted(produced.formatted));
    }
    let same_runtime = ctx
        .client()
        .kernel_info(&source)
        .is_some_and(|info| ctx.kernel_info().shares_runtime_with(&info));
    match produced.value {
        Some(value) if same_runtime => Ok(StoredValue::native(value)),
        // Across runtimes only the formatted string is usable.
        _ => {
            debug!(
                "kernel '{}' binding '{}' from '{}' as {}",
                ctx.kernel_name(),
                name,
                source,
                produced.formatted.mime_type
            );
            Ok(StoredValue::formatted(produced.formatted))
        }
    }
}
