mod helpers;

use helpers::{WEBVIEW_URI, loopback, script_kernel, webview};
use serde_json::json;
use weave_commands::{Command, CommandKind, Event, InputProduced, KernelCommand};
use weave_host::{HostConfig, KernelHost};
use weave_kernel::{CompositeKernel, KernelError, handler_fn};

/// Stand-in for the editor: answers prompts and accepts editable code.
fn editor() -> CompositeKernel {
    let editor = CompositeKernel::new("editor");
    editor.register_command_handler(
        CommandKind::RequestInput,
        handler_fn(|command: &KernelCommand| match command.command() {
            Command::RequestInput(request) => Ok(vec![Event::InputProduced(InputProduced {
                value: format!("answer to {}", request.prompt),
            })]),
            _ => Err(KernelError::NoReturnValue),
        }),
    );
    editor.register_command_handler(
        CommandKind::SendEditableCode,
        handler_fn(|_: &KernelCommand| Ok(Vec::new())),
    );
    editor
}

async fn frontend_host() -> KernelHost {
    let mut host = KernelHost::new(CompositeKernel::new("root"), HostConfig::default());
    host.register_connector(loopback("kernel://vscode", editor()), ["frontend"]);
    host.register_connector(loopback(WEBVIEW_URI, webview()), ["js"]);
    host.add_kernel(script_kernel("csharp", "dotnet")).unwrap();
    host.connect_frontend().await.unwrap();
    host
}

#[tokio::test]
async fn frontend_is_default_for_prompts_and_editable_code() {
    let host = frontend_host().await;
    let root = host.root();

    assert_eq!(
        root.default_target_kernel_name_for_command(CommandKind::RequestInput),
        Some("vscode".to_string())
    );
    assert_eq!(
        root.default_target_kernel_name_for_command(CommandKind::SendEditableCode),
        Some("vscode".to_string())
    );
    let result = root
        .send(KernelCommand::send_editable_code("csharp", "1+1"))
        .await;
    assert!(result.succeeded(), "{:?}", result.failure_message());
    assert_eq!(result.command().target_kernel_name(), Some("vscode"));
}

#[tokio::test]
async fn set_from_input_goes_through_the_frontend() {
    let host = frontend_host().await;
    let csharp = host.root().kernel("csharp").unwrap();

    let result = host
        .root()
        .send(KernelCommand::submit_code("#!set --name who --from-value @input:Name").with_target("csharp"))
        .await;

    assert!(result.succeeded(), "{:?}", result.failure_message());
    assert_eq!(
        csharp.try_request_value("who").await.unwrap().value,
        Some(json!("answer to Name"))
    );
}

#[tokio::test]
async fn javascript_kernel_accepts_code_and_values() {
    let host = frontend_host().await;
    let info = host.root().kernel("javascript").unwrap().info();

    for kind in [
        CommandKind::SubmitCode,
        CommandKind::RequestValue,
        CommandKind::RequestValueInfos,
        CommandKind::SendValue,
    ] {
        assert!(info.supports(kind), "{kind}");
    }
    let result = host
        .root()
        .send(KernelCommand::submit_code("\"js\" + 1").with_target("javascript"))
        .await;
    assert_eq!(result.return_value().unwrap().value, json!("js1"));
}
