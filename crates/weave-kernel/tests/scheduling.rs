mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use helpers::{Log, RecordingKernel, entries};
use tokio_util::sync::CancellationToken;
use weave_commands::{CommandKind, KernelCommand, KernelInfo, SchedulingScope};
use weave_kernel::{
    CompositeKernel, Kernel, KernelError, KernelHandle, KernelInvocationContext, SchedulerState,
};

fn positions(log: &[String], kernel: &str) -> Vec<String> {
    log.iter()
        .filter(|entry| entry.starts_with(&format!("{kernel}:start:")))
        .map(|entry| entry.rsplit(':').next().unwrap_or_default().to_string())
        .collect()
}

fn index_of(log: &[String], entry: &str) -> usize {
    log.iter().position(|e| e == entry).unwrap()
}

#[tokio::test]
async fn kernels_interleave_but_each_keeps_submission_order() {
    let log: Log = Arc::default();
    let composite = CompositeKernel::new("root");
    composite
        .add(RecordingKernel::new("a", log.clone(), Duration::from_millis(20)))
        .unwrap();
    composite
        .add(RecordingKernel::new("b", log.clone(), Duration::from_millis(20)))
        .unwrap();

    let mut sends = Vec::new();
    for i in 1..=3 {
        for kernel in ["a", "b"] {
            sends.push(composite.send(KernelCommand::submit_code(format!("{i}")).with_target(kernel)));
        }
    }
    let results = join_all(sends).await;
    assert!(results.iter().all(|r| r.succeeded()));

    let log = entries(&log);
    assert_eq!(positions(&log, "a"), ["1", "2", "3"]);
    assert_eq!(positions(&log, "b"), ["1", "2", "3"]);
    // b started before a finished everything it was given.
    assert!(index_of(&log, "b:start:1") < index_of(&log, "a:end:3"));
}

#[tokio::test]
async fn one_command_at_a_time_per_kernel() {
    let log: Log = Arc::default();
    let kernel = KernelHandle::new(RecordingKernel::new("a", log.clone(), Duration::from_millis(5)));

    join_all((1..=4).map(|i| kernel.send(KernelCommand::submit_code(format!("{i}"))))).await;

    let log = entries(&log);
    for pair in log.chunks(2) {
        let code = pair[0].rsplit(':').next().unwrap();
        assert_eq!(pair[0], format!("a:start:{code}"));
        assert_eq!(pair[1], format!("a:end:{code}"));
    }
}

#[tokio::test]
async fn scopes_are_independent_queues() {
    let log: Log = Arc::default();
    let kernel = KernelHandle::new(RecordingKernel::new("a", log.clone(), Duration::from_millis(30)));
    let first = SchedulingScope::new("first");
    let second = SchedulingScope::new("second");

    join_all([
        kernel.send(KernelCommand::submit_code("x1").with_scope(Some(first.clone()))),
        kernel.send(KernelCommand::submit_code("x2").with_scope(Some(first))),
        kernel.send(KernelCommand::submit_code("y1").with_scope(Some(second))),
    ])
    .await;

    let log = entries(&log);
    assert!(index_of(&log, "a:start:x1") < index_of(&log, "a:start:x2"));
    // The other scope does not wait behind the whole first queue.
    assert!(index_of(&log, "a:start:y1") < index_of(&log, "a:start:x2"));
}

#[tokio::test]
async fn state_reports_running_while_handling() {
    let log: Log = Arc::default();
    let kernel = KernelHandle::new(RecordingKernel::new("a", log, Duration::ZERO));
    let mut state = kernel.watch_state();
    assert_eq!(kernel.state(), SchedulerState::Idle);

    let token = CancellationToken::new();
    let running = {
        let kernel = kernel.clone();
        let token = token.clone();
        tokio::spawn(async move {
            kernel
                .send_with_cancellation(KernelCommand::submit_code("block"), token)
                .await
        })
    };
    state
        .wait_for(|s| *s == SchedulerState::Running)
        .await
        .unwrap();
    token.cancel();
    let result = running.await.unwrap();

    assert!(result.failure().unwrap().cancelled);
    assert_eq!(kernel.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn cancelling_a_pending_command_withdraws_it() {
    let log: Log = Arc::default();
    let kernel = KernelHandle::new(RecordingKernel::new("a", log.clone(), Duration::ZERO));
    let mut state = kernel.watch_state();
    let blocker = CancellationToken::new();
    let pending = CancellationToken::new();

    let first = tokio::spawn({
        let kernel = kernel.clone();
        let blocker = blocker.clone();
        async move {
            kernel
                .send_with_cancellation(KernelCommand::submit_code("block"), blocker)
                .await
        }
    });
    state
        .wait_for(|s| *s == SchedulerState::Running)
        .await
        .unwrap();
    let second = tokio::spawn({
        let kernel = kernel.clone();
        let pending = pending.clone();
        async move {
            kernel
                .send_with_cancellation(KernelCommand::submit_code("never"), pending)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    pending.cancel();
    blocker.cancel();

    let second = second.await.unwrap();
    let failure = second.failure().unwrap();
    assert!(failure.cancelled);
    assert_eq!(failure.message, "Command cancelled.");
    assert!(first.await.unwrap().failure().unwrap().cancelled);
    assert!(!entries(&log).iter().any(|e| e.ends_with(":never")));
}

/// Asks itself for its variables while handling a submission.
struct SelfAsking {
    info: KernelInfo,
}

#[async_trait]
impl Kernel for SelfAsking {
    fn info(&self) -> &KernelInfo {
        &self.info
    }

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        if ctx.command().kind() != CommandKind::SubmitCode {
            return Ok(());
        }
        let request = KernelCommand::request_value_infos()
            .with_target("self")
            .with_parent(ctx.command().id());
        let result = ctx.client().send(request).await?;
        match result.failure_message() {
            Some(message) => Err(KernelError::Remote(message.to_string())),
            None => Ok(()),
        }
    }
}

#[tokio::test]
async fn request_to_the_busy_kernel_fails_fast() {
    let composite = CompositeKernel::new("root");
    composite
        .add(SelfAsking {
            info: KernelInfo::new("self")
                .with_commands([CommandKind::SubmitCode, CommandKind::RequestValueInfos]),
        })
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        composite.send(KernelCommand::submit_code("go")),
    )
    .await
    .expect("scheduler deadlocked");

    assert_eq!(
        result.failure_message(),
        Some("Kernel 'self' is busy with the command that issued this request.")
    );
}

#[tokio::test]
async fn results_arrive_for_every_command() {
    let log: Log = Arc::default();
    let kernel = KernelHandle::new(RecordingKernel::new("a", log, Duration::ZERO));
    let results = join_all((0..20).map(|i| kernel.send(KernelCommand::submit_code(i.to_string())))).await;

    for result in &results {
        let terminals = result.events().iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(result.succeeded());
    }
}

/// Waits until its partner is also running, then asks the partner for its
/// variables.
struct Asker {
    info: KernelInfo,
    partner: &'static str,
    both_running: Arc<tokio::sync::Barrier>,
}

#[async_trait]
impl Kernel for Asker {
    fn info(&self) -> &KernelInfo {
        &self.info
    }

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        if ctx.command().kind() != CommandKind::SubmitCode || ctx.command().parent().is_some() {
            return Ok(());
        }
        self.both_running.wait().await;
        let request = KernelCommand::request_value_infos()
            .with_target(self.partner)
            .with_parent(ctx.command().id());
        let result = ctx.client().send(request).await?;
        match result.failure_message() {
            Some(message) => Err(KernelError::Remote(message.to_string())),
            None => Ok(()),
        }
    }
}

#[tokio::test]
async fn kernels_waiting_on_each_other_fail_instead_of_hanging() {
    let composite = CompositeKernel::new("root");
    let both_running = Arc::new(tokio::sync::Barrier::new(2));
    for (name, partner) in [("left", "right"), ("right", "left")] {
        composite
            .add(Asker {
                info: KernelInfo::new(name)
                    .with_commands([CommandKind::SubmitCode, CommandKind::RequestValueInfos]),
                partner,
                both_running: both_running.clone(),
            })
            .unwrap();
    }

    let (left, right) = tokio::time::timeout(
        Duration::from_secs(5),
        async {
            tokio::join!(
                composite.send(KernelCommand::submit_code("go").with_target("left")),
                composite.send(KernelCommand::submit_code("go").with_target("right")),
            )
        },
    )
    .await
    .expect("kernels deadlocked");

    let failures: Vec<&str> = [&left, &right]
        .into_iter()
        .filter_map(|result| result.failure_message())
        .collect();
    assert!(!failures.is_empty());
    assert!(
        failures.iter().all(|m| m.ends_with("the request would deadlock.")),
        "{failures:?}"
    );

    for name in ["left", "right"] {
        let later = tokio::time::timeout(
            Duration::from_secs(5),
            composite.send(KernelCommand::request_value_infos().with_target(name)),
        )
        .await
        .expect("kernel stayed blocked");
        assert!(later.succeeded(), "{:?}", later.failure_message());
        assert_eq!(composite.kernel(name).unwrap().state(), SchedulerState::Idle);
    }
}
