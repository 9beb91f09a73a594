//! Task Executor pipeline (spec §4.4): pre-hook, placeholder resolution,
//! `mkdir -p`, the FFmpeg Runner, post-hook, and finalization, all behind
//! one entry point the Scheduler spawns per claimed task.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use mediaqueue_model::{Task, TaskStatus};
use tokio_util::sync::CancellationToken;

use crate::cancellation::CancellationRegistry;
use crate::error::{CoreError, Result};
use crate::ffmpeg::{self, Progress};
use crate::hooks::{self, HookPhase};
use crate::placeholder::{self, ResolveContext};
use crate::task_service::TaskService;

#[derive(Clone)]
pub struct ExecutorContext {
    pub tasks: TaskService,
    pub cancellation: Arc<CancellationRegistry>,
    pub ffmpeg_path: String,
}

/// Runs one claimed task end to end. The scheduler has already
/// transitioned it to `RUNNING` in the store and registered its
/// cancellation token before spawning this.
pub async fn execute(mut task: Task, ctx: ExecutorContext) {
    let token = ctx.cancellation.register(task.uuid);
    let result = run_pipeline(&mut task, &ctx, &token).await;
    ctx.cancellation.unregister(&task.uuid);

    if let Err(e) = result {
        tracing::error!(task = %task.uuid, error = %e, "task pipeline exited with an unreported error");
    }
}

async fn run_pipeline(task: &mut Task, ctx: &ExecutorContext, token: &CancellationToken) -> Result<()> {
    task.started_at = Some(Utc::now());

    if task.pre_processing.is_configured() {
        task.status = TaskStatus::PreProcessing;
        ctx.tasks.update(task).await?;

        hooks::run(task, HookPhase::Pre, &ctx.ffmpeg_path).await?;
        if let Some(message) = hooks::failure_message(&task.pre_processing).map(str::to_string) {
            return fail(task, ctx, format!("pre-processing: {message}")).await;
        }
    }

    let resolve_ctx = ResolveContext {
        input_raw: &task.input_file.raw,
        output_raw: &task.output_file.raw,
        source: task.source.as_str(),
        metadata: &task.metadata,
        ffmpeg_path: &ctx.ffmpeg_path,
    };
    task.input_file.resolved = placeholder::resolve(&task.input_file.raw, &resolve_ctx);
    task.output_file.resolved = placeholder::resolve(&task.output_file.raw, &resolve_ctx);
    task.command.resolved = placeholder::resolve(&task.command.raw, &resolve_ctx);
    task.status = TaskStatus::Running;
    ctx.tasks.update(task).await?;

    if let Some(parent) = Path::new(&task.output_file.resolved).parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return fail(task, ctx, format!("mkdir -p failed: {e}")).await;
        }
    }

    let run_result = {
        let command = task.command.resolved.clone();
        let ffmpeg_path = ctx.ffmpeg_path.clone();

        // Progress lines arrive synchronously off the stderr reader in
        // `ffmpeg::run`; hop them onto an unbounded channel so a single
        // consumer task persists each one in arrival order without
        // blocking the reader on a store round-trip.
        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<Progress>();
        let consumer = {
            let tasks = ctx.tasks.clone();
            let mut snapshot = task.clone();
            tokio::spawn(async move {
                while let Some(p) = progress_rx.recv().await {
                    snapshot.progress = p.progress;
                    snapshot.remaining = p.remaining;
                    let _ = tasks.update(&mut snapshot).await;
                }
            })
        };

        let progress_result = ffmpeg::run(&ffmpeg_path, &command, token, move |p: Progress| {
            let _ = progress_tx.send(p);
        })
        .await;

        // `progress_tx` was owned by the closure passed to `ffmpeg::run`
        // and is dropped along with it here, which ends the consumer's
        // `recv()` loop.
        let _ = consumer.await;
        progress_result
    };

    match run_result {
        Ok(()) => {
            task.progress = 100.0;
            task.remaining = -1.0;
        }
        Err(CoreError::Cancelled(cause)) => {
            task.status = TaskStatus::DoneCanceled;
            task.progress = 100.0;
            task.remaining = -1.0;
            task.error = cause;
            task.finished_at = Some(Utc::now());
            return ctx.tasks.update(task).await;
        }
        Err(e) => {
            return fail(task, ctx, e.to_string()).await;
        }
    }

    if task.post_processing.is_configured() {
        task.status = TaskStatus::PostProcessing;
        ctx.tasks.update(task).await?;

        hooks::run(task, HookPhase::Post, &ctx.ffmpeg_path).await?;
        if let Some(message) = hooks::failure_message(&task.post_processing).map(str::to_string) {
            return fail(task, ctx, format!("post-processing: {message}")).await;
        }
    }

    task.finished_at = Some(Utc::now());
    task.status = TaskStatus::DoneSuccessful;
    ctx.tasks.update(task).await
}

/// §4.4 *fail* path: terminal `DONE_ERROR`, or a requeue back to
/// `QUEUED` while the task still has retry budget (Open Question 2).
async fn fail(task: &mut Task, ctx: &ExecutorContext, message: String) -> Result<()> {
    task.error = message;
    task.progress = 100.0;
    task.finished_at = Some(Utc::now());

    if task.retries > 0 && task.retried < task.retries {
        task.retried += 1;
        task.status = TaskStatus::Queued;
        task.error.clear();
        task.finished_at = None;
        task.remaining = -1.0;
    } else {
        task.status = TaskStatus::DoneError;
        task.remaining = -1.0;
    }

    ctx.tasks.update(task).await
}
