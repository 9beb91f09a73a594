//! Pre/post-processing hook execution (spec §4.5).
//!
//! Shared by the Task Executor for both the pre- and post-processing
//! steps; the two differ only in which paths the hook resolves against
//! and whether sidecar re-import is honored.

use std::io::Write as _;
use std::path::Path;

use chrono::Utc;
use mediaqueue_model::{HookRecord, Task};

use crate::error::Result;
use crate::placeholder::{self, ResolveContext};
use crate::shellwords;

/// Which paths a hook resolves its own `scriptPath`/`sidecarPath`
/// templates against (§4.5 step 2/3: the pre-hook uses the task's raw
/// paths, the post-hook uses the already-resolved ones).
pub enum HookPhase {
    Pre,
    Post,
}

/// Runs one hook (pre or post). Mutates `task.pre_processing` /
/// `task.post_processing` in place with timing and any error, and —
/// for the pre-hook with `importSidecar` set — overwrites `task` with
/// whatever the script wrote back to the sidecar file.
///
/// Returns `Ok(())` whether or not the hook itself failed; the caller
/// inspects `hook.error` to decide whether to continue the pipeline,
/// per §4.5 step 5 ("if hook.error != "", the hook fails with that
/// message" is the caller's responsibility, not this function's).
pub async fn run(task: &mut Task, phase: HookPhase, ffmpeg_path: &str) -> Result<()> {
    let hook = match phase {
        HookPhase::Pre => task.pre_processing.clone(),
        HookPhase::Post => task.post_processing.clone(),
    };
    if !hook.is_configured() {
        return Ok(());
    }

    let mut hook = hook;
    hook.started_at = Some(Utc::now());
    hook.error.clear();

    let ctx = ResolveContext {
        input_raw: match phase {
            HookPhase::Pre => &task.input_file.raw,
            HookPhase::Post => &task.input_file.resolved,
        },
        output_raw: match phase {
            HookPhase::Pre => &task.output_file.raw,
            HookPhase::Post => &task.output_file.resolved,
        },
        source: task.source.as_str(),
        metadata: &task.metadata,
        ffmpeg_path,
    };

    if !hook.sidecar_path.raw.is_empty() {
        hook.sidecar_path.resolved = placeholder::resolve(&hook.sidecar_path.raw, &ctx);
        if let Err(e) = write_sidecar(&hook.sidecar_path.resolved, task) {
            hook.error = e.to_string();
        }
    }

    if hook.error.is_empty() && !hook.script_path.raw.is_empty() {
        hook.script_path.resolved = placeholder::resolve(&hook.script_path.raw, &ctx);
        if let Err(e) = run_script(&hook.script_path.resolved).await {
            hook.error = e.to_string();
        }
    }

    let import_sidecar = hook.import_sidecar;
    if matches!(phase, HookPhase::Pre) && import_sidecar && hook.error.is_empty() {
        if let Err(e) = reimport_sidecar(&hook.sidecar_path.resolved, task) {
            hook.error = e.to_string();
        }
    }

    hook.finished_at = Some(Utc::now());

    match phase {
        HookPhase::Pre => task.pre_processing = hook,
        HookPhase::Post => task.post_processing = hook,
    }

    Ok(())
}

/// The error message carried on the active `HookRecord`, if the most
/// recently run hook failed (§4.5 step 5).
pub fn failure_message(hook: &HookRecord) -> Option<&str> {
    if hook.error.is_empty() {
        None
    } else {
        Some(&hook.error)
    }
}

fn write_sidecar(resolved_path: &str, task: &Task) -> std::io::Result<()> {
    if let Some(parent) = Path::new(resolved_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(task).map_err(std::io::Error::other)?;
    let tmp_path = format!("{resolved_path}.tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, resolved_path)?;
    Ok(())
}

fn reimport_sidecar(resolved_path: &str, task: &mut Task) -> std::io::Result<()> {
    let contents = std::fs::read(resolved_path)?;
    let imported: Task = serde_json::from_slice(&contents).map_err(std::io::Error::other)?;
    *task = imported;
    Ok(())
}

async fn run_script(resolved_path: &str) -> std::io::Result<()> {
    let argv = shellwords::split(resolved_path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let Some((program, args)) = argv.split_first() else {
        return Ok(());
    };

    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        return Err(std::io::Error::other(format!(
            "{stderr} (exit code: {code})"
        )));
    }
    Ok(())
}
