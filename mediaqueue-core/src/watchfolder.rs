//! Watchfolder Scanner (spec §4.10): one independent, wall-clock-aligned
//! poll loop per active watchfolder, turning stable new files into
//! submitted tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mediaqueue_model::{Label, PathPair, Task, TaskSource, TaskStatus, Watchfolder};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::database::{PresetStore, WatchfolderStore};
use crate::error::Result;
use crate::task_service::TaskService;

enum TickOutcome {
    Continue,
    Terminate,
}

/// Per-path growth-stability tracker (§4.10 step 6): equal consecutive
/// sizes increment `attempts`; any change resets it to `(size, 1)`.
type GrowthTracker = HashMap<PathBuf, (u64, u32)>;

pub struct WatchfolderScanner {
    store: Arc<dyn WatchfolderStore>,
    presets: Arc<dyn PresetStore>,
    tasks: TaskService,
    client_labels: Vec<Label>,
}

impl WatchfolderScanner {
    pub fn new(
        store: Arc<dyn WatchfolderStore>,
        presets: Arc<dyn PresetStore>,
        tasks: TaskService,
        client_labels: Vec<Label>,
    ) -> Self {
        Self {
            store,
            presets,
            tasks,
            client_labels,
        }
    }

    /// Runs the poll loop for `folder_uuid` until the folder is deleted
    /// or `shutdown` fires. `interval` is the folder's `intervalSeconds`
    /// as known at loop start; a change to it only takes effect the next
    /// time this loop is (re)started, since `first_and_lock` needs the
    /// interval up front to compute `nextAllowed`.
    pub async fn run(&self, folder_uuid: Uuid, interval: Duration, shutdown: CancellationToken) {
        let mut growth = GrowthTracker::new();
        loop {
            if sleep_until_next_boundary(interval, &shutdown).await.is_err() {
                break;
            }

            match self.tick(folder_uuid, interval, &mut growth).await {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::Terminate) => {
                    tracing::info!(folder = %folder_uuid, "watchfolder deleted, stopping poller");
                    break;
                }
                Err(e) => {
                    tracing::warn!(folder = %folder_uuid, error = %e, "watchfolder tick failed");
                }
            }
        }
    }

    async fn tick(
        &self,
        folder_uuid: Uuid,
        interval: Duration,
        growth: &mut GrowthTracker,
    ) -> Result<TickOutcome> {
        let now = Utc::now();
        let folder = match self.store.first_and_lock(folder_uuid, interval, now).await? {
            Some(folder) => folder,
            None => {
                return if self.store.exists(folder_uuid).await? {
                    Ok(TickOutcome::Continue) // another node already advanced lastRun this interval
                } else {
                    Ok(TickOutcome::Terminate)
                };
            }
        };

        if folder.suspended {
            return Ok(TickOutcome::Continue);
        }
        if !labels_overlap(&folder.labels, &self.client_labels) {
            return Ok(TickOutcome::Continue);
        }

        let walk_result = self.walk_and_submit(&folder, growth).await;
        let error_message = walk_result.as_ref().err().map(|e| e.to_string()).unwrap_or_default();
        self.store
            .touch_last_check(folder_uuid, Utc::now(), &error_message)
            .await?;
        Ok(TickOutcome::Continue)
    }

    async fn walk_and_submit(&self, folder: &Watchfolder, growth: &mut GrowthTracker) -> Result<()> {
        let root = folder.path.clone();
        let filter = folder.filter.clone();
        let candidates = tokio::task::spawn_blocking(move || collect_candidates(&root, &filter))
            .await
            .map_err(|e| crate::error::CoreError::TransientStore(e.to_string()))??;

        for path in candidates {
            let size = match std::fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(_) => continue, // vanished between walk and stat
            };

            let ready = if folder.growth_checks == 0 {
                true
            } else {
                match growth.get_mut(&path) {
                    Some((tracked_size, attempts)) if *tracked_size == size => {
                        *attempts += 1;
                        *attempts >= folder.growth_checks
                    }
                    _ => {
                        growth.insert(path.clone(), (size, 1));
                        false
                    }
                }
            };

            if !ready {
                continue;
            }

            if let Err(e) = create_lock_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to create lock file, skipping");
                continue;
            }
            growth.remove(&path);

            if let Err(e) = self.submit_task(folder, &path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to submit watchfolder task");
            }
        }

        Ok(())
    }

    async fn submit_task(&self, folder: &Watchfolder, path: &Path) -> Result<()> {
        let preset = self.presets.get(folder.preset).await?;

        let relative_path = path
            .strip_prefix(&folder.path)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        let relative_dir = Path::new(&relative_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let metadata = serde_json::json!({
            "ffmate": {
                "watchfolder": {
                    "uuid": folder.uuid,
                    "path": path.to_string_lossy(),
                    "relativePath": relative_path,
                    "relativeDir": relative_dir,
                }
            }
        });

        let now = Utc::now();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let task = Task {
            uuid: Uuid::new_v4(),
            batch: None,
            name,
            command: preset.command,
            input_file: PathPair::new(path.to_string_lossy().into_owned()),
            output_file: preset.output_file,
            metadata,
            status: TaskStatus::Queued,
            progress: 0.0,
            remaining: -1.0,
            priority: preset.priority,
            labels: preset.labels,
            source: TaskSource::Watchfolder,
            webhooks: preset.webhooks,
            pre_processing: preset.pre_processing,
            post_processing: preset.post_processing,
            retries: preset.retries,
            retried: 0,
            error: String::new(),
            client_identifier: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };

        self.tasks.create(&task).await
    }
}

/// Plain-string overlap (§4.10 step 4, not the task glob-affinity rule):
/// an unlabeled folder applies everywhere, mirroring
/// `Task::eligible_for`'s same treatment of an unlabeled task.
fn labels_overlap(folder_labels: &[Label], client_labels: &[Label]) -> bool {
    folder_labels.is_empty() || folder_labels.iter().any(|l| client_labels.contains(l))
}

fn collect_candidates(
    root: &str,
    filter: &mediaqueue_model::FileFilter,
) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !accepts_path(path, filter) {
            continue;
        }
        candidates.push(path.to_path_buf());
    }
    Ok(candidates)
}

fn accepts_path(path: &Path, filter: &mediaqueue_model::FileFilter) -> bool {
    let basename = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if basename.starts_with('.') {
        return false;
    }
    if basename.ends_with(".lock") {
        return false;
    }
    if lock_sibling(path).exists() {
        return false;
    }
    filter.accepts(&extension_of(path))
}

fn lock_sibling(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Normalizes a file's extension to lowercase with a leading dot, or
/// the empty string if the file has none.
fn extension_of(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => String::new(),
    }
}

fn create_lock_file(path: &Path) -> std::io::Result<()> {
    let lock_path = lock_sibling(path);
    let _file = std::fs::File::create(&lock_path)?;
    set_lock_permissions(&lock_path)
}

#[cfg(unix)]
fn set_lock_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn set_lock_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Sleeps until the next wall-clock multiple of `interval`
/// (`next = truncate(now, interval) + interval`), racing against
/// `shutdown`. `Err(())` means shutdown fired first.
async fn sleep_until_next_boundary(interval: Duration, shutdown: &CancellationToken) -> std::result::Result<(), ()> {
    let interval_secs = interval.as_secs().max(1);
    let now_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let next_secs = (now_secs / interval_secs + 1) * interval_secs;
    let wait = Duration::from_secs(next_secs - now_secs);

    tokio::select! {
        _ = tokio::time::sleep(wait) => Ok(()),
        _ = shutdown.cancelled() => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaqueue_model::FileFilter;

    #[test]
    fn extension_of_normalizes_case_and_dot() {
        assert_eq!(extension_of(Path::new("/a/Clip.MP4")), ".mp4");
        assert_eq!(extension_of(Path::new("/a/noext")), "");
    }

    #[test]
    fn dotfile_and_lock_suffix_are_rejected() {
        let filter = FileFilter::default();
        assert!(!accepts_path(Path::new("/a/.hidden.mp4"), &filter));
        assert!(!accepts_path(Path::new("/a/clip.mp4.lock"), &filter));
    }

    #[test]
    fn extension_filter_is_applied() {
        let filter = FileFilter {
            include: vec![".mp4".to_string()],
            exclude: vec![],
        };
        assert!(accepts_path(Path::new("/a/clip.mp4"), &filter));
        assert!(!accepts_path(Path::new("/a/clip.mov"), &filter));
    }

    #[test]
    fn unlabeled_folder_applies_everywhere() {
        assert!(labels_overlap(&[], &[]));
        assert!(labels_overlap(&[], &[Label::new("gpu")]));
    }

    #[test]
    fn labeled_folder_requires_overlap() {
        let folder_labels = [Label::new("gpu")];
        assert!(!labels_overlap(&folder_labels, &[]));
        assert!(!labels_overlap(&folder_labels, &[Label::new("cpu")]));
        assert!(labels_overlap(&folder_labels, &[Label::new("gpu")]));
    }
}
