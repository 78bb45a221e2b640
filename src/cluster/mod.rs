//! Submission side: moving a rendered WaNo to a cluster and starting it.

use crate::error::{Result, WanoError};
use crate::runtime::render::{confined_join, ExecutionDescriptor, INPUTS_DIR};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const EXEC_DESCRIPTOR_FILE: &str = "wano_exec.yml";

// --- Interfaces ---

/// Connection to the machine that runs jobs. Remote paths are `/`-separated.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn mkdir(&self, remote: &str) -> Result<()>;
    /// Returns the number of bytes written.
    async fn put_file(&self, local: &Path, remote: &str) -> Result<u64>;
    async fn get_file(&self, remote: &str, local: &Path) -> Result<u64>;
    async fn list_dir(&self, remote: &str) -> Result<Vec<String>>;
    /// Starts the job described by `descriptor` in `remote_dir`; returns its id.
    async fn submit(&self, remote_dir: &str, descriptor: &ExecutionDescriptor) -> Result<String>;
    /// Returns whether a job with that id existed.
    async fn delete_job(&self, job_id: &str) -> Result<bool>;
}

// --- Directory-backed implementation ---

/// Treats a local directory as the cluster filesystem.
pub struct LocalClusterClient {
    root: PathBuf,
    connected: AtomicBool,
    // job id -> remote directory
    jobs: DashMap<String, String>,
}

impl LocalClusterClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: AtomicBool::new(false),
            jobs: DashMap::new(),
        }
    }

    pub fn job_dir(&self, job_id: &str) -> Option<String> {
        self.jobs.get(job_id).map(|dir| dir.value().clone())
    }

    fn resolve(&self, remote: &str) -> Result<PathBuf> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(WanoError::Transfer("not connected".to_string()));
        }
        let mut path = self.root.clone();
        for component in Path::new(remote.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(WanoError::Transfer(format!(
                        "remote path '{remote}' escapes the cluster root"
                    )));
                }
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl ClusterClient for LocalClusterClient {
    async fn connect(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| WanoError::io(&self.root, e))?;
        self.connected.store(true, Ordering::SeqCst);
        info!(root = %self.root.display(), "connected to local cluster");
        Ok(())
    }

    async fn mkdir(&self, remote: &str) -> Result<()> {
        let path = self.resolve(remote)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WanoError::io(&path, e))
    }

    async fn put_file(&self, local: &Path, remote: &str) -> Result<u64> {
        let path = self.resolve(remote)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WanoError::io(parent, e))?;
        }
        tokio::fs::copy(local, &path)
            .await
            .map_err(|e| WanoError::io(local, e))
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<u64> {
        let path = self.resolve(remote)?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WanoError::io(parent, e))?;
        }
        tokio::fs::copy(&path, local)
            .await
            .map_err(|e| WanoError::io(&path, e))
    }

    async fn list_dir(&self, remote: &str) -> Result<Vec<String>> {
        let path = self.resolve(remote)?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| WanoError::io(&path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WanoError::io(&path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn submit(&self, remote_dir: &str, descriptor: &ExecutionDescriptor) -> Result<String> {
        let path = self.resolve(remote_dir)?.join(EXEC_DESCRIPTOR_FILE);
        let yaml = serde_yaml::to_string(descriptor)?;
        tokio::fs::write(&path, yaml)
            .await
            .map_err(|e| WanoError::io(&path, e))?;

        let job_id = Uuid::new_v4().to_string();
        self.jobs.insert(job_id.clone(), remote_dir.to_string());
        info!(job_id = %job_id, wano = %descriptor.wano, remote_dir, "submitted job");
        Ok(job_id)
    }

    async fn delete_job(&self, job_id: &str) -> Result<bool> {
        Ok(self.jobs.remove(job_id).is_some())
    }
}

// --- Transfer tracking ---

#[derive(Debug, Clone, PartialEq)]
pub enum TransferStatus {
    InFlight,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferState {
    pub source: String,
    pub target: String,
    pub bytes: u64,
    pub status: TransferStatus,
}

/// Uploads and downloads in progress, pollable from any thread.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    transfers: DashMap<Uuid, TransferState>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: &str, target: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.transfers.insert(
            id,
            TransferState {
                source: source.to_string(),
                target: target.to_string(),
                bytes: 0,
                status: TransferStatus::InFlight,
            },
        );
        id
    }

    pub fn progress(&self, id: Uuid, bytes: u64) {
        if let Some(mut state) = self.transfers.get_mut(&id) {
            state.bytes = bytes;
        }
    }

    pub fn finish(&self, id: Uuid, bytes: u64) {
        if let Some(mut state) = self.transfers.get_mut(&id) {
            state.bytes = bytes;
            state.status = TransferStatus::Done;
        }
    }

    pub fn fail(&self, id: Uuid, message: &str) {
        if let Some(mut state) = self.transfers.get_mut(&id) {
            state.status = TransferStatus::Failed(message.to_string());
        }
    }

    pub fn get(&self, id: Uuid) -> Option<TransferState> {
        self.transfers.get(&id).map(|state| state.value().clone())
    }

    pub fn in_flight(&self) -> usize {
        self.transfers
            .iter()
            .filter(|entry| entry.value().status == TransferStatus::InFlight)
            .count()
    }

    pub fn snapshot(&self) -> Vec<(Uuid, TransferState)> {
        self.transfers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

// --- Staging ---

/// Uploads everything under `<submit_dir>/inputs` to `<remote_dir>/inputs`
/// concurrently, then submits `descriptor`. Returns the job id.
///
/// Storage-backed stage-in entries are resolved on the cluster side and are
/// not uploaded.
pub async fn stage_submission(
    client: Arc<dyn ClusterClient>,
    registry: Arc<TransferRegistry>,
    submit_dir: &Path,
    remote_dir: &str,
    descriptor: &ExecutionDescriptor,
) -> Result<String> {
    let inputs_dir = submit_dir.join(INPUTS_DIR);
    let remote_inputs = format!("{}/{}", remote_dir.trim_end_matches('/'), INPUTS_DIR);
    client.mkdir(&remote_inputs).await?;

    let files = collect_files(&inputs_dir)?;
    let mut handles = Vec::with_capacity(files.len());
    for file in files {
        let relative = file
            .strip_prefix(&inputs_dir)
            .map(remote_relative)
            .unwrap_or_default();
        let remote = format!("{remote_inputs}/{relative}");
        let id = registry.register(&file.to_string_lossy(), &remote);

        let client = client.clone();
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            match client.put_file(&file, &remote).await {
                Ok(bytes) => {
                    debug!(remote = %remote, bytes, "uploaded");
                    registry.finish(id, bytes);
                    Ok(())
                }
                Err(e) => {
                    registry.fail(id, &e.to_string());
                    Err(format!("{}: {}", remote, e))
                }
            }
        }));
    }

    let mut failures = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => failures.push(message),
            Err(e) => failures.push(format!("upload task panicked: {}", e)),
        }
    }
    if !failures.is_empty() {
        error!(count = failures.len(), "uploads failed");
        return Err(WanoError::Transfer(failures.join("; ")));
    }

    client.submit(remote_dir, descriptor).await
}

/// Downloads every `stage_out` file that exists remotely into `local_dir`.
/// Missing outputs are logged and skipped; a name pointing outside
/// `local_dir` fails the whole fetch.
pub async fn fetch_results(
    client: &dyn ClusterClient,
    registry: &TransferRegistry,
    remote_dir: &str,
    descriptor: &ExecutionDescriptor,
    local_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut fetched = Vec::new();
    for name in &descriptor.stage_out {
        let remote = format!("{}/{}", remote_dir.trim_end_matches('/'), name);
        let local = confined_join(local_dir, name, name)?;
        let id = registry.register(&remote, &local.to_string_lossy());
        match client.get_file(&remote, &local).await {
            Ok(bytes) => {
                registry.finish(id, bytes);
                fetched.push(local);
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "output not fetched");
                registry.fail(id, &e.to_string());
            }
        }
    }
    Ok(fetched)
}

fn remote_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| WanoError::io(&current, e))?;
        for entry in entries {
            let path = entry.map_err(|e| WanoError::io(&current, e))?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
