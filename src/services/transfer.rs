//! Drives encrypt-upload and decrypt-download jobs.
//!
//! Every job runs at most once: `IDLE -> DIGESTING -> IN_FLIGHT ->
//! SUCCEEDED | FAILED`. Nothing is retried; a retry is a `reset` followed by
//! another explicit `run`. Jobs are keyed by id, so concurrent jobs that
//! complete out of order never see each other's results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use reqwest::{
    Body,
    multipart::{Form, Part},
};
use tokio::sync::{RwLock, broadcast};

use crate::{
    client::{ApiClient, BinaryResponse},
    config::Config,
    crypto::digest,
    error::{AppError, Result},
    models::{
        file::FileDescriptor,
        transfer::{
            DownloadVariant, FilePayload, JobEvent, JobId, JobState, SavedFile, TransferJob,
            TransferOutcome, TransferRequest,
        },
    },
};

/// Capacity of the job event channel. Slow subscribers observe a lag error.
const EVENT_CAPACITY: usize = 256;
/// Suffixes stripped from a submitted ciphertext's name to name the plaintext.
const CIPHERTEXT_SUFFIXES: [&str; 2] = [".encrypted", ".enc"];

/// Owns all transfer jobs and runs them against the vault.
#[derive(Clone)]
pub struct TransferOrchestrator {
    client: ApiClient,
    jobs: Arc<RwLock<HashMap<JobId, TransferJob>>>,
    events: broadcast::Sender<JobEvent>,
    download_dir: PathBuf,
    digest_uploads: bool,
    max_upload_bytes: u64,
}

impl TransferOrchestrator {
    /// Creates a new `TransferOrchestrator`.
    ///
    /// # Arguments
    ///
    /// * `client` - The API client.
    /// * `config` - Supplies the download directory, the upload ceiling and
    ///   whether uploads are digested.
    pub fn new(client: ApiClient, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            events,
            download_dir: config.download_dir.clone(),
            digest_uploads: config.digest_uploads,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Subscribes to job state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    async fn create(&self, request: TransferRequest) -> JobId {
        let job = TransferJob::new(request);
        let id = job.id;
        tracing::debug!("🆕 Job {} created for {}", id, job.request.label());
        self.jobs.write().await.insert(id, job);
        self.publish(id, JobState::Idle);
        id
    }

    /// Creates an upload job for `payload`.
    pub async fn new_upload(&self, payload: FilePayload) -> JobId {
        self.create(TransferRequest::Upload(payload)).await
    }

    /// Creates a download job for a stored file.
    pub async fn new_download(&self, file_id: i64, variant: DownloadVariant) -> JobId {
        self.create(TransferRequest::Download {
            file_id,
            variant,
            local_ciphertext: None,
        })
        .await
    }

    /// Creates a decrypted download job that also digests a local copy of
    /// the ciphertext, for comparison out of band.
    pub async fn new_download_verified(&self, file_id: i64, local_ciphertext: FilePayload) -> JobId {
        self.create(TransferRequest::Download {
            file_id,
            variant: DownloadVariant::Decrypted,
            local_ciphertext: Some(local_ciphertext),
        })
        .await
    }

    /// Creates a job that submits a local ciphertext for decryption under
    /// the key labelled `key_label`.
    pub async fn new_submitted_decrypt(
        &self,
        payload: FilePayload,
        key_label: impl Into<String>,
    ) -> JobId {
        self.create(TransferRequest::SubmittedDecrypt {
            payload,
            key_label: key_label.into(),
        })
        .await
    }

    /// Returns a snapshot of a job.
    pub async fn job(&self, id: JobId) -> Option<TransferJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Drops a job. A result that arrives for it later is ignored.
    ///
    /// # Returns
    ///
    /// Whether the job existed.
    pub async fn discard(&self, id: JobId) -> bool {
        let removed = self.jobs.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!("Job {} discarded", id);
        }
        removed
    }

    /// Moves a failed job back to `IDLE` so it can be run again.
    pub async fn reset(&self, id: JobId) -> Result<()> {
        {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::InvalidState(format!("unknown job {}", id)))?;
            job.reset()?;
        }
        self.publish(id, JobState::Idle);
        Ok(())
    }

    /// Runs an `IDLE` job to completion.
    ///
    /// Transfer failures do not surface as `Err`: they leave the job `FAILED`
    /// with a reason. `Err` means the job could not be started at all.
    ///
    /// # Returns
    ///
    /// The final snapshot, or `None` if the job was discarded while running.
    pub async fn run(&self, id: JobId) -> Result<Option<TransferJob>> {
        let request = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::InvalidState(format!("unknown job {}", id)))?;
            job.transition(JobState::Digesting)?;
            job.request.clone()
        };
        self.publish(id, JobState::Digesting);
        tracing::info!("🚚 Job {} started: {}", id, request.label());

        if let Err(e) = self.check_locally(&request) {
            tracing::warn!("⚠️ Job {} rejected locally: {}", id, e);
            return self.finish(id, Err(e)).await;
        }

        let digest = match request.digest_input(self.digest_uploads) {
            Some(payload) => match digest::sha256_hex_async(payload.bytes.clone()).await {
                Ok(hex) => {
                    tracing::info!("🔎 Job {} SHA-256 of {}: {}", id, payload.name, hex);
                    Some(hex)
                }
                Err(e) => {
                    tracing::warn!("⚠️ Job {} digest unavailable: {}", id, e);
                    None
                }
            },
            None => None,
        };

        {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(&id) else {
                tracing::debug!("Job {} discarded before submission", id);
                return Ok(None);
            };
            job.digest = digest;
            job.transition(JobState::InFlight)?;
        }
        self.publish(id, JobState::InFlight);

        let outcome = self.submit(id, &request).await;
        self.finish(id, outcome).await
    }

    fn check_locally(&self, request: &TransferRequest) -> Result<()> {
        match request {
            TransferRequest::Upload(payload) => {
                if payload.is_empty() {
                    return Err(AppError::Validation(format!("{} is empty", payload.name)));
                }
                if payload.len() > self.max_upload_bytes {
                    return Err(AppError::Validation(format!(
                        "{} is {} bytes, above the {} byte limit",
                        payload.name,
                        payload.len(),
                        self.max_upload_bytes
                    )));
                }
            }
            TransferRequest::SubmittedDecrypt { payload, key_label } => {
                if payload.is_empty() {
                    return Err(AppError::Validation(format!("{} is empty", payload.name)));
                }
                if key_label.trim().is_empty() {
                    return Err(AppError::Validation("a key label is required".into()));
                }
            }
            TransferRequest::Download { .. } => {}
        }
        Ok(())
    }

    async fn submit(&self, id: JobId, request: &TransferRequest) -> Result<TransferOutcome> {
        match request {
            TransferRequest::Upload(payload) => {
                let form = Form::new().part("archivo", file_part(payload)?);
                let descriptor: FileDescriptor =
                    self.client.post_multipart("/archivos/cifrar", form).await?;
                tracing::info!(
                    "✅ Job {} stored {} as file {} ({} bytes)",
                    id,
                    descriptor.original_name,
                    descriptor.id,
                    descriptor.size_bytes
                );
                Ok(TransferOutcome::Uploaded(descriptor))
            }
            TransferRequest::Download { file_id, variant, .. } => {
                let (path, fallback) = match variant {
                    DownloadVariant::Decrypted => (
                        format!("/archivos/descifrar/{}", file_id),
                        format!("archivo_{}", file_id),
                    ),
                    DownloadVariant::Ciphertext => (
                        format!("/archivos/descargar-cifrado/{}", file_id),
                        format!("archivo_{}.encrypted", file_id),
                    ),
                };
                let response = self.client.get_binary(&path).await?;
                self.save(id, response, &fallback).await
            }
            TransferRequest::SubmittedDecrypt { payload, key_label } => {
                let form = Form::new()
                    .part("file", file_part(payload)?)
                    .text("key", key_label.trim().to_string());
                let response = self
                    .client
                    .post_multipart_binary("/archivos/desencriptar", form)
                    .await?;
                let fallback = plaintext_name(&payload.name);
                self.save(id, response, &fallback).await
            }
        }
    }

    async fn save(&self, id: JobId, response: BinaryResponse, fallback: &str) -> Result<TransferOutcome> {
        if !self.jobs.read().await.contains_key(&id) {
            return Err(AppError::InvalidState(format!("job {} was discarded", id)));
        }

        let file_name = response
            .file_name
            .as_deref()
            .and_then(sanitize_file_name)
            .or_else(|| sanitize_file_name(fallback))
            .unwrap_or_else(|| "archivo".to_string());

        let path = save_unique(&self.download_dir, &file_name, &response.bytes).await?;
        tracing::info!(
            "💾 Job {} saved {} bytes to {}",
            id,
            response.bytes.len(),
            path.display()
        );

        Ok(TransferOutcome::Saved(SavedFile {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or(file_name),
            size_bytes: response.bytes.len() as u64,
            content_type: response.content_type,
            path,
        }))
    }

    /// Records the outcome of a run, unless the job was discarded meanwhile.
    async fn finish(&self, id: JobId, outcome: Result<TransferOutcome>) -> Result<Option<TransferJob>> {
        let snapshot = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&id) {
                None => None,
                Some(job) => {
                    match &outcome {
                        Ok(result) => job.succeed(result.clone())?,
                        Err(e) => job.fail(e)?,
                    }
                    Some(job.clone())
                }
            }
        };

        let Some(job) = snapshot else {
            tracing::warn!("⚠️ Ignoring result of discarded job {}", id);
            if let Ok(TransferOutcome::Saved(saved)) = &outcome {
                if let Err(e) = tokio::fs::remove_file(&saved.path).await {
                    tracing::warn!("⚠️ Could not remove {}: {}", saved.path.display(), e);
                }
            }
            return Ok(None);
        };

        match &job.failure {
            None => tracing::info!("✅ Job {} succeeded", id),
            Some(failure) => tracing::warn!("❌ Job {} failed ({:?}): {}", id, failure.kind, failure.reason),
        }
        self.publish(id, job.state);
        Ok(Some(job))
    }

    fn publish(&self, job_id: JobId, state: JobState) {
        // No subscribers is fine.
        let _ = self.events.send(JobEvent { job_id, state });
    }
}

fn file_part(payload: &FilePayload) -> Result<Part> {
    Part::stream_with_length(Body::from(payload.bytes.clone()), payload.len())
        .file_name(payload.name.clone())
        .mime_str(&payload.mime)
        .map_err(|e| AppError::Validation(format!("invalid MIME type {:?}: {}", payload.mime, e)))
}

/// Names the plaintext of a submitted ciphertext.
fn plaintext_name(ciphertext_name: &str) -> String {
    let stripped = CIPHERTEXT_SUFFIXES
        .iter()
        .find_map(|suffix| {
            let lower = ciphertext_name.to_ascii_lowercase();
            lower
                .ends_with(suffix)
                .then(|| ciphertext_name[..ciphertext_name.len() - suffix.len()].to_string())
        })
        .unwrap_or_else(|| ciphertext_name.to_string());

    if stripped.trim().is_empty() {
        "archivo_descifrado".to_string()
    } else {
        stripped
    }
}

/// Reduces a server-supplied file name to a safe single path component.
///
/// Returns `None` when nothing usable is left.
pub(crate) fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .map(|c| match c {
            '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Returns `name` for `n == 0`, else `stem (n).ext`.
fn numbered_name(name: &str, n: u64) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

/// Claims `dir/name`, or `dir/stem (n).ext` for the first free `n`, by
/// creating it exclusively. Concurrent savers never claim the same path.
async fn claim_unique_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut n: u64 = 0;
    loop {
        let candidate = dir.join(numbered_name(name, n));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Writes `bytes` under `dir` without replacing an existing file.
///
/// The content lands in a temp file first and is renamed over the claimed
/// placeholder, so a saved file is never seen half written.
async fn save_unique(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let tmp = dir.join(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    let target = match claim_unique_path(dir, name).await {
        Ok(target) => target,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&tmp, &target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        let _ = tokio::fs::remove_file(&target).await;
        return Err(e.into());
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_a_single_component() {
        assert_eq!(sanitize_file_name("informe.pdf").as_deref(), Some("informe.pdf"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name(r"C:\temp\a.txt").as_deref(), Some("a.txt"));
        assert_eq!(sanitize_file_name("a\"b\nc.txt").as_deref(), Some("a_b_c.txt"));
        assert_eq!(sanitize_file_name(".hidden").as_deref(), Some("hidden"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);
    }

    #[test]
    fn plaintext_name_strips_ciphertext_suffix() {
        assert_eq!(plaintext_name("foto.png.encrypted"), "foto.png");
        assert_eq!(plaintext_name("foto.png.ENC"), "foto.png");
        assert_eq!(plaintext_name("notas.txt"), "notas.txt");
        assert_eq!(plaintext_name(".enc"), "archivo_descifrado");
    }

    #[tokio::test]
    async fn saving_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();

        let first = save_unique(dir.path(), "a.txt", b"one").await.unwrap();
        let second = save_unique(dir.path(), "a.txt", b"two").await.unwrap();
        let third = save_unique(dir.path(), "a.txt", b"three").await.unwrap();
        let bare = save_unique(dir.path(), "archivo_7", b"x").await.unwrap();
        let bare_again = save_unique(dir.path(), "archivo_7", b"y").await.unwrap();

        assert_eq!(first.file_name().unwrap(), "a.txt");
        assert_eq!(second.file_name().unwrap(), "a (1).txt");
        assert_eq!(third.file_name().unwrap(), "a (2).txt");
        assert_eq!(bare_again.file_name().unwrap(), "archivo_7 (1)");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert!(bare.exists());

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_under_one_name_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let path = path.clone();
                tokio::spawn(async move {
                    let content = format!("job {}", i);
                    let saved = save_unique(&path, "same.txt", content.as_bytes()).await.unwrap();
                    (saved, content)
                })
            })
            .collect();

        let mut paths = std::collections::HashSet::new();
        for handle in handles {
            let (saved, content) = handle.await.unwrap();
            assert_eq!(std::fs::read_to_string(&saved).unwrap(), content);
            assert!(paths.insert(saved));
        }
        assert_eq!(paths.len(), 24);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 24);
    }
}
