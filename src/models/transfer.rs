use std::fmt;
use std::path::{Path, PathBuf};
use bytes::Bytes;
use uuid::Uuid;

use crate::error::{AppError, FailureKind, Result};
use crate::models::file::FileDescriptor;

/// The fallback MIME type for payloads whose type cannot be determined.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Identifies a transfer job. Random, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A file selected by the user: name, declared type and content.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl FilePayload {
    /// Creates a new `FilePayload`.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads `path` into a payload, sniffing its MIME type from the content.
    ///
    /// # Arguments
    ///
    /// * `path` - The file to read.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `FilePayload`.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Validation(format!("{} is not a file", path.display())))?;
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        tracing::debug!("📄 Loaded {} ({} bytes, {})", name, bytes.len(), mime);

        Ok(Self::new(name, mime, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Which representation of a stored file to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadVariant {
    /// The server decrypts and returns the plaintext.
    Decrypted,
    /// The raw ciphertext, as stored.
    Ciphertext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    EncryptUpload,
    DecryptDownload,
}

/// What a job does once run.
#[derive(Debug, Clone)]
pub enum TransferRequest {
    /// Submit a plaintext file for encryption and storage.
    Upload(FilePayload),
    /// Fetch a stored file by id. `local_ciphertext`, when present, is
    /// digested before the request for out-of-band comparison.
    Download {
        file_id: i64,
        variant: DownloadVariant,
        local_ciphertext: Option<FilePayload>,
    },
    /// Submit a local ciphertext with the label of the key that decrypts it.
    SubmittedDecrypt { payload: FilePayload, key_label: String },
}

impl TransferRequest {
    pub fn direction(&self) -> Direction {
        match self {
            TransferRequest::Upload(_) => Direction::EncryptUpload,
            TransferRequest::Download { .. } | TransferRequest::SubmittedDecrypt { .. } => {
                Direction::DecryptDownload
            }
        }
    }

    /// The payload digested before submission, if any.
    pub(crate) fn digest_input(&self, digest_uploads: bool) -> Option<&FilePayload> {
        match self {
            TransferRequest::Upload(payload) if digest_uploads => Some(payload),
            TransferRequest::Upload(_) => None,
            TransferRequest::Download { local_ciphertext, .. } => local_ciphertext.as_ref(),
            TransferRequest::SubmittedDecrypt { payload, .. } => Some(payload),
        }
    }

    /// A short description for logs and listings.
    pub fn label(&self) -> String {
        match self {
            TransferRequest::Upload(payload) => payload.name.clone(),
            TransferRequest::Download { file_id, variant, .. } => match variant {
                DownloadVariant::Decrypted => format!("file {}", file_id),
                DownloadVariant::Ciphertext => format!("file {} (ciphertext)", file_id),
            },
            TransferRequest::SubmittedDecrypt { payload, .. } => payload.name.clone(),
        }
    }
}

/// The lifecycle of a transfer job.
///
/// States only move forward; the single exception is `Failed -> Idle` on an
/// explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Digesting,
    InFlight,
    Succeeded,
    Failed,
}

impl JobState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Digesting)
                | (Digesting, InFlight)
                | (Digesting, Failed)
                | (InFlight, Succeeded)
                | (InFlight, Failed)
                | (Failed, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// A file written to the local download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

/// The result descriptor of a succeeded job.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Uploaded(FileDescriptor),
    Saved(SavedFile),
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl From<&AppError> for JobFailure {
    fn from(e: &AppError) -> Self {
        Self {
            kind: e.kind(),
            reason: e.to_string(),
        }
    }
}

/// A snapshot of one transfer job.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub id: JobId,
    pub direction: Direction,
    pub request: TransferRequest,
    pub state: JobState,
    /// Lowercase hex SHA-256 of the digested payload. Advisory only.
    pub digest: Option<String>,
    pub result: Option<TransferOutcome>,
    pub failure: Option<JobFailure>,
}

impl TransferJob {
    pub(crate) fn new(request: TransferRequest) -> Self {
        Self {
            id: JobId::new(),
            direction: request.direction(),
            request,
            state: JobState::Idle,
            digest: None,
            result: None,
            failure: None,
        }
    }

    /// Moves the job to `next`, rejecting illegal transitions.
    pub(crate) fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "job {} cannot move from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn succeed(&mut self, outcome: TransferOutcome) -> Result<()> {
        self.transition(JobState::Succeeded)?;
        self.result = Some(outcome);
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: &AppError) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.failure = Some(JobFailure::from(error));
        Ok(())
    }

    /// `Failed -> Idle`, dropping the failure and any digest.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.transition(JobState::Idle)?;
        self.failure = None;
        self.digest = None;
        Ok(())
    }

    /// The human-readable failure reason, if the job failed.
    pub fn error_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.reason.as_str())
    }
}

/// Published on every job state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub state: JobState,
}
