use std::path::PathBuf;
use futures::future::join_all;

use anyhow::Result;

use securevault_client::{
    models::{
        file::FileDescriptor,
        transfer::{DownloadVariant, FilePayload, JobId, TransferJob, TransferOutcome},
    },
    services::files as file_service,
    state::AppState,
};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn print_file(file: &FileDescriptor) {
    println!(
        "{:>6}  {:<40}  {:>10}  {:<24}  {}",
        file.id,
        file.original_name,
        format_bytes(file.size_bytes),
        file.mime_type.as_deref().unwrap_or("-"),
        file.created_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    );
}

/// Prints the outcome of a finished job. A failed job becomes an error.
fn report(job: &TransferJob) -> Result<()> {
    if let Some(digest) = &job.digest {
        println!("SHA-256 (local): {}", digest);
    }

    match (&job.result, &job.failure) {
        (Some(TransferOutcome::Uploaded(file)), _) => {
            println!(
                "Uploaded {} as file {} ({})",
                file.original_name,
                file.id,
                format_bytes(file.size_bytes)
            );
            Ok(())
        }
        (Some(TransferOutcome::Saved(saved)), _) => {
            println!(
                "Saved {} ({}) to {}",
                saved.file_name,
                format_bytes(saved.size_bytes),
                saved.path.display()
            );
            Ok(())
        }
        (None, Some(failure)) => {
            anyhow::bail!("{} failed: {}", job.request.label(), failure.reason)
        }
        (None, None) => anyhow::bail!("job {} did not finish", job.id),
    }
}

async fn run_and_report(state: &AppState, id: JobId) -> Result<()> {
    let Some(job) = state.transfers.run(id).await? else {
        return Ok(());
    };
    let reported = report(&job);
    state.transfers.discard(id).await;
    reported
}

/// Handles `upload`. Every path becomes its own job; jobs run concurrently.
pub async fn upload(state: &AppState, paths: Vec<PathBuf>) -> Result<()> {
    let mut jobs = Vec::with_capacity(paths.len());
    for path in &paths {
        let payload = FilePayload::from_path(path).await?;
        jobs.push(state.transfers.new_upload(payload).await);
    }

    let results = join_all(jobs.into_iter().map(|id| run_and_report(state, id))).await;

    let mut failed = 0;
    for result in &results {
        if let Err(e) = result {
            eprintln!("{}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, results.len());
    }
    Ok(())
}

/// Handles `download`.
pub async fn download(
    state: &AppState,
    file_id: i64,
    ciphertext: bool,
    verify: Option<PathBuf>,
) -> Result<()> {
    let id = match (verify, ciphertext) {
        (Some(local), _) => {
            let payload = FilePayload::from_path(&local).await?;
            state.transfers.new_download_verified(file_id, payload).await
        }
        (None, true) => state.transfers.new_download(file_id, DownloadVariant::Ciphertext).await,
        (None, false) => state.transfers.new_download(file_id, DownloadVariant::Decrypted).await,
    };
    run_and_report(state, id).await
}

/// Handles `decrypt`.
pub async fn decrypt(state: &AppState, path: PathBuf, key_label: String) -> Result<()> {
    let payload = FilePayload::from_path(&path).await?;
    let id = state.transfers.new_submitted_decrypt(payload, key_label).await;
    run_and_report(state, id).await
}

/// Handles `files`.
pub async fn list(state: &AppState, delete: Option<i64>, show: Option<i64>) -> Result<()> {
    if let Some(file_id) = show {
        print_file(&file_service::get(&state.client, file_id).await?);
        return Ok(());
    }

    let files = match delete {
        Some(file_id) => {
            let files = file_service::delete_and_refresh(&state.client, file_id).await?;
            println!("Deleted file {}", file_id);
            files
        }
        None => file_service::list(&state.client).await?,
    };

    if files.is_empty() {
        println!("No files");
    }
    for file in &files {
        print_file(file);
    }
    Ok(())
}

/// Handles `stats`.
pub async fn stats(state: &AppState) -> Result<()> {
    let stats = file_service::dashboard_stats(&state.client).await?;
    println!("Files:          {}", stats.total_files);
    println!("Encrypted:      {}", stats.encrypted_files);
    println!("Active keys:    {}", stats.active_keys);
    println!("Space used:     {}", stats.space_used);
    println!("Last activity:  {}", stats.last_activity);
    println!("System:         {}", stats.system_status);
    Ok(())
}
