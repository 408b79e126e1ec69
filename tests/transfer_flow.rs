mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use common::{Harness, serve, token};
use securevault_client::{
    crypto::digest::sha256_hex,
    error::{AppError, FailureKind},
    models::{
        session::SessionState,
        transfer::{DownloadVariant, FilePayload, JobEvent, JobState, TransferOutcome},
    },
};

const TEN_MB: usize = 10 * 1024 * 1024;

/// Mimics `POST /archivos/cifrar`: reads the `archivo` field and describes it.
/// Files named `slow*` are answered after a delay.
async fn encrypt_upload(mut multipart: Multipart) -> impl IntoResponse {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() != Some("archivo") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let mime = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();

        if name.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }

        let id = if name.starts_with("slow") { 1 } else { 2 };
        return (
            StatusCode::CREATED,
            Json(json!({
                "id": id,
                "nombre_original": name,
                "tipo_mime": mime,
                "tamano_bytes": data.len(),
                "creado_en": "2024-05-01T10:20:30.123456"
            })),
        );
    }

    (StatusCode::BAD_REQUEST, Json(json!({"mensaje": "Falta archivo"})))
}

fn upload_router() -> Router {
    Router::new()
        .route("/api/archivos/cifrar", post(encrypt_upload))
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
}

fn user_token() -> String {
    token("5", &["USER"], 3600)
}

#[tokio::test]
async fn ten_megabyte_upload_succeeds_with_server_descriptor() {
    let harness = Harness::logged_in(&serve(upload_router()).await, &user_token());
    let transfers = &harness.state.transfers;
    let mut events = transfers.subscribe();

    let payload = FilePayload::new("informe.bin", "application/octet-stream", vec![7u8; TEN_MB]);
    let id = transfers.new_upload(payload).await;
    let job = transfers.run(id).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert!(job.failure.is_none());
    match job.result {
        Some(TransferOutcome::Uploaded(descriptor)) => {
            assert_eq!(descriptor.id, 2);
            assert_eq!(descriptor.size_bytes, 10_485_760);
            assert_eq!(descriptor.original_name, "informe.bin");
            assert_eq!(descriptor.mime_type.as_deref(), Some("application/octet-stream"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let mut states = Vec::new();
    while let Ok(JobEvent { job_id, state }) = events.try_recv() {
        assert_eq!(job_id, id);
        states.push(state);
    }
    assert_eq!(
        states,
        vec![JobState::Idle, JobState::Digesting, JobState::InFlight, JobState::Succeeded]
    );
}

#[tokio::test]
async fn concurrent_uploads_keep_their_own_results() {
    let harness = Harness::logged_in(&serve(upload_router()).await, &user_token());
    let transfers = &harness.state.transfers;

    let slow = transfers
        .new_upload(FilePayload::new("slow.txt", "text/plain", "first"))
        .await;
    let fast = transfers
        .new_upload(FilePayload::new("fast.txt", "text/plain", "second!"))
        .await;

    let (slow_job, fast_job) = tokio::join!(transfers.run(slow), transfers.run(fast));
    let slow_job = slow_job.unwrap().unwrap();
    let fast_job = fast_job.unwrap().unwrap();

    let descriptor = |outcome: Option<TransferOutcome>| match outcome {
        Some(TransferOutcome::Uploaded(descriptor)) => descriptor,
        other => panic!("unexpected result: {:?}", other),
    };

    let slow_descriptor = descriptor(slow_job.result);
    let fast_descriptor = descriptor(fast_job.result);
    assert_eq!((slow_descriptor.id, slow_descriptor.original_name.as_str()), (1, "slow.txt"));
    assert_eq!(slow_descriptor.size_bytes, 5);
    assert_eq!((fast_descriptor.id, fast_descriptor.original_name.as_str()), (2, "fast.txt"));
    assert_eq!(fast_descriptor.size_bytes, 7);
}

#[tokio::test]
async fn empty_or_oversized_uploads_fail_without_a_request() {
    let hits = Arc::new(Mutex::new(0usize));
    let counter = hits.clone();
    let router = Router::new().route(
        "/api/archivos/cifrar",
        post(move || {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                StatusCode::CREATED
            }
        }),
    );

    let harness = Harness::with_config(&serve(router).await, |config| {
        config.max_upload_bytes = 4;
    });
    let transfers = &harness.state.transfers;

    for payload in [
        FilePayload::new("empty.txt", "text/plain", Vec::new()),
        FilePayload::new("big.txt", "text/plain", "12345"),
    ] {
        let id = transfers.new_upload(payload).await;
        let job = transfers.run(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failure.unwrap().kind, FailureKind::Local);
    }
    assert_eq!(*hits.lock().unwrap(), 0);
}

#[tokio::test]
async fn wrong_key_fails_with_the_server_reason() {
    let router = Router::new().route(
        "/api/archivos/desencriptar",
        post(|mut multipart: Multipart| async move {
            let mut key = None;
            while let Some(field) = multipart.next_field().await.unwrap() {
                if field.name() == Some("key") {
                    key = Some(field.text().await.unwrap());
                }
            }
            assert_eq!(key.as_deref(), Some("principal"));
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Clave incorrecta o archivo corrupto"})),
            )
        }),
    );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = &harness.state.transfers;

    let ciphertext = b"not really ciphertext".to_vec();
    let id = transfers
        .new_submitted_decrypt(
            FilePayload::new("foto.png.encrypted", "application/octet-stream", ciphertext.clone()),
            "principal",
        )
        .await;
    let job = transfers.run(id).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Failed);
    let failure = job.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Server);
    assert!(failure.reason.contains("Clave incorrecta"));
    assert_ne!(failure.reason, AppError::Timeout.to_string());
    assert_eq!(job.digest.as_deref(), Some(sha256_hex(&ciphertext).as_str()));
    assert_eq!(harness.state.session.state(), SessionState::Authenticated);

    // Only an explicit reset makes the job runnable again.
    assert!(matches!(transfers.run(id).await, Err(AppError::InvalidState(_))));
    transfers.reset(id).await.unwrap();
    assert_eq!(transfers.job(id).await.unwrap().state, JobState::Idle);
}

#[tokio::test]
async fn hung_download_fails_as_timed_out() {
    let router = Router::new().route(
        "/api/archivos/descifrar/{id}",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "too late"
        }),
    );

    let harness = Harness::with_config(&serve(router).await, |config| {
        config.request_timeout = Duration::from_millis(200);
    });
    let transfers = &harness.state.transfers;

    let id = transfers.new_download(1, DownloadVariant::Decrypted).await;
    let job = transfers.run(id).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Failed);
    let failure = job.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.reason, AppError::Timeout.to_string());
}

#[tokio::test]
async fn downloads_are_saved_under_the_served_name() {
    let router = Router::new()
        .route(
            "/api/archivos/descargar-cifrado/{id}",
            get(|Path(id): Path<i64>| async move {
                (
                    [
                        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                        (
                            header::CONTENT_DISPOSITION,
                            format!("attachment; filename=\"informe_{}.pdf.encrypted\"", id),
                        ),
                    ],
                    vec![0xAAu8; 64],
                )
            }),
        )
        .route(
            "/api/archivos/descifrar/{id}",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hola mundo") }),
        );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = &harness.state.transfers;

    let id = transfers.new_download(5, DownloadVariant::Ciphertext).await;
    let job = transfers.run(id).await.unwrap().unwrap();
    let Some(TransferOutcome::Saved(saved)) = job.result.clone() else {
        panic!("unexpected job: {:?}", job);
    };
    assert_eq!(saved.file_name, "informe_5.pdf.encrypted");
    assert_eq!(saved.size_bytes, 64);
    assert_eq!(saved.path.parent(), Some(harness.downloads.path()));
    assert_eq!(std::fs::read(&saved.path).unwrap(), vec![0xAAu8; 64]);

    let id = transfers.new_download(3, DownloadVariant::Decrypted).await;
    let job = transfers.run(id).await.unwrap().unwrap();
    let Some(TransferOutcome::Saved(saved)) = job.result.clone() else {
        panic!("unexpected job: {:?}", job);
    };
    assert_eq!(saved.file_name, "archivo_3");
    assert_eq!(saved.content_type.as_deref(), Some("text/plain"));
    assert_eq!(std::fs::read_to_string(&saved.path).unwrap(), "hola mundo");
}

#[tokio::test]
async fn verified_download_digests_the_local_ciphertext() {
    let router = Router::new().route(
        "/api/archivos/descifrar/{id}",
        get(|| async { "plaintext" }),
    );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = &harness.state.transfers;

    let local = FilePayload::new("copy.encrypted", "application/octet-stream", "ciphertext");
    let id = transfers.new_download_verified(8, local).await;
    let job = transfers.run(id).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.digest.as_deref(), Some(sha256_hex(b"ciphertext").as_str()));
}

#[tokio::test]
async fn discarded_job_result_is_ignored() {
    let router = Router::new().route(
        "/api/archivos/descifrar/{id}",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "late bytes"
        }),
    );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = harness.state.transfers.clone();

    let id = transfers.new_download(4, DownloadVariant::Decrypted).await;
    let running = tokio::spawn({
        let transfers = transfers.clone();
        async move { transfers.run(id).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(transfers.discard(id).await);

    let finished = running.await.unwrap().unwrap();
    assert!(finished.is_none());
    assert!(transfers.job(id).await.is_none());
    assert_eq!(std::fs::read_dir(harness.downloads.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn unauthorized_upload_fails_the_job_and_the_session() {
    let router = Router::new().route(
        "/api/archivos/cifrar",
        post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"msg": "Token has expired"}))) }),
    );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = &harness.state.transfers;

    let id = transfers
        .new_upload(FilePayload::new("a.txt", "text/plain", "abc"))
        .await;
    let job = transfers.run(id).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.failure.unwrap().kind, FailureKind::Authentication);
    assert_eq!(harness.state.session.state(), SessionState::Anonymous);
    assert!(harness.stored_access_token().is_none());
}

#[tokio::test]
async fn rejected_decrypt_download_fails_with_the_server_reason() {
    let router = Router::new().route(
        "/api/archivos/descifrar/{id}",
        get(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No se pudo descifrar el archivo"})),
            )
        }),
    );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = &harness.state.transfers;

    let id = transfers.new_download(6, DownloadVariant::Decrypted).await;
    let job = transfers.run(id).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert!(job.result.is_none());
    let failure = job.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Server);
    assert!(!failure.reason.is_empty());
    assert!(failure.reason.contains("No se pudo descifrar"));
    assert_ne!(failure.reason, AppError::Timeout.to_string());
    assert_eq!(std::fs::read_dir(harness.downloads.path()).unwrap().count(), 0);
    assert_eq!(harness.state.session.state(), SessionState::Authenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_downloads_of_one_name_keep_their_own_files() {
    let router = Router::new().route(
        "/api/archivos/descifrar/{id}",
        get(|Path(id): Path<i64>| async move {
            (
                [(header::CONTENT_DISPOSITION, "attachment; filename=\"same.txt\"")],
                format!("contents of {}", id),
            )
        }),
    );

    let harness = Harness::logged_in(&serve(router).await, &user_token());
    let transfers = harness.state.transfers.clone();

    let mut handles = Vec::new();
    for file_id in 1..=16i64 {
        let id = transfers.new_download(file_id, DownloadVariant::Decrypted).await;
        let transfers = transfers.clone();
        handles.push(tokio::spawn(async move { (file_id, transfers.run(id).await) }));
    }

    let mut paths = std::collections::HashSet::new();
    for handle in handles {
        let (file_id, run) = handle.await.unwrap();
        let job = run.unwrap().unwrap();
        let Some(TransferOutcome::Saved(saved)) = job.result.clone() else {
            panic!("unexpected job: {:?}", job);
        };
        assert_eq!(
            std::fs::read_to_string(&saved.path).unwrap(),
            format!("contents of {}", file_id)
        );
        assert!(paths.insert(saved.path));
    }

    assert_eq!(paths.len(), 16);
    assert_eq!(std::fs::read_dir(harness.downloads.path()).unwrap().count(), 16);
}
