//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire every service to the in-process backend and exercise one pass of
//!   session, document, file and install-prompt flows.
//! - Validate `APPSHELL_*` backend settings and report placeholder use.
//! - Keep output short for quick local sanity checks.

use appshell_core::logging::mask_identifier;
use appshell_core::{
    init_logging, BackendConfig, DeferredPrompt, DocumentRepository, Fields, FileStore, InstallController,
    InstallOutcome, InstallPromptConfig, LoggingConfig, MemoryBackend, MemoryKeyValueStore,
    SessionManager, UploadRequest,
};
use log::{info, warn};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

struct ConsolePrompt;

impl DeferredPrompt for ConsolePrompt {
    fn present(&mut self) {
        println!("install prompt presented");
    }
}

/// Validates the project settings and mirrors the configured bucket's
/// download URLs; placeholder settings keep the local defaults.
fn in_process_backend(config: &BackendConfig) -> MemoryBackend {
    match config.validate() {
        Ok(()) => {
            info!(
                "event=backend_config module=cli status=ok project_id={}",
                mask_identifier(&config.project_id)
            );
            println!("backend config: project {}", config.project_id);
            MemoryBackend::new().with_download_base_url(config.download_base_url())
        }
        Err(err) => {
            warn!(
                "event=backend_config module=cli status=placeholder error={}",
                err
            );
            println!("backend config incomplete ({err}); using local defaults");
            MemoryBackend::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("APPSHELL_LOG_DIR") {
        init_logging(&LoggingConfig::new(log_dir))?;
    }

    println!("appshell_core ping={}", appshell_core::ping());
    println!("appshell_core version={}", appshell_core::core_version());

    let backend = Arc::new(in_process_backend(&BackendConfig::from_env()));

    let sessions = SessionManager::new(backend.clone());
    let _subscription = sessions.subscribe(|session| {
        println!(
            "session changed: {}",
            session.map_or("signed out", |session| session.label())
        );
    });
    sessions.initialize().await?;
    let session = sessions
        .register_principal("demo@example.com", "demo-secret", Some("Demo"))
        .await?;

    let documents = DocumentRepository::with_system_clock(backend.clone());
    let id = documents
        .create("notes", &json!({ "text": "hi", "owner": session.uid }), None)
        .await?;
    documents
        .update("notes", &id, &json!({ "text": "hello" }))
        .await?;
    let listed = documents.list::<Fields>("notes", &[]).await?;
    println!("notes={}", serde_json::to_string(&listed)?);

    let files = FileStore::new(backend.clone());
    let url = files
        .upload(
            UploadRequest::new(format!("uploads/{}/hello.txt", session.uid), b"hello".to_vec())
                .with_content_type("text/plain"),
        )
        .await?;
    println!("uploaded url={url}");

    let install = InstallController::new(
        Arc::new(MemoryKeyValueStore::new()),
        &InstallPromptConfig::default(),
        Arc::new(appshell_core::SystemClock::new()),
    );
    install.on_installability_signalled(Box::new(ConsolePrompt));
    install.present();
    install.resolve_user_choice(InstallOutcome::Dismissed);
    println!("install state={}", install.state());

    sessions.end_session().await?;
    info!("event=cli_smoke module=cli status=ok");
    Ok(())
}
