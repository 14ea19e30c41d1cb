//! Tramita server executable: wires the stores, the engine and the
//! request-directory watcher together.

mod requests;

use clap::{Arg, Command};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use requests::{Request, RequestProcessor};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;
use tramita_core::{
    Dispatcher, FileAuditSink, LogNotifier, MemoryStore, ProtocolService, ProtocolStore,
    SequenceCounter, TramitaConfig, TransitionEngine, WorkflowStore,
};
use tramita_types::{SectorId, StageSpec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("tramita-server")
        .version("1.0.0")
        .about("Protocol tramitation engine")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("requests-dir")
                .long("requests-dir")
                .value_name("DIR")
                .help("Directory watched for JSON request files (overrides config)"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Seed a demo workflow before serving")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Load configuration
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            let config = TramitaConfig::from_file(path)?;
            log::info!("Loaded configuration from {}", path);
            config
        }
        None => {
            log::info!("No config file given, using defaults");
            TramitaConfig::default()
        }
    };

    let requests_dir = matches
        .get_one::<String>("requests-dir")
        .cloned()
        .unwrap_or_else(|| config.server.requests_dir.clone());

    // All repositories live on one in-memory store, built once here and
    // injected everywhere
    let store = Arc::new(MemoryStore::new());
    let workflows: Arc<dyn WorkflowStore> = store.clone();
    let protocols: Arc<dyn ProtocolStore> = store.clone();
    let sequence: Arc<dyn SequenceCounter> = store.clone();

    let dispatcher = Dispatcher::new(
        Arc::new(FileAuditSink::new(config.server.audit_log.clone())),
        Arc::new(LogNotifier),
        config.notifications.clone(),
    );

    let service = Arc::new(ProtocolService::new(
        workflows.clone(),
        protocols.clone(),
        sequence,
        dispatcher.clone(),
    ));
    let engine = Arc::new(TransitionEngine::new(
        workflows.clone(),
        protocols,
        dispatcher,
        config.engine.max_transition_attempts,
        config.engine.return_fallback,
    ));

    log::info!("Initialized stores and engine");

    if matches.get_flag("seed") {
        seed_demo(workflows.as_ref()).await?;
    }

    let processor = RequestProcessor::new(service, engine, workflows);
    watch_requests(processor, Path::new(&requests_dir)).await
}

/// Seed the demo workflow used by the original deployment scripts
async fn seed_demo(workflows: &dyn WorkflowStore) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let workflow = workflows
        .create_workflow(
            "Tramitação Padrão".to_string(),
            Some("Fluxo padrão de documentos".to_string()),
            true,
        )
        .await?;

    let stage_names = ["Protocolo", "Análise Jurídica", "Aprovação da Diretoria"];
    let specs = stage_names
        .iter()
        .enumerate()
        .map(|(idx, name)| StageSpec {
            name: name.to_string(),
            order: idx as u32 + 1,
            sector_id: SectorId::new(),
            sla_hours: 24,
            mandatory: true,
            on_sla_breach: Vec::new(),
        })
        .collect();
    let stages = workflows.replace_stages(&workflow.id, specs).await?;

    log::info!("Seeded workflow '{}' ({})", workflow.name, workflow.id);
    for stage in &stages {
        log::info!(
            "  stage {} '{}' sector {}",
            stage.order,
            stage.name,
            stage.sector_id
        );
    }

    Ok(())
}

/// Watch the requests directory and process JSON request files as they
/// appear. Each file is moved to `processed/` or `failed/` afterwards.
async fn watch_requests(
    processor: RequestProcessor,
    requests_dir: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let processed_dir = requests_dir.join("processed");
    let failed_dir = requests_dir.join("failed");

    std::fs::create_dir_all(requests_dir)?;
    std::fs::create_dir_all(&processed_dir)?;
    std::fs::create_dir_all(&failed_dir)?;

    log::info!("Monitoring requests in {}/", requests_dir.display());

    // Set up file system watcher
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(requests_dir, RecursiveMode::NonRecursive)?;

    // Process files that were already waiting
    if let Ok(entries) = std::fs::read_dir(requests_dir) {
        for entry in entries.flatten() {
            if entry.path().is_file() {
                process_request_file(&processor, &entry.path(), &processed_dir, &failed_dir).await;
            }
        }
    }

    // Monitor for new files
    loop {
        match rx.recv() {
            Ok(event) => {
                log::debug!("File system event: {:?}", event);

                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {
                        for path in event.paths {
                            if path.is_file() {
                                process_request_file(&processor, &path, &processed_dir, &failed_dir)
                                    .await;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Err(e) => {
                log::error!("Watcher error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        }
    }
}

async fn process_request_file(
    processor: &RequestProcessor,
    request_path: &Path,
    processed_dir: &Path,
    failed_dir: &Path,
) {
    let file_name = match request_path.file_name().and_then(|n| n.to_str()) {
        Some(name) if name.ends_with(".json") => name.to_string(),
        _ => return,
    };

    log::info!("Processing request file: {}", file_name);

    let outcome = handle_request_file(processor, request_path).await;

    let destination: PathBuf = match &outcome {
        Ok(summary) => {
            log::info!("Request {}: {}", file_name, summary);
            processed_dir.join(&file_name)
        }
        Err(e) => {
            log::error!("Request {} failed: {}", file_name, e);
            failed_dir.join(&file_name)
        }
    };

    if let Err(e) = std::fs::rename(request_path, &destination) {
        log::error!("Failed to move request file {}: {}", file_name, e);
    }
}

async fn handle_request_file(
    processor: &RequestProcessor,
    request_path: &Path,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let content = std::fs::read_to_string(request_path)?;
    let request: Request = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse request JSON: {}", e))?;

    let summary = processor.handle(request).await?;
    Ok(summary)
}
