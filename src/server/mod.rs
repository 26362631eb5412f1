pub mod protocol;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, LoaderError};
use crate::models::{Config, ContextPolicy, ExamKind, SearchResults};
use crate::server::protocol::{
    MAX_FRAME_LEN, Request, Response, StatusResponse, UploadResponse, decode_length,
    encode_message,
};
use crate::services::{
    DocumentLoader, ExamService, FileLoader, HuggingFaceGenerator, RetrievalStore, SharedEmbedder,
    SharedGenerator, TextChunker, create_embedder,
};
use crate::utils::store_upload;

struct DaemonState {
    config: Config,
    store: Arc<RetrievalStore>,
    exams: ExamService,
    generator: SharedGenerator,
    loader: FileLoader,
    chunker: TextChunker,
    last_request: RwLock<Instant>,
    requests_served: AtomicU64,
    shutdown: Notify,
}

pub struct DaemonServer {
    socket_path: PathBuf,
    state: Arc<DaemonState>,
}

impl DaemonServer {
    /// Load the embedding model and generator described by `config`.
    pub async fn new(config: Config) -> Result<Self, AppError> {
        info!(
            provider = %config.embedding.provider,
            model = %config.embedding.model_id,
            "loading embedder"
        );
        let embedder = create_embedder(&config.embedding)
            .map_err(|e| AppError::Other(format!("failed to load embedder: {e}")))?;
        let generator: SharedGenerator =
            Arc::new(HuggingFaceGenerator::from_config(&config.generation)?);
        Self::with_services(config, embedder, generator).await
    }

    /// Build a server around already constructed services.
    pub async fn with_services(
        config: Config,
        embedder: SharedEmbedder,
        generator: SharedGenerator,
    ) -> Result<Self, AppError> {
        let chunker = TextChunker::from_config(&config.chunking)?;
        let store = Arc::new(RetrievalStore::new(embedder));

        if config.storage.persist {
            let snapshot = config.storage.snapshot_path();
            if snapshot.exists() {
                match store.load(&snapshot).await {
                    Ok(chunks) => info!(chunks, "restored previous corpus"),
                    Err(e) => {
                        warn!(path = %snapshot.display(), error = %e, "ignoring unusable snapshot")
                    }
                }
            }
        }

        let exams = ExamService::new(store.clone(), generator.clone(), config.generation.clone());
        let loader = FileLoader::new(config.storage.max_file_size);

        Ok(Self {
            socket_path: config.socket_path(),
            state: Arc::new(DaemonState {
                config,
                store,
                exams,
                generator,
                loader,
                chunker,
                last_request: RwLock::new(Instant::now()),
                requests_served: AtomicU64::new(0),
                shutdown: Notify::new(),
            }),
        })
    }

    pub async fn run(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        self.write_pid_file()?;

        let idle_timeout = Duration::from_secs(self.state.config.daemon.idle_timeout_secs);
        let check_interval = Duration::from_secs(10)
            .min(idle_timeout)
            .max(Duration::from_secs(1));
        info!(
            socket = %self.socket_path.display(),
            idle_timeout_secs = idle_timeout.as_secs(),
            "daemon listening"
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            *self.state.last_request.write().await = Instant::now();
                            let state = self.state.clone();
                            tokio::spawn(async move { state.handle_connection(stream).await });
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = self.state.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(check_interval) => {
                    let last = *self.state.last_request.read().await;
                    if last.elapsed() > idle_timeout {
                        info!("idle timeout reached, shutting down");
                        break;
                    }
                }
                _ = shutdown_signal() => {
                    info!("received termination signal, shutting down");
                    break;
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    fn write_pid_file(&self) -> Result<(), std::io::Error> {
        std::fs::write(self.state.config.pid_path(), std::process::id().to_string())
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(self.state.config.pid_path());
        info!("daemon stopped");
    }
}

impl DaemonState {
    async fn handle_connection(&self, mut stream: UnixStream) {
        let mut len_buf = [0u8; 4];

        while stream.read_exact(&mut len_buf).await.is_ok() {
            let len = decode_length(&len_buf);
            if len > MAX_FRAME_LEN {
                warn!(len, "frame too large, closing connection");
                break;
            }

            let mut msg_buf = vec![0u8; len];
            if stream.read_exact(&mut msg_buf).await.is_err() {
                break;
            }

            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => Response::error(format!("invalid request: {e}")),
            };
            self.requests_served.fetch_add(1, Ordering::Relaxed);

            if let Ok(encoded) = encode_message(&response)
                && stream.write_all(&encoded).await.is_err()
            {
                break;
            }

            if matches!(response, Response::ShutdownAck) {
                self.shutdown.notify_one();
                break;
            }
        }
    }

    async fn handle_request(&self, request: Request) -> Response {
        debug!(?request, "handling request");
        let result = match request {
            Request::Ping => Ok(Response::Pong),
            Request::Shutdown => Ok(Response::ShutdownAck),
            Request::Status => Ok(self.status().await),
            Request::Upload(req) => self.upload(&req.path).await.map(Response::Uploaded),
            Request::Retrieve(req) => self
                .retrieve(req.query, req.k)
                .await
                .map(Response::Retrieved),
            Request::Generate(req) => self
                .generate(req.kind, req.policy)
                .await
                .map(Response::Generated),
            Request::Reset => self.reset().await.map(|()| Response::ResetAck),
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "request failed");
            Response::error(e.user_message())
        })
    }

    async fn status(&self) -> Response {
        let last = *self.last_request.read().await;
        let storage = &self.config.storage;
        Response::Status(StatusResponse {
            running: true,
            embedding_model: self.store.embedder().name().to_string(),
            dimension: self.store.embedder().dimension(),
            generation_model: self.generator.name().to_string(),
            api_key_present: std::env::var(crate::models::API_KEY_ENV).is_ok(),
            idle_secs: last.elapsed().as_secs(),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            corpus: self.store.stats(),
            snapshot_path: storage.persist.then(|| storage.snapshot_path()),
        })
    }

    async fn upload(&self, path: &Path) -> Result<UploadResponse, AppError> {
        let start = Instant::now();
        let document = self.loader.load(path)?;
        let stored_path = store_upload(path, &self.config.storage.upload_dir())
            .map_err(LoaderError::Unreadable)?;

        let chunks = self.chunker.chunk_document(&document.text);
        if chunks.is_empty() {
            return Err(LoaderError::Empty.into());
        }
        let count = if self.config.storage.persist {
            let snapshot = self.config.storage.snapshot_path();
            self.store.index_document_and_save(chunks, &snapshot).await?
        } else {
            self.store.index_document(chunks).await?
        };

        info!(file = %document.file_name, chunks = count, "document indexed");
        Ok(UploadResponse {
            file_name: document.file_name,
            stored_path,
            chunks: count,
            checksum: document.checksum,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn reset(&self) -> Result<(), AppError> {
        if self.config.storage.persist {
            let snapshot = self.config.storage.snapshot_path();
            self.store.reset_and_delete(&snapshot).await?;
        } else {
            self.store.reset().await;
        }
        Ok(())
    }

    async fn retrieve(&self, query: String, k: usize) -> Result<SearchResults, AppError> {
        let start = Instant::now();
        let results = self.store.retrieve_scored(&query, k).await?;
        Ok(SearchResults::new(
            query,
            results,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn generate(
        &self,
        kind: ExamKind,
        policy: ContextPolicy,
    ) -> Result<crate::models::GeneratedExam, AppError> {
        self.exams.generate(kind, policy).await
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

pub async fn run_daemon(config: Config) -> Result<(), AppError> {
    let server = DaemonServer::new(config).await?;
    server
        .run()
        .await
        .map_err(|e| AppError::Daemon(e.into()))
}
