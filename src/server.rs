//! Message keeper server
//!
//! Serves the two message operations over gRPC and runs the naming service
//! that clients use to find it.

use crate::pb::message_keeper_service_server::{
    MessageKeeperService, MessageKeeperServiceServer,
};
use crate::pb::{
    FindMessagesRequest, FindMessagesResponse, SaveMessageRequest, SaveMessageResponse,
};
use crate::registry::NameRegistry;
use crate::store::{MessageStore, SqliteStore, StoreError};
use crate::MESSAGE_KEEPER_NAME;
use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tonic::{Request, Response, Status};

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port the naming service listens on
    pub registry_port: u16,
    /// Host name advertised to clients through the registry
    pub server_host: String,
    /// Port the message service listens on
    pub server_port: u16,
    /// sqlx SQLite connection URL
    pub database_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            registry_port: 1099,
            server_host: "localhost".to_string(),
            server_port: 2099,
            database_url: "sqlite://messages.db".to_string(),
        }
    }
}

impl ServerConfig {
    /// Endpoint clients should dial for the message service
    pub fn advertised_endpoint(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }

    pub fn registry_listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.registry_port))
    }

    pub fn server_listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.server_port))
    }
}

impl From<StoreError> for Status {
    fn from(e: StoreError) -> Self {
        Status::internal(e.to_string())
    }
}

/// The remote message object
pub struct MessageKeeperServer<S> {
    store: S,
}

impl<S: MessageStore> MessageKeeperServer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get the gRPC service for this server
    pub fn into_service(self) -> MessageKeeperServiceServer<MessageKeeperServiceImpl<S>> {
        MessageKeeperServiceServer::new(MessageKeeperServiceImpl {
            inner: Arc::new(self),
        })
    }

    pub async fn save_message(&self, message: &str) -> Result<i64, StoreError> {
        self.store.save(message).await
    }

    pub async fn find_messages(&self, substring: &str) -> Result<Vec<String>, StoreError> {
        self.store.find(substring).await
    }
}

/// gRPC service implementation wrapper
pub struct MessageKeeperServiceImpl<S> {
    inner: Arc<MessageKeeperServer<S>>,
}

#[tonic::async_trait]
impl<S: MessageStore> MessageKeeperService for MessageKeeperServiceImpl<S> {
    async fn save_message(
        &self,
        request: Request<SaveMessageRequest>,
    ) -> Result<Response<SaveMessageResponse>, Status> {
        let req = request.into_inner();

        tracing::debug!("SAVE request: len={}", req.message.chars().count());

        match self.inner.save_message(&req.message).await {
            Ok(id) => {
                tracing::debug!("SAVE success: id={}", id);
                Ok(Response::new(SaveMessageResponse { id }))
            }
            Err(e) => {
                tracing::warn!("SAVE failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn find_messages(
        &self,
        request: Request<FindMessagesRequest>,
    ) -> Result<Response<FindMessagesResponse>, Status> {
        let req = request.into_inner();

        tracing::debug!("FIND request: substring={:?}", req.substring);

        match self.inner.find_messages(&req.substring).await {
            Ok(messages) => {
                tracing::debug!("FIND success: {} messages", messages.len());
                Ok(Response::new(FindMessagesResponse { messages }))
            }
            Err(e) => {
                tracing::warn!("FIND failed: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Run the registry and the message service until Ctrl-C or a server error,
/// then close the database connection
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let store = SqliteStore::connect(&config.database_url).await?;

    let result = serve_with_shutdown(config, store.clone(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    })
    .await;

    store.close().await;
    tracing::info!("Closed message store");
    result
}

/// Run with an already opened store until either server stops
pub async fn serve<S: MessageStore>(config: ServerConfig, store: S) -> Result<()> {
    serve_with_shutdown(config, store, std::future::pending()).await
}

/// Run with an already opened store until `signal` completes
pub async fn serve_with_shutdown<S, F>(config: ServerConfig, store: S, signal: F) -> Result<()>
where
    S: MessageStore,
    F: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let registry = Arc::new(NameRegistry::new());
    let endpoint = config.advertised_endpoint();

    let registry_addr = config.registry_listen_addr();
    let server_addr = config.server_listen_addr();

    tracing::info!("Creating registry on port: {}", config.registry_port);
    let registry_server = tonic::transport::Server::builder()
        .add_service(registry.clone().into_service())
        .serve_with_shutdown(registry_addr, stopped(shutdown_rx.clone()));

    tracing::info!(
        "Binding server object on: {}:{}",
        config.server_host,
        config.server_port
    );
    registry.rebind(MESSAGE_KEEPER_NAME, &endpoint);
    for name in registry.list() {
        tracing::info!("Bound object: {}", name);
    }

    let message_server = tonic::transport::Server::builder()
        .add_service(MessageKeeperServer::new(store).into_service())
        .serve_with_shutdown(server_addr, stopped(shutdown_rx));

    let shutdown = async {
        signal.await;
        let _ = shutdown_tx.send(true);
        Ok::<(), tonic::transport::Error>(())
    };

    tokio::try_join!(registry_server, message_server, shutdown)?;

    Ok(())
}
