//! Naming service
//!
//! Maps names to remote endpoints so clients can find the message service
//! knowing only where the registry listens.

use crate::pb::registry_client::RegistryClient as GrpcRegistryClient;
use crate::pb::registry_server::{Registry, RegistryServer};
use crate::pb::{
    BindRequest, BindResponse, ListRequest, ListResponse, LookupRequest, LookupResponse,
    UnbindRequest, UnbindResponse,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("name already bound: {0}")]
    AlreadyBound(String),
    #[error("name not bound: {0}")]
    NotBound(String),
}

impl From<RegistryError> for Status {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyBound(_) => Status::already_exists(e.to_string()),
            RegistryError::NotBound(_) => Status::not_found(e.to_string()),
        }
    }
}

/// In-memory directory of name -> endpoint bindings
#[derive(Debug, Default)]
pub struct NameRegistry {
    bindings: DashMap<String, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, failing if it is already taken
    pub fn bind(&self, name: &str, endpoint: &str) -> Result<(), RegistryError> {
        match self.bindings.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyBound(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(endpoint.to_string());
                Ok(())
            }
        }
    }

    /// Bind `name`, replacing any existing binding
    pub fn rebind(&self, name: &str, endpoint: &str) {
        self.bindings.insert(name.to_string(), endpoint.to_string());
    }

    pub fn unbind(&self, name: &str) -> Result<(), RegistryError> {
        self.bindings
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotBound(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<String, RegistryError> {
        self.bindings
            .get(name)
            .map(|endpoint| endpoint.value().clone())
            .ok_or_else(|| RegistryError::NotBound(name.to_string()))
    }

    /// All bound names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Get the gRPC service exposing this registry
    pub fn into_service(self: Arc<Self>) -> RegistryServer<RegistryServiceImpl> {
        RegistryServer::new(RegistryServiceImpl { inner: self })
    }
}

/// gRPC service implementation wrapper
pub struct RegistryServiceImpl {
    inner: Arc<NameRegistry>,
}

#[tonic::async_trait]
impl Registry for RegistryServiceImpl {
    async fn bind(&self, request: Request<BindRequest>) -> Result<Response<BindResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!("BIND request: name={}, endpoint={}", req.name, req.endpoint);

        self.inner.bind(&req.name, &req.endpoint)?;
        Ok(Response::new(BindResponse {}))
    }

    async fn rebind(
        &self,
        request: Request<BindRequest>,
    ) -> Result<Response<BindResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!("REBIND request: name={}, endpoint={}", req.name, req.endpoint);

        self.inner.rebind(&req.name, &req.endpoint);
        Ok(Response::new(BindResponse {}))
    }

    async fn unbind(
        &self,
        request: Request<UnbindRequest>,
    ) -> Result<Response<UnbindResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!("UNBIND request: name={}", req.name);

        self.inner.unbind(&req.name)?;
        Ok(Response::new(UnbindResponse {}))
    }

    async fn lookup(
        &self,
        request: Request<LookupRequest>,
    ) -> Result<Response<LookupResponse>, Status> {
        let req = request.into_inner();

        match self.inner.lookup(&req.name) {
            Ok(endpoint) => {
                tracing::debug!("LOOKUP success: name={}, endpoint={}", req.name, endpoint);
                Ok(Response::new(LookupResponse { endpoint }))
            }
            Err(e) => {
                tracing::warn!("LOOKUP failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn list(&self, _request: Request<ListRequest>) -> Result<Response<ListResponse>, Status> {
        Ok(Response::new(ListResponse {
            names: self.inner.list(),
        }))
    }
}

/// Client side of the naming service
#[derive(Clone)]
pub struct RegistryClient {
    inner: GrpcRegistryClient<Channel>,
}

impl RegistryClient {
    /// Connect to a registry at `addr` (e.g. `http://localhost:1099`)
    pub async fn connect(addr: &str) -> Result<Self, tonic::transport::Error> {
        tracing::info!("Connecting to registry at {}", addr);
        let channel = Endpoint::from_shared(addr.to_string())?.connect().await?;
        Ok(Self {
            inner: GrpcRegistryClient::new(channel),
        })
    }

    pub async fn lookup(&mut self, name: &str) -> Result<String, Status> {
        let response = self
            .inner
            .lookup(LookupRequest {
                name: name.to_string(),
            })
            .await?
            .into_inner();
        Ok(response.endpoint)
    }

    pub async fn rebind(&mut self, name: &str, endpoint: &str) -> Result<(), Status> {
        self.inner
            .rebind(BindRequest {
                name: name.to_string(),
                endpoint: endpoint.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn list(&mut self) -> Result<Vec<String>, Status> {
        Ok(self.inner.list(ListRequest {}).await?.into_inner().names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup() {
        let registry = NameRegistry::new();
        registry.bind("//MessageKeeper", "http://host:2000").unwrap();

        assert_eq!(registry.lookup("//MessageKeeper").unwrap(), "http://host:2000");
        assert_eq!(
            registry.bind("//MessageKeeper", "http://other:2000"),
            Err(RegistryError::AlreadyBound("//MessageKeeper".to_string()))
        );
    }

    #[test]
    fn test_rebind_replaces() {
        let registry = NameRegistry::new();
        registry.rebind("svc", "http://a:1");
        registry.rebind("svc", "http://b:2");

        assert_eq!(registry.lookup("svc").unwrap(), "http://b:2");
        assert_eq!(registry.list(), vec!["svc".to_string()]);
    }

    #[test]
    fn test_unbind_and_missing() {
        let registry = NameRegistry::new();
        registry.rebind("svc", "http://a:1");
        registry.unbind("svc").unwrap();

        assert_eq!(
            registry.lookup("svc"),
            Err(RegistryError::NotBound("svc".to_string()))
        );
        assert!(registry.unbind("svc").is_err());
    }

    #[test]
    fn test_list_sorted() {
        let registry = NameRegistry::new();
        registry.rebind("b", "http://b:1");
        registry.rebind("a", "http://a:1");

        assert_eq!(registry.list(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_error_status_codes() {
        let status: Status = RegistryError::NotBound("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: Status = RegistryError::AlreadyBound("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }
}
