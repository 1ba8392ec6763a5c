use crate::{Api, Client, Ingress, ListParams, PostParams, ResourceExt, Service};
use thiserror::Error;

/// The remote operations the controller needs from the Kubernetes API.
///
/// The reconciler only ever talks to the cluster through this trait so that
/// it may be driven against an in-memory cluster in tests.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync + 'static {
    /// Lists all services in the controller's scope.
    async fn list_services(&self) -> Result<Vec<Service>, Error>;

    /// Fetches the current state of an ingress.
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, Error>;

    /// Replaces an ingress. The ingress's `resourceVersion` must match the
    /// server's version or the update is rejected with [`Error::Conflict`].
    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("ingress {namespace}/{name} was modified concurrently")]
    Conflict { namespace: String, name: String },

    #[error("ingress has no {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// A [`Cluster`] backed by a Kubernetes client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: Option<String>,
}

// === impl Error ===

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// === impl KubeCluster ===

impl KubeCluster {
    /// Creates a cluster handle. When `namespace` is `None`, services are
    /// listed across all namespaces.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn services(&self) -> Api<Service> {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn ingresses(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl Cluster for KubeCluster {
    async fn list_services(&self) -> Result<Vec<Service>, Error> {
        let list = self.services().list(&ListParams::default()).await?;
        tracing::debug!(services = list.items.len(), "Listed services");
        Ok(list.items)
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, Error> {
        tracing::debug!(%namespace, %name, "Getting ingress");
        self.ingresses(namespace)
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "ingress",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        let namespace = ingress.namespace().ok_or(Error::Invalid("namespace"))?;
        let name = ingress.metadata.name.as_deref().ok_or(Error::Invalid("name"))?;
        match self
            .ingresses(&namespace)
            .replace(name, &PostParams::default(), ingress)
            .await
        {
            Ok(ingress) => Ok(ingress),
            Err(kube::Error::Api(rsp)) if rsp.code == 409 => Err(Error::Conflict {
                namespace,
                name: name.to_string(),
            }),
            Err(kube::Error::Api(rsp)) if rsp.code == 404 => Err(Error::NotFound {
                kind: "ingress",
                namespace,
                name: name.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }
}
