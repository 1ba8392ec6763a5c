use crate::{Backoff, Editor, Metrics, ServiceEvent, SharedStore};
use ahash::AHashMap as HashMap;
use ingress_rules_core::{rules, Attachment, Backend, RoutingIntent};
use ingress_rules_k8s_api::{self as k8s, Cluster, ResourceExt, Service};
use thiserror::Error;
use tokio::{sync::mpsc::UnboundedReceiver, time};
use tracing::{debug, info, info_span, warn, Instrument};

/// Attaches and detaches services as their annotations change.
///
/// Events are handled one at a time, in the order they are received; each
/// event's ingress edits complete before the next event is considered. An
/// attempt that fails is remembered and retried on the requeue interval,
/// unless a newer event for the same service arrives first.
pub struct Reconciler<C> {
    editor: Editor<C>,
    store: SharedStore,
    metrics: Metrics,

    /// Services whose last reconciliation failed, with the most recent
    /// version of each service (`None` once it has been deleted).
    requeue: HashMap<String, Option<Service>>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("service {0} has no namespace")]
    NoNamespace(String),

    #[error("service {0} declares no ports")]
    NoPorts(String),

    #[error(transparent)]
    Cluster(#[from] k8s::Error),
}

// === impl Error ===

impl Error {
    /// Indicates whether retrying the reconciliation could succeed without
    /// the service changing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }
}

// === impl Reconciler ===

impl<C: Cluster> Reconciler<C> {
    pub fn new(cluster: C, store: SharedStore, backoff: Backoff, metrics: Metrics) -> Self {
        metrics.set_attachments(store.read().len());
        Self {
            editor: Editor::new(cluster, backoff, metrics.clone()),
            store,
            metrics,
            requeue: HashMap::new(),
        }
    }

    /// Processes events until the event source is dropped.
    pub async fn run(
        mut self,
        mut events: UnboundedReceiver<ServiceEvent>,
        requeue_interval: time::Duration,
    ) {
        let mut retries =
            time::interval_at(time::Instant::now() + requeue_interval, requeue_interval);
        retries.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        let span = info_span!("service", name = %event.name());
                        self.handle(event).instrument(span).await;
                    }
                    None => {
                        info!("Service events closed");
                        return;
                    }
                },
                _ = retries.tick() => self.retry_requeued().await,
            }
        }
    }

    pub async fn handle(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Added(service) => {
                let name = service.name_any();
                info!(service = %name, "Service added");
                self.requeue.remove(&name);
                if let Some(attached) = self.attached(&name) {
                    warn!(
                        service = %name,
                        host = %attached.host,
                        ingress = %attached.ingress_name,
                        "Service is already attached"
                    );
                    return;
                }
                self.attach_or_requeue(&service).await;
            }

            ServiceEvent::Deleted(service) => {
                let name = service.name_any();
                info!(service = %name, "Service deleted");
                if self.shadowed(&service) {
                    return;
                }
                self.requeue.remove(&name);
                let Some(attached) = self.attached(&name) else {
                    debug!(service = %name, "Service was not attached");
                    return;
                };
                if let Err(error) = self.detach(&attached).await {
                    warn!(service = %name, %error, "Failed to detach service");
                    self.requeue.insert(name, None);
                }
            }

            ServiceEvent::Updated { old, new } => {
                let name = old.name_any();
                info!(service = %name, "Service updated");
                if self.shadowed(&new) {
                    return;
                }
                self.requeue.remove(&name);
                match self.attached(&name) {
                    Some(attached) => {
                        if let Err(error) = self.detach(&attached).await {
                            warn!(service = %name, %error, "Failed to detach service");
                            self.requeue.insert(name, Some(new));
                            return;
                        }
                    }
                    None => debug!(service = %name, "Service was not attached"),
                }
                self.attach_or_requeue(&new).await;
            }
        }
    }

    /// Attaches a service according to its annotations. Returns the new
    /// attachment, or `None` if the service doesn't ask to be routed.
    pub async fn attach(&mut self, service: &Service) -> Result<Option<Attachment>, Error> {
        let name = service.name_any();
        let intent = match RoutingIntent::from_annotations(service.annotations()) {
            Ok(intent) => intent,
            Err(reason) => {
                debug!(service = %name, %reason, "Will not attach service");
                return Ok(None);
            }
        };

        let namespace = service
            .namespace()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| Error::NoNamespace(name.clone()))?;
        let backend = Backend::for_service(service).ok_or_else(|| Error::NoPorts(name.clone()))?;

        let result = self.editor.add(&namespace, &intent, &backend).await;
        self.metrics.attach(result.is_ok());
        let ingress = result?;

        let position = rules::find_position(&ingress, &name, &intent.host);
        let attachment = Attachment::new(namespace, &name, &intent, position);
        info!(
            service = %name,
            host = %attachment.host,
            ingress = %attachment.ingress_name,
            "Service attached"
        );

        let mut store = self.store.write();
        store.insert(attachment.clone());
        self.metrics.set_attachments(store.len());
        Ok(Some(attachment))
    }

    /// Removes a service from its ingress and forgets the attachment. The
    /// attachment is kept if the ingress can't be updated.
    pub async fn detach(&mut self, attachment: &Attachment) -> Result<(), Error> {
        let result = self.editor.remove(attachment).await;
        self.metrics.detach(result.is_ok());
        result?;

        info!(
            service = %attachment.service_name,
            ingress = %attachment.ingress_name,
            "Service detached"
        );
        let mut store = self.store.write();
        store.remove(&attachment.service_name);
        self.metrics.set_attachments(store.len());
        Ok(())
    }

    /// Returns the names of services awaiting a retry.
    pub fn requeued(&self) -> impl Iterator<Item = &str> + '_ {
        self.requeue.keys().map(String::as_str)
    }

    /// Drives each requeued service toward the state its latest version
    /// describes.
    pub async fn retry_requeued(&mut self) {
        if self.requeue.is_empty() {
            return;
        }
        debug!(services = self.requeue.len(), "Retrying failed reconciliations");

        for (name, service) in std::mem::take(&mut self.requeue) {
            let span = info_span!("requeue", service = %name);
            if let Err(error) = self.resync(&name, service.as_ref()).instrument(span).await {
                if error.is_retryable() {
                    debug!(service = %name, %error, "Reconciliation still failing");
                    self.requeue.insert(name, service);
                } else {
                    warn!(service = %name, %error, "Dropping reconciliation");
                }
            }
        }
    }

    async fn resync(&mut self, name: &str, service: Option<&Service>) -> Result<(), Error> {
        let intent = service.and_then(|s| RoutingIntent::from_annotations(s.annotations()).ok());

        if let Some(attached) = self.attached(name) {
            let current = intent.as_ref().is_some_and(|i| attached.matches(i))
                && service.and_then(|s| s.namespace()).as_deref()
                    == Some(attached.namespace.as_str());
            if current {
                return Ok(());
            }
            self.detach(&attached).await?;
        }

        if let Some(service) = service {
            self.attach(service).await?;
        }
        Ok(())
    }

    async fn attach_or_requeue(&mut self, service: &Service) {
        if let Err(error) = self.attach(service).await {
            let name = service.name_any();
            warn!(service = %name, %error, "Failed to attach service");
            if error.is_retryable() {
                self.requeue.insert(name, Some(service.clone()));
            }
        }
    }

    /// Indicates whether the service's name is attached on behalf of a
    /// same-named service in another namespace.
    fn shadowed(&self, service: &Service) -> bool {
        let Some(attached) = self.attached(&service.name_any()) else {
            return false;
        };
        let namespace = service.namespace().unwrap_or_default();
        if attached.namespace == namespace {
            return false;
        }
        debug!(
            service = %attached.service_name,
            %namespace,
            attached = %attached.namespace,
            "Service name is attached in another namespace"
        );
        true
    }

    fn attached(&self, name: &str) -> Option<Attachment> {
        self.store.read().get(name).cloned()
    }
}
