use ahash::AHashMap as HashMap;
use ingress_rules_k8s_api::{ResourceExt, Service};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub type SharedEvents = Arc<RwLock<EventIndex>>;

/// A change to a watched service.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceEvent {
    Added(Service),
    Updated { old: Service, new: Service },
    Deleted(Service),
}

/// Turns watch updates into ordered [`ServiceEvent`]s.
///
/// A watch only reports the current state of each object, so the index holds
/// the last version it saw of every service in order to report the prior
/// object on updates and deletes. When the watch restarts, services that are
/// replayed unchanged produce no event.
pub struct EventIndex {
    services: HashMap<(String, String), Service>,
    events: UnboundedSender<ServiceEvent>,
}

// === impl ServiceEvent ===

impl ServiceEvent {
    /// The name of the service the event is about.
    pub fn name(&self) -> String {
        match self {
            Self::Added(svc) | Self::Updated { new: svc, .. } | Self::Deleted(svc) => {
                svc.name_any()
            }
        }
    }
}

// === impl EventIndex ===

impl EventIndex {
    pub fn shared(events: UnboundedSender<ServiceEvent>) -> SharedEvents {
        Arc::new(RwLock::new(Self {
            services: HashMap::new(),
            events,
        }))
    }

    fn send(&self, event: ServiceEvent) {
        if let Err(error) = self.events.send(event) {
            tracing::error!(service = %error.0.name(), "Reconciler is no longer receiving events");
        }
    }
}

impl kubert::index::IndexNamespacedResource<Service> for EventIndex {
    fn apply(&mut self, service: Service) {
        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();

        let event = match self.services.insert((namespace, name), service.clone()) {
            None => ServiceEvent::Added(service),
            Some(old) if old.metadata.resource_version.is_some()
                && old.metadata.resource_version == service.metadata.resource_version =>
            {
                tracing::trace!(service = %service.name_any(), "Service unchanged");
                return;
            }
            Some(old) => ServiceEvent::Updated { old, new: service },
        };
        self.send(event);
    }

    fn delete(&mut self, namespace: String, name: String) {
        match self.services.remove(&(namespace, name)) {
            Some(service) => self.send(ServiceEvent::Deleted(service)),
            None => tracing::debug!("Deleted service was never indexed"),
        }
    }

    // The default reset applies each listed service and deletes the rest,
    // which produces exactly the events a restarted watch implies.
}
