//! Seeds the attachment store from the cluster's current state.
//!
//! The scan only records what is already present in each ingress; it never
//! edits one. Services that ask to be routed but aren't yet are left to the
//! service watch, which replays every existing service when it starts.

use crate::SharedStore;
use ingress_rules_core::{rules, Attachment, RoutingIntent};
use ingress_rules_k8s_api::{Cluster, Error, ResourceExt, Service};
use tracing::{debug, info, info_span, warn, Instrument};

/// Lists services and records an attachment for each one whose intended
/// ingress already routes its host to it. Returns the number of services
/// found attached.
///
/// Failing to list services is an error; problems with an individual
/// service's ingress only skip that service.
pub async fn scan<C: Cluster>(cluster: &C, store: &SharedStore) -> Result<usize, Error> {
    let services = cluster.list_services().await?;
    info!(services = services.len(), "Scanning services for attachments");

    let mut attached = 0;
    for service in services {
        let span = info_span!("bootstrap", service = %service.name_any());
        if let Some(attachment) = inspect(cluster, &service).instrument(span).await {
            store.write().insert(attachment);
            attached += 1;
        }
    }

    Ok(attached)
}

async fn inspect<C: Cluster>(cluster: &C, service: &Service) -> Option<Attachment> {
    let name = service.name_any();
    let intent = match RoutingIntent::from_annotations(service.annotations()) {
        Ok(intent) => intent,
        Err(reason) => {
            debug!(%reason, "Skipping service");
            return None;
        }
    };
    let Some(namespace) = service.namespace().filter(|ns| !ns.is_empty()) else {
        warn!("Skipping service without a namespace");
        return None;
    };

    let ingress = match cluster.get_ingress(&namespace, &intent.ingress).await {
        Ok(ingress) => ingress,
        Err(error) => {
            warn!(ingress = %intent.ingress, %error, "Skipping service");
            return None;
        }
    };

    let positions = rules::positions(&ingress, &name, &intent.host).collect::<Vec<_>>();
    let Some(first) = positions.first().copied() else {
        info!(
            ingress = %intent.ingress,
            host = %intent.host,
            "Service is not attached to ingress"
        );
        return None;
    };
    if positions.len() > 1 {
        warn!(
            ingress = %intent.ingress,
            host = %intent.host,
            places = positions.len(),
            "Service is attached to ingress in multiple places"
        );
    } else {
        info!(ingress = %intent.ingress, host = %intent.host, "Service is attached to ingress");
    }

    Some(Attachment::new(namespace, &name, &intent, Some(first)))
}
