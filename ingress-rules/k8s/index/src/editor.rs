use crate::Metrics;
use ingress_rules_core::{rules, Attachment, Backend, RoutingIntent};
use ingress_rules_k8s_api::{Cluster, Error, Ingress};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounds how update conflicts are retried.
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Total number of update attempts, including the first.
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

/// Applies rule edits to remote ingresses.
///
/// Each edit fetches the current ingress, applies the edit in memory, and
/// replaces the ingress at the fetched resource version. When the update is
/// rejected because the ingress changed in the meantime, the edit is
/// re-applied to a fresh copy after a backoff.
pub struct Editor<C> {
    cluster: C,
    backoff: Backoff,
    metrics: Metrics,
}

// === impl Backoff ===

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

// === impl Editor ===

impl<C: Cluster> Editor<C> {
    pub fn new(cluster: C, backoff: Backoff, metrics: Metrics) -> Self {
        Self {
            cluster,
            backoff,
            metrics,
        }
    }

    /// Routes `intent.host` to `backend` in the intended ingress, returning
    /// the committed ingress.
    pub async fn add(
        &self,
        namespace: &str,
        intent: &RoutingIntent,
        backend: &Backend,
    ) -> Result<Ingress, Error> {
        info!(
            service = %backend.service,
            host = %intent.host,
            ingress = %intent.ingress,
            "Adding service to ingress"
        );
        self.update(namespace, &intent.ingress, |ingress| {
            rules::add_path(ingress, &intent.host, backend)
        })
        .await
    }

    /// Removes the attachment's paths from its ingress, returning the
    /// committed ingress.
    pub async fn remove(&self, attachment: &Attachment) -> Result<Ingress, Error> {
        info!(
            service = %attachment.service_name,
            host = %attachment.host,
            ingress = %attachment.ingress_name,
            namespace = %attachment.namespace,
            "Removing service from ingress"
        );
        self.update(&attachment.namespace, &attachment.ingress_name, |ingress| {
            rules::remove_paths(ingress, &attachment.host, &attachment.service_name) > 0
        })
        .await
    }

    /// Fetches an ingress, edits it, and writes it back. `edit` returns false
    /// when it left the ingress unchanged, in which case nothing is written.
    async fn update(
        &self,
        namespace: &str,
        name: &str,
        edit: impl Fn(&mut Ingress) -> bool,
    ) -> Result<Ingress, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut ingress = self.cluster.get_ingress(namespace, name).await?;
            if !edit(&mut ingress) {
                debug!(%namespace, %name, "Ingress already up to date");
                return Ok(ingress);
            }

            match self.cluster.replace_ingress(&ingress).await {
                Ok(updated) => {
                    debug!(
                        %namespace,
                        %name,
                        rules = updated
                            .spec
                            .as_ref()
                            .and_then(|s| s.rules.as_ref())
                            .map_or(0, Vec::len),
                        "Updated ingress"
                    );
                    return Ok(updated);
                }
                Err(error) if error.is_conflict() => {
                    self.metrics.conflicts.inc();
                    if attempt >= self.backoff.attempts {
                        warn!(%namespace, %name, attempt, "Giving up on conflicting ingress update");
                        return Err(error);
                    }
                    let delay = self.backoff.delay(attempt);
                    debug!(%namespace, %name, attempt, ?delay, "Ingress changed; retrying update");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
