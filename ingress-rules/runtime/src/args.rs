use crate::{
    index::{self, bootstrap, Backoff, EventIndex, Reconciler, Store},
    k8s::{Api, KubeCluster, Service},
    status,
};
use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use tokio::{sync::mpsc, time::Duration};
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "ingress-rules",
    about = "Routes annotated services through a named ingress"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress_rules=info,warn",
        env = "INGRESS_RULES_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Restricts the controller to services in a single namespace.
    ///
    /// Services in all namespaces are watched when this is unset or empty.
    #[clap(long, env = "NAMESPACE")]
    namespace: Option<String>,

    #[clap(long, default_value = "0.0.0.0:8080", env = "STATUS_ADDR")]
    status_addr: SocketAddr,

    /// The number of times an ingress update is attempted before a conflict
    /// is treated as a failure.
    #[clap(long, default_value = "5")]
    update_attempts: u32,

    #[clap(long, default_value = "100")]
    update_backoff_ms: u64,

    #[clap(long, default_value = "5000")]
    update_backoff_max_ms: u64,

    /// How often failed reconciliations are retried.
    #[clap(long, default_value = "30")]
    requeue_interval_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            namespace,
            status_addr,
            update_attempts,
            update_backoff_ms,
            update_backoff_max_ms,
            requeue_interval_secs,
        } = self;

        ensure!(update_attempts > 0, "--update-attempts must be at least 1");
        ensure!(
            requeue_interval_secs > 0,
            "--requeue-interval-secs must be at least 1"
        );
        let namespace = namespace.filter(|ns| !ns.is_empty());
        let backoff = Backoff {
            attempts: update_attempts,
            initial: Duration::from_millis(update_backoff_ms),
            max: Duration::from_millis(update_backoff_max_ms),
        };

        let mut prom = <Registry>::default();
        let metrics = index::Metrics::register(prom.sub_registry_with_prefix("ingress_rules"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        match &namespace {
            Some(ns) => info!(namespace = %ns, "Watching services in a single namespace"),
            None => info!("Watching services in all namespaces"),
        }

        // Record the attachments that already exist before any events are
        // handled so that replayed services are not attached twice.
        let cluster = KubeCluster::new(runtime.client(), namespace.clone());
        let store = Store::shared();
        let attached = bootstrap::scan(&cluster, &store)
            .await
            .context("failed to scan services")?;
        info!(attached, "Bootstrapped attachments");

        // Spawn the service watch, translating its updates into ordered events.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let events = EventIndex::shared(events_tx);
        let api = match &namespace {
            Some(ns) => Api::<Service>::namespaced(runtime.client(), ns),
            None => Api::<Service>::all(runtime.client()),
        };
        let services = runtime.watch(api, watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(events, services).instrument(info_span!("services")),
        );

        // Spawn the reconciler, which owns all ingress mutations.
        let reconciler = Reconciler::new(cluster, store.clone(), backoff, metrics);
        tokio::spawn(
            reconciler
                .run(events_rx, Duration::from_secs(requeue_interval_secs))
                .instrument(info_span!("reconciler")),
        );

        let drain = runtime.shutdown_handle();
        tokio::spawn(async move {
            if let Err(error) = status::serve(status_addr, store, drain).await {
                error!(%error, addr = %status_addr, "Status server failed");
            }
        });

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
