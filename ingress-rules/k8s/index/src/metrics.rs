use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct Metrics {
    attaches: Family<OutcomeLabels, Counter>,
    detaches: Family<OutcomeLabels, Counter>,
    pub(crate) conflicts: Counter,
    attachments: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    result: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum Outcome {
    Ok,
    Error,
}

impl Metrics {
    pub fn register(prom: &mut Registry) -> Self {
        let attaches = Family::default();
        prom.register(
            "attaches",
            "Count of attempts to attach a service to an ingress",
            attaches.clone(),
        );

        let detaches = Family::default();
        prom.register(
            "detaches",
            "Count of attempts to detach a service from an ingress",
            detaches.clone(),
        );

        let conflicts = Counter::default();
        prom.register(
            "update_conflicts",
            "Count of ingress updates rejected due to a stale resource version",
            conflicts.clone(),
        );

        let attachments = Gauge::default();
        prom.register(
            "attachments",
            "Gauge of the number of services attached to an ingress",
            attachments.clone(),
        );

        Self {
            attaches,
            detaches,
            conflicts,
            attachments,
        }
    }

    pub(crate) fn attach(&self, ok: bool) {
        self.attaches.get_or_create(&OutcomeLabels::from(ok)).inc();
    }

    pub(crate) fn detach(&self, ok: bool) {
        self.detaches.get_or_create(&OutcomeLabels::from(ok)).inc();
    }

    pub(crate) fn set_attachments(&self, n: usize) {
        self.attachments.set(n as i64);
    }
}

impl From<bool> for OutcomeLabels {
    fn from(ok: bool) -> Self {
        let result = if ok { Outcome::Ok } else { Outcome::Error };
        Self { result }
    }
}
