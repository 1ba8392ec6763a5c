use std::collections::BTreeMap;
use thiserror::Error;

/// Names the ingress a service should be routed through.
pub const INGRESS_ANNOTATION: &str = "king-rules/over";

/// Names the host under which the service is routed.
pub const HOST_ANNOTATION: &str = "king-rules/host";

/// Disables routing when set to anything other than `"true"`.
pub const ENABLED_ANNOTATION: &str = "ingress-rules/enabled";

/// Describes where a service asks to be routed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoutingIntent {
    pub ingress: String,
    pub host: String,
}

/// Explains why a service's annotations don't describe a routing intent.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Invalid {
    #[error("missing king-rules/over annotation")]
    MissingIngress,

    #[error("missing king-rules/host annotation")]
    MissingHost,

    #[error("routing disabled by ingress-rules/enabled={0:?}")]
    Disabled(String),
}

/// Returns the routing intent described by a set of annotations, if any.
pub fn parse(annotations: &BTreeMap<String, String>) -> Option<RoutingIntent> {
    RoutingIntent::from_annotations(annotations).ok()
}

// === impl RoutingIntent ===

impl RoutingIntent {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self, Invalid> {
        if let Some(enabled) = annotations.get(ENABLED_ANNOTATION) {
            if enabled != "true" {
                return Err(Invalid::Disabled(enabled.clone()));
            }
        }

        let ingress = non_empty(annotations, INGRESS_ANNOTATION).ok_or(Invalid::MissingIngress)?;
        let host = non_empty(annotations, HOST_ANNOTATION).ok_or(Invalid::MissingHost)?;
        Ok(Self {
            ingress: ingress.to_string(),
            host: host.to_string(),
        })
    }
}

fn non_empty<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    annotations
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}
