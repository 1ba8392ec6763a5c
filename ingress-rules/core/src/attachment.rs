use crate::{Position, RoutingIntent};
use serde::Serialize;

/// Records that a service's backend has been wired into an ingress rule.
///
/// The position is the first place the service was observed in the ingress
/// when the attachment was recorded. It goes stale as soon as anyone else
/// edits the ingress, so it's only ever reported, never used to edit rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub namespace: String,
    pub service_name: String,
    pub ingress_name: String,
    pub host: String,

    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Attachment {
    pub fn new(
        namespace: impl ToString,
        service_name: impl ToString,
        intent: &RoutingIntent,
        position: Option<Position>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            service_name: service_name.to_string(),
            ingress_name: intent.ingress.clone(),
            host: intent.host.clone(),
            position,
        }
    }

    /// Indicates whether this attachment already satisfies `intent`.
    pub fn matches(&self, intent: &RoutingIntent) -> bool {
        self.ingress_name == intent.ingress && self.host == intent.host
    }
}
