pub use ingress_rules_core as core;
pub use ingress_rules_k8s_api as k8s;
pub use ingress_rules_k8s_index as index;

mod args;
pub mod status;

pub use self::args::Args;
