#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster;

pub use self::cluster::{Cluster, Error, KubeCluster};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Service, ServicePort, ServiceSpec},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, ServiceBackendPort,
        },
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
pub use kube::{
    api::{Api, ListParams, PostParams},
    Client, Resource, ResourceExt,
};
