//! Ingress rules core
//!
//! Services opt into routing through an ingress by carrying annotations that
//! name the ingress and the host to route. This crate holds the pieces of the
//! controller that don't talk to the cluster:
//!
//! - [`annotation`] derives a [`RoutingIntent`] from a service's annotations;
//! - [`Attachment`] records that a service has been wired into an ingress;
//! - [`rules`] finds, adds, and removes backend paths in an ingress's rules.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotation;
mod attachment;
pub mod rules;

pub use self::{
    annotation::RoutingIntent,
    attachment::Attachment,
    rules::{Backend, Position},
};
