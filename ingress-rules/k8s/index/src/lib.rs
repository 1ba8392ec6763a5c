//! Ingress rules controller
//!
//! Keeps an ingress's rules in step with the services that ask to be routed
//! through it. The controller is made of a few cooperating pieces:
//!
//! - The [`bootstrap`] scan runs once at startup. It lists services and
//!   records, without editing anything, which of them are already routed by
//!   their ingress.
//! - The [`EventIndex`] is fed by the service watch. It remembers the last
//!   version of each service so that it can publish ordered
//!   [`ServiceEvent`]s that carry the prior object on updates and deletes.
//! - The [`Reconciler`] consumes those events one at a time, attaching and
//!   detaching services by editing their ingress through the [`Editor`].
//! - The [`Store`] records which services are attached where. It's shared
//!   with the status server, which only ever reads it.
//!
//! ```text
//! [ watch ] -> [ EventIndex ] -> ServiceEvent -> [ Reconciler ] -> [ Editor ] -> Ingress
//!                                                      |
//!                                                  [ Store ] <- status
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod bootstrap;
mod editor;
mod events;
mod metrics;
mod reconcile;
mod store;


pub use self::{
    editor::{Backoff, Editor},
    events::{EventIndex, ServiceEvent, SharedEvents},
    metrics::Metrics,
    reconcile::{Error, Reconciler},
    store::{SharedStore, Store},
};
