use ahash::AHashMap as HashMap;
use ingress_rules_core::Attachment;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

pub type SharedStore = Arc<RwLock<Store>>;

/// Records which services are attached to which ingress, keyed by service
/// name.
///
/// The store is seeded by the bootstrap scan and thereafter only written by
/// the reconciler, after the corresponding ingress edit has been committed.
/// Readers must not hold the lock across an await point.
#[derive(Debug, Default)]
pub struct Store {
    attachments: HashMap<String, Attachment>,
}

// === impl Store ===

impl Store {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn get(&self, service_name: &str) -> Option<&Attachment> {
        self.attachments.get(service_name)
    }

    /// Records an attachment, returning any attachment it replaced.
    pub fn insert(&mut self, attachment: Attachment) -> Option<Attachment> {
        self.attachments
            .insert(attachment.service_name.clone(), attachment)
    }

    pub fn remove(&mut self, service_name: &str) -> Option<Attachment> {
        self.attachments.remove(service_name)
    }

    /// Returns an ordered copy of the store's contents.
    pub fn snapshot(&self) -> BTreeMap<String, Attachment> {
        self.attachments
            .iter()
            .map(|(name, a)| (name.clone(), a.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}
