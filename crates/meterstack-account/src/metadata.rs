//! Property bags keyed by (subspace, entity id, property name).

use std::collections::BTreeMap;

use meterstack_kv::{Subspace, Transaction};

use crate::error::AccountError;

/// Generic property bag over one subspace.
///
/// Properties of entity `id` live at `space.pack(&[id, key])`. The store is
/// used for account metadata (`metadata:`) and bucket properties (`bucket:`).
#[derive(Debug, Clone)]
pub struct MetadataStore {
    space: Subspace,
}

impl MetadataStore {
    /// Create a bag over `space`.
    #[must_use]
    pub fn new(space: Subspace) -> Self {
        Self { space }
    }

    /// Every property of `id`, read without conflicts.
    pub fn get_raw(
        &self,
        tr: &Transaction,
        id: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, AccountError> {
        let mut props = BTreeMap::new();
        for (key, value) in tr.get_range_snapshot(&self.space.entity_range(&[id]), 0) {
            let mut elements = self.space.unpack(&key)?;
            if elements.len() == 2 {
                if let Some(name) = elements.pop() {
                    props.insert(name, value);
                }
            }
        }
        Ok(props)
    }

    /// Every property of `id` decoded as UTF-8 (lossily).
    pub fn get(&self, tr: &Transaction, id: &str) -> Result<BTreeMap<String, String>, AccountError> {
        Ok(self
            .get_raw(tr, id)?
            .into_iter()
            .map(|(k, v)| (k, String::from_utf8_lossy(&v).into_owned()))
            .collect())
    }

    /// Delete then set properties of `id`.
    pub fn update(
        &self,
        tr: &mut Transaction,
        id: &str,
        set: &BTreeMap<String, String>,
        delete: &[String],
    ) {
        for key in delete {
            tr.clear(&self.space.pack(&[id, key.as_str()]));
        }
        for (key, value) in set {
            tr.set(&self.space.pack(&[id, key.as_str()]), value.as_bytes());
        }
    }

    /// Remove every property of `id`.
    pub fn clear(&self, tr: &mut Transaction, id: &str) {
        tr.clear_range(&self.space.entity_range(&[id]));
    }
}
