//! In-memory state of a store: every namespace and its records.
//!
//! The committed state lives behind an `Arc` and is never mutated in place.
//! An update transaction clones the namespace table (cheap: one `Arc` per
//! namespace) and copies a namespace's contents only on its first write,
//! so open view transactions keep seeing the state they started with.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::format::{Op, BATCH_PREFIX_SIZE, FILE_HEADER_SIZE, HEADER_SIZE};

/// Identifier of a namespace, stable for the life of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub u32);

impl NamespaceId {
    /// The implicit root that holds top-level namespaces
    pub const ROOT: NamespaceId = NamespaceId(0);
}

/// What occupies a key position inside a namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    Value(Vec<u8>),
    Namespace(NamespaceId),
}

/// One namespace's key positions plus its sequence counter
#[derive(Debug, Clone, Default)]
pub(crate) struct NamespaceData {
    pub(crate) entries: BTreeMap<Vec<u8>, Slot>,
    pub(crate) sequence: u64,
}

impl NamespaceData {
    pub(crate) fn value(&self, key: &[u8]) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(Slot::Value(value)) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub(crate) fn child(&self, name: &[u8]) -> Option<NamespaceId> {
        match self.entries.get(name) {
            Some(Slot::Namespace(id)) => Some(*id),
            _ => None,
        }
    }
}

/// A key position seen while iterating a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    /// A stored record
    Value(&'a [u8]),
    /// A nested namespace lives at this key
    Namespace,
}

/// Ascending-key iterator over a namespace's positions
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, Vec<u8>, Slot>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(data: &'a NamespaceData) -> Self {
        Self { inner: data.entries.iter() }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], Entry<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, slot)| {
            let entry = match slot {
                Slot::Value(value) => Entry::Value(value.as_slice()),
                Slot::Namespace(_) => Entry::Namespace,
            };
            (key.as_slice(), entry)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// The complete store state at one transaction id
#[derive(Debug, Clone)]
pub(crate) struct State {
    namespaces: HashMap<NamespaceId, Arc<NamespaceData>>,
    next_namespace_id: u32,
    /// Id of the last transaction folded into this state
    pub(crate) txid: u64,
}

impl State {
    pub(crate) fn new() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert(NamespaceId::ROOT, Arc::new(NamespaceData::default()));
        Self { namespaces, next_namespace_id: 1, txid: 0 }
    }

    /// True until the first namespace is created
    pub(crate) fn is_pristine(&self) -> bool {
        self.namespaces.len() == 1 && self.txid == 0
    }

    pub(crate) fn namespace(&self, id: NamespaceId) -> Option<&NamespaceData> {
        self.namespaces.get(&id).map(Arc::as_ref)
    }

    /// Number of namespaces, excluding the root
    pub(crate) fn namespace_count(&self) -> usize {
        self.namespaces.len() - 1
    }

    pub(crate) fn allocate_namespace_id(&self) -> NamespaceId {
        NamespaceId(self.next_namespace_id)
    }

    fn namespace_mut(&mut self, id: NamespaceId) -> StoreResult<&mut NamespaceData> {
        self.namespaces
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or_else(|| StoreError::NamespaceNotFound { name: format!("#{}", id.0) })
    }

    /// Fold one operation into the state.
    ///
    /// Fails without side effects when the operation does not fit the
    /// current shape of the state.
    pub(crate) fn apply(&mut self, op: &Op) -> StoreResult<()> {
        match op {
            Op::CreateNamespace { id, parent, name } => {
                if *id == NamespaceId::ROOT || self.namespaces.contains_key(id) {
                    return Err(StoreError::IncompatibleValue { key: lossy(name) });
                }
                let parent_data = self.namespace_mut(*parent)?;
                if parent_data.entries.contains_key(name) {
                    return Err(StoreError::IncompatibleValue { key: lossy(name) });
                }
                parent_data.entries.insert(name.clone(), Slot::Namespace(*id));
                self.namespaces.insert(*id, Arc::new(NamespaceData::default()));
                self.next_namespace_id = self.next_namespace_id.max(id.0 + 1);
            }
            Op::Put { ns, key, value } => {
                if *ns == NamespaceId::ROOT {
                    return Err(StoreError::IncompatibleValue { key: lossy(key) });
                }
                let data = self.namespace_mut(*ns)?;
                if let Some(Slot::Namespace(_)) = data.entries.get(key) {
                    return Err(StoreError::IncompatibleValue { key: lossy(key) });
                }
                data.entries.insert(key.clone(), Slot::Value(value.clone()));
            }
            Op::Delete { ns, key } => {
                let data = self.namespace_mut(*ns)?;
                if let Some(Slot::Namespace(_)) = data.entries.get(key) {
                    return Err(StoreError::IncompatibleValue { key: lossy(key) });
                }
                data.entries.remove(key);
            }
            Op::SetSequence { ns, value } => {
                self.namespace_mut(*ns)?.sequence = *value;
            }
        }
        Ok(())
    }

    /// Operations that rebuild this state from nothing, parents before children
    pub(crate) fn snapshot_ops(&self) -> Vec<Op> {
        let mut ops = Vec::new();
        self.collect_ops(NamespaceId::ROOT, &mut ops);
        ops
    }

    fn collect_ops(&self, id: NamespaceId, ops: &mut Vec<Op>) {
        let data = match self.namespace(id) {
            Some(data) => data,
            None => return,
        };
        if data.sequence > 0 {
            ops.push(Op::SetSequence { ns: id, value: data.sequence });
        }
        for (key, slot) in &data.entries {
            match slot {
                Slot::Value(value) => ops.push(Op::Put { ns: id, key: key.clone(), value: value.clone() }),
                Slot::Namespace(child) => {
                    ops.push(Op::CreateNamespace { id: *child, parent: id, name: key.clone() });
                    self.collect_ops(*child, ops);
                }
            }
        }
    }

    /// Bytes a freshly compacted file holding this state would occupy
    pub(crate) fn live_bytes(&self) -> u64 {
        let ops: usize = self.snapshot_ops().iter().map(Op::encoded_len).sum();
        (FILE_HEADER_SIZE + HEADER_SIZE + BATCH_PREFIX_SIZE + ops) as u64
    }
}

/// Render a key for error messages
pub(crate) fn lossy(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
