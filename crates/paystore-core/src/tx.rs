//! Transaction implementations: `ViewTx` (read) and `UpdateTx` (read-write).
//!
//! View transactions read a frozen `Arc<State>`; nothing they do can observe
//! a later commit. Update transactions mutate a private working copy and
//! record every mutation as an `Op`; the store turns those ops into one log
//! entry on commit, or drops the working copy on error.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::format::Op;
use crate::state::{lossy, Iter, NamespaceData, NamespaceId, Slot, State};

// ---------------------------------------------------------------------------
// Read-only transaction
// ---------------------------------------------------------------------------

/// Read-only transaction over a point-in-time snapshot.
pub struct ViewTx {
    state: Arc<State>,
}

impl ViewTx {
    pub(crate) fn new(state: Arc<State>) -> Self {
        Self { state }
    }

    /// Top-level namespace by name.
    pub fn namespace(&self, name: &[u8]) -> Option<Namespace<'_>> {
        Namespace::top_level(&self.state, name)
    }

    /// Id of the last transaction visible to this view.
    pub fn txid(&self) -> u64 {
        self.state.txid
    }
}

impl std::fmt::Debug for ViewTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewTx").field("txid", &self.state.txid).finish()
    }
}

/// Read handle on one namespace, valid for the enclosing transaction.
#[derive(Clone, Copy)]
pub struct Namespace<'tx> {
    state: &'tx State,
    id: NamespaceId,
    data: &'tx NamespaceData,
}

impl<'tx> Namespace<'tx> {
    fn top_level(state: &'tx State, name: &[u8]) -> Option<Self> {
        let id = state.namespace(NamespaceId::ROOT)?.child(name)?;
        Self::open(state, id)
    }

    fn open(state: &'tx State, id: NamespaceId) -> Option<Self> {
        state.namespace(id).map(|data| Self { state, id, data })
    }

    pub fn id(&self) -> NamespaceId {
        self.id
    }

    /// Record stored under `key`; `None` when absent or when a nested namespace lives there.
    pub fn get(&self, key: &[u8]) -> Option<&'tx [u8]> {
        self.data.value(key)
    }

    /// Nested namespace stored under `name`.
    pub fn namespace(&self, name: &[u8]) -> Option<Namespace<'tx>> {
        self.data.child(name).and_then(|id| Self::open(self.state, id))
    }

    /// All key positions in ascending key order, nested namespaces included.
    pub fn iter(&self) -> Iter<'tx> {
        Iter::new(self.data)
    }

    /// Records only, in ascending key order.
    pub fn records(&self) -> impl Iterator<Item = (&'tx [u8], &'tx [u8])> + 'tx {
        self.data.entries.iter().filter_map(|(key, slot)| match slot {
            Slot::Value(value) => Some((key.as_slice(), value.as_slice())),
            Slot::Namespace(_) => None,
        })
    }

    /// Current value of the namespace's sequence counter.
    pub fn sequence(&self) -> u64 {
        self.data.sequence
    }

    /// Number of key positions, nested namespaces included.
    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }
}

impl std::fmt::Debug for Namespace<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("entries", &self.data.entries.len())
            .field("sequence", &self.data.sequence)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Read-write transaction
// ---------------------------------------------------------------------------

static EMPTY_NAMESPACE: NamespaceData = NamespaceData { entries: BTreeMap::new(), sequence: 0 };

/// Size limits enforced on writes
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_key_size: usize,
    max_value_size: usize,
}

/// Read-write transaction.
///
/// Only one exists at a time: `Store::update` holds the writer lock for the
/// transaction's whole lifetime. Reads inside the transaction see its own
/// uncommitted writes.
pub struct UpdateTx {
    state: State,
    ops: Vec<Op>,
    limits: Limits,
}

impl UpdateTx {
    pub(crate) fn new(mut state: State, config: &Config) -> Self {
        state.txid += 1;
        Self {
            state,
            ops: Vec::new(),
            limits: Limits { max_key_size: config.max_key_size, max_value_size: config.max_value_size },
        }
    }

    /// Hand back the working state and the ops that produced it.
    pub(crate) fn finish(self) -> (State, Vec<Op>) {
        (self.state, self.ops)
    }

    /// Id this transaction commits under.
    pub fn txid(&self) -> u64 {
        self.state.txid
    }

    /// Read handle on a top-level namespace.
    pub fn namespace(&self, name: &[u8]) -> Option<Namespace<'_>> {
        Namespace::top_level(&self.state, name)
    }

    /// Write handle on a top-level namespace.
    pub fn namespace_mut(&mut self, name: &[u8]) -> Option<NamespaceMut<'_>> {
        NamespaceMut { tx: self, id: NamespaceId::ROOT }.into_namespace_mut(name)
    }

    /// Write handle on a top-level namespace, creating it when absent.
    pub fn create_namespace_if_not_exists(&mut self, name: &[u8]) -> StoreResult<NamespaceMut<'_>> {
        NamespaceMut { tx: self, id: NamespaceId::ROOT }.into_created_namespace(name)
    }

    /// Number of mutations recorded so far.
    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    fn apply(&mut self, op: Op) -> StoreResult<()> {
        self.state.apply(&op)?;
        self.ops.push(op);
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if key.len() > self.limits.max_key_size {
            return Err(StoreError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: self.limits.max_key_size as u64,
                component: "key".to_string(),
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> StoreResult<()> {
        if value.len() > self.limits.max_value_size {
            return Err(StoreError::OversizedEntry {
                entry_size: value.len() as u64,
                max_size: self.limits.max_value_size as u64,
                component: "value".to_string(),
            });
        }
        Ok(())
    }

    fn data(&self, id: NamespaceId) -> &NamespaceData {
        // Handles are only minted for ids present in this state and namespaces
        // are never dropped, so the fallback is unreachable in practice.
        self.state.namespace(id).unwrap_or(&EMPTY_NAMESPACE)
    }
}

impl std::fmt::Debug for UpdateTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateTx")
            .field("txid", &self.state.txid)
            .field("pending_ops", &self.ops.len())
            .finish()
    }
}

/// Write handle on one namespace inside an update transaction.
pub struct NamespaceMut<'tx> {
    tx: &'tx mut UpdateTx,
    id: NamespaceId,
}

impl<'tx> NamespaceMut<'tx> {
    pub fn id(&self) -> NamespaceId {
        self.id
    }

    /// Record stored under `key`, including writes made earlier in this transaction.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.tx.data(self.id).value(key)
    }

    /// All key positions in ascending key order, nested namespaces included.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self.tx.data(self.id))
    }

    /// Records only, in ascending key order.
    pub fn records(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.tx.data(self.id).entries.iter().filter_map(|(key, slot)| match slot {
            Slot::Value(value) => Some((key.as_slice(), value.as_slice())),
            Slot::Namespace(_) => None,
        })
    }

    /// Current value of the sequence counter.
    pub fn sequence(&self) -> u64 {
        self.tx.data(self.id).sequence
    }

    /// Insert or overwrite the record under `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.tx.check_key(key)?;
        self.tx.check_value(value)?;
        self.tx.apply(Op::Put { ns: self.id, key: key.to_vec(), value: value.to_vec() })
    }

    /// Remove the record under `key`. Removing an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        match self.tx.data(self.id).entries.get(key) {
            None => Ok(()),
            Some(Slot::Namespace(_)) => Err(StoreError::IncompatibleValue { key: lossy(key) }),
            Some(Slot::Value(_)) => self.tx.apply(Op::Delete { ns: self.id, key: key.to_vec() }),
        }
    }

    /// Advance the sequence counter and return the new value.
    ///
    /// The first call on a new namespace returns 1. The counter is committed
    /// with the transaction, so values are never handed out twice.
    pub fn next_sequence(&mut self) -> StoreResult<u64> {
        let next = self.sequence() + 1;
        self.tx.apply(Op::SetSequence { ns: self.id, value: next })?;
        Ok(next)
    }

    /// Write handle on the nested namespace `name`.
    pub fn namespace_mut(&mut self, name: &[u8]) -> Option<NamespaceMut<'_>> {
        NamespaceMut { tx: &mut *self.tx, id: self.id }.into_namespace_mut(name)
    }

    /// Write handle on the nested namespace `name`, creating it when absent.
    pub fn create_namespace_if_not_exists(&mut self, name: &[u8]) -> StoreResult<NamespaceMut<'_>> {
        NamespaceMut { tx: &mut *self.tx, id: self.id }.into_created_namespace(name)
    }

    /// Trade this handle for one on the nested namespace `name`.
    pub fn into_namespace_mut(self, name: &[u8]) -> Option<NamespaceMut<'tx>> {
        let id = self.tx.data(self.id).child(name)?;
        Some(NamespaceMut { tx: self.tx, id })
    }

    /// Trade this handle for one on the nested namespace `name`, creating it when absent.
    pub fn into_created_namespace(self, name: &[u8]) -> StoreResult<NamespaceMut<'tx>> {
        self.tx.check_key(name)?;
        let id = match self.tx.data(self.id).entries.get(name) {
            Some(Slot::Namespace(id)) => *id,
            Some(Slot::Value(_)) => return Err(StoreError::IncompatibleValue { key: lossy(name) }),
            None => {
                let id = self.tx.state.allocate_namespace_id();
                self.tx.apply(Op::CreateNamespace { id, parent: self.id, name: name.to_vec() })?;
                id
            }
        };
        Ok(NamespaceMut { tx: self.tx, id })
    }
}

impl std::fmt::Debug for NamespaceMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceMut").field("id", &self.id).finish()
    }
}
