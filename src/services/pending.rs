//! Tracks mutations in flight so the same target is never mutated twice
//! concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DirectoryError, Result};
use crate::models::Address;

/// Mutations that conflict with each other share a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    /// create, register storage, finalize
    Lifecycle,
    /// make public / make private
    Visibility,
    /// grant / revoke
    Access,
    /// global config and profile creation ahead of a first upload
    Setup,
}

impl OpClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpClass::Lifecycle => "file update",
            OpClass::Visibility => "visibility change",
            OpClass::Access => "access change",
            OpClass::Setup => "account setup",
        }
    }
}

#[derive(Clone, Default)]
pub struct PendingOps {
    inner: Arc<Mutex<HashSet<(OpClass, Address)>>>,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `(class, target)` pending until the returned guard drops.
    pub fn begin(&self, class: OpClass, target: Address) -> Result<PendingGuard> {
        let mut pending = self.inner.lock();
        if !pending.insert((class, target)) {
            return Err(DirectoryError::AlreadyInProgress { operation: class.as_str(), target });
        }
        Ok(PendingGuard { ops: self.clone(), key: (class, target) })
    }

    pub fn is_pending(&self, class: OpClass, target: &Address) -> bool {
        self.inner.lock().contains(&(class, *target))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[must_use = "the operation stops being pending when the guard drops"]
pub struct PendingGuard {
    ops: PendingOps,
    key: (OpClass, Address),
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.ops.inner.lock().remove(&self.key);
    }
}
