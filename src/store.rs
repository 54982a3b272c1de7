//! Persistence for slips, with compare-and-set writes
use super::error::StoreError;
use super::slip::{Slip, SlipKind, SlipState};
use sled::{Db, Tree};
use std::sync::Arc;

/// Record store the engine is written against.
pub trait SlipStore {
    /// Reserve a fresh id for a new slip of `kind`.
    fn next_id(&self, kind: SlipKind) -> Result<u64, StoreError>;

    fn insert(&self, slip: &Slip) -> Result<(), StoreError>;

    fn get(&self, kind: SlipKind, id: u64) -> Result<Slip, StoreError>;

    /// Write `slip` only if the stored record is still in `expected_state`
    /// at `expected_version`, otherwise fail with [`StoreError::Conflict`].
    fn compare_and_save(
        &self,
        slip: &Slip,
        expected_state: SlipState,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Every slip of `kind`, in id order.
    fn list(&self, kind: SlipKind) -> Result<Vec<Slip>, StoreError>;
}

impl<S: SlipStore + ?Sized> SlipStore for Arc<S> {
    fn next_id(&self, kind: SlipKind) -> Result<u64, StoreError> {
        (**self).next_id(kind)
    }
    fn insert(&self, slip: &Slip) -> Result<(), StoreError> {
        (**self).insert(slip)
    }
    fn get(&self, kind: SlipKind, id: u64) -> Result<Slip, StoreError> {
        (**self).get(kind, id)
    }
    fn compare_and_save(
        &self,
        slip: &Slip,
        expected_state: SlipState,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        (**self).compare_and_save(slip, expected_state, expected_version)
    }
    fn list(&self, kind: SlipKind) -> Result<Vec<Slip>, StoreError> {
        (**self).list(kind)
    }
}

/// sled backed store, one tree per slip kind keyed by big-endian id.
#[derive(Clone)]
pub struct SledStore {
    instance: Arc<Db>,
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    fn tree(&self, kind: SlipKind) -> Result<Tree, StoreError> {
        Ok(self.instance.open_tree(kind.as_str())?)
    }

    fn encode(slip: &Slip) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(slip).map_err(|e| StoreError::Encode(e.to_string()))
    }
}

impl SlipStore for SledStore {
    fn next_id(&self, _kind: SlipKind) -> Result<u64, StoreError> {
        // generate_id starts at zero
        Ok(self.instance.generate_id()? + 1)
    }

    fn insert(&self, slip: &Slip) -> Result<(), StoreError> {
        let tree = self.tree(slip.kind())?;
        let bytes = Self::encode(slip)?;

        tree.compare_and_swap(slip.id().to_be_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::Conflict { id: slip.id() })
    }

    fn get(&self, kind: SlipKind, id: u64) -> Result<Slip, StoreError> {
        let tree = self.tree(kind)?;
        match tree.get(id.to_be_bytes())? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Err(StoreError::NotFound { kind, id }),
        }
    }

    fn compare_and_save(
        &self,
        slip: &Slip,
        expected_state: SlipState,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let tree = self.tree(slip.kind())?;
        let key = slip.id().to_be_bytes();
        let current = tree.get(key)?.ok_or(StoreError::NotFound {
            kind: slip.kind(),
            id: slip.id(),
        })?;

        let stored: Slip = minicbor::decode(&current)?;
        if stored.state() != expected_state || stored.version() != expected_version {
            return Err(StoreError::Conflict { id: slip.id() });
        }

        // swap against the exact bytes checked above, a writer in between loses
        tree.compare_and_swap(key, Some(current), Some(Self::encode(slip)?))?
            .map_err(|_| StoreError::Conflict { id: slip.id() })
    }

    fn list(&self, kind: SlipKind) -> Result<Vec<Slip>, StoreError> {
        let tree = self.tree(kind)?;
        let mut slips = vec![];
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            slips.push(minicbor::decode(&bytes)?);
        }
        Ok(slips)
    }
}
