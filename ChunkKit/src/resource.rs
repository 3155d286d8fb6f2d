//! Lazy load / explicit commit wrapper for resources stored in chunks
//!
//! A [`ResourceSlot`] owns the raw bytes of one resource and parses them only
//! when the resource is first accessed. Mutable access marks the slot dirty;
//! a dirty slot refuses to drop or swap its bytes until the changes are
//! committed (re-serialized) or discarded.
//!
//! ```
//! use chunkkit::formats::chunk::Chunk;
//! use chunkkit::formats::model::ModelPackage;
//! use chunkkit::resource::{Resource, ResourceSlot};
//!
//! # fn edit(chunk: &mut Chunk) -> chunkkit::Result<()> {
//! let mut slot = ResourceSlot::<ModelPackage>::from_chunk(chunk)?;
//! slot.get_mut()?.uid = 0x1234;
//! slot.commit_to(chunk)?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::formats::chunk::Chunk;
use crate::formats::common::tag_name;

/// A typed object that lives as the payload of a chunk.
pub trait Resource: Sized {
    /// Chunk context tag identifying this resource type.
    const CONTEXT: u32;

    /// Parse the resource from its payload bytes.
    fn load(data: &[u8]) -> Result<Self>;

    /// Serialize the resource back to payload bytes.
    fn save(&self) -> Result<Vec<u8>>;
}

/// Observable state of a [`ResourceSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Only the raw bytes are held.
    Unloaded,
    /// Parsed and identical to the raw bytes.
    Loaded,
    /// Parsed and possibly edited since the last commit.
    Dirty,
}

/// Raw resource bytes plus the lazily parsed object.
#[derive(Debug)]
pub struct ResourceSlot<T: Resource> {
    bytes: Vec<u8>,
    value: Option<T>,
    /// Only set while `value` holds uncommitted edits
    dirty: bool,
}

impl<T: Resource> ResourceSlot<T> {
    /// Wrap raw payload bytes without parsing them.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            value: None,
            dirty: false,
        }
    }

    /// Wrap an already constructed object; the slot starts dirty.
    #[must_use]
    pub fn from_value(value: T) -> Self {
        Self {
            bytes: Vec::new(),
            value: Some(value),
            dirty: true,
        }
    }

    /// Take a copy of a data chunk's payload.
    ///
    /// # Errors
    /// Returns [`Error::ContextMismatch`] if the chunk's context is not
    /// `T::CONTEXT`, or [`Error::UnimplementedFormat`] if the chunk holds a
    /// nested container instead of data.
    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        check_context::<T>(chunk)?;
        let data = chunk.data().ok_or_else(|| {
            Error::unimplemented(format!(
                "{} resource stored as a nested container",
                tag_name(T::CONTEXT)
            ))
        })?;
        Ok(Self::new(data.to_vec()))
    }

    #[must_use]
    pub fn state(&self) -> SlotState {
        match (&self.value, self.dirty) {
            (None, _) => SlotState::Unloaded,
            (Some(_), false) => SlotState::Loaded,
            (Some(_), true) => SlotState::Dirty,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.dirty
    }

    /// The backing bytes as of the last load or commit.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The parsed object, parsing the backing bytes on first use.
    ///
    /// A failed parse leaves the slot unloaded, so a later call retries.
    fn loaded(&mut self) -> Result<&mut T> {
        let value = match self.value.take() {
            Some(value) => value,
            None => T::load(&self.bytes)?,
        };
        Ok(self.value.insert(value))
    }

    /// Parse the backing bytes if that has not happened yet.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        self.loaded().map(|_| ())
    }

    /// Shared access, loading on first use.
    pub fn get(&mut self) -> Result<&T> {
        self.loaded().map(|value| &*value)
    }

    /// Mutable access, loading on first use. Marks the slot dirty.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        self.mark_dirty()?;
        self.loaded()
    }

    /// Flag the loaded object as edited.
    pub fn mark_dirty(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        self.dirty = true;
        Ok(())
    }

    /// Serialize pending edits into the backing bytes.
    ///
    /// Does nothing when the slot is clean. On failure the slot stays dirty
    /// and the previous bytes are kept.
    pub fn commit(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(value) = &self.value {
            self.bytes = value.save()?;
        }
        self.dirty = false;
        tracing::debug!(
            "Committed {} resource ({} bytes)",
            tag_name(T::CONTEXT),
            self.bytes.len()
        );
        Ok(())
    }

    /// Commit and store the result as the payload of `chunk`.
    ///
    /// # Errors
    /// Returns [`Error::ContextMismatch`] if the chunk's context is not
    /// `T::CONTEXT`, or any error from [`Resource::save`].
    pub fn commit_to(&mut self, chunk: &mut Chunk) -> Result<()> {
        check_context::<T>(chunk)?;
        self.commit()?;
        chunk.set_data(self.bytes.clone());
        Ok(())
    }

    /// Drop the parsed object, keeping only the bytes.
    ///
    /// # Errors
    /// Returns [`Error::PendingChanges`] while the slot is dirty.
    pub fn free(&mut self) -> Result<()> {
        if self.dirty {
            return Err(Error::PendingChanges);
        }
        self.value = None;
        Ok(())
    }

    /// Swap in new backing bytes; the object is reparsed on next access.
    ///
    /// # Errors
    /// Returns [`Error::PendingChanges`] while the slot is dirty.
    pub fn replace_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        if self.dirty {
            return Err(Error::PendingChanges);
        }
        self.bytes = bytes;
        self.value = None;
        Ok(())
    }

    /// Throw away uncommitted edits.
    pub fn discard(&mut self) {
        if self.dirty {
            tracing::warn!("Discarding uncommitted {} edits", tag_name(T::CONTEXT));
        }
        self.value = None;
        self.dirty = false;
    }

    /// Commit pending edits and return the bytes.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.commit()?;
        Ok(self.bytes)
    }
}

fn check_context<T: Resource>(chunk: &Chunk) -> Result<()> {
    if chunk.context == T::CONTEXT {
        Ok(())
    } else {
        Err(Error::ContextMismatch {
            expected: T::CONTEXT,
            found: chunk.context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static LOADS: Cell<usize> = const { Cell::new(0) };
    }

    /// A one-word resource; saving fails for the value 0xDEAD.
    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    impl Resource for Counter {
        const CONTEXT: u32 = 0x544E_4F43;

        fn load(data: &[u8]) -> Result<Self> {
            LOADS.with(|l| l.set(l.get() + 1));
            let bytes: [u8; 4] = data.try_into().map_err(|_| Error::UnexpectedEof {
                offset: 0,
                needed: 4,
            })?;
            Ok(Counter(u32::from_le_bytes(bytes)))
        }

        fn save(&self) -> Result<Vec<u8>> {
            if self.0 == 0xDEAD {
                return Err(Error::unimplemented("dead counter"));
            }
            Ok(self.0.to_le_bytes().to_vec())
        }
    }

    fn loads() -> usize {
        LOADS.with(Cell::get)
    }

    #[test]
    fn test_lazy_load_runs_once() {
        let mut slot = ResourceSlot::<Counter>::new(5u32.to_le_bytes().to_vec());
        assert_eq!(slot.state(), SlotState::Unloaded);
        let before = loads();
        assert_eq!(slot.get().unwrap(), &Counter(5));
        assert_eq!(slot.get().unwrap(), &Counter(5));
        slot.ensure_loaded().unwrap();
        assert_eq!(loads() - before, 1);
        assert_eq!(slot.state(), SlotState::Loaded);
    }

    #[test]
    fn test_failed_load_stays_unloaded() {
        let mut slot = ResourceSlot::<Counter>::new(vec![1, 2]);
        assert!(slot.ensure_loaded().is_err());
        assert_eq!(slot.state(), SlotState::Unloaded);

        // Neither accessor leaves a half-loaded or dirty slot behind
        assert!(slot.get().is_err());
        assert!(slot.get_mut().is_err());
        assert_eq!(slot.state(), SlotState::Unloaded);
        assert!(!slot.has_pending_changes());

        slot.replace_bytes(3u32.to_le_bytes().to_vec()).unwrap();
        assert_eq!(slot.get_mut().unwrap(), &mut Counter(3));
        assert_eq!(slot.state(), SlotState::Dirty);
    }

    #[test]
    fn test_from_value_starts_dirty() {
        let mut slot = ResourceSlot::from_value(Counter(9));
        assert_eq!(slot.state(), SlotState::Dirty);
        assert_eq!(slot.into_bytes().unwrap(), 9u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_pending_changes_block_free_and_replace() {
        let mut slot = ResourceSlot::<Counter>::new(1u32.to_le_bytes().to_vec());
        slot.get_mut().unwrap().0 = 2;
        assert!(slot.has_pending_changes());
        assert!(matches!(slot.free(), Err(Error::PendingChanges)));
        assert!(matches!(slot.replace_bytes(vec![0; 4]), Err(Error::PendingChanges)));

        slot.commit().unwrap();
        assert_eq!(slot.bytes(), &2u32.to_le_bytes());
        assert_eq!(slot.state(), SlotState::Loaded);
        slot.free().unwrap();
        assert_eq!(slot.state(), SlotState::Unloaded);
    }

    #[test]
    fn test_failed_commit_stays_dirty() {
        let mut slot = ResourceSlot::<Counter>::new(1u32.to_le_bytes().to_vec());
        slot.get_mut().unwrap().0 = 0xDEAD;
        assert!(slot.commit().is_err());
        assert!(slot.has_pending_changes());
        assert_eq!(slot.bytes(), &1u32.to_le_bytes());

        slot.discard();
        assert_eq!(slot.get().unwrap(), &Counter(1));
    }

    #[test]
    fn test_chunk_round_trip() {
        let mut chunk = Chunk::new_data(Counter::CONTEXT, 7u32.to_le_bytes().to_vec());
        let mut slot = ResourceSlot::<Counter>::from_chunk(&chunk).unwrap();
        slot.get_mut().unwrap().0 += 1;
        slot.commit_to(&mut chunk).unwrap();
        assert_eq!(chunk.data(), Some(&8u32.to_le_bytes()[..]));

        let other = Chunk::new_data(1, vec![]);
        assert!(matches!(
            ResourceSlot::<Counter>::from_chunk(&other),
            Err(Error::ContextMismatch { found: 1, .. })
        ));
    }
}
