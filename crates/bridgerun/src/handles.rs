//! # Object Handles
//!
//! Local objects are named to the peer by small integers. A handle is only meaningful to
//! the side that registered it: the peer stores it and sends it back, and this side turns
//! it into the object again.
//!
//! ## Invariants
//! - **Append Only**: Registration never removes or reorders entries, so a handle stays
//!   valid for the life of the connection.
//! - **No Deduplication**: Registering the same object twice yields two handles.
//! - **Null Is Zero**: Handle `0` means "no object"; the first registration is `1`.

use std::any::Any;
use std::sync::Arc;
use std::sync::RwLock;

use bridgewire::Handle;

use crate::error::Error;
use crate::error::Result;
use crate::fatal;

type Entry = Arc<dyn Any + Send + Sync>;

/// The per-connection table of objects exposed to the peer.
#[derive(Default)]
pub struct HandleTable {
    entries: RwLock<Vec<Entry>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `object` and returns the handle that now names it.
    pub fn register<T: Any + Send + Sync>(&self, object: Arc<T>) -> Handle {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(object);
        Handle::from_index(entries.len() - 1)
    }

    /// As [`register`](Self::register), mapping `None` to [`Handle::NULL`] without
    /// touching the table.
    pub fn register_nullable<T: Any + Send + Sync>(&self, object: Option<Arc<T>>) -> Handle {
        match object {
            Some(object) => self.register(object),
            None => Handle::NULL,
        }
    }

    /// Resolves `handle` to an object of type `T`.
    ///
    /// # Errors
    /// `HandleOutOfRange` if the table never issued `handle`, `HandleType` if it names an
    /// object of another type.
    pub fn try_lookup<T: Any + Send + Sync>(&self, handle: Handle) -> Result<Option<Arc<T>>> {
        let Some(index) = handle.index() else {
            return Ok(None);
        };
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get(index)
            .cloned()
            .ok_or(Error::HandleOutOfRange { handle, len: entries.len() })?;
        entry
            .downcast::<T>()
            .map(Some)
            .map_err(|_| Error::HandleType { handle, expected: std::any::type_name::<T>() })
    }

    /// Resolves `handle`, aborting on a handle the peer could not legitimately hold.
    pub fn lookup<T: Any + Send + Sync>(&self, handle: Handle) -> Option<Arc<T>> {
        self.try_lookup(handle).unwrap_or_else(|e| fatal::abort(e))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
