//! # Wait Slots
//!
//! The store of outstanding outgoing calls. A call's [`TaskId`] is the index of the slot
//! it occupies; the peer echoes it in the return frame and the dispatcher looks the slot
//! up to find which worker is waiting.
//!
//! ## Invariants
//! - **Unique While Live**: A slot index is never handed to two calls that are
//!   outstanding at the same time. It is reused only after [`WaitSlots::release`].
//! - **Single Trigger**: A slot accepts exactly one return between allocation and release.
//! - **No Shrinking**: The pool grows to the peak number of concurrent calls and stays
//!   there. Freed slots are threaded onto a LIFO free list.
//!
//! The blocking side of a slot is the owning worker's condition variable, so a slot
//! itself only records who owns it and whether its return has arrived.

use std::sync::Mutex;

use bridgewire::TaskId;
use bridgewire::ThreadIdentity;

use crate::channel::lock;
use crate::error::Error;
use crate::error::Result;

#[derive(Default)]
struct Slot {
    next: Option<usize>,
    owner: Option<ThreadIdentity>,
    triggered: bool,
}

#[derive(Default)]
struct Pool {
    slots: Vec<Slot>,
    head: Option<usize>,
    outstanding: usize,
}

/// Outstanding outgoing calls, indexed by task id.
#[derive(Default)]
pub(crate) struct WaitSlots {
    pool: Mutex<Pool>,
}

impl WaitSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a slot for a call issued by `owner`.
    pub fn allocate(&self, owner: ThreadIdentity) -> TaskId {
        let mut pool = lock(&self.pool);
        let index = match pool.head {
            Some(index) => {
                pool.head = pool.slots[index].next.take();
                index
            }
            None => {
                pool.slots.push(Slot::default());
                pool.slots.len() - 1
            }
        };
        let slot = &mut pool.slots[index];
        slot.owner = Some(owner);
        slot.triggered = false;
        pool.outstanding += 1;
        TaskId(index as u64)
    }

    /// Marks the return for `task` as arrived and yields the identity waiting on it.
    pub fn trigger(&self, task: TaskId) -> Result<ThreadIdentity> {
        let mut pool = lock(&self.pool);
        let slot = pool
            .slots
            .get_mut(task.index())
            .filter(|slot| !slot.triggered)
            .ok_or(Error::UnknownTask(task))?;
        let owner = slot.owner.ok_or(Error::UnknownTask(task))?;
        slot.triggered = true;
        Ok(owner)
    }

    /// Returns the slot for `task` to the free list.
    pub fn release(&self, task: TaskId) -> Result<()> {
        let mut pool = lock(&self.pool);
        let head = pool.head;
        let slot = pool
            .slots
            .get_mut(task.index())
            .filter(|slot| slot.owner.is_some())
            .ok_or(Error::UnknownTask(task))?;
        slot.owner = None;
        slot.triggered = false;
        slot.next = head;
        pool.head = Some(task.index());
        pool.outstanding -= 1;
        Ok(())
    }

    /// Calls issued and not yet released.
    pub fn outstanding(&self) -> usize {
        lock(&self.pool).outstanding
    }

    /// Slots ever created, live or free.
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        lock(&self.pool).slots.len()
    }
}
