//! Shadow-table hooks via table-pointer replacement
//!
//! A [`ShadowHook`] copies an object's dispatch table, patches one slot of
//! the copy, and swaps the object's table pointer at the copy. The live
//! table is never written; restoring puts the original pointer back.

use crate::error::{HookError, HookStatus};
use crate::table::{self, RESERVED_SLOTS};

/// Hook for a single slot of one object's dispatch table
///
/// Holds the snapshot of the table taken at construction and toggles the
/// object between the original table and the patched copy. Dropping a
/// still-hooked instance restores the original pointer, so the object can
/// never be left dispatching into freed snapshot memory.
///
/// The table-pointer swap is visible to the entire process. The caller is
/// responsible for serializing it against concurrent dispatch through the
/// same object, and for keeping at most one hook per (object, slot) pair
/// alive at a time.
#[derive(Debug)]
pub struct ShadowHook {
    /// Target object (first word is the table pointer)
    object: *mut (),

    /// Slot index being intercepted
    index: usize,

    /// Replacement function address
    replacement: *const (),

    /// Entry count discovered by the null-terminator scan
    function_count: usize,

    /// Table pointer recorded at construction
    original_table: *const *const (),

    /// Function address at the target slot, recorded at construction
    original_fn: *const (),

    /// Patched copy of the table, reserved slot included
    shadow: Option<Box<[*const ()]>>,

    status: HookStatus,
    hooked: bool,
}

// SAFETY: callers serialize all access to the hooked object externally; the
// raw pointers are only dereferenced under that contract.
unsafe impl Send for ShadowHook {}
unsafe impl Sync for ShadowHook {}

impl ShadowHook {
    /// Validate the target and snapshot its dispatch table
    ///
    /// Scans the live table for the null terminator to discover its length,
    /// then copies `function_count + 1` slots starting one slot before the
    /// table's first entry, capturing the reserved slot along with every
    /// function slot. The copy is not installed until [`install`] is called.
    ///
    /// `index` may equal the discovered entry count (one past the last
    /// slot); [`install`] refuses that index at write time.
    ///
    /// # Safety
    /// - a non-null `object` must point at an object whose first word is a
    ///   valid pointer to a null-terminated dispatch table
    /// - the slot preceding the table's first entry must be readable
    ///
    /// [`install`]: ShadowHook::install
    pub unsafe fn new(
        object: *mut (),
        index: usize,
        replacement: *const (),
    ) -> Result<Self, HookError> {
        if object.is_null() {
            return Err(HookError::BadBase);
        }
        if replacement.is_null() {
            return Err(HookError::BadFunction);
        }

        let original_table = table::table_ptr(object as *const ());
        let function_count = table::count_slots(original_table);
        if function_count == 0 {
            return Err(HookError::BadFunctionCount);
        }
        if index > function_count {
            return Err(HookError::BadIndex {
                index,
                count: function_count,
            });
        }

        let original_fn = *original_table.add(index);
        let shadow = copy_table(original_table, function_count);

        tracing::debug!(
            "Snapshotted dispatch table: object={:x}, table={:x}, slots={}, slot[{}]={:x}",
            object as usize,
            original_table as usize,
            function_count,
            index,
            original_fn as usize
        );

        Ok(Self {
            object,
            index,
            replacement,
            function_count,
            original_table,
            original_fn,
            shadow: Some(shadow),
            status: HookStatus::Initialized,
            hooked: false,
        })
    }

    /// Patch the snapshot and redirect the object at it
    ///
    /// Writes the replacement into snapshot slot `index + 1`, then points
    /// the object's table pointer at snapshot slot 1 so the logical table
    /// keeps its original relative addressing, reserved slot included. If a
    /// prior [`remove`] released the snapshot, a fresh copy is taken from
    /// the table recorded at construction first.
    ///
    /// The redirection is process-wide: any code dispatching through this
    /// object observes the replacement immediately.
    ///
    /// # Safety
    /// No other thread may dispatch through the object during the swap, and
    /// the replacement must match the original function's calling convention
    /// and signature.
    ///
    /// [`remove`]: ShadowHook::remove
    pub unsafe fn install(&mut self) -> Result<(), HookError> {
        if self.replacement.is_null() {
            self.status = HookStatus::HookFail;
            return Err(HookError::BadFunction);
        }
        if self.index > self.function_count {
            self.status = HookStatus::HookFail;
            return Err(HookError::BadIndex {
                index: self.index,
                count: self.function_count,
            });
        }

        let mut shadow = match self.shadow.take() {
            Some(shadow) => shadow,
            None => copy_table(self.original_table, self.function_count),
        };

        // index == function_count addresses the table's terminator, which
        // the snapshot does not carry.
        match shadow.get_mut(self.index + RESERVED_SLOTS) {
            Some(slot) => *slot = self.replacement,
            None => {
                self.shadow = Some(shadow);
                self.status = HookStatus::HookFail;
                return Err(HookError::BadIndex {
                    index: self.index,
                    count: self.function_count,
                });
            }
        }

        if let Err(err) = table::set_table_ptr(self.object, shadow.as_ptr().add(RESERVED_SLOTS)) {
            self.shadow = Some(shadow);
            self.status = HookStatus::HookFail;
            return Err(err);
        }

        self.shadow = Some(shadow);
        self.hooked = true;
        self.status = HookStatus::HookSuccess;

        tracing::info!(
            "Installed shadow table on object {:x}, slot {} -> {:x}",
            self.object as usize,
            self.index,
            self.replacement as usize
        );
        Ok(())
    }

    /// Put the original table pointer back and release the snapshot
    ///
    /// Fails with [`HookError::NotInstalled`] if the object's live pointer
    /// already equals the pointer recorded at construction. Restoring twice
    /// in a row succeeds then fails, and restoring without a prior install
    /// fails outright.
    ///
    /// # Safety
    /// No other thread may dispatch through the object during the swap.
    pub unsafe fn remove(&mut self) -> Result<(), HookError> {
        if table::table_ptr(self.object as *const ()) == self.original_table {
            self.status = HookStatus::HookFail;
            return Err(HookError::NotInstalled);
        }

        if let Err(err) = table::set_table_ptr(self.object, self.original_table) {
            self.status = HookStatus::HookFail;
            return Err(err);
        }

        self.shadow = None;
        self.hooked = false;
        self.status = HookStatus::HookSuccess;

        tracing::info!(
            "Restored original table {:x} on object {:x}",
            self.original_table as usize,
            self.object as usize
        );
        Ok(())
    }

    /// Resolve the target slot's function address
    ///
    /// With `live` set, re-reads the entry through the object's current
    /// table pointer, reflecting whatever is installed right now (after a
    /// successful [`install`](ShadowHook::install), the replacement).
    /// Otherwise returns the address recorded at construction: the true
    /// original, unaffected by anything hooked since.
    ///
    /// # Safety
    /// With `live` set, the object's table pointer must currently be valid
    /// for a read at the target slot.
    pub unsafe fn original_addr(&self, live: bool) -> *const () {
        if live {
            table::slot_addr(self.object as *const (), self.index)
        } else {
            self.original_fn
        }
    }

    /// Storage address of the active table
    ///
    /// The snapshot's base address while hooked (slot 0 is the reserved
    /// slot), the recorded original table pointer otherwise.
    pub fn hooked_addr(&self) -> *const *const () {
        match &self.shadow {
            Some(shadow) if self.hooked => shadow.as_ptr(),
            _ => self.original_table,
        }
    }

    /// Status of the last completed operation
    pub fn status(&self) -> HookStatus {
        self.status
    }

    /// Whether the object currently dispatches through the snapshot
    pub fn is_hooked(&self) -> bool {
        self.hooked
    }

    /// Entry count discovered at construction
    pub fn function_count(&self) -> usize {
        self.function_count
    }

    /// Slot index being intercepted
    pub fn index(&self) -> usize {
        self.index
    }

    /// Target object address
    pub fn object(&self) -> *mut () {
        self.object
    }

    /// Table pointer recorded at construction
    pub fn original_table(&self) -> *const *const () {
        self.original_table
    }
}

impl Drop for ShadowHook {
    fn drop(&mut self) {
        if !self.hooked {
            return;
        }
        unsafe {
            if table::table_ptr(self.object as *const ()) == self.original_table {
                return;
            }
            if let Err(err) = table::set_table_ptr(self.object, self.original_table) {
                tracing::warn!(
                    "Failed to restore table on object {:x} during teardown: {}",
                    self.object as usize,
                    err
                );
            }
        }
    }
}

/// Copy `count + 1` slots starting one slot before the table's first entry
unsafe fn copy_table(table: *const *const (), count: usize) -> Box<[*const ()]> {
    let mut shadow = vec![std::ptr::null(); count + RESERVED_SLOTS];
    std::ptr::copy_nonoverlapping(
        table.sub(RESERVED_SLOTS),
        shadow.as_mut_ptr(),
        count + RESERVED_SLOTS,
    );
    shadow.into_boxed_slice()
}
