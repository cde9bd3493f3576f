//! Dispatch-table plumbing
//!
//! Low-level reads and writes against the classic single-inheritance layout:
//! the object's first machine word points at a null-terminated table of
//! function addresses, preceded by one compiler-reserved slot (type info).

use crate::error::HookError;

/// Slots the compiler appends in front of the table's logical start
pub const RESERVED_SLOTS: usize = 1;

/// Read the dispatch-table pointer out of an object's first word
///
/// # Safety
/// `object` must point at an object whose first machine word is a valid
/// dispatch-table pointer.
#[inline]
pub unsafe fn table_ptr(object: *const ()) -> *const *const () {
    *(object as *const *const *const ())
}

/// Read the function address at `index` through the object's current table
///
/// Reflects whatever table the object dispatches through right now, hooked
/// or not.
///
/// # Safety
/// `object` must have a valid dispatch-table pointer and `index` must be
/// within the table it currently points at.
#[inline]
pub unsafe fn slot_addr(object: *const (), index: usize) -> *const () {
    *table_ptr(object).add(index)
}

/// Count the entries of a dispatch table by scanning for the null terminator
///
/// # Safety
/// `table` must point at a sequence of function-address slots that is
/// terminated by a zero-valued slot.
pub unsafe fn count_slots(table: *const *const ()) -> usize {
    let mut count = 0;
    while !(*table.add(count)).is_null() {
        count += 1;
    }
    count
}

/// Write a new dispatch-table pointer into an object's first word
///
/// The store is process-globally visible: every caller that dispatches
/// through this object observes the new table immediately. The containing
/// page is raised to read/write for the store and returned to its previous
/// protection afterward.
///
/// # Safety
/// `object` must be a valid, externally-serialized object; no other thread
/// may dispatch through it while the pointer is being swapped.
pub(crate) unsafe fn set_table_ptr(
    object: *mut (),
    table: *const *const (),
) -> Result<(), HookError> {
    let field = object as *mut *const *const ();

    let previous = region::query(field as *const u8)
        .map_err(|e| HookError::Protection(e.to_string()))?
        .protection();

    region::protect(
        field as *const u8,
        std::mem::size_of::<usize>(),
        region::Protection::READ_WRITE,
    )
    .map_err(|e| HookError::Protection(e.to_string()))?;

    *field = table;

    let _ = region::protect(field as *const u8, std::mem::size_of::<usize>(), previous);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_slots() {
        let table: [*const (); 4] = [
            0x1000 as *const (),
            0x2000 as *const (),
            0x3000 as *const (),
            std::ptr::null(),
        ];
        assert_eq!(unsafe { count_slots(table.as_ptr()) }, 3);
    }

    #[test]
    fn test_count_slots_empty() {
        let table: [*const (); 1] = [std::ptr::null()];
        assert_eq!(unsafe { count_slots(table.as_ptr()) }, 0);
    }

    #[test]
    fn test_slot_read_through_object() {
        let table: [*const (); 3] = [0x1000 as *const (), 0x2000 as *const (), std::ptr::null()];
        let object: *const *const () = table.as_ptr();
        let object_ptr = &object as *const *const *const () as *const ();

        assert_eq!(unsafe { table_ptr(object_ptr) }, table.as_ptr());
        assert_eq!(unsafe { slot_addr(object_ptr, 1) }, 0x2000 as *const ());
    }

    #[test]
    fn test_set_table_ptr_roundtrip() {
        let first: [*const (); 2] = [0x1000 as *const (), std::ptr::null()];
        let second: [*const (); 2] = [0x2000 as *const (), std::ptr::null()];

        let mut object: *const *const () = first.as_ptr();
        let object_ptr = &mut object as *mut *const *const () as *mut ();

        unsafe {
            set_table_ptr(object_ptr, second.as_ptr()).unwrap();
            assert_eq!(table_ptr(object_ptr as *const ()), second.as_ptr());

            set_table_ptr(object_ptr, first.as_ptr()).unwrap();
            assert_eq!(table_ptr(object_ptr as *const ()), first.as_ptr());
        }
    }
}
