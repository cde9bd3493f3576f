//! Shadow-table interception of virtual dispatch
//!
//! Replaces one entry of an object's virtual method table without ever
//! writing the table itself: the table is copied, the copy is patched, and
//! the object's table pointer is swapped at the copy. Restoring writes the
//! original pointer back.
//!
//! Works against the classic single-inheritance layout: the object's first
//! machine word points at a null-terminated table of function addresses,
//! with one compiler-reserved slot (type info) directly in front of it. The
//! table's length is discovered by scanning for the null terminator; the
//! caller supplies the object and the slot index.
//!
//! # Example
//!
//! ```ignore
//! use shadow_vmt::ShadowHook;
//!
//! fn my_present(this: *mut ()) { /* ... */ }
//!
//! unsafe {
//!     let mut hook = ShadowHook::new(device, PRESENT_INDEX, my_present as *const ())?;
//!     hook.install()?;
//!
//!     // Call the original from inside the replacement:
//!     let original: fn(*mut ()) = std::mem::transmute(hook.original_addr(false));
//!
//!     hook.remove()?;
//! }
//! ```
//!
//! The pointer swap is visible process-wide and is not synchronized against
//! concurrent dispatch; callers serialize access to each hooked object
//! themselves. For managing hooks by handle (and a typed-hook macro), see
//! [`registry`].

pub mod error;
pub mod hook;
pub mod registry;
pub mod table;

// Re-export commonly used items
pub use error::{HookError, HookStatus};
pub use hook::ShadowHook;
pub use registry::{
    create_shadow_hook, disable_shadow_hook, enable_shadow_hook, is_shadow_hook_enabled,
    remove_shadow_hook, shadow_hook_original, ShadowHookKey,
};
pub use table::{count_slots, slot_addr, table_ptr, RESERVED_SLOTS};
