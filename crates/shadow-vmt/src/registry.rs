//! Global shadow-hook registry
//!
//! Keyed storage for installed hooks, so call sites can manage them by
//! handle instead of threading [`ShadowHook`] values around. Also enforces
//! the one-hook-per-slot rule for everything it manages.

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};
use std::sync::LazyLock;

use crate::error::HookError;
use crate::hook::ShadowHook;

new_key_type! {
    /// Handle for a registered shadow hook
    pub struct ShadowHookKey;
}

/// Storage for a registered hook
struct ShadowHookEntry {
    hook: ShadowHook,

    /// Debug name
    name: String,
}

/// Global shadow hook registry
static SHADOW_HOOKS: LazyLock<RwLock<SlotMap<ShadowHookKey, ShadowHookEntry>>> =
    LazyLock::new(|| RwLock::new(SlotMap::with_key()));

/// Snapshot, patch, and install a shadow table in one step
///
/// Refuses a second hook on a (object, slot) pair the registry already
/// manages.
///
/// # Safety
/// - `object` must be a valid pointer to an object with a null-terminated
///   dispatch table
/// - `replacement` must have a compatible signature with the original
/// - no other thread may dispatch through the object during the swap
///
/// # Arguments
/// * `name` - Debug name for the hook
/// * `object` - Pointer to the object (first member is the table pointer)
/// * `index` - Slot index of the virtual function
/// * `replacement` - Your replacement function
///
/// # Returns
/// A key to manage the hook, and the original function pointer
pub unsafe fn create_shadow_hook(
    name: &str,
    object: *mut (),
    index: usize,
    replacement: *const (),
) -> Result<(ShadowHookKey, *const ()), HookError> {
    let mut hooks = SHADOW_HOOKS.write();

    if hooks
        .values()
        .any(|e| e.hook.object() == object && e.hook.index() == index)
    {
        return Err(HookError::SlotBusy);
    }

    tracing::debug!(
        "Creating shadow hook '{}': object={:x}, slot={}, replacement={:x}",
        name,
        object as usize,
        index,
        replacement as usize
    );

    let mut hook = ShadowHook::new(object, index, replacement)?;
    hook.install()?;
    let original = hook.original_addr(false);

    let key = hooks.insert(ShadowHookEntry {
        hook,
        name: name.to_string(),
    });

    tracing::info!("Created shadow hook '{}' at slot {}", name, index);

    Ok((key, original))
}

/// Disable a shadow hook (restore the original table pointer)
///
/// The entry stays registered; re-enable with [`enable_shadow_hook`].
pub fn disable_shadow_hook(key: ShadowHookKey) -> Result<(), HookError> {
    let mut hooks = SHADOW_HOOKS.write();
    let entry = hooks.get_mut(key).ok_or(HookError::NotFound)?;

    if !entry.hook.is_hooked() {
        return Ok(());
    }

    unsafe { entry.hook.remove()? };

    tracing::info!("Disabled shadow hook '{}'", entry.name);
    Ok(())
}

/// Enable a shadow hook (redirect at the patched snapshot again)
pub fn enable_shadow_hook(key: ShadowHookKey) -> Result<(), HookError> {
    let mut hooks = SHADOW_HOOKS.write();
    let entry = hooks.get_mut(key).ok_or(HookError::NotFound)?;

    if entry.hook.is_hooked() {
        return Ok(());
    }

    unsafe { entry.hook.install()? };

    tracing::info!("Enabled shadow hook '{}'", entry.name);
    Ok(())
}

/// Remove a shadow hook completely
pub fn remove_shadow_hook(key: ShadowHookKey) -> Result<(), HookError> {
    // Disable first to restore the original pointer
    disable_shadow_hook(key)?;

    let mut hooks = SHADOW_HOOKS.write();
    let entry = hooks.remove(key).ok_or(HookError::NotFound)?;

    tracing::info!("Removed shadow hook '{}'", entry.name);
    Ok(())
}

/// Get the original function pointer for a shadow hook
pub fn shadow_hook_original(key: ShadowHookKey) -> Option<*const ()> {
    SHADOW_HOOKS
        .read()
        .get(key)
        .map(|e| unsafe { e.hook.original_addr(false) })
}

/// Check if a shadow hook is enabled
pub fn is_shadow_hook_enabled(key: ShadowHookKey) -> bool {
    SHADOW_HOOKS
        .read()
        .get(key)
        .map(|e| e.hook.is_hooked())
        .unwrap_or(false)
}

/// Helper macro for shadow hooks with typed original
#[macro_export]
macro_rules! shadow_hook {
    ($name:ident, $index:expr, fn($($arg:ty),*) $(-> $ret:ty)?) => {
        paste::paste! {
            static [<$name _KEY>]: std::sync::LazyLock<parking_lot::RwLock<Option<$crate::registry::ShadowHookKey>>> =
                std::sync::LazyLock::new(|| parking_lot::RwLock::new(None));

            static [<$name _ORIGINAL>]: std::sync::LazyLock<parking_lot::RwLock<Option<fn($($arg),*) $(-> $ret)?>>> =
                std::sync::LazyLock::new(|| parking_lot::RwLock::new(None));

            pub fn [<$name _install>](object: *mut (), replacement: fn($($arg),*) $(-> $ret)?) -> Result<(), $crate::error::HookError> {
                unsafe {
                    let (key, original) = $crate::registry::create_shadow_hook(
                        stringify!($name),
                        object,
                        $index,
                        replacement as *const (),
                    )?;
                    *[<$name _KEY>].write() = Some(key);
                    *[<$name _ORIGINAL>].write() = Some(std::mem::transmute(original));
                    Ok(())
                }
            }

            pub fn [<$name _original>]() -> Option<fn($($arg),*) $(-> $ret)?> {
                *[<$name _ORIGINAL>].read()
            }

            pub fn [<$name _enable>]() -> Result<(), $crate::error::HookError> {
                if let Some(key) = *[<$name _KEY>].read() {
                    $crate::registry::enable_shadow_hook(key)
                } else {
                    Err($crate::error::HookError::NotFound)
                }
            }

            pub fn [<$name _disable>]() -> Result<(), $crate::error::HookError> {
                if let Some(key) = *[<$name _KEY>].read() {
                    $crate::registry::disable_shadow_hook(key)
                } else {
                    Err($crate::error::HookError::NotFound)
                }
            }

            pub fn [<$name _remove>]() -> Result<(), $crate::error::HookError> {
                if let Some(key) = [<$name _KEY>].write().take() {
                    $crate::registry::remove_shadow_hook(key)?;
                }
                *[<$name _ORIGINAL>].write() = None;
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESERVED: *const () = 0xdead_0000 as *const ();

    fn addr(n: usize) -> *const () {
        (0x1000 + n * 0x40) as *const ()
    }

    struct Fixture {
        table: Vec<*const ()>,
        object: Box<*const *const ()>,
    }

    impl Fixture {
        fn new(count: usize) -> Self {
            let mut table = Vec::with_capacity(count + 2);
            table.push(RESERVED);
            for i in 0..count {
                table.push(addr(i));
            }
            table.push(std::ptr::null());

            let object = Box::new(unsafe { table.as_ptr().add(1) });
            Fixture { table, object }
        }

        fn object_ptr(&mut self) -> *mut () {
            &mut *self.object as *mut *const *const () as *mut ()
        }

        fn live_table(&self) -> *const *const () {
            *self.object
        }

        fn original_table(&self) -> *const *const () {
            unsafe { self.table.as_ptr().add(1) }
        }
    }

    #[test]
    fn test_create_and_remove() {
        let mut fix = Fixture::new(3);
        let (key, original) =
            unsafe { create_shadow_hook("greet", fix.object_ptr(), 0, addr(9)) }.unwrap();

        assert_eq!(original, addr(0));
        assert!(is_shadow_hook_enabled(key));
        assert_eq!(shadow_hook_original(key), Some(addr(0)));
        assert_ne!(fix.live_table(), fix.original_table());

        remove_shadow_hook(key).unwrap();

        assert!(!is_shadow_hook_enabled(key));
        assert_eq!(shadow_hook_original(key), None);
        assert_eq!(fix.live_table(), fix.original_table());
    }

    #[test]
    fn test_duplicate_slot_refused() {
        let mut fix = Fixture::new(3);
        let object = fix.object_ptr();
        let (key, _) = unsafe { create_shadow_hook("first", object, 1, addr(8)) }.unwrap();

        let err = unsafe { create_shadow_hook("second", object, 1, addr(9)) }.unwrap_err();
        assert!(matches!(err, HookError::SlotBusy));

        // Removal frees the slot for a new hook.
        remove_shadow_hook(key).unwrap();
        let (again, _) = unsafe { create_shadow_hook("again", object, 1, addr(9)) }.unwrap();
        remove_shadow_hook(again).unwrap();
    }

    #[test]
    fn test_enable_disable_cycle() {
        let mut fix = Fixture::new(2);
        let (key, _) =
            unsafe { create_shadow_hook("toggle", fix.object_ptr(), 0, addr(9)) }.unwrap();

        disable_shadow_hook(key).unwrap();
        assert!(!is_shadow_hook_enabled(key));
        assert_eq!(fix.live_table(), fix.original_table());

        // Disabling twice is a no-op.
        disable_shadow_hook(key).unwrap();

        enable_shadow_hook(key).unwrap();
        assert!(is_shadow_hook_enabled(key));
        assert_ne!(fix.live_table(), fix.original_table());

        remove_shadow_hook(key).unwrap();
    }

    crate::shadow_hook!(probe_hook, 0, fn(*mut ()));

    fn probe_replacement(_this: *mut ()) {}

    #[test]
    fn test_typed_macro_cycle() {
        let mut fix = Fixture::new(2);

        probe_hook_install(fix.object_ptr(), probe_replacement).unwrap();
        assert!(probe_hook_original().is_some());
        assert_ne!(fix.live_table(), fix.original_table());

        probe_hook_disable().unwrap();
        assert_eq!(fix.live_table(), fix.original_table());

        probe_hook_enable().unwrap();
        assert_ne!(fix.live_table(), fix.original_table());

        probe_hook_remove().unwrap();
        assert!(probe_hook_original().is_none());
        assert_eq!(fix.live_table(), fix.original_table());
    }

    #[test]
    fn test_dead_key_lookups() {
        let mut fix = Fixture::new(2);
        let (key, _) =
            unsafe { create_shadow_hook("ephemeral", fix.object_ptr(), 1, addr(9)) }.unwrap();
        remove_shadow_hook(key).unwrap();

        assert!(matches!(
            disable_shadow_hook(key),
            Err(HookError::NotFound)
        ));
        assert!(matches!(enable_shadow_hook(key), Err(HookError::NotFound)));
        assert!(matches!(
            remove_shadow_hook(key),
            Err(HookError::NotFound)
        ));
        assert!(!is_shadow_hook_enabled(key));
        assert_eq!(shadow_hook_original(key), None);
    }
}
