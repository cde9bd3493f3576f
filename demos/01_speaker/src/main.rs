//! # Speaker Demo
//!
//! Builds an object in the single-inheritance dispatch layout by hand, then
//! intercepts one of its virtual slots:
//! - slot 0 `announce` gets replaced, the replacement calls the original
//! - the hook is toggled off and on, then removed
//!
//! All dispatch goes through the object's table pointer, so every call
//! observes whichever table is installed at that moment.

use shadow_vmt::HookError;

#[repr(C)]
struct Speaker {
    vtable: *const *const (),
    volume: u32,
}

fn announce(this: *mut Speaker) {
    let volume = unsafe { (*this).volume };
    tracing::info!("Speaker announcing at volume {volume}");
}

fn mute(this: *mut Speaker) {
    unsafe { (*this).volume = 0 };
    tracing::info!("Speaker muted");
}

shadow_vmt::shadow_hook!(announce_hook, 0, fn(*mut Speaker));

fn announce_replacement(this: *mut Speaker) {
    tracing::info!("Intercepted announce, lowering volume first");
    unsafe { (*this).volume /= 2 };

    if let Some(original) = announce_hook_original() {
        original(this);
    }
}

/// Call through the object's current dispatch table, like the runtime would.
fn dispatch(speaker: *mut Speaker, index: usize) {
    unsafe {
        let entry = shadow_vmt::slot_addr(speaker as *const (), index);
        let func: fn(*mut Speaker) = std::mem::transmute(entry);
        func(speaker);
    }
}

fn main() -> Result<(), HookError> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    // Reserved type-info slot, two methods, null terminator.
    static TYPE_INFO: u8 = 0;
    let table: Vec<*const ()> = vec![
        &TYPE_INFO as *const u8 as *const (),
        announce as *const (),
        mute as *const (),
        std::ptr::null(),
    ];

    let mut speaker = Speaker {
        vtable: unsafe { table.as_ptr().add(1) },
        volume: 8,
    };
    let speaker_ptr = &mut speaker as *mut Speaker;

    dispatch(speaker_ptr, 0);

    announce_hook_install(speaker_ptr as *mut (), announce_replacement)?;
    dispatch(speaker_ptr, 0);

    announce_hook_disable()?;
    dispatch(speaker_ptr, 0);

    announce_hook_enable()?;
    dispatch(speaker_ptr, 0);

    announce_hook_remove()?;
    dispatch(speaker_ptr, 0);
    dispatch(speaker_ptr, 1);
    dispatch(speaker_ptr, 0);

    Ok(())
}
