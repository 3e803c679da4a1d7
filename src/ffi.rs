// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

//! C ABI for embedding in native engines. Every function accepts a null adapter and then
//! does nothing, returning `false` or zero.

use std::ffi::{ c_char, c_void, CStr };
use crate::*;

pub type VideoSizeCallback = extern "C" fn(sender: *mut PlaybackTextureAdapter, width: i32, height: i32, context: *mut c_void);

unsafe fn as_adapter<'a>(ptr: *mut PlaybackTextureAdapter) -> Option<&'a mut PlaybackTextureAdapter> {
    unsafe { ptr.as_mut() }
}

fn report(what: &str, result: Result<(), PlayerError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("{what} failed: {e}");
            false
        }
    }
}

/// Returns null when `device` is null.
///
/// # Safety
/// `device` must be null or a valid `id<MTLDevice>` on Apple platforms.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_create(index: usize, device: *mut c_void) -> *mut PlaybackTextureAdapter {
    match unsafe { PlaybackTextureAdapter::from_raw_device(index, device) } {
        Ok(adapter) => Box::into_raw(Box::new(adapter)),
        Err(e) => {
            log::error!("ptex_create: {e}");
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `ptr` must come from [`ptex_create`] and not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_destroy(ptr: *mut PlaybackTextureAdapter) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

/// # Safety
/// `ptr` must be null or a live adapter, `path` null or a NUL-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_set_source(ptr: *mut PlaybackTextureAdapter, path: *const c_char) -> bool {
    let Some(adapter) = (unsafe { as_adapter(ptr) }) else { return false; };
    if path.is_null() {
        log::error!("ptex_set_source: null path");
        return false;
    }
    let Ok(path) = unsafe { CStr::from_ptr(path) }.to_str() else {
        log::error!("ptex_set_source: path is not valid UTF-8");
        return false;
    };
    report("set_source", adapter.set_source(path))
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_play(ptr: *mut PlaybackTextureAdapter) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        report("play", adapter.play());
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_pause(ptr: *mut PlaybackTextureAdapter) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        report("pause", adapter.pause());
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_seek(ptr: *mut PlaybackTextureAdapter, seconds: f32) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        report("seek", adapter.seek(seconds));
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_set_rate(ptr: *mut PlaybackTextureAdapter, rate: f32) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        report("set_rate", adapter.set_rate(rate));
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_set_volume(ptr: *mut PlaybackTextureAdapter, volume: f32) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        report("set_volume", adapter.set_volume(volume));
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_set_loop(ptr: *mut PlaybackTextureAdapter, loop_play: bool) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        adapter.set_loop_play(loop_play);
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_close(ptr: *mut PlaybackTextureAdapter) {
    if let Some(adapter) = unsafe { as_adapter(ptr) } {
        adapter.shutdown();
    }
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_current_seconds(ptr: *mut PlaybackTextureAdapter) -> f32 {
    unsafe { as_adapter(ptr) }.map_or(0.0, |a| a.current_seconds())
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_duration(ptr: *mut PlaybackTextureAdapter) -> f32 {
    unsafe { as_adapter(ptr) }.map_or(0.0, |a| a.duration())
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_is_playing(ptr: *mut PlaybackTextureAdapter) -> bool {
    unsafe { as_adapter(ptr) }.is_some_and(|a| a.is_playing())
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_width(ptr: *mut PlaybackTextureAdapter) -> i32 {
    unsafe { as_adapter(ptr) }.map_or(0, |a| a.width() as i32)
}

/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_height(ptr: *mut PlaybackTextureAdapter) -> i32 {
    unsafe { as_adapter(ptr) }.map_or(0, |a| a.height() as i32)
}

/// Returns -1 for a null adapter.
///
/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_index(ptr: *mut PlaybackTextureAdapter) -> isize {
    unsafe { as_adapter(ptr) }.map_or(-1, |a| a.index() as isize)
}

/// Sets the `id<MTLTexture>` frames are copied into. Null clears it.
///
/// # Safety
/// `ptr` must be null or a live adapter, `texture` null or a valid `id<MTLTexture>`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_set_output_texture(ptr: *mut PlaybackTextureAdapter, texture: *mut c_void) {
    let Some(adapter) = (unsafe { as_adapter(ptr) }) else { return; };
    adapter.set_output_texture(unsafe { wrap_texture(texture) });
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
unsafe fn wrap_texture(texture: *mut c_void) -> Option<OutputTexture> {
    unsafe { MetalTexture::from_raw(texture) }.map(OutputTexture::from)
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
unsafe fn wrap_texture(texture: *mut c_void) -> Option<OutputTexture> {
    if !texture.is_null() {
        log::warn!("ptex_set_output_texture: native textures are not supported on this platform");
    }
    None
}

/// The native handle of the current output texture, or null.
///
/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_get_output_texture(ptr: *mut PlaybackTextureAdapter) -> *mut c_void {
    unsafe { as_adapter(ptr) }
        .and_then(|a| a.output_texture().map(|t| t.native_handle()))
        .unwrap_or(std::ptr::null_mut())
}

/// Returns `true` when the output texture was written.
///
/// The size callback runs from here with no borrow of the adapter held, see
/// [`ptex_set_size_callback`].
///
/// # Safety
/// `ptr` must be null or a live adapter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_update(ptr: *mut PlaybackTextureAdapter) -> bool {
    let Some(adapter) = (unsafe { as_adapter(ptr) }) else { return false; };
    let change = match adapter.poll_frame() {
        Ok(change) => change,
        Err(e) => {
            log::error!("update_frame failed: {e}");
            return false;
        }
    };
    if let Some(change) = change {
        if let Some((mut handler, generation)) = adapter.take_size_change_handler() {
            handler(change);
            // The callback may have called back in; only a fresh borrow is valid now.
            let Some(adapter) = (unsafe { as_adapter(ptr) }) else { return false; };
            adapter.restore_size_change_handler(handler, generation);
        }
    }

    let Some(adapter) = (unsafe { as_adapter(ptr) }) else { return false; };
    match adapter.write_output() {
        Ok(written) => written,
        Err(e) => {
            log::error!("update_frame failed: {e}");
            false
        }
    }
}

/// Registers the size callback, replacing the previous one. A null callback clears it.
///
/// The callback is invoked from [`ptex_update`] before the texture write and receives the
/// adapter as `sender`. From inside it the host may call any `ptex_*` function on `sender`
/// except [`ptex_destroy`] and [`ptex_update`]: setting the output texture, closing, setting
/// a new source or replacing the callback all take effect before `ptex_update` returns.
/// A frame of a session closed or replaced from the callback is discarded.
///
/// # Safety
/// `ptr` must be null or a live adapter. `context` is passed back untouched and must stay
/// valid for as long as the callback is registered.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptex_set_size_callback(ptr: *mut PlaybackTextureAdapter, context: *mut c_void, callback: Option<VideoSizeCallback>) {
    let Some(adapter) = (unsafe { as_adapter(ptr) }) else { return; };
    match callback {
        Some(callback) => adapter.set_size_change_handler(move |change: SizeChange| {
            callback(ptr, change.width as i32, change.height as i32, context);
        }),
        None => adapter.clear_size_change_handler(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    #[test]
    fn null_device_gives_null_adapter() {
        let ptr = unsafe { ptex_create(0, std::ptr::null_mut()) };
        assert!(ptr.is_null());
        // Everything tolerates null.
        unsafe {
            assert!(!ptex_set_source(ptr, c"testsrc".as_ptr()));
            assert!(!ptex_update(ptr));
            assert_eq!(ptex_index(ptr), -1);
            assert_eq!(ptex_duration(ptr), 0.0);
            ptex_destroy(ptr);
        }
    }

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn on_size(sender: *mut PlaybackTextureAdapter, width: i32, height: i32, context: *mut c_void) {
        assert!(!sender.is_null());
        assert_eq!((width, height), (64, 32));
        assert_eq!(unsafe { *(context as *const u32) }, 0xC0FFEE);
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    #[test]
    fn size_callback_gets_sender_and_context() {
        let mut token = 0xC0FFEEu32;
        let mut device = 0u8;
        let source = CString::new("testsrc=size=64x32:rate=10:duration=1").unwrap();
        unsafe {
            let ptr = ptex_create(3, &mut device as *mut u8 as *mut c_void);
            assert!(!ptr.is_null());
            assert_eq!(ptex_index(ptr), 3);
            ptex_set_size_callback(ptr, &mut token as *mut u32 as *mut c_void, Some(on_size));
            assert!(ptex_set_source(ptr, source.as_ptr()));
            assert_eq!((ptex_width(ptr), ptex_height(ptr)), (64, 32));

            // No texture set, so nothing is written but the size is still reported.
            assert!(!ptex_update(ptr));
            assert!(!ptex_update(ptr));
            assert_eq!(CALLS.load(Ordering::SeqCst), 1);
            assert!(ptex_get_output_texture(ptr).is_null());

            ptex_close(ptr);
            assert_eq!(ptex_current_seconds(ptr), 0.0);
            assert!(!ptex_is_playing(ptr));
            ptex_destroy(ptr);
        }
    }

    extern "C" fn close_on_size(sender: *mut PlaybackTextureAdapter, _width: i32, _height: i32, context: *mut c_void) {
        unsafe {
            *(context as *mut usize) += 1;
            ptex_close(sender);
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    #[test]
    fn closing_from_callback_discards_frame() {
        let mut calls = 0usize;
        let mut device = 0u8;
        unsafe {
            let ptr = ptex_create(0, &mut device as *mut u8 as *mut c_void);
            ptex_set_size_callback(ptr, &mut calls as *mut usize as *mut c_void, Some(close_on_size));
            assert!(ptex_set_source(ptr, c"testsrc=size=16x8:rate=10:duration=1".as_ptr()));

            assert!(!ptex_update(ptr));
            assert_eq!(calls, 1);
            assert!(!(*ptr).has_session());

            let texture = MemoryTexture::new(16, 8, PixelFormat::BGRA8);
            (*ptr).set_output_texture(Some(texture.clone().into()));
            assert!(!ptex_update(ptr));
            assert_eq!(texture.write_count(), 0);
            assert!(texture.pixels().iter().all(|b| *b == 0));

            // The handler survived its own call.
            assert!(ptex_set_source(ptr, c"testsrc=size=16x8".as_ptr()));
            ptex_update(ptr);
            assert_eq!(calls, 2);
            ptex_destroy(ptr);
        }
    }

    extern "C" fn unregister_on_size(sender: *mut PlaybackTextureAdapter, _width: i32, _height: i32, context: *mut c_void) {
        unsafe {
            *(context as *mut usize) += 1;
            ptex_set_size_callback(sender, std::ptr::null_mut(), None);
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    #[test]
    fn callback_can_unregister_itself() {
        let mut calls = 0usize;
        let mut device = 0u8;
        unsafe {
            let ptr = ptex_create(0, &mut device as *mut u8 as *mut c_void);
            ptex_set_size_callback(ptr, &mut calls as *mut usize as *mut c_void, Some(unregister_on_size));
            assert!(ptex_set_source(ptr, c"testsrc=size=16x8".as_ptr()));
            ptex_update(ptr);
            assert!(ptex_set_source(ptr, c"testsrc=size=32x8".as_ptr()));
            ptex_update(ptr);
            assert_eq!(calls, 1);
            assert_eq!(ptex_width(ptr), 32);
            ptex_destroy(ptr);
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    #[test]
    fn invalid_path_is_rejected() {
        let mut device = 0u8;
        unsafe {
            let ptr = ptex_create(0, &mut device as *mut u8 as *mut c_void);
            assert!(!ptex_set_source(ptr, std::ptr::null()));
            assert!(!ptex_set_source(ptr, c"/no/such/file.mov".as_ptr()));
            ptex_destroy(ptr);
        }
    }
}
