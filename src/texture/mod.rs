// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

mod memory; pub use memory::*;
#[cfg(any(target_os = "macos", target_os = "ios"))] mod metal_texture;
#[cfg(any(target_os = "macos", target_os = "ios"))] pub use metal_texture::*;

use std::ffi::c_void;
use crate::frame::VideoFrame;
use crate::types::*;

/// Destination of decoded frames. Sinks are shared handles: the caller keeps its own
/// reference and the adapter only holds a clone while the sink is set.
#[enum_dispatch::enum_dispatch(OutputTexture)]
pub trait FrameSink {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), PlayerError>;
    /// Native object pointer (`id<MTLTexture>`) for hosts, null for system-memory textures.
    fn native_handle(&self) -> *mut c_void;
}

#[enum_dispatch::enum_dispatch]
#[derive(Clone)]
pub enum OutputTexture {
    MemoryTexture(MemoryTexture),
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    MetalTexture(MetalTexture),
}

impl std::fmt::Debug for OutputTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutputTexture({}x{}, {:?})", self.width(), self.height(), self.native_handle())
    }
}

pub(crate) fn check_size(sink: &impl FrameSink, frame: &VideoFrame) -> Result<(), PlayerError> {
    if (sink.width(), sink.height()) != frame.size() {
        return Err(PlayerError::TextureSizeMismatch { texture: (sink.width(), sink.height()), frame: frame.size() });
    }
    Ok(())
}

/// Copies one row, swapping the red and blue channels when the layouts differ.
pub(crate) fn convert_row(src: &[u8], src_format: PixelFormat, dst: &mut [u8], dst_format: PixelFormat) {
    if src_format == dst_format {
        dst.copy_from_slice(src);
        return;
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        d.copy_from_slice(&[s[2], s[1], s[0], s[3]]);
    }
}

/// Graphics device the adapter was created for. Textures it allocates live on this device.
#[derive(Clone, Debug)]
pub enum GraphicsDevice {
    /// No GPU; frames go to system-memory textures.
    Headless,
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    Metal(metal::Device),
}

impl GraphicsDevice {
    /// Wraps a device handle received from a host engine.
    ///
    /// # Safety
    /// On Apple targets `ptr` must be null or a valid `id<MTLDevice>`; the device is retained.
    /// Elsewhere the handle is opaque and only checked for null.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Result<Self, PlayerError> {
        if ptr.is_null() {
            return Err(PlayerError::InvalidDevice);
        }
        Ok(unsafe { Self::wrap_native(ptr) })
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    unsafe fn wrap_native(ptr: *mut c_void) -> Self {
        use metal::foreign_types::ForeignTypeRef;
        let device = unsafe { metal::DeviceRef::from_ptr(ptr as *mut metal::MTLDevice) };
        GraphicsDevice::Metal(device.to_owned())
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    unsafe fn wrap_native(_ptr: *mut c_void) -> Self {
        log::warn!("No native graphics API on this platform, using system-memory textures");
        GraphicsDevice::Headless
    }

    /// The platform's default GPU.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub fn system_default() -> Result<Self, PlayerError> {
        metal::Device::system_default().map(GraphicsDevice::Metal).ok_or(PlayerError::InvalidDevice)
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    pub fn system_default() -> Result<Self, PlayerError> {
        Ok(GraphicsDevice::Headless)
    }

    /// Allocates a BGRA texture that frames of `width`x`height` can be written into.
    pub fn create_texture(&self, width: u32, height: u32) -> Result<OutputTexture, PlayerError> {
        match self {
            GraphicsDevice::Headless => Ok(MemoryTexture::new(width, height, PixelFormat::BGRA8).into()),
            #[cfg(any(target_os = "macos", target_os = "ios"))]
            GraphicsDevice::Metal(device) => Ok(MetalTexture::create(device, width, height).into()),
        }
    }
}
