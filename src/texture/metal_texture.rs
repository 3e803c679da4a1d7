// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::ffi::c_void;
use metal::foreign_types::{ ForeignType, ForeignTypeRef };
use metal::{ MTLPixelFormat, MTLRegion };

use super::*;

/// A host-owned `MTLTexture`. The adapter holds a retained reference while it is set.
#[derive(Clone)]
pub struct MetalTexture {
    texture: metal::Texture,
    scratch: Vec<u8>,
}

impl MetalTexture {
    pub fn new(texture: metal::Texture) -> Self {
        Self { texture, scratch: Vec::new() }
    }

    /// Retains a texture received from a host engine.
    ///
    /// # Safety
    /// `ptr` must be a valid `id<MTLTexture>`.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        let texture = unsafe { metal::TextureRef::from_ptr(ptr as *mut metal::MTLTexture) };
        Some(Self::new(texture.to_owned()))
    }

    pub fn create(device: &metal::DeviceRef, width: u32, height: u32) -> Self {
        let desc = metal::TextureDescriptor::new();
        desc.set_texture_type(metal::MTLTextureType::D2);
        desc.set_pixel_format(MTLPixelFormat::BGRA8Unorm);
        desc.set_width(width as u64);
        desc.set_height(height as u64);
        desc.set_usage(metal::MTLTextureUsage::ShaderRead);
        #[cfg(target_os = "macos")]
        desc.set_storage_mode(metal::MTLStorageMode::Managed);
        #[cfg(target_os = "ios")]
        desc.set_storage_mode(metal::MTLStorageMode::Shared);
        log::debug!("Allocating {width}x{height} BGRA8 Metal texture");
        Self::new(device.new_texture(&desc))
    }

    pub fn texture(&self) -> &metal::TextureRef {
        &self.texture
    }

    fn layout(&self) -> Result<PixelFormat, PlayerError> {
        match self.texture.pixel_format() {
            MTLPixelFormat::BGRA8Unorm | MTLPixelFormat::BGRA8Unorm_sRGB => Ok(PixelFormat::BGRA8),
            MTLPixelFormat::RGBA8Unorm | MTLPixelFormat::RGBA8Unorm_sRGB => Ok(PixelFormat::RGBA8),
            other => Err(PlayerError::UnsupportedTextureFormat(format!("{other:?}"))),
        }
    }
}

impl FrameSink for MetalTexture {
    fn width(&self) -> u32 { self.texture.width() as u32 }
    fn height(&self) -> u32 { self.texture.height() as u32 }

    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), PlayerError> {
        check_size(self, frame)?;
        let layout = self.layout()?;
        let region = MTLRegion::new_2d(0, 0, frame.width() as u64, frame.height() as u64);

        if layout == frame.format() {
            self.texture.replace_region(region, 0, frame.data().as_ptr() as *const c_void, frame.stride() as u64);
            return Ok(());
        }

        let row_bytes = frame.width() as usize * layout.bytes_per_pixel();
        self.scratch.resize(row_bytes * frame.height() as usize, 0);
        for (y, dst) in self.scratch.chunks_exact_mut(row_bytes).enumerate() {
            convert_row(frame.row(y as u32), frame.format(), dst, layout);
        }
        self.texture.replace_region(region, 0, self.scratch.as_ptr() as *const c_void, row_bytes as u64);
        Ok(())
    }

    fn native_handle(&self) -> *mut c_void {
        self.texture.as_ptr() as *mut c_void
    }
}
