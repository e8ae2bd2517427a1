use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::context::{SharedTextureExt, TextureId};

/// In-process stand-in for a cross-process texture sharing extension.
///
/// The wgpu backend registers every texture created while sharing is enabled
/// and hands out the registry key as the shared handle. A host living in the same
/// process streams frames into the texture with [`SharedTextureRegistry::write`].
#[derive(Clone, Default)]
pub struct SharedTextureRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    next_handle: u64,
    entries: HashMap<u64, SharedEntry>,
}

struct SharedEntry {
    texture: wgpu::Texture,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
}

impl SharedTextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        texture: wgpu::Texture,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> u64 {
        let mut inner = self.inner.borrow_mut();
        // Handle 0 means "no texture" on the wire.
        inner.next_handle += 1;
        let handle = inner.next_handle;
        inner.entries.insert(
            handle,
            SharedEntry {
                texture,
                queue,
                width,
                height,
            },
        );
        handle
    }

    pub(crate) fn unregister(&self, handle: u64) {
        self.inner.borrow_mut().entries.remove(&handle);
    }

    /// Pixel size of the texture behind `handle`.
    pub fn size(&self, handle: u64) -> Option<(u32, u32)> {
        self.inner
            .borrow()
            .entries
            .get(&handle)
            .map(|e| (e.width, e.height))
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uploads tightly packed RGBA8 rows (top row first) into the shared texture.
    ///
    /// Returns `false` for unknown handles or a pixel count that does not match
    /// the texture size.
    pub fn write(&self, handle: u64, rgba: &[u8]) -> bool {
        let inner = self.inner.borrow();
        let Some(entry) = inner.entries.get(&handle) else {
            return false;
        };
        if rgba.len() != entry.width as usize * entry.height as usize * 4 {
            log::warn!(
                "shared texture {handle}: {} bytes do not fit {}x{}",
                rgba.len(),
                entry.width,
                entry.height
            );
            return false;
        }

        entry.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(entry.width * 4),
                rows_per_image: Some(entry.height),
            },
            wgpu::Extent3d {
                width: entry.width,
                height: entry.height,
                depth_or_array_layers: 1,
            },
        );
        true
    }
}

/// Per-context view of the registry implementing the sharing extension.
pub(crate) struct RegistryShare {
    pub(crate) registry: SharedTextureRegistry,
    pub(crate) share_next: bool,
    pub(crate) handles: HashMap<TextureId, u64>,
}

impl RegistryShare {
    pub(crate) fn new(registry: SharedTextureRegistry) -> Self {
        Self {
            registry,
            share_next: false,
            handles: HashMap::new(),
        }
    }

    pub(crate) fn forget(&mut self, texture: TextureId) {
        if let Some(handle) = self.handles.remove(&texture) {
            self.registry.unregister(handle);
        }
    }
}

impl SharedTextureExt for RegistryShare {
    fn set_share_next(&mut self, on: bool) {
        self.share_next = on;
    }

    fn shared_handle(&mut self, texture: TextureId) -> Option<u64> {
        self.handles.get(&texture).copied()
    }
}

impl Drop for RegistryShare {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            self.registry.unregister(handle);
        }
    }
}
