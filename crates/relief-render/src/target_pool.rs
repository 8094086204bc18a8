//! Offscreen render-target pool keyed by dimensions.
//!
//! Instead of creating a texture and framebuffer every time a tile is
//! prepared, [`RenderTargetPool`] keeps a free list per `(width, height)` and
//! hands targets out by value. A target is either held by a caller or sitting
//! in the pool, never both. Pooled targets live as long as the pool unless
//! [`RenderTargetPool::purge`] is called.

use std::collections::HashMap;

use crate::backend::{FramebufferId, TerrainBackend, TextureId};

/// A texture bound as the sole color attachment of a framebuffer.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderTarget {
    texture: TextureId,
    framebuffer: FramebufferId,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn key(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Free lists of render targets, bucketed by size.
///
/// Also remembers the texture of the most recently released target (the
/// "viewport texture"), last writer wins.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    free: HashMap<(u32, u32), Vec<RenderTarget>>,
    viewport_texture: Option<TextureId>,
    allocated: usize,
    in_use: usize,
}

impl RenderTargetPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a `width x height` target and bind it for drawing.
    ///
    /// Returns a pooled target if one is free, otherwise allocates a new
    /// texture and framebuffer.
    pub fn acquire<B: TerrainBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderTarget {
        self.in_use += 1;

        if let Some(target) = self.free.get_mut(&(width, height)).and_then(Vec::pop) {
            backend.bind_framebuffer(target.framebuffer);
            backend.attach_color(target.framebuffer, target.texture);
            return target;
        }

        let texture = backend.create_texture(width, height);
        let framebuffer = backend.create_framebuffer();
        backend.bind_framebuffer(framebuffer);
        backend.attach_color(framebuffer, texture);
        self.allocated += 1;

        log::debug!(
            "Allocated {width}x{height} render target ({} total)",
            self.allocated
        );

        RenderTarget {
            texture,
            framebuffer,
            width,
            height,
        }
    }

    /// Return a target to the pool and rebind the main framebuffer.
    ///
    /// The target's contents stay on the GPU but are unspecified from the
    /// next [`acquire`](Self::acquire) of the same size onwards.
    pub fn release<B: TerrainBackend + ?Sized>(&mut self, backend: &mut B, target: RenderTarget) {
        backend.bind_default_framebuffer();
        self.viewport_texture = Some(target.texture);
        self.in_use = self.in_use.saturating_sub(1);
        self.free.entry(target.key()).or_default().push(target);
    }

    /// Texture of the most recently released target. The shading pass
    /// samples this right after a tile's target is released.
    pub fn viewport_texture(&self) -> Option<TextureId> {
        self.viewport_texture
    }

    /// Delete every free target. Targets currently held by callers are
    /// untouched. Returns the number deleted.
    pub fn purge<B: TerrainBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut deleted = 0;
        for (_, targets) in self.free.drain() {
            for target in targets {
                if self.viewport_texture == Some(target.texture) {
                    self.viewport_texture = None;
                }
                backend.delete_framebuffer(target.framebuffer);
                backend.delete_texture(target.texture);
                deleted += 1;
            }
        }
        self.allocated = self.allocated.saturating_sub(deleted);
        if deleted > 0 {
            log::debug!("Purged {deleted} pooled render targets");
        }
        deleted
    }

    /// Targets created by this pool and not yet purged.
    pub fn allocated_count(&self) -> usize {
        self.allocated
    }

    /// Targets currently held by callers.
    pub fn in_use_count(&self) -> usize {
        self.in_use
    }

    /// Targets waiting in the pool across all sizes.
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}
