//! Generational handles for backend-owned resources.
//!
//! Handles are plain `Copy` keys. A released handle never aliases a resource
//! created later, so a stale handle fails lookup instead of reaching the wrong
//! object.

use std::sync::atomic::{AtomicU64, Ordering};

slotmap::new_key_type! {
    /// Device-local buffer (vertex, index or storage data).
    pub struct BufferHandle;
    /// Host-visible upload buffer.
    pub struct StagingHandle;
    pub struct TextureHandle;
    pub struct SamplerHandle;
    pub struct ShaderHandle;
    pub struct PipelineHandle;
    pub struct CommandBufferHandle;
    pub struct CopyPassHandle;
    /// Acquired swapchain image.
    pub struct TargetHandle;
    pub struct RenderPassHandle;
}

/// Identity of one `Gpu` instance.
///
/// Render objects remember the device that created their resources and refuse
/// to draw or release through a different one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
