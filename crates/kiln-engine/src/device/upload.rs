//! Staged resource upload.
//!
//! Every upload follows one sequence: allocate the destination, allocate a
//! host-visible staging buffer, fill it, record a single copy into a fresh
//! command buffer, submit, release the staging buffer. A failure anywhere
//! releases what the sequence created and returns the error; nothing is retried.

use std::path::{Path, PathBuf};

use bytemuck::Pod;
use image::{DynamicImage, RgbaImage};

use super::backend::{BufferDesc, BufferUsage, CopyOp, SamplerDesc, TextureDesc};
use super::error::{BackendError, ResourceError};
use super::gpu::Gpu;
use super::handle::{BufferHandle, SamplerHandle, StagingHandle, TextureHandle};
use super::surface::{aligned_buffer_size, padded_bytes_per_row};

/// Pixel source of a texture.
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// Image file decoded on upload.
    File(PathBuf),
    /// Already decoded image.
    Image(DynamicImage),
}

impl TextureSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Decodes the source and normalizes it to 8-bit RGBA.
    pub fn load(&self) -> Result<RgbaImage, ResourceError> {
        match self {
            TextureSource::File(path) => Ok(decode_file(path)?.to_rgba8()),
            TextureSource::Image(img) => Ok(img.to_rgba8()),
        }
    }
}

impl From<DynamicImage> for TextureSource {
    fn from(img: DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl From<RgbaImage> for TextureSource {
    fn from(img: RgbaImage) -> Self {
        Self::Image(DynamicImage::ImageRgba8(img))
    }
}

fn decode_file(path: &Path) -> Result<DynamicImage, ResourceError> {
    let bytes = std::fs::read(path).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Format every uploaded texture is stored in.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

impl Gpu<'_> {
    /// Creates a device-local buffer holding `data`.
    ///
    /// The size is `size_of::<T>() * data.len()` rounded up to the copy alignment.
    pub fn create_buffer<T: Pod>(
        &mut self,
        data: &[T],
        usage: BufferUsage,
    ) -> Result<BufferHandle, ResourceError> {
        self.ensure_alive()?;
        let what = usage.label();
        if data.is_empty() {
            return Err(ResourceError::EmptyData(what));
        }

        let raw: &[u8] = bytemuck::cast_slice(data);
        let size = aligned_buffer_size(raw.len() as u64);
        let mut bytes = raw.to_vec();
        bytes.resize(size as usize, 0);

        let buffer = self
            .backend_mut()
            .create_buffer(&BufferDesc {
                label: what,
                size,
                usage,
            })
            .map_err(|source| ResourceError::Allocation { what, source })?;

        if let Err(e) = self.stage_and_copy(what, &bytes, |src| CopyOp::Buffer {
            src,
            dst: buffer,
            size,
        }) {
            self.backend_mut().release_buffer(buffer);
            return Err(e);
        }

        log::trace!("uploaded {what} ({size} bytes)");
        Ok(buffer)
    }

    /// Creates a sampled RGBA8 texture from `source`.
    pub fn create_texture(
        &mut self,
        source: &TextureSource,
    ) -> Result<TextureHandle, ResourceError> {
        self.ensure_alive()?;
        let rgba = source.load()?;
        self.create_texture_rgba8(&rgba)
    }

    /// Creates a sampled RGBA8 texture from decoded pixels.
    pub fn create_texture_rgba8(
        &mut self,
        rgba: &RgbaImage,
    ) -> Result<TextureHandle, ResourceError> {
        self.ensure_alive()?;
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(ResourceError::EmptyData("texture"));
        }

        let row = 4 * width as usize;
        let bytes_per_row = padded_bytes_per_row(row as u32);
        let mut bytes = vec![0u8; bytes_per_row as usize * height as usize];
        for (dst, src) in bytes
            .chunks_exact_mut(bytes_per_row as usize)
            .zip(rgba.as_raw().chunks_exact(row))
        {
            dst[..row].copy_from_slice(src);
        }

        let texture = self
            .backend_mut()
            .create_texture(&TextureDesc {
                label: "texture",
                width,
                height,
                format: TEXTURE_FORMAT,
            })
            .map_err(|source| ResourceError::Allocation {
                what: "texture",
                source,
            })?;

        if let Err(e) = self.stage_and_copy("texture", &bytes, |src| CopyOp::Texture {
            src,
            bytes_per_row,
            dst: texture,
            width,
            height,
        }) {
            self.backend_mut().release_texture(texture);
            return Err(e);
        }

        log::trace!("uploaded texture {width}x{height}");
        Ok(texture)
    }

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, ResourceError> {
        self.ensure_alive()?;
        self.backend_mut()
            .create_sampler(desc)
            .map_err(|source| ResourceError::Allocation {
                what: "sampler",
                source,
            })
    }

    pub fn release_buffer(&mut self, buffer: BufferHandle) {
        if self.is_shut_down() {
            return;
        }
        if !self.backend_mut().release_buffer(buffer) {
            log::warn!("release of unknown buffer {buffer:?}");
        }
    }

    pub fn release_texture(&mut self, texture: TextureHandle) {
        if self.is_shut_down() {
            return;
        }
        if !self.backend_mut().release_texture(texture) {
            log::warn!("release of unknown texture {texture:?}");
        }
    }

    pub fn release_sampler(&mut self, sampler: SamplerHandle) {
        if self.is_shut_down() {
            return;
        }
        if !self.backend_mut().release_sampler(sampler) {
            log::warn!("release of unknown sampler {sampler:?}");
        }
    }

    /// Runs the staging half of an upload; the destination already exists.
    fn stage_and_copy(
        &mut self,
        what: &'static str,
        bytes: &[u8],
        op: impl FnOnce(StagingHandle) -> CopyOp,
    ) -> Result<(), ResourceError> {
        let backend = self.backend_mut();

        let staging = backend
            .create_staging_buffer(what, bytes.len() as u64)
            .map_err(|source| ResourceError::Allocation { what, source })?;

        let transfer = |source: BackendError| ResourceError::Transfer { what, source };

        let result = (|| {
            backend.write_staging_buffer(staging, bytes).map_err(transfer)?;

            let cmd = backend.acquire_command_buffer().map_err(transfer)?;
            let copied = backend.begin_copy_pass(cmd).and_then(|pass| {
                let copied = backend.copy(pass, &op(staging));
                backend.end_copy_pass(pass);
                copied
            });
            if let Err(e) = copied {
                backend.discard_command_buffer(cmd);
                return Err(transfer(e));
            }

            backend.submit(cmd).map_err(transfer)
        })();

        backend.release_staging_buffer(staging);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::{Call, Op};

    #[test]
    fn buffer_upload_sequence() {
        let (mut gpu, recorder) = Gpu::headless();

        let buffer = gpu
            .create_buffer(&[[0.0f32, 1.0], [2.0, 3.0]], BufferUsage::Vertex)
            .unwrap();

        let calls = recorder.calls();
        let kinds: Vec<&str> = calls
            .iter()
            .map(|c| match c {
                Call::CreateBuffer { .. } => "create",
                Call::CreateStagingBuffer { .. } => "staging",
                Call::WriteStagingBuffer { .. } => "write",
                Call::AcquireCommandBuffer(_) => "cmd",
                Call::BeginCopyPass(_) => "begin",
                Call::Copy(_) => "copy",
                Call::EndCopyPass(_) => "end",
                Call::Submit(_) => "submit",
                Call::ReleaseStagingBuffer(_) => "release",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            ["create", "staging", "write", "cmd", "begin", "copy", "end", "submit", "release"]
        );
        assert!(matches!(
            calls[5],
            Call::Copy(CopyOp::Buffer { dst, size: 16, .. }) if dst == buffer
        ));
        assert_eq!(recorder.live_staging_buffers(), 0);
        assert_eq!(recorder.live_buffers(), 1);
    }

    #[test]
    fn buffer_size_is_padded() {
        let (mut gpu, recorder) = Gpu::headless();
        gpu.create_buffer(&[1u8, 2, 3, 4, 5], BufferUsage::Index).unwrap();
        assert!(matches!(
            recorder.calls()[0],
            Call::CreateBuffer { size: 8, usage: BufferUsage::Index, .. }
        ));
    }

    #[test]
    fn empty_buffer_rejected_without_backend_calls() {
        let (mut gpu, recorder) = Gpu::headless();
        let err = gpu.create_buffer::<u32>(&[], BufferUsage::Index).unwrap_err();
        assert!(matches!(err, ResourceError::EmptyData("index buffer")));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn every_failure_point_rolls_back() {
        for op in [
            Op::CreateBuffer,
            Op::CreateStagingBuffer,
            Op::WriteStagingBuffer,
            Op::AcquireCommandBuffer,
            Op::BeginCopyPass,
            Op::Copy,
            Op::Submit,
        ] {
            let (mut gpu, recorder) = Gpu::headless();
            recorder.fail(op);

            assert!(
                gpu.create_buffer(&[7u32; 4], BufferUsage::Storage).is_err(),
                "{op:?} should fail the upload"
            );
            assert_eq!(recorder.live_resources(), 0, "{op:?} leaked a resource");
            assert_eq!(recorder.open_command_buffers(), 0, "{op:?} leaked a command buffer");
        }
    }

    #[test]
    fn texture_rows_are_padded() {
        let (mut gpu, recorder) = Gpu::headless();
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]));

        gpu.create_texture(&TextureSource::from(img)).unwrap();

        let staged = recorder.calls().into_iter().find_map(|c| match c {
            Call::CreateStagingBuffer { size, .. } => Some(size),
            _ => None,
        });
        assert_eq!(staged, Some(512));
        assert!(recorder.calls().iter().any(|c| matches!(
            c,
            Call::Copy(CopyOp::Texture { bytes_per_row: 256, width: 3, height: 2, .. })
        )));
        assert_eq!(recorder.live_textures(), 1);
        assert_eq!(recorder.live_staging_buffers(), 0);
    }

    #[test]
    fn texture_failure_releases_texture() {
        let (mut gpu, recorder) = Gpu::headless();
        recorder.fail(Op::Copy);
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        assert!(gpu.create_texture_rgba8(&img).is_err());
        assert_eq!(recorder.live_resources(), 0);
    }

    #[test]
    fn missing_texture_file_is_io_error() {
        let (mut gpu, recorder) = Gpu::headless();
        let err = gpu
            .create_texture(&TextureSource::file("definitely/missing.png"))
            .unwrap_err();
        assert!(matches!(err, ResourceError::Io { .. }));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn uploads_refused_after_shutdown() {
        let (mut gpu, _recorder) = Gpu::headless();
        gpu.shutdown();
        assert!(matches!(
            gpu.create_buffer(&[1u32], BufferUsage::Vertex),
            Err(ResourceError::TornDown)
        ));
        assert!(matches!(
            gpu.create_sampler(&SamplerDesc::default()),
            Err(ResourceError::TornDown)
        ));
    }
}
