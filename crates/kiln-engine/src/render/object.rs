use std::marker::PhantomData;

use bytemuck::Pod;

use crate::device::{
    BufferHandle, BufferUsage, DeviceId, Frame, Gpu, ResourceError, SamplerDesc, SamplerHandle,
    TextureHandle, TextureSource,
};
use crate::pipeline::{ObjectPipeline, PipelineKind};

/// Lifecycle of a [`RenderObject`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ObjectState {
    /// Holds CPU data only.
    Empty,
    /// GPU resources exist and the object can be drawn.
    Initialized,
    /// Resources were released; the object cannot be initialized again.
    Destroyed,
}

/// Something a scene can draw and must release.
pub trait Drawable {
    /// Binds whatever pipeline it needs and records its draw calls.
    fn draw(&self, frame: &mut Frame<'_, '_>);

    /// Releases GPU resources. Called once, before the drawable is dropped.
    fn release(&mut self, gpu: &mut Gpu<'_>);
}

/// Geometry with optional indices and texture, drawn with pipeline `K`.
///
/// CPU data is edited while the object is `Empty`; [`init`](Self::init)
/// uploads it. Resources are owned by the object and released through the
/// `Gpu` that created them.
pub struct RenderObject<V: Pod, K: PipelineKind = ObjectPipeline> {
    vertices: Vec<V>,
    indices: Vec<u32>,
    texture_source: Option<TextureSource>,
    sampler_desc: SamplerDesc,

    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    texture: Option<TextureHandle>,
    sampler: Option<SamplerHandle>,

    owner: Option<DeviceId>,
    state: ObjectState,
    _pipeline: PhantomData<fn() -> K>,
}

impl<V: Pod, K: PipelineKind> RenderObject<V, K> {
    pub fn empty() -> Self {
        Self::with_indices(Vec::new(), Vec::new())
    }

    pub fn new(vertices: Vec<V>) -> Self {
        Self::with_indices(vertices, Vec::new())
    }

    pub fn with_indices(vertices: Vec<V>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            texture_source: None,
            sampler_desc: SamplerDesc::default(),
            vertex_buffer: None,
            index_buffer: None,
            texture: None,
            sampler: None,
            owner: None,
            state: ObjectState::Empty,
            _pipeline: PhantomData,
        }
    }

    /// Samples `source` when drawn. Requires indices to take effect.
    pub fn with_texture(mut self, source: impl Into<TextureSource>) -> Self {
        self.texture_source = Some(source.into());
        self
    }

    pub fn with_sampler(mut self, desc: SamplerDesc) -> Self {
        self.sampler_desc = desc;
        self
    }

    pub fn push_vertex(&mut self, vertex: V) {
        if self.editable() {
            self.vertices.push(vertex);
        }
    }

    pub fn extend_vertices(&mut self, vertices: impl IntoIterator<Item = V>) {
        if self.editable() {
            self.vertices.extend(vertices);
        }
    }

    pub fn push_index(&mut self, index: u32) {
        if self.editable() {
            self.indices.push(index);
        }
    }

    pub fn extend_indices(&mut self, indices: impl IntoIterator<Item = u32>) {
        if self.editable() {
            self.indices.extend(indices);
        }
    }

    fn editable(&self) -> bool {
        if self.state != ObjectState::Empty {
            log::warn!("render object edit ignored in state {:?}", self.state);
            return false;
        }
        true
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ObjectState::Initialized
    }

    /// Device holding this object's resources, while initialized.
    pub fn owner(&self) -> Option<DeviceId> {
        self.owner
    }

    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn sampler(&self) -> Option<SamplerHandle> {
        self.sampler
    }

    /// Uploads vertex, index and texture data and creates the sampler.
    ///
    /// On failure every resource created by this call is released, in reverse
    /// order, and the object stays `Empty`. Initializing an initialized object
    /// is a no-op.
    pub fn init(&mut self, gpu: &mut Gpu<'_>) -> Result<(), ResourceError> {
        match self.state {
            ObjectState::Initialized => return Ok(()),
            ObjectState::Destroyed => return Err(ResourceError::Destroyed),
            ObjectState::Empty => {}
        }
        if self.vertices.is_empty() {
            return Err(ResourceError::EmptyData("vertex data"));
        }

        let vertex_buffer = gpu.create_buffer(&self.vertices, BufferUsage::Vertex)?;

        let index_buffer = if self.indices.is_empty() {
            None
        } else {
            match gpu.create_buffer(&self.indices, BufferUsage::Index) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    rollback(gpu, vertex_buffer, None, None);
                    return Err(e);
                }
            }
        };

        let (texture, sampler) = match &self.texture_source {
            None => (None, None),
            Some(source) => {
                let texture = match gpu.create_texture(source) {
                    Ok(texture) => texture,
                    Err(e) => {
                        rollback(gpu, vertex_buffer, index_buffer, None);
                        return Err(e);
                    }
                };
                match gpu.create_sampler(&self.sampler_desc) {
                    Ok(sampler) => (Some(texture), Some(sampler)),
                    Err(e) => {
                        rollback(gpu, vertex_buffer, index_buffer, Some(texture));
                        return Err(e);
                    }
                }
            }
        };

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = index_buffer;
        self.texture = texture;
        self.sampler = sampler;
        self.owner = Some(gpu.id());
        self.state = ObjectState::Initialized;
        Ok(())
    }

    /// Records this object's draw into `frame`. The pipeline must already be bound.
    ///
    /// Texture, sampler and indices give a textured indexed draw; indices alone
    /// an indexed draw; otherwise every vertex is drawn in order.
    pub fn render(&self, frame: &mut Frame<'_, '_>) {
        if self.state != ObjectState::Initialized {
            return;
        }
        if self.owner != Some(frame.device_id()) {
            log::warn!("render object skipped: created on another device");
            return;
        }
        let Some(vertices) = self.vertex_buffer else {
            return;
        };

        match (self.texture, self.sampler, self.index_buffer) {
            (Some(texture), Some(sampler), Some(indices)) => {
                let count = self.indices.len() as u32;
                frame.draw_textured(vertices, indices, count, texture, sampler)
            }
            (_, _, Some(indices)) => {
                frame.draw_indexed(vertices, indices, self.indices.len() as u32)
            }
            _ => frame.draw(vertices, self.vertices.len() as u32),
        }
    }

    /// Releases vertex buffer, index buffer, sampler and texture, in that order.
    ///
    /// Destroying twice is harmless. Fails only when `gpu` is not the device
    /// that created the resources.
    pub fn destroy(&mut self, gpu: &mut Gpu<'_>) -> Result<(), ResourceError> {
        if self.state == ObjectState::Initialized && self.owner != Some(gpu.id()) {
            return Err(ResourceError::DeviceMismatch);
        }

        if let Some(buffer) = self.vertex_buffer.take() {
            gpu.release_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            gpu.release_buffer(buffer);
        }
        if let Some(sampler) = self.sampler.take() {
            gpu.release_sampler(sampler);
        }
        if let Some(texture) = self.texture.take() {
            gpu.release_texture(texture);
        }

        self.owner = None;
        self.state = ObjectState::Destroyed;
        Ok(())
    }
}

fn rollback(
    gpu: &mut Gpu<'_>,
    vertex_buffer: BufferHandle,
    index_buffer: Option<BufferHandle>,
    texture: Option<TextureHandle>,
) {
    if let Some(texture) = texture {
        gpu.release_texture(texture);
    }
    if let Some(buffer) = index_buffer {
        gpu.release_buffer(buffer);
    }
    gpu.release_buffer(vertex_buffer);
}

impl<V: Pod, K: PipelineKind> Drawable for RenderObject<V, K> {
    fn draw(&self, frame: &mut Frame<'_, '_>) {
        if self.is_initialized() && frame.bind_pipeline::<K>() {
            self.render(frame);
        }
    }

    fn release(&mut self, gpu: &mut Gpu<'_>) {
        if let Err(e) = self.destroy(gpu) {
            log::error!("failed to release render object: {e}");
        }
    }
}

impl<V: Pod, K: PipelineKind> Drop for RenderObject<V, K> {
    fn drop(&mut self) {
        if self.state == ObjectState::Initialized {
            log::warn!(
                "render object dropped without destroy(); \
                 its resources live until device teardown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Call, Op};
    use crate::paint::Color;
    use crate::pipeline::ColorPipeline;
    use crate::render::{ColorVertex, TexturedVertex};
    use crate::testing::{gpu_with_object_pipeline, shader_pair};

    fn quad_vertices() -> Vec<TexturedVertex> {
        vec![
            TexturedVertex::new([-0.5, -0.5], [0.0, 1.0]),
            TexturedVertex::new([0.5, -0.5], [1.0, 1.0]),
            TexturedVertex::new([0.5, 0.5], [1.0, 0.0]),
            TexturedVertex::new([-0.5, 0.5], [0.0, 0.0]),
        ]
    }

    fn textured() -> RenderObject<TexturedVertex> {
        RenderObject::with_indices(quad_vertices(), vec![0, 1, 2, 2, 3, 0])
            .with_texture(image::RgbaImage::new(2, 2))
    }

    #[test]
    fn empty_vertex_data_never_initializes() {
        let (mut gpu, recorder) = Gpu::headless();
        let mut obj: RenderObject<TexturedVertex> = RenderObject::empty();

        assert!(matches!(obj.init(&mut gpu), Err(ResourceError::EmptyData(_))));
        assert_eq!(obj.state(), ObjectState::Empty);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn init_creates_all_resources() {
        let (mut gpu, recorder) = Gpu::headless();
        let mut obj = textured();

        obj.init(&mut gpu).unwrap();
        assert!(obj.is_initialized());
        assert_eq!(obj.owner(), Some(gpu.id()));
        assert!(obj.texture().is_some() && obj.sampler().is_some());
        assert_eq!(recorder.live_resources(), 4);

        obj.destroy(&mut gpu).unwrap();
        assert_eq!(recorder.live_resources(), 0);
    }

    #[test]
    fn failure_at_each_step_rolls_back() {
        // Buffer creation is the first backend call of each upload.
        for (op, nth) in [
            (Op::CreateBuffer, 1),
            (Op::CreateBuffer, 2),
            (Op::CreateTexture, 1),
            (Op::CreateSampler, 1),
            (Op::Submit, 3),
        ] {
            let (mut gpu, recorder) = Gpu::headless();
            recorder.fail_nth(op, nth);
            let mut obj = textured();

            assert!(obj.init(&mut gpu).is_err(), "{op:?} #{nth}");
            assert_eq!(obj.state(), ObjectState::Empty);
            assert_eq!(recorder.live_resources(), 0, "{op:?} #{nth} leaked");
        }
    }

    #[test]
    fn destroy_releases_in_order() {
        let (mut gpu, recorder) = Gpu::headless();
        let mut obj = textured();
        obj.init(&mut gpu).unwrap();
        let (vb, ib) = (obj.vertex_buffer().unwrap(), obj.index_buffer().unwrap());
        let (tex, sampler) = (obj.texture().unwrap(), obj.sampler().unwrap());
        recorder.clear_calls();

        obj.destroy(&mut gpu).unwrap();
        obj.destroy(&mut gpu).unwrap();

        assert_eq!(
            recorder.calls(),
            [
                Call::ReleaseBuffer(vb),
                Call::ReleaseBuffer(ib),
                Call::ReleaseSampler(sampler),
                Call::ReleaseTexture(tex),
            ]
        );
        assert_eq!(obj.owner(), None);
        assert_eq!(obj.state(), ObjectState::Destroyed);
        assert!(matches!(obj.init(&mut gpu), Err(ResourceError::Destroyed)));
    }

    #[test]
    fn destroy_through_other_device_is_refused() {
        let (mut gpu, _recorder) = Gpu::headless();
        let (mut other, _other_recorder) = Gpu::headless();
        let mut obj = textured();
        obj.init(&mut gpu).unwrap();

        assert!(matches!(obj.destroy(&mut other), Err(ResourceError::DeviceMismatch)));
        assert!(obj.is_initialized());
        obj.destroy(&mut gpu).unwrap();
    }

    fn color_vertices() -> Vec<ColorVertex> {
        vec![
            ColorVertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]),
            ColorVertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),
            ColorVertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),
            ColorVertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),
        ]
    }

    #[test]
    fn render_picks_draw_shape() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let (vert, frag) = shader_pair();
        gpu.add_pipeline::<ColorPipeline>(&vert, &frag);

        let mut full = textured();
        let mut indexed: RenderObject<ColorVertex, ColorPipeline> =
            RenderObject::with_indices(color_vertices(), vec![0, 1, 2]);
        let mut plain: RenderObject<ColorVertex, ColorPipeline> =
            RenderObject::new(color_vertices());
        full.init(&mut gpu).unwrap();
        indexed.init(&mut gpu).unwrap();
        plain.init(&mut gpu).unwrap();
        recorder.clear_calls();

        let mut frame = gpu.begin(Color::BLACK).unwrap();
        full.draw(&mut frame);
        indexed.draw(&mut frame);
        plain.draw(&mut frame);
        frame.end().unwrap();

        let draws: Vec<Call> = recorder
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Draw { .. } | Call::DrawIndexed { .. }))
            .collect();
        assert_eq!(
            draws,
            [
                Call::DrawIndexed { indices: 0..6, base_vertex: 0, instances: 0..1 },
                Call::DrawIndexed { indices: 0..3, base_vertex: 0, instances: 0..1 },
                Call::Draw { vertices: 0..4, instances: 0..1 },
            ]
        );
        assert_eq!(recorder.count(|c| matches!(c, Call::BindFragmentSampler { .. })), 1);

        full.destroy(&mut gpu).unwrap();
        indexed.destroy(&mut gpu).unwrap();
        plain.destroy(&mut gpu).unwrap();
    }

    #[test]
    fn textured_pipeline_without_texture_draws_nothing() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let mut indexed: RenderObject<TexturedVertex> =
            RenderObject::with_indices(quad_vertices(), vec![0, 1, 2]);
        let mut plain: RenderObject<TexturedVertex> = RenderObject::new(quad_vertices());
        let mut unindexed: RenderObject<TexturedVertex> =
            RenderObject::new(quad_vertices()).with_texture(image::RgbaImage::new(1, 1));
        for obj in [&mut indexed, &mut plain, &mut unindexed] {
            obj.init(&mut gpu).unwrap();
        }
        recorder.clear_calls();

        let mut frame = gpu.begin(Color::BLACK).unwrap();
        indexed.draw(&mut frame);
        plain.draw(&mut frame);
        unindexed.draw(&mut frame);
        frame.end().unwrap();

        assert_eq!(recorder.count(|c| matches!(c, Call::BindFragmentSampler { .. })), 0);
        assert_eq!(
            recorder.count(|c| matches!(c, Call::Draw { .. } | Call::DrawIndexed { .. })),
            0
        );

        for obj in [&mut indexed, &mut plain, &mut unindexed] {
            obj.destroy(&mut gpu).unwrap();
        }
    }

    #[test]
    fn uninitialized_object_draws_nothing() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let obj = textured();

        let mut frame = gpu.begin(Color::BLACK).unwrap();
        obj.draw(&mut frame);
        frame.end().unwrap();

        assert_eq!(recorder.count(|c| matches!(c, Call::BindPipeline(_))), 0);
    }

    #[test]
    fn built_incrementally() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let linear = SamplerDesc {
            mag_filter: wgpu::FilterMode::Linear,
            ..SamplerDesc::default()
        };
        let mut obj: RenderObject<TexturedVertex> = RenderObject::empty()
            .with_texture(image::RgbaImage::new(1, 1))
            .with_sampler(linear);
        for v in quad_vertices() {
            obj.push_vertex(v);
        }
        obj.push_index(0);
        obj.extend_indices([1, 2]);

        obj.init(&mut gpu).unwrap();
        obj.push_index(3);
        assert_eq!(obj.indices(), [0, 1, 2]);

        let mut frame = gpu.begin(Color::BLACK).unwrap();
        obj.draw(&mut frame);
        frame.end().unwrap();
        assert!(recorder.calls().contains(&Call::DrawIndexed {
            indices: 0..3,
            base_vertex: 0,
            instances: 0..1
        }));

        obj.destroy(&mut gpu).unwrap();
    }

    #[test]
    fn pipeline_kind_follows_type_parameter() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_pair();
        gpu.add_pipeline::<ColorPipeline>(&vert, &frag);

        let mut tri: RenderObject<ColorVertex, ColorPipeline> = RenderObject::empty();
        tri.extend_vertices([
            ColorVertex::new([0.0, 0.5], [1.0, 0.0, 0.0]),
            ColorVertex::new([-0.5, -0.5], [0.0, 1.0, 0.0]),
            ColorVertex::new([0.5, -0.5], [0.0, 0.0, 1.0]),
        ]);
        tri.init(&mut gpu).unwrap();
        tri.push_vertex(ColorVertex::default());
        assert_eq!(tri.vertices().len(), 3);

        let mut frame = gpu.begin(Color::BLACK).unwrap();
        tri.draw(&mut frame);
        frame.end().unwrap();

        assert!(recorder.calls().contains(&Call::Draw { vertices: 0..3, instances: 0..1 }));
        tri.release(&mut gpu);
        assert_eq!(recorder.live_resources(), 1);
    }
}
