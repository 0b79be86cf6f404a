//! A context that records native calls, for tests.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::*;

pub const TEXTURE_SIZE: u32 = 64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferKey {
	pub buffer: ResourceId,
	pub offset: u32,
	pub size: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ViewKey {
	Texture(ResourceId),
	Buffer(ResourceId, u32, u32),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Call {
	ClearState,
	Finish,
	GraphicsPipeline(ResourceId),
	ComputePipeline(ResourceId),
	Framebuffer(ResourceId),
	ConstantBuffer(ShaderStage, u32, Option<BufferKey>),
	ShaderResource(ShaderStage, u32, Option<ViewKey>),
	UnorderedAccess(ShaderStage, u32, Option<ViewKey>),
	Sampler(ShaderStage, u32, Option<ResourceId>),
	VertexBuffers {
		first_slot: u32,
		buffers: Vec<Option<ResourceId>>,
		strides: Vec<u32>,
		offsets: Vec<u32>,
	},
	IndexBuffer(ResourceId, Format, u32),
	Viewports(Vec<Viewport>),
	ScissorRects(Vec<Rect<u32>>),
	Draw(Range<u32>, Range<u32>),
	DrawIndexed(Range<u32>, i32, Range<u32>),
	DrawIndirect(ResourceId, u32),
	DrawIndexedIndirect(ResourceId, u32),
	Dispatch([u32; 3]),
	DispatchIndirect(ResourceId, u32),
	ClearColor(ResourceId, u32, Color<f32>),
	ClearDepthStencil(ResourceId, f32, u8),
	UpdateBuffer(ResourceId, u32, Vec<u8>),
	CopyBuffer(ResourceId, u32, ResourceId, u32, u32),
	CopyTexture(ResourceId, ResourceId, [u32; 3]),
	GenerateMipmaps(ResourceId),
	DebugMarker(String),
	DebugEventPush(String),
	DebugEventPop,
}

/// What the native context has bound, as reconstructed from its call history.
#[derive(Default, PartialEq, Debug)]
pub struct Bindings {
	pub constant_buffers: HashMap<(ShaderStage, u32), BufferKey>,
	pub shader_resources: HashMap<(ShaderStage, u32), ViewKey>,
	pub unordered_access: HashMap<(ShaderStage, u32), ViewKey>,
	pub samplers: HashMap<(ShaderStage, u32), ResourceId>,
}

fn apply<K: Copy>(map: &mut HashMap<(ShaderStage, u32), K>, stage: ShaderStage, slot: u32, value: Option<K>) {
	match value {
		Some(value) => map.insert((stage, slot), value),
		None => map.remove(&(stage, slot)),
	};
}

#[derive(Default)]
pub struct MockContext {
	/// Calls since the last [`MockContext::take`].
	pub calls: Vec<Call>,
	/// Every call ever made.
	pub history: Vec<Call>,
}

impl MockContext {
	fn record(&mut self, call: Call) {
		self.history.push(call.clone());
		self.calls.push(call);
	}

	pub fn take(&mut self) -> Vec<Call> {
		std::mem::take(&mut self.calls)
	}

	pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
		self.calls.iter().filter(|c| f(*c)).count()
	}

	pub fn bindings(&self) -> Bindings {
		let mut bindings = Bindings::default();

		for call in &self.history {
			match call {
				Call::ClearState => bindings = Bindings::default(),
				Call::ConstantBuffer(stage, slot, key) => apply(&mut bindings.constant_buffers, *stage, *slot, *key),
				Call::ShaderResource(stage, slot, key) => apply(&mut bindings.shader_resources, *stage, *slot, *key),
				Call::UnorderedAccess(stage, slot, key) => apply(&mut bindings.unordered_access, *stage, *slot, *key),
				Call::Sampler(stage, slot, key) => apply(&mut bindings.samplers, *stage, *slot, *key),
				_ => {}
			}
		}

		bindings
	}
}

pub fn range_key(range: &BufferRange<MockContext>) -> BufferKey {
	BufferKey {
		buffer: range.buffer.id(),
		offset: range.offset,
		size: range.size,
	}
}

pub fn view_key(view: &TextureView<MockContext>) -> ViewKey {
	ViewKey::Texture(view.id())
}

fn shader_view_key(view: ShaderView<MockContext>) -> ViewKey {
	match view {
		ShaderView::Texture(view) => view_key(view),
		ShaderView::Buffer(range) => ViewKey::Buffer(range.buffer.id(), range.offset, range.size),
	}
}

impl ContextImpl for MockContext {
	type Buffer = ();
	type Texture = ();
	type TextureView = ();
	type Sampler = ();
	type GraphicsPipeline = ();
	type ComputePipeline = ();
	type Framebuffer = ();

	fn clear_state(&mut self) {
		self.record(Call::ClearState);
	}

	fn finish(&mut self) {
		self.record(Call::Finish);
	}

	fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline<Self>) {
		self.record(Call::GraphicsPipeline(pipeline.id()));
	}

	fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline<Self>) {
		self.record(Call::ComputePipeline(pipeline.id()));
	}

	fn set_framebuffer(&mut self, framebuffer: &Framebuffer<Self>) {
		self.record(Call::Framebuffer(framebuffer.id()));
	}

	fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, range: Option<&BufferRange<Self>>) {
		self.record(Call::ConstantBuffer(stage, slot, range.map(range_key)));
	}

	fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderView<Self>>) {
		self.record(Call::ShaderResource(stage, slot, view.map(shader_view_key)));
	}

	fn set_unordered_access(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderView<Self>>) {
		self.record(Call::UnorderedAccess(stage, slot, view.map(shader_view_key)));
	}

	fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<&Sampler<Self>>) {
		self.record(Call::Sampler(stage, slot, sampler.map(|s| s.id())));
	}

	fn set_vertex_buffers(&mut self, first_slot: u32, buffers: &[Option<Arc<Buffer<Self>>>], strides: &[u32], offsets: &[u32]) {
		self.record(Call::VertexBuffers {
			first_slot,
			buffers: buffers.iter().map(|b| b.as_ref().map(|b| b.id())).collect(),
			strides: strides.to_vec(),
			offsets: offsets.to_vec(),
		});
	}

	fn set_index_buffer(&mut self, buffer: &Buffer<Self>, format: Format, offset: u32) {
		self.record(Call::IndexBuffer(buffer.id(), format, offset));
	}

	fn set_viewports(&mut self, viewports: &[Viewport]) {
		self.record(Call::Viewports(viewports.to_vec()));
	}

	fn set_scissor_rects(&mut self, rects: &[Rect<u32>]) {
		self.record(Call::ScissorRects(rects.to_vec()));
	}

	fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
		self.record(Call::Draw(vertices, instances));
	}

	fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
		self.record(Call::DrawIndexed(indices, base_vertex, instances));
	}

	fn draw_indirect(&mut self, args: &Buffer<Self>, offset: u32) {
		self.record(Call::DrawIndirect(args.id(), offset));
	}

	fn draw_indexed_indirect(&mut self, args: &Buffer<Self>, offset: u32) {
		self.record(Call::DrawIndexedIndirect(args.id(), offset));
	}

	fn dispatch(&mut self, groups: [u32; 3]) {
		self.record(Call::Dispatch(groups));
	}

	fn dispatch_indirect(&mut self, args: &Buffer<Self>, offset: u32) {
		self.record(Call::DispatchIndirect(args.id(), offset));
	}

	fn clear_color_target(&mut self, framebuffer: &Framebuffer<Self>, index: u32, color: Color<f32>) {
		self.record(Call::ClearColor(framebuffer.id(), index, color));
	}

	fn clear_depth_stencil(&mut self, framebuffer: &Framebuffer<Self>, depth: f32, stencil: u8) {
		self.record(Call::ClearDepthStencil(framebuffer.id(), depth, stencil));
	}

	fn update_buffer(&mut self, buffer: &Buffer<Self>, offset: u32, data: &[u8]) {
		self.record(Call::UpdateBuffer(buffer.id(), offset, data.to_vec()));
	}

	fn copy_buffer(&mut self, src: &Buffer<Self>, src_offset: u32, dst: &Buffer<Self>, dst_offset: u32, size: u32) {
		self.record(Call::CopyBuffer(src.id(), src_offset, dst.id(), dst_offset, size));
	}

	fn copy_texture(
		&mut self,
		src: &Texture<Self>,
		_src_mip_level: u32,
		_src_array_slice: u32,
		_src_offset: [u32; 3],
		dst: &Texture<Self>,
		_dst_mip_level: u32,
		_dst_array_slice: u32,
		_dst_offset: [u32; 3],
		size: [u32; 3],
	) {
		self.record(Call::CopyTexture(src.id(), dst.id(), size));
	}

	fn generate_mipmaps(&mut self, view: &TextureView<Self>) {
		self.record(Call::GenerateMipmaps(view.id()));
	}

	fn debug_marker(&mut self, name: &str) {
		self.record(Call::DebugMarker(name.to_string()));
	}

	fn debug_event_push(&mut self, name: &str) {
		self.record(Call::DebugEventPush(name.to_string()));
	}

	fn debug_event_pop(&mut self) {
		self.record(Call::DebugEventPop);
	}
}

pub fn cmd() -> CmdList<MockContext> {
	cmd_with(CmdListDesc {
		validation: Validation::CPU,
		..Default::default()
	})
}

pub fn cmd_with(desc: CmdListDesc) -> CmdList<MockContext> {
	CmdList::new(MockContext::default(), desc)
}

pub fn buffer(size: u32, usage: BufferUsage) -> Arc<Buffer<MockContext>> {
	Buffer::new(BufferDesc { size, usage, struct_stride: 0 }, ())
}

pub fn structured_buffer(size: u32, usage: BufferUsage) -> Arc<Buffer<MockContext>> {
	Buffer::new(BufferDesc { size, usage, struct_stride: 16 }, ())
}

pub fn texture(usage: TextureUsage) -> Arc<Texture<MockContext>> {
	Texture::new(
		TextureDesc {
			width: TEXTURE_SIZE,
			height: TEXTURE_SIZE,
			depth: 1,
			array_size: 1,
			mip_levels: 1,
			format: Format::RGBA8UNorm,
			usage,
		},
		(),
	)
}

pub fn view(texture: &Arc<Texture<MockContext>>) -> Arc<TextureView<MockContext>> {
	let desc = TextureViewDesc {
		first_mip_level: 0,
		mip_level_count: texture.desc().mip_levels,
	};

	TextureView::new(texture.clone(), desc, ())
}

pub fn sampler() -> Arc<Sampler<MockContext>> {
	Sampler::new(())
}

pub fn element(kind: ResourceKind, stages: ShaderStages) -> ResourceLayoutElementDesc {
	ResourceLayoutElementDesc::new(&format!("{kind:?}"), kind, stages)
}

pub fn layout(elements: &[(ResourceKind, ShaderStages)]) -> Arc<ResourceLayout> {
	let elements: Vec<_> = elements.iter().map(|&(kind, stages)| element(kind, stages)).collect();
	layout_with(&elements)
}

pub fn layout_with(elements: &[ResourceLayoutElementDesc]) -> Arc<ResourceLayout> {
	ResourceLayout::new(&ResourceLayoutDesc {
		elements: elements.to_vec(),
	})
	.unwrap()
}

pub fn graphics_pipeline(layouts: Vec<Arc<ResourceLayout>>) -> Arc<GraphicsPipeline<MockContext>> {
	GraphicsPipeline::new(layouts, vec![16], ())
}

pub fn compute_pipeline(layouts: Vec<Arc<ResourceLayout>>) -> Arc<ComputePipeline<MockContext>> {
	ComputePipeline::new(layouts, ())
}

/// A framebuffer of `color_count` sampleable render targets.
pub fn framebuffer(color_count: usize) -> Arc<Framebuffer<MockContext>> {
	let targets = (0..color_count)
		.map(|_| texture(TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED))
		.collect();

	Framebuffer::new(targets, None, ()).unwrap()
}
