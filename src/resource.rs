use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use crate::{ContextImpl, Error, Format, ShaderStages, align_pow2};

/// Process-unique identity of a resource object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceId(u64);

impl ResourceId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}
}

bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	pub struct BufferUsage: u32 {
		const VERTEX                = 1 << 0;
		const INDEX                 = 1 << 1;
		const UNIFORM               = 1 << 2;
		const STRUCTURED_READ_ONLY  = 1 << 3;
		const STRUCTURED_READ_WRITE = 1 << 4;
		const INDIRECT              = 1 << 5;
		const DYNAMIC               = 1 << 6;
		const STAGING               = 1 << 7;
	}

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	pub struct TextureUsage: u32 {
		const SAMPLED          = 1 << 0;
		const STORAGE          = 1 << 1;
		const RENDER_TARGET    = 1 << 2;
		const DEPTH_STENCIL    = 1 << 3;
		const GENERATE_MIPMAPS = 1 << 4;
	}

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	pub struct ResourceLayoutElementOptions: u8 {
		/// The buffer is bound with a per-draw dynamic offset.
		const DYNAMIC_BINDING = 1 << 0;
	}
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc {
	pub size: u32,
	pub usage: BufferUsage,
	/// Element size of structured buffers, 0 for everything else.
	pub struct_stride: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureDesc {
	pub width: u32,
	pub height: u32,
	pub depth: u32,

	pub array_size: u32,
	pub mip_levels: u32,

	pub format: Format,
	pub usage: TextureUsage,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureViewDesc {
	pub first_mip_level: u32,
	pub mip_level_count: u32,
}

pub struct Buffer<C: ContextImpl> {
	id: ResourceId,
	desc: BufferDesc,
	pub raw: C::Buffer,
}

impl<C: ContextImpl> Buffer<C> {
	pub fn new(desc: BufferDesc, raw: C::Buffer) -> Arc<Self> {
		Arc::new(Self {
			id: ResourceId::next(),
			desc,
			raw,
		})
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn desc(&self) -> &BufferDesc {
		&self.desc
	}

	pub fn size(&self) -> u32 {
		self.desc.size
	}
}

pub struct Texture<C: ContextImpl> {
	id: ResourceId,
	desc: TextureDesc,
	pub raw: C::Texture,
}

impl<C: ContextImpl> Texture<C> {
	pub fn new(desc: TextureDesc, raw: C::Texture) -> Arc<Self> {
		Arc::new(Self {
			id: ResourceId::next(),
			desc,
			raw,
		})
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn desc(&self) -> &TextureDesc {
		&self.desc
	}
}

pub struct TextureView<C: ContextImpl> {
	id: ResourceId,
	target: Arc<Texture<C>>,
	desc: TextureViewDesc,
	pub raw: C::TextureView,
}

impl<C: ContextImpl> TextureView<C> {
	pub fn new(target: Arc<Texture<C>>, desc: TextureViewDesc, raw: C::TextureView) -> Arc<Self> {
		Arc::new(Self {
			id: ResourceId::next(),
			target,
			desc,
			raw,
		})
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	/// The texture this view reads from or writes to.
	pub fn target(&self) -> &Arc<Texture<C>> {
		&self.target
	}

	pub fn desc(&self) -> &TextureViewDesc {
		&self.desc
	}
}

pub struct Sampler<C: ContextImpl> {
	id: ResourceId,
	pub raw: C::Sampler,
}

impl<C: ContextImpl> Sampler<C> {
	pub fn new(raw: C::Sampler) -> Arc<Self> {
		Arc::new(Self {
			id: ResourceId::next(),
			raw,
		})
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}
}

/// A byte range of a buffer.
///
/// Two ranges are equal when they cover the same bytes of the same buffer,
/// regardless of which instance describes them.
pub struct BufferRange<C: ContextImpl> {
	pub buffer: Arc<Buffer<C>>,
	pub offset: u32,
	pub size: u32,
}

impl<C: ContextImpl> BufferRange<C> {
	pub fn new(buffer: Arc<Buffer<C>>, offset: u32, size: u32) -> Self {
		assert!(
			offset as u64 + size as u64 <= buffer.size() as u64,
			"buffer range {offset}..{} exceeds buffer size {}", offset as u64 + size as u64, buffer.size(),
		);

		Self { buffer, offset, size }
	}

	pub fn full(buffer: Arc<Buffer<C>>) -> Self {
		let size = buffer.size();
		Self { buffer, offset: 0, size }
	}

	pub fn is_full_range(&self) -> bool {
		self.offset == 0 && self.size == self.buffer.size()
	}

	/// Normalizes a plain buffer or range binding into a range, adding `additional_offset`.
	///
	/// Panics if `resource` is not a buffer, the resource set and its layout disagree,
	/// or if the offset range no longer fits in the buffer.
	pub fn resolve(resource: &BindableResource<C>, additional_offset: u32) -> Self {
		Self::try_resolve(resource, additional_offset).unwrap_or_else(|| {
			panic!("{} moved by {additional_offset} bytes exceeds its buffer", resource.describe())
		})
	}

	/// Like [`BufferRange::resolve`], but returns `None` when the offset range doesn't fit in the buffer.
	pub fn try_resolve(resource: &BindableResource<C>, additional_offset: u32) -> Option<Self> {
		let (buffer, offset, size) = match resource {
			BindableResource::Buffer(buffer) => (buffer, 0, buffer.size()),
			BindableResource::BufferRange(range) => (&range.buffer, range.offset, range.size),
			other => panic!("expected a buffer or buffer range, found {}", other.describe()),
		};

		let offset = offset.checked_add(additional_offset)?;
		if offset as u64 + size as u64 > buffer.size() as u64 {
			return None;
		}

		Some(Self { buffer: buffer.clone(), offset, size })
	}

	/// Returns `(first_constant, num_constants)` in 16 byte constants, the size rounded up to 256 bytes.
	pub fn constant_range(&self) -> (u32, u32) {
		let size = align_pow2(self.size as u64, 256) as u32;
		(self.offset / 16, size / 16)
	}
}

impl<C: ContextImpl> Clone for BufferRange<C> {
	fn clone(&self) -> Self {
		Self {
			buffer: self.buffer.clone(),
			offset: self.offset,
			size: self.size,
		}
	}
}

impl<C: ContextImpl> PartialEq for BufferRange<C> {
	fn eq(&self, other: &Self) -> bool {
		self.buffer.id() == other.buffer.id() && self.offset == other.offset && self.size == other.size
	}
}

impl<C: ContextImpl> std::fmt::Debug for BufferRange<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}[{}..{}]", self.buffer.id(), self.offset, self.offset as u64 + self.size as u64)
	}
}

pub enum BindableResource<C: ContextImpl> {
	Buffer(Arc<Buffer<C>>),
	BufferRange(BufferRange<C>),
	TextureView(Arc<TextureView<C>>),
	Sampler(Arc<Sampler<C>>),
}

impl<C: ContextImpl> BindableResource<C> {
	pub fn describe(&self) -> &'static str {
		match self {
			Self::Buffer(_) => "buffer",
			Self::BufferRange(_) => "buffer range",
			Self::TextureView(_) => "texture view",
			Self::Sampler(_) => "sampler",
		}
	}

	fn buffer(&self) -> Option<&Arc<Buffer<C>>> {
		match self {
			Self::Buffer(buffer) => Some(buffer),
			Self::BufferRange(range) => Some(&range.buffer),
			_ => None,
		}
	}
}

impl<C: ContextImpl> Clone for BindableResource<C> {
	fn clone(&self) -> Self {
		match self {
			Self::Buffer(buffer) => Self::Buffer(buffer.clone()),
			Self::BufferRange(range) => Self::BufferRange(range.clone()),
			Self::TextureView(view) => Self::TextureView(view.clone()),
			Self::Sampler(sampler) => Self::Sampler(sampler.clone()),
		}
	}
}

impl<C: ContextImpl> From<Arc<Buffer<C>>> for BindableResource<C> {
	fn from(buffer: Arc<Buffer<C>>) -> Self {
		Self::Buffer(buffer)
	}
}

impl<C: ContextImpl> From<BufferRange<C>> for BindableResource<C> {
	fn from(range: BufferRange<C>) -> Self {
		Self::BufferRange(range)
	}
}

impl<C: ContextImpl> From<Arc<TextureView<C>>> for BindableResource<C> {
	fn from(view: Arc<TextureView<C>>) -> Self {
		Self::TextureView(view)
	}
}

impl<C: ContextImpl> From<Arc<Sampler<C>>> for BindableResource<C> {
	fn from(sampler: Arc<Sampler<C>>) -> Self {
		Self::Sampler(sampler)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceKind {
	UniformBuffer,
	StructuredBufferReadOnly,
	StructuredBufferReadWrite,
	TextureReadOnly,
	TextureReadWrite,
	Sampler,
}

impl ResourceKind {
	fn is_buffer(self) -> bool {
		matches!(self, Self::UniformBuffer | Self::StructuredBufferReadOnly | Self::StructuredBufferReadWrite)
	}

	fn is_read_write(self) -> bool {
		matches!(self, Self::StructuredBufferReadWrite | Self::TextureReadWrite)
	}
}

#[derive(Clone, Debug)]
pub struct ResourceLayoutElementDesc {
	pub name: String,
	pub kind: ResourceKind,
	pub stages: ShaderStages,
	pub options: ResourceLayoutElementOptions,
}

impl ResourceLayoutElementDesc {
	pub fn new(name: &str, kind: ResourceKind, stages: ShaderStages) -> Self {
		Self {
			name: name.to_string(),
			kind,
			stages,
			options: ResourceLayoutElementOptions::empty(),
		}
	}

	pub fn dynamic(mut self) -> Self {
		self.options |= ResourceLayoutElementOptions::DYNAMIC_BINDING;
		self
	}
}

#[derive(Clone, Debug, Default)]
pub struct ResourceLayoutDesc {
	pub elements: Vec<ResourceLayoutElementDesc>,
}

/// Where one element of a layout lands in the native slot space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ResourceBindingInfo {
	/// Index within the element's kind class: constant buffers, shader resources,
	/// unordered access views or samplers.
	pub slot: u32,
	pub stages: ShaderStages,
	pub kind: ResourceKind,
	pub dynamic: bool,
}

pub struct ResourceLayout {
	id: ResourceId,
	names: Vec<String>,
	bindings: Vec<ResourceBindingInfo>,
	uniform_buffer_count: u32,
	unordered_access_count: u32,
	texture_count: u32,
	sampler_count: u32,
	dynamic_buffer_count: usize,
}

impl ResourceLayout {
	pub fn new(desc: &ResourceLayoutDesc) -> Result<Arc<Self>, Error> {
		let mut cb_index = 0;
		let mut texture_index = 0;
		let mut sampler_index = 0;
		let mut unordered_access_index = 0;
		let mut dynamic_buffer_count = 0;

		let mut bindings = Vec::with_capacity(desc.elements.len());

		for element in &desc.elements {
			if element.stages.is_empty() {
				return Err(Error::new(format!("resource layout element '{}' is not visible to any stage", element.name)));
			}

			let dynamic = element.options.contains(ResourceLayoutElementOptions::DYNAMIC_BINDING);
			if dynamic && !element.kind.is_buffer() {
				return Err(Error::new(format!(
					"resource layout element '{}' is a {:?} and can't use a dynamic binding", element.name, element.kind,
				)));
			}

			if element.kind.is_read_write()
				&& element.stages.contains(ShaderStages::COMPUTE)
				&& element.stages != ShaderStages::COMPUTE
			{
				return Err(Error::new(format!(
					"read-write resource layout element '{}' can't be visible to compute and graphics stages at once", element.name,
				)));
			}

			let counter = match element.kind {
				ResourceKind::UniformBuffer => &mut cb_index,
				ResourceKind::StructuredBufferReadOnly => &mut texture_index,
				ResourceKind::StructuredBufferReadWrite => &mut unordered_access_index,
				ResourceKind::TextureReadOnly => &mut texture_index,
				ResourceKind::TextureReadWrite => &mut unordered_access_index,
				ResourceKind::Sampler => &mut sampler_index,
			};

			let slot = *counter;
			*counter += 1;

			if dynamic {
				dynamic_buffer_count += 1;
			}

			bindings.push(ResourceBindingInfo {
				slot,
				stages: element.stages,
				kind: element.kind,
				dynamic,
			});
		}

		Ok(Arc::new(Self {
			id: ResourceId::next(),
			names: desc.elements.iter().map(|e| e.name.clone()).collect(),
			bindings,
			uniform_buffer_count: cb_index,
			unordered_access_count: unordered_access_index,
			texture_count: texture_index,
			sampler_count: sampler_index,
			dynamic_buffer_count,
		}))
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn bindings(&self) -> &[ResourceBindingInfo] {
		&self.bindings
	}

	pub fn binding(&self, index: usize) -> &ResourceBindingInfo {
		&self.bindings[index]
	}

	pub fn name(&self, index: usize) -> &str {
		&self.names[index]
	}

	pub fn uniform_buffer_count(&self) -> u32 {
		self.uniform_buffer_count
	}

	/// Read-write structured buffers plus read-write textures.
	pub fn unordered_access_count(&self) -> u32 {
		self.unordered_access_count
	}

	/// Read-only textures plus read-only structured buffers.
	pub fn texture_count(&self) -> u32 {
		self.texture_count
	}

	pub fn sampler_count(&self) -> u32 {
		self.sampler_count
	}

	pub fn dynamic_buffer_count(&self) -> usize {
		self.dynamic_buffer_count
	}
}

pub struct ResourceSet<C: ContextImpl> {
	id: ResourceId,
	layout: Arc<ResourceLayout>,
	resources: Vec<BindableResource<C>>,
}

impl<C: ContextImpl> ResourceSet<C> {
	pub fn new(layout: &Arc<ResourceLayout>, resources: Vec<BindableResource<C>>) -> Result<Arc<Self>, Error> {
		if resources.len() != layout.bindings().len() {
			return Err(Error::new(format!(
				"resource set has {} resources but its layout declares {}", resources.len(), layout.bindings().len(),
			)));
		}

		for (index, (resource, info)) in resources.iter().zip(layout.bindings()).enumerate() {
			let name = layout.name(index);
			let mismatch = || Error::new(format!(
				"resource '{name}' is a {} but the layout expects {:?}", resource.describe(), info.kind,
			));

			match info.kind {
				ResourceKind::UniformBuffer | ResourceKind::StructuredBufferReadOnly | ResourceKind::StructuredBufferReadWrite => {
					let buffer = resource.buffer().ok_or_else(mismatch)?;
					let usage = buffer.desc().usage;
					let supported = match info.kind {
						ResourceKind::UniformBuffer => usage.contains(BufferUsage::UNIFORM),
						ResourceKind::StructuredBufferReadOnly => usage.intersects(BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE),
						_ => usage.contains(BufferUsage::STRUCTURED_READ_WRITE),
					};
					if !supported {
						return Err(Error::new(format!(
							"buffer bound to '{name}' has usage {usage:?} which doesn't allow {:?}", info.kind,
						)));
					}
				}
				ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite => {
					let BindableResource::TextureView(view) = resource else {
						return Err(mismatch());
					};
					let required = if info.kind == ResourceKind::TextureReadOnly {
						TextureUsage::SAMPLED
					} else {
						TextureUsage::STORAGE
					};
					if !view.target().desc().usage.contains(required) {
						return Err(Error::new(format!(
							"texture bound to '{name}' is missing usage {required:?}",
						)));
					}
				}
				ResourceKind::Sampler => {
					if !matches!(resource, BindableResource::Sampler(_)) {
						return Err(mismatch());
					}
				}
			}
		}

		Ok(Arc::new(Self {
			id: ResourceId::next(),
			layout: layout.clone(),
			resources,
		}))
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn layout(&self) -> &Arc<ResourceLayout> {
		&self.layout
	}

	pub fn resources(&self) -> &[BindableResource<C>] {
		&self.resources
	}
}

/// First native slot of each kind class for the resource set at some slot index.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct BaseOffsets {
	pub constant_buffer: u32,
	pub unordered_access: u32,
	pub texture: u32,
	pub sampler: u32,
}

impl BaseOffsets {
	/// Sums the per-kind counts of every layout below `slot`.
	pub fn compute(layouts: &[Arc<ResourceLayout>], slot: u32) -> Self {
		layouts.iter().take(slot as usize).fold(Self::default(), |base, layout| Self {
			constant_buffer: base.constant_buffer + layout.uniform_buffer_count(),
			unordered_access: base.unordered_access + layout.unordered_access_count(),
			texture: base.texture + layout.texture_count(),
			sampler: base.sampler + layout.sampler_count(),
		})
	}
}

pub struct GraphicsPipeline<C: ContextImpl> {
	id: ResourceId,
	resource_layouts: Vec<Arc<ResourceLayout>>,
	vertex_strides: Vec<u32>,
	pub raw: C::GraphicsPipeline,
}

impl<C: ContextImpl> GraphicsPipeline<C> {
	pub fn new(resource_layouts: Vec<Arc<ResourceLayout>>, vertex_strides: Vec<u32>, raw: C::GraphicsPipeline) -> Arc<Self> {
		Arc::new(Self {
			id: ResourceId::next(),
			resource_layouts,
			vertex_strides,
			raw,
		})
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn resource_layouts(&self) -> &[Arc<ResourceLayout>] {
		&self.resource_layouts
	}

	pub fn vertex_strides(&self) -> &[u32] {
		&self.vertex_strides
	}

	pub fn base_offsets(&self, slot: u32) -> BaseOffsets {
		BaseOffsets::compute(&self.resource_layouts, slot)
	}
}

pub struct ComputePipeline<C: ContextImpl> {
	id: ResourceId,
	resource_layouts: Vec<Arc<ResourceLayout>>,
	pub raw: C::ComputePipeline,
}

impl<C: ContextImpl> ComputePipeline<C> {
	pub fn new(resource_layouts: Vec<Arc<ResourceLayout>>, raw: C::ComputePipeline) -> Arc<Self> {
		Arc::new(Self {
			id: ResourceId::next(),
			resource_layouts,
			raw,
		})
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn resource_layouts(&self) -> &[Arc<ResourceLayout>] {
		&self.resource_layouts
	}

	pub fn base_offsets(&self, slot: u32) -> BaseOffsets {
		BaseOffsets::compute(&self.resource_layouts, slot)
	}
}

pub struct Framebuffer<C: ContextImpl> {
	id: ResourceId,
	color_targets: Vec<Arc<Texture<C>>>,
	depth_target: Option<Arc<Texture<C>>>,
	width: u32,
	height: u32,
	pub raw: C::Framebuffer,
}

impl<C: ContextImpl> Framebuffer<C> {
	pub fn new(
		color_targets: Vec<Arc<Texture<C>>>,
		depth_target: Option<Arc<Texture<C>>>,
		raw: C::Framebuffer,
	) -> Result<Arc<Self>, Error> {
		let Some(first) = color_targets.first().or(depth_target.as_ref()) else {
			return Err(Error::new("framebuffer needs at least one color or depth target"));
		};

		let (width, height) = (first.desc().width, first.desc().height);

		for target in &color_targets {
			if !target.desc().usage.contains(TextureUsage::RENDER_TARGET) {
				return Err(Error::new("framebuffer color target is missing usage RENDER_TARGET"));
			}
			if target.desc().width != width || target.desc().height != height {
				return Err(Error::new("framebuffer targets must share the same dimensions"));
			}
		}

		if let Some(depth) = &depth_target {
			if !depth.desc().usage.contains(TextureUsage::DEPTH_STENCIL) {
				return Err(Error::new("framebuffer depth target is missing usage DEPTH_STENCIL"));
			}
			if depth.desc().width != width || depth.desc().height != height {
				return Err(Error::new("framebuffer targets must share the same dimensions"));
			}
		}

		Ok(Arc::new(Self {
			id: ResourceId::next(),
			color_targets,
			depth_target,
			width,
			height,
			raw,
		}))
	}

	pub fn id(&self) -> ResourceId {
		self.id
	}

	pub fn color_targets(&self) -> &[Arc<Texture<C>>] {
		&self.color_targets
	}

	pub fn depth_target(&self) -> Option<&Arc<Texture<C>>> {
		self.depth_target.as_ref()
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::{self, MockContext};

	#[test]
	fn layout_slots_per_kind_class() {
		let layout = mock::layout(&[
			(ResourceKind::UniformBuffer, ShaderStages::VERTEX),
			(ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
			(ResourceKind::StructuredBufferReadOnly, ShaderStages::FRAGMENT),
			(ResourceKind::Sampler, ShaderStages::FRAGMENT),
			(ResourceKind::UniformBuffer, ShaderStages::FRAGMENT),
			(ResourceKind::TextureReadWrite, ShaderStages::COMPUTE),
			(ResourceKind::StructuredBufferReadWrite, ShaderStages::COMPUTE),
		]);

		let slots: Vec<u32> = layout.bindings().iter().map(|b| b.slot).collect();
		assert_eq!(slots, [0, 0, 1, 0, 1, 0, 1]);

		assert_eq!(layout.uniform_buffer_count(), 2);
		assert_eq!(layout.texture_count(), 2);
		assert_eq!(layout.unordered_access_count(), 2);
		assert_eq!(layout.sampler_count(), 1);
		assert_eq!(layout.dynamic_buffer_count(), 0);
	}

	#[test]
	fn dynamic_binding_only_on_buffers() {
		let desc = ResourceLayoutDesc {
			elements: vec![
				ResourceLayoutElementDesc::new("params", ResourceKind::UniformBuffer, ShaderStages::VERTEX).dynamic(),
				ResourceLayoutElementDesc::new("tex", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT).dynamic(),
			],
		};

		assert!(ResourceLayout::new(&desc).is_err());
	}

	#[test]
	fn read_write_elements_cant_mix_compute_and_graphics() {
		let desc = ResourceLayoutDesc {
			elements: vec![ResourceLayoutElementDesc::new(
				"out",
				ResourceKind::TextureReadWrite,
				ShaderStages::COMPUTE | ShaderStages::FRAGMENT,
			)],
		};

		assert!(ResourceLayout::new(&desc).is_err());
	}

	#[test]
	fn resource_set_validates_kinds_and_usage() {
		let layout = mock::layout(&[
			(ResourceKind::UniformBuffer, ShaderStages::VERTEX),
			(ResourceKind::TextureReadWrite, ShaderStages::COMPUTE),
		]);

		let uniform = mock::buffer(256, BufferUsage::UNIFORM);
		let vertex = mock::buffer(256, BufferUsage::VERTEX);
		let sampled = mock::view(&mock::texture(TextureUsage::SAMPLED));
		let storage = mock::view(&mock::texture(TextureUsage::STORAGE));

		assert!(ResourceSet::<MockContext>::new(&layout, vec![uniform.clone().into()]).is_err());
		assert!(ResourceSet::<MockContext>::new(&layout, vec![storage.clone().into(), uniform.clone().into()]).is_err());
		assert!(ResourceSet::<MockContext>::new(&layout, vec![vertex.into(), storage.clone().into()]).is_err());
		assert!(ResourceSet::<MockContext>::new(&layout, vec![uniform.clone().into(), sampled.into()]).is_err());
		assert!(ResourceSet::<MockContext>::new(&layout, vec![uniform.into(), storage.into()]).is_ok());
	}

	#[test]
	fn base_offsets_sum_lower_layouts() {
		let layout0 = mock::layout(&[
			(ResourceKind::UniformBuffer, ShaderStages::VERTEX),
			(ResourceKind::UniformBuffer, ShaderStages::FRAGMENT),
			(ResourceKind::Sampler, ShaderStages::FRAGMENT),
		]);
		let layout1 = mock::layout(&[(ResourceKind::UniformBuffer, ShaderStages::VERTEX)]);
		let pipeline = mock::graphics_pipeline(vec![layout0, layout1]);

		assert_eq!(pipeline.base_offsets(0), BaseOffsets::default());
		assert_eq!(pipeline.base_offsets(1).constant_buffer, 2);
		assert_eq!(pipeline.base_offsets(1).sampler, 1);
		assert_eq!(pipeline.base_offsets(1).texture, 0);
		assert_eq!(pipeline.base_offsets(2).constant_buffer, 3);
	}

	#[test]
	fn resolve_plain_buffer_is_full_range() {
		let buffer = mock::buffer(512, BufferUsage::UNIFORM);

		let plain = BufferRange::<MockContext>::resolve(&buffer.clone().into(), 0);
		let ranged = BufferRange::<MockContext>::resolve(&BufferRange::new(buffer.clone(), 0, 512).into(), 0);

		assert!(plain.is_full_range());
		assert!(ranged.is_full_range());
		assert_eq!(plain, ranged);

		let dynamic = BufferRange::<MockContext>::resolve(&BufferRange::new(buffer, 128, 64).into(), 256);
		assert_eq!((dynamic.offset, dynamic.size), (384, 64));
		assert!(!dynamic.is_full_range());
	}

	#[test]
	#[should_panic(expected = "expected a buffer")]
	fn resolve_rejects_non_buffers() {
		let sampler = mock::sampler();
		BufferRange::<MockContext>::resolve(&sampler.into(), 0);
	}

	#[test]
	fn resolved_ranges_stay_inside_the_buffer() {
		let buffer = mock::buffer(1024, BufferUsage::UNIFORM);
		let range: BindableResource<MockContext> = BufferRange::new(buffer.clone(), 0, 256).into();

		assert_eq!(BufferRange::try_resolve(&range, 768).map(|r| r.offset), Some(768));
		assert!(BufferRange::try_resolve(&range, 1024).is_none());
		assert!(BufferRange::try_resolve(&range, u32::MAX).is_none(), "offset overflow");
		assert!(BufferRange::<MockContext>::try_resolve(&buffer.into(), 256).is_none(), "a whole buffer has no room to move");
	}

	#[test]
	fn constant_range_rounds_to_256_bytes() {
		let buffer = mock::buffer(4096, BufferUsage::UNIFORM);

		assert_eq!(BufferRange::new(buffer.clone(), 512, 64).constant_range(), (32, 16));
		assert_eq!(BufferRange::new(buffer, 256, 300).constant_range(), (16, 32));
	}

	#[test]
	fn framebuffer_requires_matching_targets() {
		let color = mock::texture(TextureUsage::RENDER_TARGET);
		let sampled = mock::texture(TextureUsage::SAMPLED);

		assert!(Framebuffer::<MockContext>::new(vec![], None, ()).is_err());
		assert!(Framebuffer::new(vec![sampled], None, ()).is_err());

		let framebuffer = Framebuffer::new(vec![color], None, ()).unwrap();
		assert_eq!((framebuffer.width(), framebuffer.height()), (mock::TEXTURE_SIZE, mock::TEXTURE_SIZE));
	}
}
