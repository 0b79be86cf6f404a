mod cmd;
#[cfg(all(windows, feature = "d3d11"))]
pub mod d3d11;
#[cfg(test)]
mod mock;
mod resource;

use bitflags::bitflags;

use std::ops::Range;
use std::sync::Arc;

pub use cmd::{BoundResourceSetInfo, BoundTextureInfo, CmdList};
pub use resource::*;

pub struct Error {
	pub error: String,
}

impl Error {
	pub(crate) fn new(error: impl Into<String>) -> Self {
		Self {
			error: error.into(),
		}
	}
}

impl std::fmt::Debug for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.error)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.error)
	}
}

impl std::error::Error for Error {}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct Color<T> {
	pub r: T,
	pub g: T,
	pub b: T,
	pub a: T,
}

impl From<Color<f32>> for [f32; 4] {
	fn from(c: Color<f32>) -> Self {
		[c.r, c.g, c.b, c.a]
	}
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Rect<T> {
	pub left: T,
	pub top: T,
	pub right: T,
	pub bottom: T,
}

impl<T: Copy + Default> Rect<T> {
	pub fn from_size(size: [T; 2]) -> Self {
		Self {
			left: Default::default(),
			top: Default::default(),
			right: size[0],
			bottom: size[1],
		}
	}
}

impl From<Rect<u32>> for Rect<f32> {
	fn from(r: Rect<u32>) -> Self {
		Self {
			left: r.left as f32,
			top: r.top as f32,
			right: r.right as f32,
			bottom: r.bottom as f32,
		}
	}
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct Viewport {
	pub rect: Rect<f32>,
	pub min_depth: f32,
	pub max_depth: f32,
}

impl Viewport {
	pub fn new(rect: Rect<f32>, depth: Range<f32>) -> Self {
		Self {
			rect,
			min_depth: depth.start,
			max_depth: depth.end,
		}
	}
}

/// Defines resource formats.
///
/// The number after every component indicates how many bits it occupies,
/// the suffix is the component type.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum Format {
	#[default]
	Unknown,

	R8UNorm,
	R8UInt,
	R16UInt,
	R16Float,
	R32UInt,
	R32Float,

	RG16Float,
	RG32Float,

	RGB32Float,

	RGBA8UNorm,
	RGBA8UInt,
	RGBA16Float,
	RGBA32UInt,
	RGBA32Float,

	BGRA8UNorm,

	D16UNorm,
	D24UNormS8UInt,
	D32Float,
	D32FloatS8UIntX24,
}

bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	pub struct Validation : u8 {
		/// Validate draw and dispatch state on the cpu before recording.
		const CPU = 1 << 0;
	}

	#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
	pub struct ShaderStages : u8 {
		const VERTEX                  = 1 << 0;
		const GEOMETRY                = 1 << 1;
		const TESSELLATION_CONTROL    = 1 << 2;
		const TESSELLATION_EVALUATION = 1 << 3;
		const FRAGMENT                = 1 << 4;
		const COMPUTE                 = 1 << 5;
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ShaderStage {
	Vertex,
	Geometry,
	TessellationControl,
	TessellationEvaluation,
	Fragment,
	Compute,
}

impl ShaderStage {
	pub const ALL: [ShaderStage; 6] = [
		ShaderStage::Vertex,
		ShaderStage::Geometry,
		ShaderStage::TessellationControl,
		ShaderStage::TessellationEvaluation,
		ShaderStage::Fragment,
		ShaderStage::Compute,
	];

	pub fn flag(self) -> ShaderStages {
		match self {
			ShaderStage::Vertex => ShaderStages::VERTEX,
			ShaderStage::Geometry => ShaderStages::GEOMETRY,
			ShaderStage::TessellationControl => ShaderStages::TESSELLATION_CONTROL,
			ShaderStage::TessellationEvaluation => ShaderStages::TESSELLATION_EVALUATION,
			ShaderStage::Fragment => ShaderStages::FRAGMENT,
			ShaderStage::Compute => ShaderStages::COMPUTE,
		}
	}
}

impl ShaderStages {
	/// Iterates the individual stages in pipeline order.
	pub fn stages(self) -> impl Iterator<Item = ShaderStage> {
		ShaderStage::ALL.into_iter().filter(move |stage| self.contains(stage.flag()))
	}
}

/// Per-stage slot limits of the native api, defaults match D3D11.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
	pub max_constant_buffers: u32,
	pub max_shader_resources: u32,
	pub max_samplers: u32,
	pub max_unordered_access_views: u32,
	pub max_vertex_buffers: u32,
	pub uniform_buffer_offset_alignment: u32,
}

impl Default for Limits {
	fn default() -> Self {
		Self {
			max_constant_buffers: 14,
			max_shader_resources: 128,
			max_samplers: 16,
			max_unordered_access_views: 8,
			max_vertex_buffers: 32,
			uniform_buffer_offset_alignment: 256,
		}
	}
}

#[derive(Clone, Copy, Debug)]
pub struct CmdListDesc {
	pub validation: Validation,
	/// Skip native binds that would rebind the value already bound to a vertex or fragment slot.
	pub cache_bindings: bool,
	pub limits: Limits,
}

impl Default for CmdListDesc {
	fn default() -> Self {
		Self {
			validation: Validation::empty(),
			cache_bindings: true,
			limits: Default::default(),
		}
	}
}

/// A shader-visible view handed to the native context.
pub enum ShaderView<'a, C: ContextImpl> {
	Texture(&'a TextureView<C>),
	Buffer(&'a BufferRange<C>),
}

impl<C: ContextImpl> Clone for ShaderView<'_, C> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<C: ContextImpl> Copy for ShaderView<'_, C> {}

/// The native device context a [`CmdList`] records into.
///
/// Every method maps onto a single native call, the command list decides when
/// (and whether) to issue it.
pub trait ContextImpl: 'static + Sized {
	type Buffer;
	type Texture;
	type TextureView;
	type Sampler;
	type GraphicsPipeline;
	type ComputePipeline;
	type Framebuffer;

	/// Resets every native binding to its default state.
	fn clear_state(&mut self);
	/// Closes the native recording.
	fn finish(&mut self);

	fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline<Self>);
	fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline<Self>);
	fn set_framebuffer(&mut self, framebuffer: &Framebuffer<Self>);

	fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, range: Option<&BufferRange<Self>>);
	fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderView<Self>>);
	/// `stage` is [`ShaderStage::Compute`] for compute slots and [`ShaderStage::Fragment`]
	/// for the output merger slots that follow the color targets.
	fn set_unordered_access(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderView<Self>>);
	fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<&Sampler<Self>>);

	fn set_vertex_buffers(&mut self, first_slot: u32, buffers: &[Option<Arc<Buffer<Self>>>], strides: &[u32], offsets: &[u32]);
	fn set_index_buffer(&mut self, buffer: &Buffer<Self>, format: Format, offset: u32);
	fn set_viewports(&mut self, viewports: &[Viewport]);
	fn set_scissor_rects(&mut self, rects: &[Rect<u32>]);

	fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
	fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
	fn draw_indirect(&mut self, args: &Buffer<Self>, offset: u32);
	fn draw_indexed_indirect(&mut self, args: &Buffer<Self>, offset: u32);
	fn dispatch(&mut self, groups: [u32; 3]);
	fn dispatch_indirect(&mut self, args: &Buffer<Self>, offset: u32);

	fn clear_color_target(&mut self, framebuffer: &Framebuffer<Self>, index: u32, color: Color<f32>);
	fn clear_depth_stencil(&mut self, framebuffer: &Framebuffer<Self>, depth: f32, stencil: u8);

	fn update_buffer(&mut self, buffer: &Buffer<Self>, offset: u32, data: &[u8]);
	fn copy_buffer(&mut self, src: &Buffer<Self>, src_offset: u32, dst: &Buffer<Self>, dst_offset: u32, size: u32);

	fn copy_texture(
		&mut self,
		src: &Texture<Self>,
		src_mip_level: u32,
		src_array_slice: u32,
		src_offset: [u32; 3],
		dst: &Texture<Self>,
		dst_mip_level: u32,
		dst_array_slice: u32,
		dst_offset: [u32; 3],
		size: [u32; 3],
	);

	fn generate_mipmaps(&mut self, view: &TextureView<Self>);

	fn debug_marker(&mut self, name: &str);
	fn debug_event_push(&mut self, name: &str);
	fn debug_event_pop(&mut self);
}

/// Rounds `value` up to a multiple of `alignment`, which must be a power of 2.
pub fn align_pow2(value: u64, alignment: u64) -> u64 {
	(value + alignment - 1) & !(alignment - 1)
}
