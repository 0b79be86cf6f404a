mod cmd;

use std::collections::HashMap;

use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::core::Interface;

use crate as rhi;
use rhi::ResourceId;

impl From<windows::core::Error> for rhi::Error {
	fn from(e: windows::core::Error) -> Self {
		Self {
			error: e.message().to_string(),
		}
	}
}

pub struct Buffer {
	pub buffer: ID3D11Buffer,
}

pub struct Texture {
	pub resource: ID3D11Resource,
}

pub struct TextureView {
	pub srv: Option<ID3D11ShaderResourceView>,
	pub uav: Option<ID3D11UnorderedAccessView>,
}

pub struct Sampler {
	pub state: ID3D11SamplerState,
}

pub struct GraphicsPipeline {
	pub blend_state: ID3D11BlendState,
	pub blend_factor: [f32; 4],
	pub depth_stencil_state: ID3D11DepthStencilState,
	pub stencil_reference: u32,
	pub rasterizer_state: ID3D11RasterizerState,
	pub topology: D3D_PRIMITIVE_TOPOLOGY,
	pub input_layout: Option<ID3D11InputLayout>,
	pub vs: ID3D11VertexShader,
	pub gs: Option<ID3D11GeometryShader>,
	pub hs: Option<ID3D11HullShader>,
	pub ds: Option<ID3D11DomainShader>,
	pub ps: Option<ID3D11PixelShader>,
}

pub struct ComputePipeline {
	pub cs: ID3D11ComputeShader,
}

pub struct Framebuffer {
	pub rtvs: Vec<Option<ID3D11RenderTargetView>>,
	pub dsv: Option<ID3D11DepthStencilView>,
}

/// Byte window of a structured buffer a view is created for.
type BufferViewKey = (ResourceId, u32, u32);

/// A D3D11 device context, immediate or deferred.
pub struct Context {
	device: ID3D11Device,
	context: ID3D11DeviceContext,
	context1: Option<ID3D11DeviceContext1>,
	annotation: Option<ID3DUserDefinedAnnotation>,
	deferred: bool,
	command_list: Option<ID3D11CommandList>,

	// Structured buffer views live until the next `clear_state`.
	buffer_srvs: HashMap<BufferViewKey, ID3D11ShaderResourceView>,
	buffer_uavs: HashMap<BufferViewKey, ID3D11UnorderedAccessView>,
}

impl Context {
	pub fn new(device: &ID3D11Device, context: &ID3D11DeviceContext) -> Result<Self, rhi::Error> {
		let feature_level = unsafe { device.GetFeatureLevel() };
		if feature_level.0 < D3D_FEATURE_LEVEL_11_0.0 {
			return Err(rhi::Error::new(format!(
				"Feature level 11_0 is required, the device supports {:#x}", feature_level.0,
			)));
		}

		let context1 = context.cast::<ID3D11DeviceContext1>().ok();
		if context1.is_none() {
			log::warn!(target: "rhi::d3d11", "ID3D11DeviceContext1 is unavailable, only whole constant buffers can be bound");
		}

		let deferred = unsafe { context.GetType() } == D3D11_DEVICE_CONTEXT_DEFERRED;

		Ok(Self {
			device: device.clone(),
			context: context.clone(),
			context1,
			annotation: context.cast::<ID3DUserDefinedAnnotation>().ok(),
			deferred,
			command_list: None,
			buffer_srvs: HashMap::new(),
			buffer_uavs: HashMap::new(),
		})
	}

	/// Creates a context that records into a new deferred context of `device`.
	pub fn new_deferred(device: &ID3D11Device) -> Result<Self, rhi::Error> {
		let mut context = None;
		unsafe { device.CreateDeferredContext(0, Some(&mut context))? };

		let context = context.ok_or_else(|| rhi::Error::new("CreateDeferredContext returned no context"))?;
		Self::new(device, &context)
	}

	pub fn device_context(&self) -> &ID3D11DeviceContext {
		&self.context
	}

	pub fn is_deferred(&self) -> bool {
		self.deferred
	}

	/// The command list produced by the last `finish` of a deferred context.
	pub fn take_command_list(&mut self) -> Option<ID3D11CommandList> {
		self.command_list.take()
	}

	fn buffer_srv(&mut self, range: &rhi::BufferRange<Self>) -> Option<ID3D11ShaderResourceView> {
		let key = (range.buffer.id(), range.offset, range.size);
		if let Some(srv) = self.buffer_srvs.get(&key) {
			return Some(srv.clone());
		}

		let (first, count) = structured_elements(range)?;

		let desc = D3D11_SHADER_RESOURCE_VIEW_DESC {
			Format: DXGI_FORMAT_UNKNOWN,
			ViewDimension: D3D11_SRV_DIMENSION_BUFFER,
			Anonymous: D3D11_SHADER_RESOURCE_VIEW_DESC_0 {
				Buffer: D3D11_BUFFER_SRV {
					Anonymous1: D3D11_BUFFER_SRV_0 { FirstElement: first },
					Anonymous2: D3D11_BUFFER_SRV_1 { NumElements: count },
				},
			},
		};

		let mut srv = None;
		if let Err(e) = unsafe { self.device.CreateShaderResourceView(&range.buffer.raw.buffer, Some(&desc), Some(&mut srv)) } {
			log::error!(target: "rhi::d3d11", "Failed to create a structured buffer view: {e}");
			return None;
		}

		let srv = srv?;
		self.buffer_srvs.insert(key, srv.clone());
		Some(srv)
	}

	fn buffer_uav(&mut self, range: &rhi::BufferRange<Self>) -> Option<ID3D11UnorderedAccessView> {
		let key = (range.buffer.id(), range.offset, range.size);
		if let Some(uav) = self.buffer_uavs.get(&key) {
			return Some(uav.clone());
		}

		let (first, count) = structured_elements(range)?;

		let desc = D3D11_UNORDERED_ACCESS_VIEW_DESC {
			Format: DXGI_FORMAT_UNKNOWN,
			ViewDimension: D3D11_UAV_DIMENSION_BUFFER,
			Anonymous: D3D11_UNORDERED_ACCESS_VIEW_DESC_0 {
				Buffer: D3D11_BUFFER_UAV {
					FirstElement: first,
					NumElements: count,
					Flags: 0,
				},
			},
		};

		let mut uav = None;
		if let Err(e) = unsafe { self.device.CreateUnorderedAccessView(&range.buffer.raw.buffer, Some(&desc), Some(&mut uav)) } {
			log::error!(target: "rhi::d3d11", "Failed to create a structured buffer view: {e}");
			return None;
		}

		let uav = uav?;
		self.buffer_uavs.insert(key, uav.clone());
		Some(uav)
	}
}

fn structured_elements(range: &rhi::BufferRange<Context>) -> Option<(u32, u32)> {
	let stride = range.buffer.desc().struct_stride;
	if stride == 0 {
		log::error!(target: "rhi::d3d11", "Buffer {:?} is bound as a structured buffer but has no struct stride", range.buffer.id());
		return None;
	}

	Some((range.offset / stride, range.size / stride))
}

pub fn map_format(format: rhi::Format) -> DXGI_FORMAT {
	match format {
		rhi::Format::Unknown => DXGI_FORMAT_UNKNOWN,

		rhi::Format::R8UNorm => DXGI_FORMAT_R8_UNORM,
		rhi::Format::R8UInt => DXGI_FORMAT_R8_UINT,
		rhi::Format::R16UInt => DXGI_FORMAT_R16_UINT,
		rhi::Format::R16Float => DXGI_FORMAT_R16_FLOAT,
		rhi::Format::R32UInt => DXGI_FORMAT_R32_UINT,
		rhi::Format::R32Float => DXGI_FORMAT_R32_FLOAT,

		rhi::Format::RG16Float => DXGI_FORMAT_R16G16_FLOAT,
		rhi::Format::RG32Float => DXGI_FORMAT_R32G32_FLOAT,

		rhi::Format::RGB32Float => DXGI_FORMAT_R32G32B32_FLOAT,

		rhi::Format::RGBA8UNorm => DXGI_FORMAT_R8G8B8A8_UNORM,
		rhi::Format::RGBA8UInt => DXGI_FORMAT_R8G8B8A8_UINT,
		rhi::Format::RGBA16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
		rhi::Format::RGBA32UInt => DXGI_FORMAT_R32G32B32A32_UINT,
		rhi::Format::RGBA32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,

		rhi::Format::BGRA8UNorm => DXGI_FORMAT_B8G8R8A8_UNORM,

		rhi::Format::D16UNorm => DXGI_FORMAT_D16_UNORM,
		rhi::Format::D24UNormS8UInt => DXGI_FORMAT_D24_UNORM_S8_UINT,
		rhi::Format::D32Float => DXGI_FORMAT_D32_FLOAT,
		rhi::Format::D32FloatS8UIntX24 => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
	}
}

/// Inverse of [`map_format`], `None` for formats the crate doesn't expose.
pub fn unmap_format(format: DXGI_FORMAT) -> Option<rhi::Format> {
	Some(match format {
		DXGI_FORMAT_UNKNOWN => rhi::Format::Unknown,

		DXGI_FORMAT_R8_UNORM => rhi::Format::R8UNorm,
		DXGI_FORMAT_R8_UINT => rhi::Format::R8UInt,
		DXGI_FORMAT_R16_UINT => rhi::Format::R16UInt,
		DXGI_FORMAT_R16_FLOAT => rhi::Format::R16Float,
		DXGI_FORMAT_R32_UINT => rhi::Format::R32UInt,
		DXGI_FORMAT_R32_FLOAT => rhi::Format::R32Float,

		DXGI_FORMAT_R16G16_FLOAT => rhi::Format::RG16Float,
		DXGI_FORMAT_R32G32_FLOAT => rhi::Format::RG32Float,

		DXGI_FORMAT_R32G32B32_FLOAT => rhi::Format::RGB32Float,

		DXGI_FORMAT_R8G8B8A8_UNORM => rhi::Format::RGBA8UNorm,
		DXGI_FORMAT_R8G8B8A8_UINT => rhi::Format::RGBA8UInt,
		DXGI_FORMAT_R16G16B16A16_FLOAT => rhi::Format::RGBA16Float,
		DXGI_FORMAT_R32G32B32A32_UINT => rhi::Format::RGBA32UInt,
		DXGI_FORMAT_R32G32B32A32_FLOAT => rhi::Format::RGBA32Float,

		DXGI_FORMAT_B8G8R8A8_UNORM => rhi::Format::BGRA8UNorm,

		DXGI_FORMAT_D16_UNORM => rhi::Format::D16UNorm,
		DXGI_FORMAT_D24_UNORM_S8_UINT => rhi::Format::D24UNormS8UInt,
		DXGI_FORMAT_D32_FLOAT => rhi::Format::D32Float,
		DXGI_FORMAT_D32_FLOAT_S8X24_UINT => rhi::Format::D32FloatS8UIntX24,

		_ => return None,
	})
}

fn map_viewport(viewport: &rhi::Viewport) -> D3D11_VIEWPORT {
	D3D11_VIEWPORT {
		TopLeftX: viewport.rect.left,
		TopLeftY: viewport.rect.top,
		Width: viewport.rect.right - viewport.rect.left,
		Height: viewport.rect.bottom - viewport.rect.top,
		MinDepth: viewport.min_depth,
		MaxDepth: viewport.max_depth,
	}
}

fn map_rect(rect: &rhi::Rect<u32>) -> windows::Win32::Foundation::RECT {
	windows::Win32::Foundation::RECT {
		left: rect.left as i32,
		top: rect.top as i32,
		right: rect.right as i32,
		bottom: rect.bottom as i32,
	}
}

fn map_box(offset: &[u32; 3], size: &[u32; 3]) -> D3D11_BOX {
	D3D11_BOX {
		left: offset[0],
		top: offset[1],
		front: offset[2],
		right: offset[0] + size[0],
		bottom: offset[1] + size[1],
		back: offset[2] + size[2],
	}
}

fn subresource(texture: &rhi::Texture<Context>, mip_level: u32, array_slice: u32) -> u32 {
	mip_level + array_slice * texture.desc().mip_levels
}

/// Whether a constant buffer range must be bound as a window through `ID3D11DeviceContext1`.
///
/// Panics when it must and the device has none, binding the whole buffer would expose the wrong data.
fn needs_constant_window(offset: u32, size: u32, buffer_size: u32, has_context1: bool) -> bool {
	if offset == 0 && size == buffer_size {
		return false;
	}

	assert!(
		has_context1,
		"constant buffer range at offset {offset} with size {size} needs ID3D11DeviceContext1, which this device lacks",
	);
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whole_constant_buffers_bind_without_a_window() {
		assert!(!needs_constant_window(0, 256, 256, false));
		assert!(needs_constant_window(256, 256, 1024, true));
	}

	#[test]
	#[should_panic(expected = "needs ID3D11DeviceContext1")]
	fn constant_buffer_window_requires_context1() {
		needs_constant_window(256, 256, 1024, false);
	}

	#[test]
	fn format_mapping_round_trips() {
		for format in [
			rhi::Format::R16UInt,
			rhi::Format::RGBA8UNorm,
			rhi::Format::BGRA8UNorm,
			rhi::Format::D32FloatS8UIntX24,
		] {
			assert_eq!(unmap_format(map_format(format)), Some(format));
		}

		assert_eq!(unmap_format(DXGI_FORMAT_BC7_UNORM), None);
	}

	#[test]
	fn viewport_uses_extent() {
		let viewport = rhi::Viewport::new(rhi::Rect { left: 10.0, top: 20.0, right: 110.0, bottom: 70.0 }, 0.0..1.0);
		let native = map_viewport(&viewport);

		assert_eq!((native.Width, native.Height), (100.0, 50.0));
	}
}
