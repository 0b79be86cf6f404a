use std::ops::Range;
use std::sync::Arc;

use windows::core::HSTRING;

use super::*;
use crate as rhi;
use rhi::{ShaderStage, ShaderView};

impl Context {
	fn set_constant_buffers(&self, stage: ShaderStage, slot: u32, buffers: &[Option<ID3D11Buffer>]) {
		let buffers = Some(buffers);
		unsafe {
			match stage {
				ShaderStage::Vertex => self.context.VSSetConstantBuffers(slot, buffers),
				ShaderStage::Geometry => self.context.GSSetConstantBuffers(slot, buffers),
				ShaderStage::TessellationControl => self.context.HSSetConstantBuffers(slot, buffers),
				ShaderStage::TessellationEvaluation => self.context.DSSetConstantBuffers(slot, buffers),
				ShaderStage::Fragment => self.context.PSSetConstantBuffers(slot, buffers),
				ShaderStage::Compute => self.context.CSSetConstantBuffers(slot, buffers),
			}
		}
	}

	fn set_constant_buffer_range(&self, context1: &ID3D11DeviceContext1, stage: ShaderStage, slot: u32, buffer: &ID3D11Buffer, first: u32, count: u32) {
		let buffer = Some(buffer.clone());
		let buffers = Some(&buffer as *const _);
		let first = Some(&first as *const _);
		let count = Some(&count as *const _);

		unsafe {
			match stage {
				ShaderStage::Vertex => context1.VSSetConstantBuffers1(slot, 1, buffers, first, count),
				ShaderStage::Geometry => context1.GSSetConstantBuffers1(slot, 1, buffers, first, count),
				ShaderStage::TessellationControl => context1.HSSetConstantBuffers1(slot, 1, buffers, first, count),
				ShaderStage::TessellationEvaluation => context1.DSSetConstantBuffers1(slot, 1, buffers, first, count),
				ShaderStage::Fragment => context1.PSSetConstantBuffers1(slot, 1, buffers, first, count),
				ShaderStage::Compute => context1.CSSetConstantBuffers1(slot, 1, buffers, first, count),
			}
		}
	}

	fn set_shader_resources(&self, stage: ShaderStage, slot: u32, views: &[Option<ID3D11ShaderResourceView>]) {
		let views = Some(views);
		unsafe {
			match stage {
				ShaderStage::Vertex => self.context.VSSetShaderResources(slot, views),
				ShaderStage::Geometry => self.context.GSSetShaderResources(slot, views),
				ShaderStage::TessellationControl => self.context.HSSetShaderResources(slot, views),
				ShaderStage::TessellationEvaluation => self.context.DSSetShaderResources(slot, views),
				ShaderStage::Fragment => self.context.PSSetShaderResources(slot, views),
				ShaderStage::Compute => self.context.CSSetShaderResources(slot, views),
			}
		}
	}

	fn set_samplers(&self, stage: ShaderStage, slot: u32, samplers: &[Option<ID3D11SamplerState>]) {
		let samplers = Some(samplers);
		unsafe {
			match stage {
				ShaderStage::Vertex => self.context.VSSetSamplers(slot, samplers),
				ShaderStage::Geometry => self.context.GSSetSamplers(slot, samplers),
				ShaderStage::TessellationControl => self.context.HSSetSamplers(slot, samplers),
				ShaderStage::TessellationEvaluation => self.context.DSSetSamplers(slot, samplers),
				ShaderStage::Fragment => self.context.PSSetSamplers(slot, samplers),
				ShaderStage::Compute => self.context.CSSetSamplers(slot, samplers),
			}
		}
	}
}

impl rhi::ContextImpl for Context {
	type Buffer = Buffer;
	type Texture = Texture;
	type TextureView = TextureView;
	type Sampler = Sampler;
	type GraphicsPipeline = GraphicsPipeline;
	type ComputePipeline = ComputePipeline;
	type Framebuffer = Framebuffer;

	fn clear_state(&mut self) {
		self.buffer_srvs.clear();
		self.buffer_uavs.clear();

		unsafe {
			self.context.ClearState();
		}
	}

	fn finish(&mut self) {
		if !self.deferred {
			return;
		}

		let mut command_list = None;
		match unsafe { self.context.FinishCommandList(false, Some(&mut command_list)) } {
			Ok(()) => self.command_list = command_list,
			Err(e) => log::error!(target: "rhi::d3d11", "Failed to finish the command list: {e}"),
		}
	}

	fn set_graphics_pipeline(&mut self, pipeline: &rhi::GraphicsPipeline<Self>) {
		let p = &pipeline.raw;

		unsafe {
			self.context.IASetPrimitiveTopology(p.topology);
			self.context.IASetInputLayout(p.input_layout.as_ref());
			self.context.OMSetBlendState(&p.blend_state, Some(&p.blend_factor), 0xffffffff);
			self.context.OMSetDepthStencilState(&p.depth_stencil_state, p.stencil_reference);
			self.context.RSSetState(&p.rasterizer_state);

			self.context.VSSetShader(&p.vs, None);
			self.context.GSSetShader(p.gs.as_ref(), None);
			self.context.HSSetShader(p.hs.as_ref(), None);
			self.context.DSSetShader(p.ds.as_ref(), None);
			self.context.PSSetShader(p.ps.as_ref(), None);
		}
	}

	fn set_compute_pipeline(&mut self, pipeline: &rhi::ComputePipeline<Self>) {
		unsafe {
			self.context.CSSetShader(&pipeline.raw.cs, None);
		}
	}

	fn set_framebuffer(&mut self, framebuffer: &rhi::Framebuffer<Self>) {
		unsafe {
			self.context.OMSetRenderTargets(Some(&framebuffer.raw.rtvs), framebuffer.raw.dsv.as_ref());
		}
	}

	fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, range: Option<&rhi::BufferRange<Self>>) {
		let Some(range) = range else {
			self.set_constant_buffers(stage, slot, &[None]);
			return;
		};

		let buffer = &range.buffer.raw.buffer;

		if !needs_constant_window(range.offset, range.size, range.buffer.size(), self.context1.is_some()) {
			self.set_constant_buffers(stage, slot, &[Some(buffer.clone())]);
			return;
		}

		let Some(context1) = &self.context1 else {
			unreachable!("needs_constant_window checks for ID3D11DeviceContext1");
		};

		// Immediate contexts keep the old window when the same buffer is rebound with a new one.
		if !self.deferred {
			self.set_constant_buffers(stage, slot, &[None]);
		}

		let (first, count) = range.constant_range();
		self.set_constant_buffer_range(context1, stage, slot, buffer, first, count);
	}

	fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderView<Self>>) {
		let srv = match view {
			Some(ShaderView::Texture(view)) => {
				if view.raw.srv.is_none() {
					log::warn!(target: "rhi::d3d11", "Texture view {:?} has no shader resource view", view.id());
				}
				view.raw.srv.clone()
			}
			Some(ShaderView::Buffer(range)) => self.buffer_srv(range),
			None => None,
		};

		self.set_shader_resources(stage, slot, &[srv]);
	}

	fn set_unordered_access(&mut self, stage: ShaderStage, slot: u32, view: Option<ShaderView<Self>>) {
		let uav = match view {
			Some(ShaderView::Texture(view)) => {
				if view.raw.uav.is_none() {
					log::warn!(target: "rhi::d3d11", "Texture view {:?} has no unordered access view", view.id());
				}
				view.raw.uav.clone()
			}
			Some(ShaderView::Buffer(range)) => self.buffer_uav(range),
			None => None,
		};

		unsafe {
			if stage == ShaderStage::Compute {
				self.context.CSSetUnorderedAccessViews(slot, 1, Some(&uav), None);
			} else {
				self.context.OMSetRenderTargetsAndUnorderedAccessViews(
					D3D11_KEEP_RENDER_TARGETS_AND_DEPTH_STENCIL,
					None,
					None::<&ID3D11DepthStencilView>,
					slot,
					1,
					Some(&uav),
					None,
				);
			}
		}
	}

	fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<&rhi::Sampler<Self>>) {
		self.set_samplers(stage, slot, &[sampler.map(|s| s.raw.state.clone())]);
	}

	fn set_vertex_buffers(&mut self, first_slot: u32, buffers: &[Option<Arc<rhi::Buffer<Self>>>], strides: &[u32], offsets: &[u32]) {
		let buffers = buffers.iter().map(|b| b.as_ref().map(|b| b.raw.buffer.clone())).collect::<Vec<_>>();

		unsafe {
			self.context.IASetVertexBuffers(
				first_slot,
				buffers.len() as u32,
				Some(buffers.as_ptr()),
				Some(strides.as_ptr()),
				Some(offsets.as_ptr()),
			);
		}
	}

	fn set_index_buffer(&mut self, buffer: &rhi::Buffer<Self>, format: rhi::Format, offset: u32) {
		unsafe {
			self.context.IASetIndexBuffer(&buffer.raw.buffer, map_format(format), offset);
		}
	}

	fn set_viewports(&mut self, viewports: &[rhi::Viewport]) {
		let viewports = viewports.iter().map(map_viewport).collect::<Vec<_>>();

		unsafe {
			self.context.RSSetViewports(Some(&viewports));
		}
	}

	fn set_scissor_rects(&mut self, rects: &[rhi::Rect<u32>]) {
		let rects = rects.iter().map(map_rect).collect::<Vec<_>>();

		unsafe {
			self.context.RSSetScissorRects(Some(&rects));
		}
	}

	fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
		unsafe {
			self.context.DrawInstanced(vertices.len() as u32, instances.len() as u32, vertices.start, instances.start);
		}
	}

	fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
		unsafe {
			self.context.DrawIndexedInstanced(indices.len() as u32, instances.len() as u32, indices.start, base_vertex, instances.start);
		}
	}

	fn draw_indirect(&mut self, args: &rhi::Buffer<Self>, offset: u32) {
		unsafe {
			self.context.DrawInstancedIndirect(&args.raw.buffer, offset);
		}
	}

	fn draw_indexed_indirect(&mut self, args: &rhi::Buffer<Self>, offset: u32) {
		unsafe {
			self.context.DrawIndexedInstancedIndirect(&args.raw.buffer, offset);
		}
	}

	fn dispatch(&mut self, groups: [u32; 3]) {
		unsafe {
			self.context.Dispatch(groups[0], groups[1], groups[2]);
		}
	}

	fn dispatch_indirect(&mut self, args: &rhi::Buffer<Self>, offset: u32) {
		unsafe {
			self.context.DispatchIndirect(&args.raw.buffer, offset);
		}
	}

	fn clear_color_target(&mut self, framebuffer: &rhi::Framebuffer<Self>, index: u32, color: rhi::Color<f32>) {
		let Some(Some(rtv)) = framebuffer.raw.rtvs.get(index as usize) else {
			log::warn!(target: "rhi::d3d11", "Framebuffer {:?} has no render target view at {index}", framebuffer.id());
			return;
		};

		unsafe {
			self.context.ClearRenderTargetView(rtv, &color.into());
		}
	}

	fn clear_depth_stencil(&mut self, framebuffer: &rhi::Framebuffer<Self>, depth: f32, stencil: u8) {
		let Some(dsv) = &framebuffer.raw.dsv else {
			log::warn!(target: "rhi::d3d11", "Framebuffer {:?} has no depth stencil view", framebuffer.id());
			return;
		};

		unsafe {
			self.context.ClearDepthStencilView(dsv, (D3D11_CLEAR_DEPTH.0 | D3D11_CLEAR_STENCIL.0) as u32, depth, stencil);
		}
	}

	fn update_buffer(&mut self, buffer: &rhi::Buffer<Self>, offset: u32, data: &[u8]) {
		let native = &buffer.raw.buffer;

		if buffer.desc().usage.contains(rhi::BufferUsage::DYNAMIC) {
			// WRITE_DISCARD leaves every byte outside the written range undefined.
			assert!(
				offset == 0 && data.len() as u64 == buffer.size() as u64,
				"dynamic buffer {:?} must be updated whole, got {} bytes at offset {offset}", buffer.id(), data.len(),
			);

			let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
			if let Err(e) = unsafe { self.context.Map(native, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped)) } {
				log::error!(target: "rhi::d3d11", "Failed to map buffer {:?}: {e}", buffer.id());
				return;
			}

			unsafe {
				std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.pData as *mut u8, data.len());
				self.context.Unmap(native, 0);
			}
			return;
		}

		let whole = offset == 0 && data.len() as u32 == buffer.size();
		let region = D3D11_BOX {
			left: offset,
			top: 0,
			front: 0,
			right: offset + data.len() as u32,
			bottom: 1,
			back: 1,
		};

		unsafe {
			self.context.UpdateSubresource(
				native,
				0,
				if whole { None } else { Some(&region) },
				data.as_ptr() as *const _,
				0,
				0,
			);
		}
	}

	fn copy_buffer(&mut self, src: &rhi::Buffer<Self>, src_offset: u32, dst: &rhi::Buffer<Self>, dst_offset: u32, size: u32) {
		let region = map_box(&[src_offset, 0, 0], &[size, 1, 1]);

		unsafe {
			self.context.CopySubresourceRegion(&dst.raw.buffer, 0, dst_offset, 0, 0, &src.raw.buffer, 0, Some(&region));
		}
	}

	fn copy_texture(
		&mut self,
		src: &rhi::Texture<Self>,
		src_mip_level: u32,
		src_array_slice: u32,
		src_offset: [u32; 3],
		dst: &rhi::Texture<Self>,
		dst_mip_level: u32,
		dst_array_slice: u32,
		dst_offset: [u32; 3],
		size: [u32; 3],
	) {
		let region = map_box(&src_offset, &size);

		unsafe {
			self.context.CopySubresourceRegion(
				&dst.raw.resource,
				subresource(dst, dst_mip_level, dst_array_slice),
				dst_offset[0],
				dst_offset[1],
				dst_offset[2],
				&src.raw.resource,
				subresource(src, src_mip_level, src_array_slice),
				Some(&region),
			);
		}
	}

	fn generate_mipmaps(&mut self, view: &rhi::TextureView<Self>) {
		let Some(srv) = &view.raw.srv else {
			log::warn!(target: "rhi::d3d11", "Texture view {:?} has no shader resource view to generate mipmaps from", view.id());
			return;
		};

		unsafe {
			self.context.GenerateMips(srv);
		}
	}

	fn debug_marker(&mut self, name: &str) {
		if let Some(annotation) = &self.annotation {
			unsafe {
				annotation.SetMarker(&HSTRING::from(name));
			}
		}
	}

	fn debug_event_push(&mut self, name: &str) {
		if let Some(annotation) = &self.annotation {
			unsafe {
				annotation.BeginEvent(&HSTRING::from(name));
			}
		}
	}

	fn debug_event_pop(&mut self) {
		if let Some(annotation) = &self.annotation {
			unsafe {
				annotation.EndEvent();
			}
		}
	}
}
