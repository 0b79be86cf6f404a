mod activate;
mod bindings;
mod hazard;

use std::sync::Arc;

pub use bindings::BoundResourceSetInfo;
pub use hazard::BoundTextureInfo;

use bindings::BindingTables;
use hazard::HazardTracker;

use crate::*;

fn is_same<T>(bound: &Option<Arc<T>>, other: &Arc<T>) -> bool {
	bound.as_ref().is_some_and(|bound| Arc::ptr_eq(bound, other))
}

fn span(call: &str, what: &str, first: u32, count: u32) -> std::ops::Range<u32> {
	let Some(end) = first.checked_add(count) else {
		panic!("{call}: {what} range of {count} starting at {first} overflows");
	};
	first..end
}

/// Byte offsets of `draw_count` indirect argument records `stride` bytes apart.
fn indirect_offsets(call: &str, offset: u32, draw_count: u32, stride: u32) -> Vec<u32> {
	let last = draw_count.checked_sub(1).map_or(Some(offset), |n| n.checked_mul(stride).and_then(|n| n.checked_add(offset)));
	assert!(last.is_some(), "{call}: {draw_count} records of {stride} bytes starting at {offset} overflow");

	(0..draw_count).map(|i| offset + i * stride).collect()
}

/// Records commands into a native context while keeping a shadow copy of its state.
///
/// Redundant binds are skipped, conflicting shader resource and unordered access
/// views of the same resource are evicted, and dirty raster state and invalidated
/// resource sets are flushed right before each draw or dispatch.
pub struct CmdList<C: ContextImpl> {
	context: C,
	desc: CmdListDesc,
	recording: bool,

	framebuffer: Option<Arc<Framebuffer<C>>>,
	graphics_pipeline: Option<Arc<GraphicsPipeline<C>>>,
	compute_pipeline: Option<Arc<ComputePipeline<C>>>,

	graphics_sets: Vec<BoundResourceSetInfo<C>>,
	compute_sets: Vec<BoundResourceSetInfo<C>>,
	invalidated_graphics_sets: Vec<bool>,
	invalidated_compute_sets: Vec<bool>,

	tables: BindingTables,
	hazards: HazardTracker,

	viewports: Vec<Viewport>,
	viewports_changed: bool,
	scissor_rects: Vec<Rect<u32>>,
	scissor_rects_changed: bool,

	vertex_bindings: Vec<Option<Arc<Buffer<C>>>>,
	vertex_offsets: Vec<u32>,
	vertex_strides: Vec<u32>,
	num_vertex_bindings: u32,
	vertex_bindings_changed: bool,

	index_buffer: Option<Arc<Buffer<C>>>,
	index_format: Format,
	index_offset: u32,
}

impl<C: ContextImpl> CmdList<C> {
	pub fn new(context: C, desc: CmdListDesc) -> Self {
		let max_vertex_buffers = desc.limits.max_vertex_buffers as usize;

		Self {
			context,
			desc,
			recording: false,

			framebuffer: None,
			graphics_pipeline: None,
			compute_pipeline: None,

			graphics_sets: Vec::new(),
			compute_sets: Vec::new(),
			invalidated_graphics_sets: Vec::new(),
			invalidated_compute_sets: Vec::new(),

			tables: BindingTables::new(desc.cache_bindings),
			hazards: HazardTracker::default(),

			viewports: Vec::new(),
			viewports_changed: false,
			scissor_rects: Vec::new(),
			scissor_rects_changed: false,

			vertex_bindings: vec![None; max_vertex_buffers],
			vertex_offsets: vec![0; max_vertex_buffers],
			vertex_strides: vec![0; max_vertex_buffers],
			num_vertex_bindings: 0,
			vertex_bindings_changed: false,

			index_buffer: None,
			index_format: Format::Unknown,
			index_offset: 0,
		}
	}

	fn validate(&self) -> bool {
		self.desc.validation.contains(Validation::CPU)
	}

	/// Starts a recording from a cleared native state.
	pub fn begin(&mut self) {
		self.context.clear_state();
		self.reset_managed_state();
		self.recording = true;
	}

	pub fn end(&mut self) {
		if self.validate() {
			assert!(self.recording, "end called without a matching begin");
		}

		self.context.finish();
		self.reset_managed_state();
		self.recording = false;
	}

	/// Discards everything recorded so far and starts over.
	///
	/// No native calls are made, the caller resets the native context itself.
	pub fn reset(&mut self) {
		self.reset_managed_state();
		self.recording = true;
	}

	fn reset_managed_state(&mut self) {
		self.framebuffer = None;
		self.graphics_pipeline = None;
		self.compute_pipeline = None;

		self.graphics_sets.clear();
		self.compute_sets.clear();
		self.invalidated_graphics_sets.clear();
		self.invalidated_compute_sets.clear();

		self.tables.clear();
		self.hazards.clear();

		self.viewports.clear();
		self.viewports_changed = false;
		self.scissor_rects.clear();
		self.scissor_rects_changed = false;

		self.vertex_bindings.fill(None);
		self.vertex_offsets.fill(0);
		self.vertex_strides.fill(0);
		self.num_vertex_bindings = 0;
		self.vertex_bindings_changed = false;

		self.index_buffer = None;
		self.index_format = Format::Unknown;
		self.index_offset = 0;
	}

	pub fn set_graphics_pipeline(&mut self, pipeline: &Arc<GraphicsPipeline<C>>) {
		if is_same(&self.graphics_pipeline, pipeline) {
			return;
		}

		log::debug!(target: "rhi::cmd", "Switching graphics pipeline to {:?}", pipeline.id());

		let count = pipeline.resource_layouts().len();
		self.graphics_sets.clear();
		self.graphics_sets.resize_with(count, Default::default);
		self.invalidated_graphics_sets.clear();
		self.invalidated_graphics_sets.resize(count, false);
		self.hazards.orphan(false);

		self.context.set_graphics_pipeline(pipeline);

		let strides = pipeline.vertex_strides();
		for (slot, current) in self.vertex_strides.iter_mut().enumerate() {
			let stride = strides.get(slot).copied().unwrap_or(0);
			if *current != stride {
				*current = stride;
				self.vertex_bindings_changed = true;
			}
		}

		self.graphics_pipeline = Some(pipeline.clone());
	}

	pub fn set_compute_pipeline(&mut self, pipeline: &Arc<ComputePipeline<C>>) {
		if is_same(&self.compute_pipeline, pipeline) {
			return;
		}

		log::debug!(target: "rhi::cmd", "Switching compute pipeline to {:?}", pipeline.id());

		let count = pipeline.resource_layouts().len();
		self.compute_sets.clear();
		self.compute_sets.resize_with(count, Default::default);
		self.invalidated_compute_sets.clear();
		self.invalidated_compute_sets.resize(count, false);
		self.hazards.orphan(true);

		self.context.set_compute_pipeline(pipeline);

		self.compute_pipeline = Some(pipeline.clone());
	}

	pub fn set_graphics_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<C>>, dynamic_offsets: &[u32]) {
		let layouts = self.graphics_pipeline.as_ref().map(|p| p.resource_layouts());
		self.check_resource_set("graphics", layouts, slot, set, dynamic_offsets);

		let index = slot as usize;
		if self.graphics_sets[index].matches(set, dynamic_offsets) {
			return;
		}

		self.graphics_sets[index] = BoundResourceSetInfo::new(set, dynamic_offsets);
		self.invalidated_graphics_sets[index] = false;
		self.activate_resource_set(slot, true);
	}

	pub fn set_compute_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<C>>, dynamic_offsets: &[u32]) {
		let layouts = self.compute_pipeline.as_ref().map(|p| p.resource_layouts());
		self.check_resource_set("compute", layouts, slot, set, dynamic_offsets);

		let index = slot as usize;
		if self.compute_sets[index].matches(set, dynamic_offsets) {
			return;
		}

		self.compute_sets[index] = BoundResourceSetInfo::new(set, dynamic_offsets);
		self.invalidated_compute_sets[index] = false;
		self.activate_resource_set(slot, false);
	}

	fn check_resource_set(
		&self,
		kind: &str,
		layouts: Option<&[Arc<ResourceLayout>]>,
		slot: u32,
		set: &ResourceSet<C>,
		dynamic_offsets: &[u32],
	) {
		let Some(layouts) = layouts else {
			panic!("{kind} resource set bound to slot {slot} without a {kind} pipeline");
		};

		assert!(
			(slot as usize) < layouts.len(),
			"{kind} resource set slot {slot} is out of range, the pipeline declares {} sets", layouts.len(),
		);

		assert_eq!(
			dynamic_offsets.len(),
			set.layout().dynamic_buffer_count(),
			"{kind} resource set at slot {slot} needs one offset per dynamic buffer",
		);

		if self.validate() {
			let expected = &layouts[slot as usize];
			let layout = set.layout();
			assert!(
				layout.uniform_buffer_count() == expected.uniform_buffer_count()
					&& layout.texture_count() == expected.texture_count()
					&& layout.unordered_access_count() == expected.unordered_access_count()
					&& layout.sampler_count() == expected.sampler_count(),
				"{kind} resource set at slot {slot} doesn't match the pipeline's layout",
			);

			let alignment = self.desc.limits.uniform_buffer_offset_alignment;
			for &offset in dynamic_offsets {
				assert!(
					offset % alignment == 0,
					"dynamic offset {offset} of {kind} resource set at slot {slot} is not aligned to {alignment}",
				);
			}
		}
	}

	pub fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer<C>>, offset: u32) {
		assert!(
			index < self.desc.limits.max_vertex_buffers,
			"vertex buffer slot {index} is out of range, the limit is {}", self.desc.limits.max_vertex_buffers,
		);

		if self.validate() {
			assert!(buffer.desc().usage.contains(BufferUsage::VERTEX), "vertex buffer {:?} is missing usage VERTEX", buffer.id());
		}

		let slot = index as usize;
		if is_same(&self.vertex_bindings[slot], buffer) && self.vertex_offsets[slot] == offset {
			return;
		}

		self.unbind_uav_buffer(buffer.id());

		self.vertex_bindings[slot] = Some(buffer.clone());
		self.vertex_offsets[slot] = offset;
		self.vertex_bindings_changed = true;
		self.num_vertex_bindings = self.num_vertex_bindings.max(index + 1);
	}

	pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer<C>>, format: Format, offset: u32) {
		assert!(
			matches!(format, Format::R16UInt | Format::R32UInt),
			"index buffer format must be R16UInt or R32UInt, got {format:?}",
		);

		if self.validate() {
			assert!(buffer.desc().usage.contains(BufferUsage::INDEX), "index buffer {:?} is missing usage INDEX", buffer.id());
		}

		if is_same(&self.index_buffer, buffer) && self.index_format == format && self.index_offset == offset {
			return;
		}

		self.unbind_uav_buffer(buffer.id());

		self.index_buffer = Some(buffer.clone());
		self.index_format = format;
		self.index_offset = offset;

		self.context.set_index_buffer(buffer, format, offset);
	}

	pub fn set_viewport(&mut self, index: u32, viewport: Viewport) {
		let index = index as usize;
		if self.viewports.len() <= index {
			self.viewports.resize(index + 1, Viewport::default());
		}

		self.viewports[index] = viewport;
		self.viewports_changed = true;
	}

	/// Covers the whole framebuffer with one viewport per color target.
	pub fn set_full_viewports(&mut self) {
		let Some(framebuffer) = &self.framebuffer else {
			return;
		};

		let rect = Rect::from_size([framebuffer.width() as f32, framebuffer.height() as f32]);
		let count = framebuffer.color_targets().len().max(1) as u32;

		for index in 0..count {
			self.set_viewport(index, Viewport::new(rect, 0.0..1.0));
		}
	}

	pub fn set_scissor_rect(&mut self, index: u32, x: u32, y: u32, width: u32, height: u32) {
		let index = index as usize;
		if self.scissor_rects.len() <= index {
			self.scissor_rects.resize(index + 1, Rect::default());
		}

		let (Some(right), Some(bottom)) = (x.checked_add(width), y.checked_add(height)) else {
			panic!("scissor rect {index} at ({x}, {y}) with size {width}x{height} overflows");
		};

		self.scissor_rects[index] = Rect {
			left: x,
			top: y,
			right,
			bottom,
		};
		self.scissor_rects_changed = true;
	}

	pub fn set_full_scissor_rects(&mut self) {
		let Some(framebuffer) = &self.framebuffer else {
			return;
		};

		let (width, height) = (framebuffer.width(), framebuffer.height());
		let count = framebuffer.color_targets().len().max(1) as u32;

		for index in 0..count {
			self.set_scissor_rect(index, 0, 0, width, height);
		}
	}

	pub fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer<C>>) {
		for target in framebuffer.color_targets().iter().chain(framebuffer.depth_target()) {
			self.unbind_srv_texture(target.id());
		}

		// Graphics unordered access slots start after the color targets.
		self.unbind_graphics_uavs();

		self.context.set_framebuffer(framebuffer);
		self.framebuffer = Some(framebuffer.clone());

		self.set_full_viewports();
		self.set_full_scissor_rects();
	}

	pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
		let vertices = span("draw", "vertex", first_vertex, vertex_count);
		let instances = span("draw", "instance", first_instance, instance_count);

		self.pre_draw(false);
		self.context.draw(vertices, instances);
	}

	pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
		let indices = span("draw_indexed", "index", first_index, index_count);
		let instances = span("draw_indexed", "instance", first_instance, instance_count);

		self.pre_draw(true);
		self.context.draw_indexed(indices, vertex_offset, instances);
	}

	/// Issues `draw_count` indirect draws reading their arguments `stride` bytes apart.
	pub fn draw_indirect(&mut self, args: &Arc<Buffer<C>>, offset: u32, draw_count: u32, stride: u32) {
		self.check_indirect_args(args);
		let offsets = indirect_offsets("draw_indirect", offset, draw_count, stride);
		self.pre_draw(false);

		for offset in offsets {
			self.context.draw_indirect(args, offset);
		}
	}

	pub fn draw_indexed_indirect(&mut self, args: &Arc<Buffer<C>>, offset: u32, draw_count: u32, stride: u32) {
		self.check_indirect_args(args);
		let offsets = indirect_offsets("draw_indexed_indirect", offset, draw_count, stride);
		self.pre_draw(true);

		for offset in offsets {
			self.context.draw_indexed_indirect(args, offset);
		}
	}

	pub fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
		self.pre_dispatch();
		self.context.dispatch([group_count_x, group_count_y, group_count_z]);
	}

	pub fn dispatch_indirect(&mut self, args: &Arc<Buffer<C>>, offset: u32) {
		self.check_indirect_args(args);
		self.pre_dispatch();
		self.context.dispatch_indirect(args, offset);
	}

	fn check_indirect_args(&self, args: &Buffer<C>) {
		if self.validate() {
			assert!(
				args.desc().usage.contains(BufferUsage::INDIRECT),
				"indirect arguments buffer {:?} is missing usage INDIRECT", args.id(),
			);
		}
	}

	/// Flushes dirty raster state and reactivates invalidated graphics resource sets.
	fn pre_draw(&mut self, indexed: bool) {
		if self.validate() {
			self.validate_draw(indexed);
		}

		if self.viewports_changed {
			self.viewports_changed = false;
			self.context.set_viewports(&self.viewports);
		}

		if self.scissor_rects_changed {
			self.scissor_rects_changed = false;
			if !self.scissor_rects.is_empty() {
				self.context.set_scissor_rects(&self.scissor_rects);
			}
		}

		if self.vertex_bindings_changed {
			self.vertex_bindings_changed = false;
			let count = self.num_vertex_bindings as usize;
			self.context.set_vertex_buffers(
				0,
				&self.vertex_bindings[..count],
				&self.vertex_strides[..count],
				&self.vertex_offsets[..count],
			);
		}

		for slot in 0..self.graphics_sets.len() {
			if self.invalidated_graphics_sets[slot] {
				self.invalidated_graphics_sets[slot] = false;
				self.activate_resource_set(slot as u32, true);
			}
		}

		if self.validate() {
			self.validate_hazards();
		}
	}

	/// Reactivates invalidated compute resource sets.
	fn pre_dispatch(&mut self) {
		if self.validate() {
			self.validate_dispatch();
		}

		for slot in 0..self.compute_sets.len() {
			if self.invalidated_compute_sets[slot] {
				self.invalidated_compute_sets[slot] = false;
				self.activate_resource_set(slot as u32, false);
			}
		}

		if self.validate() {
			self.validate_hazards();
		}
	}

	fn validate_draw(&self, indexed: bool) {
		assert!(self.recording, "draw recorded outside of begin and end");
		assert!(self.graphics_pipeline.is_some(), "draw recorded without a graphics pipeline");
		assert!(self.framebuffer.is_some(), "draw recorded without a framebuffer");

		for (slot, set) in self.graphics_sets.iter().enumerate() {
			assert!(set.is_bound(), "draw recorded without a graphics resource set at slot {slot}");
		}

		if indexed {
			assert!(self.index_buffer.is_some(), "indexed draw recorded without an index buffer");
		}
	}

	fn validate_dispatch(&self) {
		assert!(self.recording, "dispatch recorded outside of begin and end");
		assert!(self.compute_pipeline.is_some(), "dispatch recorded without a compute pipeline");

		for (slot, set) in self.compute_sets.iter().enumerate() {
			assert!(set.is_bound(), "dispatch recorded without a compute resource set at slot {slot}");
		}
	}

	fn validate_hazards(&self) {
		if let Some(texture) = self.hazards.conflict() {
			panic!("texture {texture:?} is bound for reading and writing at the same time");
		}
	}

	pub fn clear_color_target(&mut self, index: u32, color: Color<f32>) {
		let Some(framebuffer) = &self.framebuffer else {
			panic!("clear_color_target called without a framebuffer");
		};

		assert!(
			(index as usize) < framebuffer.color_targets().len(),
			"color target {index} is out of range, the framebuffer has {}", framebuffer.color_targets().len(),
		);

		self.context.clear_color_target(framebuffer, index, color);
	}

	pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
		let Some(framebuffer) = &self.framebuffer else {
			panic!("clear_depth_stencil called without a framebuffer");
		};

		assert!(framebuffer.depth_target().is_some(), "clear_depth_stencil called on a framebuffer without a depth target");

		self.context.clear_depth_stencil(framebuffer, depth, stencil);
	}

	pub fn update_buffer(&mut self, buffer: &Arc<Buffer<C>>, offset: u32, data: &[u8]) {
		assert!(
			offset as u64 + data.len() as u64 <= buffer.size() as u64,
			"update of {} bytes at offset {offset} exceeds buffer size {}", data.len(), buffer.size(),
		);

		// Dynamic buffers are discarded on write, a partial update would leave the rest undefined.
		if buffer.desc().usage.contains(BufferUsage::DYNAMIC) {
			assert!(
				offset == 0 && data.len() as u64 == buffer.size() as u64,
				"dynamic buffer {:?} must be updated whole, got {} bytes at offset {offset}", buffer.id(), data.len(),
			);
		}

		self.context.update_buffer(buffer, offset, data);
	}

	pub fn copy_buffer(&mut self, src: &Arc<Buffer<C>>, src_offset: u32, dst: &Arc<Buffer<C>>, dst_offset: u32, size: u32) {
		assert!(src_offset as u64 + size as u64 <= src.size() as u64, "copy source range exceeds buffer size {}", src.size());
		assert!(dst_offset as u64 + size as u64 <= dst.size() as u64, "copy destination range exceeds buffer size {}", dst.size());

		self.context.copy_buffer(src, src_offset, dst, dst_offset, size);
	}

	#[allow(clippy::too_many_arguments)]
	pub fn copy_texture(
		&mut self,
		src: &Arc<Texture<C>>,
		src_mip_level: u32,
		src_array_slice: u32,
		src_offset: [u32; 3],
		dst: &Arc<Texture<C>>,
		dst_mip_level: u32,
		dst_array_slice: u32,
		dst_offset: [u32; 3],
		size: [u32; 3],
	) {
		self.context.copy_texture(
			src,
			src_mip_level,
			src_array_slice,
			src_offset,
			dst,
			dst_mip_level,
			dst_array_slice,
			dst_offset,
			size,
		);
	}

	pub fn generate_mipmaps(&mut self, view: &Arc<TextureView<C>>) {
		assert!(
			view.target().desc().usage.contains(TextureUsage::GENERATE_MIPMAPS),
			"generate_mipmaps called on a texture without usage GENERATE_MIPMAPS",
		);

		self.context.generate_mipmaps(view);
	}

	pub fn debug_marker(&mut self, name: &str) {
		self.context.debug_marker(name);
	}

	pub fn debug_event_push(&mut self, name: &str) {
		self.context.debug_event_push(name);
	}

	pub fn debug_event_pop(&mut self) {
		self.context.debug_event_pop();
	}

	pub fn context(&self) -> &C {
		&self.context
	}

	pub fn context_mut(&mut self) -> &mut C {
		&mut self.context
	}

	pub fn is_recording(&self) -> bool {
		self.recording
	}

	pub fn framebuffer(&self) -> Option<&Arc<Framebuffer<C>>> {
		self.framebuffer.as_ref()
	}

	pub fn graphics_pipeline(&self) -> Option<&Arc<GraphicsPipeline<C>>> {
		self.graphics_pipeline.as_ref()
	}

	pub fn compute_pipeline(&self) -> Option<&Arc<ComputePipeline<C>>> {
		self.compute_pipeline.as_ref()
	}

	pub fn graphics_resource_set_count(&self) -> usize {
		self.graphics_sets.len()
	}

	pub fn graphics_resource_set(&self, slot: u32) -> Option<&BoundResourceSetInfo<C>> {
		self.graphics_sets.get(slot as usize)
	}

	pub fn compute_resource_set_count(&self) -> usize {
		self.compute_sets.len()
	}

	pub fn compute_resource_set(&self, slot: u32) -> Option<&BoundResourceSetInfo<C>> {
		self.compute_sets.get(slot as usize)
	}

	pub fn viewports(&self) -> &[Viewport] {
		&self.viewports
	}

	pub fn scissor_rects(&self) -> &[Rect<u32>] {
		&self.scissor_rects
	}

	/// Number of vertex buffer slots the next flush covers.
	pub fn vertex_binding_count(&self) -> u32 {
		self.num_vertex_bindings
	}

	pub fn index_buffer(&self) -> Option<&Arc<Buffer<C>>> {
		self.index_buffer.as_ref()
	}

	pub fn is_srv_bound(&self, texture: &Texture<C>) -> bool {
		self.hazards.is_srv_bound(texture.id())
	}

	pub fn is_uav_bound(&self, texture: &Texture<C>) -> bool {
		self.hazards.is_uav_bound(texture.id())
	}

	pub fn is_uav_buffer_bound(&self, buffer: &Buffer<C>) -> bool {
		self.hazards.is_uav_buffer_bound(buffer.id())
	}
}
