use std::sync::Arc;

use super::CmdList;
use super::bindings::RangeKey;
use crate::{BaseOffsets, BindableResource, BufferRange, ContextImpl, ResourceKind, Sampler, ShaderStages, ShaderView, TextureView};

impl<C: ContextImpl> CmdList<C> {
	/// Issues the native binds for the resource set recorded at `slot`.
	pub(super) fn activate_resource_set(&mut self, slot: u32, graphics: bool) {
		let bound = if graphics {
			&self.graphics_sets[slot as usize]
		} else {
			&self.compute_sets[slot as usize]
		};

		let Some(set) = bound.set.clone() else {
			return;
		};
		let offsets = bound.offsets.clone();

		let base = if graphics {
			self.graphics_pipeline.as_ref().map(|p| p.base_offsets(slot))
		} else {
			self.compute_pipeline.as_ref().map(|p| p.base_offsets(slot))
		};
		let base = base.unwrap_or_default();

		let mut dynamic_offsets = offsets.iter().copied();

		for (index, resource) in set.resources().iter().enumerate() {
			let binding = *set.layout().binding(index);

			let buffer_offset = if binding.dynamic {
				dynamic_offsets.next().unwrap_or_else(|| {
					panic!("resource set at slot {slot} is missing the dynamic offset for '{}'", set.layout().name(index))
				})
			} else {
				0
			};

			if buffer_offset != 0 && BufferRange::try_resolve(resource, buffer_offset).is_none() {
				panic!(
					"dynamic offset {buffer_offset} moves '{}' of the resource set at slot {slot} past the end of its buffer",
					set.layout().name(index),
				);
			}

			self.activate_resource(resource, binding.kind, binding.slot, binding.stages, buffer_offset, slot, &base);
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn activate_resource(
		&mut self,
		resource: &BindableResource<C>,
		kind: ResourceKind,
		slot: u32,
		stages: ShaderStages,
		buffer_offset: u32,
		resource_set: u32,
		base: &BaseOffsets,
	) {
		match kind {
			ResourceKind::UniformBuffer => {
				let range = BufferRange::resolve(resource, buffer_offset);
				self.bind_uniform_buffer(&range, base.constant_buffer + slot, stages);
			}
			ResourceKind::StructuredBufferReadOnly => {
				let range = BufferRange::resolve(resource, buffer_offset);
				self.unbind_uav_buffer(range.buffer.id());
				self.bind_storage_buffer_view(&range, base.texture + slot, stages);
			}
			ResourceKind::StructuredBufferReadWrite => {
				let range = BufferRange::resolve(resource, buffer_offset);
				self.bind_unordered_access(ShaderView::Buffer(&range), base.unordered_access + slot, stages, resource_set);
			}
			ResourceKind::TextureReadOnly => {
				let view = expect_texture_view(resource, kind);
				self.unbind_uav_texture(view.target().id());
				self.bind_texture_view(Some(view), base.texture + slot, stages, resource_set);
			}
			ResourceKind::TextureReadWrite => {
				let view = expect_texture_view(resource, kind);
				self.unbind_srv_texture(view.target().id());
				self.bind_unordered_access(ShaderView::Texture(view.as_ref()), base.unordered_access + slot, stages, resource_set);
			}
			ResourceKind::Sampler => {
				let BindableResource::Sampler(sampler) = resource else {
					panic!("expected a sampler, found {}", resource.describe());
				};
				self.bind_sampler(Some(sampler), base.sampler + slot, stages);
			}
		}
	}

	fn bind_uniform_buffer(&mut self, range: &BufferRange<C>, slot: u32, stages: ShaderStages) {
		check_slot("constant buffer", slot, self.desc.limits.max_constant_buffers);

		let key = RangeKey {
			buffer: range.buffer.id(),
			offset: range.offset,
			size: range.size,
		};

		for stage in stages.stages() {
			if self.tables.uniform_buffer(stage, slot, Some(key)) {
				self.context.set_constant_buffer(stage, slot, Some(range));
			}
		}
	}

	fn bind_storage_buffer_view(&mut self, range: &BufferRange<C>, slot: u32, stages: ShaderStages) {
		check_slot("shader resource", slot, self.desc.limits.max_shader_resources);

		for stage in stages.stages() {
			self.hazards.release_srv(stage, slot);
			self.tables.forget_texture_view(stage, slot);
			self.context.set_shader_resource(stage, slot, Some(ShaderView::Buffer(range)));
		}
	}

	pub(super) fn bind_texture_view(
		&mut self,
		view: Option<&Arc<TextureView<C>>>,
		slot: u32,
		stages: ShaderStages,
		resource_set: u32,
	) {
		check_slot("shader resource", slot, self.desc.limits.max_shader_resources);

		let id = view.map(|v| v.id());
		for stage in stages.stages() {
			match view {
				Some(view) => self.hazards.track_srv(view.target().id(), stage, slot, resource_set),
				None => self.hazards.release_srv(stage, slot),
			}

			if self.tables.texture_view(stage, slot, id) {
				self.context.set_shader_resource(stage, slot, view.map(|v| ShaderView::Texture(v.as_ref())));
			}
		}
	}

	fn bind_unordered_access(&mut self, view: ShaderView<C>, slot: u32, stages: ShaderStages, resource_set: u32) {
		let compute = stages.contains(ShaderStages::COMPUTE);
		let (stage, native_slot) = self.unordered_access_slot(compute, slot);
		check_slot("unordered access", native_slot, self.desc.limits.max_unordered_access_views);

		match view {
			ShaderView::Texture(view) => self.hazards.track_uav(view.target().id(), stage, native_slot, resource_set),
			ShaderView::Buffer(range) => self.hazards.track_uav_buffer(range.buffer.id(), stage, native_slot, resource_set),
		}

		self.context.set_unordered_access(stage, native_slot, Some(view));
	}

	fn bind_sampler(&mut self, sampler: Option<&Arc<Sampler<C>>>, slot: u32, stages: ShaderStages) {
		check_slot("sampler", slot, self.desc.limits.max_samplers);

		let id = sampler.map(|s| s.id());
		for stage in stages.stages() {
			if self.tables.sampler(stage, slot, id) {
				self.context.set_sampler(stage, slot, sampler.map(|s| s.as_ref()));
			}
		}
	}
}

fn expect_texture_view<C: ContextImpl>(resource: &BindableResource<C>, kind: ResourceKind) -> &Arc<TextureView<C>> {
	match resource {
		BindableResource::TextureView(view) => view,
		other => panic!("expected a texture view for {kind:?}, found {}", other.describe()),
	}
}

fn check_slot(kind: &str, slot: u32, limit: u32) {
	if slot >= limit {
		log::warn!(target: "rhi::cmd", "The {kind} slot {slot} exceeds the limit of {limit}");
		panic!("{kind} slot {slot} is out of range, the pipeline supports {limit}");
	}
}
