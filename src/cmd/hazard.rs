use std::collections::HashMap;

use super::CmdList;
use crate::{ContextImpl, ResourceId, ShaderStage, ShaderStages};

/// Resource set index of locations whose owning set belonged to a previous pipeline.
const ORPHANED: u32 = u32::MAX;

/// One native location a texture is attached to as a shader resource or unordered access view.
///
/// `slot` is the native slot and `stages` holds the single stage it was bound in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BoundTextureInfo {
	pub slot: u32,
	pub stages: ShaderStages,
	pub resource_set: u32,
}

impl BoundTextureInfo {
	fn new(stage: ShaderStage, slot: u32, resource_set: u32) -> Self {
		Self { slot, stages: stage.flag(), resource_set }
	}

	pub fn is_compute(&self) -> bool {
		self.stages.contains(ShaderStages::COMPUTE)
	}

	fn is_at(&self, stage: ShaderStage, slot: u32) -> bool {
		self.slot == slot && self.stages == stage.flag()
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct BufferUavBinding {
	buffer: ResourceId,
	stage: ShaderStage,
	slot: u32,
	resource_set: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum UavOccupant {
	Texture(ResourceId),
	Buffer(ResourceId),
}

type Locations = HashMap<ResourceId, Vec<BoundTextureInfo>>;

/// Tracks where textures and buffers are bound for reading and for writing.
///
/// Every native `(stage, slot)` has at most one occupant, binding something else
/// there drops the previous occupant's record.
#[derive(Debug, Default)]
pub(crate) struct HazardTracker {
	srvs: Locations,
	uavs: Locations,
	srv_slots: HashMap<(ShaderStage, u32), ResourceId>,
	uav_slots: HashMap<(ShaderStage, u32), UavOccupant>,
	uav_buffers: Vec<BufferUavBinding>,
	pool: Vec<Vec<BoundTextureInfo>>,
}

impl HazardTracker {
	fn insert(map: &mut Locations, pool: &mut Vec<Vec<BoundTextureInfo>>, texture: ResourceId, info: BoundTextureInfo) {
		map.entry(texture).or_insert_with(|| pool.pop().unwrap_or_default()).push(info);
	}

	fn forget(map: &mut Locations, pool: &mut Vec<Vec<BoundTextureInfo>>, texture: ResourceId, stage: ShaderStage, slot: u32) {
		let Some(locations) = map.get_mut(&texture) else {
			return;
		};

		locations.retain(|l| !l.is_at(stage, slot));

		if locations.is_empty() {
			if let Some(locations) = map.remove(&texture) {
				pool.push(locations);
			}
		}
	}

	pub fn track_srv(&mut self, texture: ResourceId, stage: ShaderStage, slot: u32, resource_set: u32) {
		self.release_srv(stage, slot);
		Self::insert(&mut self.srvs, &mut self.pool, texture, BoundTextureInfo::new(stage, slot, resource_set));
		self.srv_slots.insert((stage, slot), texture);
	}

	/// Forgets whatever texture occupies a shader resource slot.
	pub fn release_srv(&mut self, stage: ShaderStage, slot: u32) {
		if let Some(texture) = self.srv_slots.remove(&(stage, slot)) {
			Self::forget(&mut self.srvs, &mut self.pool, texture, stage, slot);
		}
	}

	pub fn track_uav(&mut self, texture: ResourceId, stage: ShaderStage, slot: u32, resource_set: u32) {
		self.release_uav(stage, slot);
		Self::insert(&mut self.uavs, &mut self.pool, texture, BoundTextureInfo::new(stage, slot, resource_set));
		self.uav_slots.insert((stage, slot), UavOccupant::Texture(texture));
	}

	pub fn track_uav_buffer(&mut self, buffer: ResourceId, stage: ShaderStage, slot: u32, resource_set: u32) {
		self.release_uav(stage, slot);
		self.uav_buffers.push(BufferUavBinding { buffer, stage, slot, resource_set });
		self.uav_slots.insert((stage, slot), UavOccupant::Buffer(buffer));
	}

	/// Forgets whatever texture or buffer occupies an unordered access slot.
	pub fn release_uav(&mut self, stage: ShaderStage, slot: u32) {
		match self.uav_slots.remove(&(stage, slot)) {
			Some(UavOccupant::Texture(texture)) => Self::forget(&mut self.uavs, &mut self.pool, texture, stage, slot),
			Some(UavOccupant::Buffer(_)) => self.uav_buffers.retain(|b| !(b.stage == stage && b.slot == slot)),
			None => {}
		}
	}

	pub fn take_srvs(&mut self, texture: ResourceId) -> Option<Vec<BoundTextureInfo>> {
		let locations = self.srvs.remove(&texture)?;
		self.srv_slots.retain(|_, occupant| *occupant != texture);
		Some(locations)
	}

	pub fn take_uavs(&mut self, texture: ResourceId) -> Option<Vec<BoundTextureInfo>> {
		let locations = self.uavs.remove(&texture)?;
		self.uav_slots.retain(|_, occupant| *occupant != UavOccupant::Texture(texture));
		Some(locations)
	}

	/// Returns a location list to the pool once its locations have been unbound.
	pub fn recycle(&mut self, mut locations: Vec<BoundTextureInfo>) {
		locations.clear();
		self.pool.push(locations);
	}

	/// Removes every unordered access binding of `buffer`, graphics and compute alike.
	fn take_uav_buffers(&mut self, buffer: ResourceId) -> Vec<BufferUavBinding> {
		let mut removed = Vec::new();
		let mut i = 0;
		while i < self.uav_buffers.len() {
			if self.uav_buffers[i].buffer == buffer {
				let binding = self.uav_buffers.swap_remove(i);
				self.uav_slots.remove(&(binding.stage, binding.slot));
				removed.push(binding);
			} else {
				i += 1;
			}
		}

		removed
	}

	/// Removes every graphics unordered access location, returning `(native slot, resource_set)` pairs.
	fn take_graphics_uavs(&mut self) -> Vec<(u32, u32)> {
		let mut removed = Vec::new();

		for locations in self.uavs.values_mut() {
			locations.retain(|l| {
				if l.is_compute() {
					return true;
				}
				removed.push((l.slot, l.resource_set));
				false
			});
		}

		let emptied = self.uavs.iter().filter(|(_, l)| l.is_empty()).map(|(t, _)| *t).collect::<Vec<_>>();
		for texture in emptied {
			if let Some(locations) = self.uavs.remove(&texture) {
				self.pool.push(locations);
			}
		}

		self.uav_buffers.retain(|b| {
			if b.stage == ShaderStage::Compute {
				return true;
			}
			removed.push((b.slot, b.resource_set));
			false
		});

		self.uav_slots.retain(|(stage, _), _| *stage == ShaderStage::Compute);

		removed
	}

	/// Detaches the locations of one pipeline type from their resource sets.
	///
	/// Called on a pipeline switch, the old set indices mean nothing to the new pipeline.
	pub fn orphan(&mut self, compute: bool) {
		for location in self.srvs.values_mut().chain(self.uavs.values_mut()).flatten() {
			if location.is_compute() == compute {
				location.resource_set = ORPHANED;
			}
		}

		for binding in &mut self.uav_buffers {
			if (binding.stage == ShaderStage::Compute) == compute {
				binding.resource_set = ORPHANED;
			}
		}
	}

	pub fn is_srv_bound(&self, texture: ResourceId) -> bool {
		self.srvs.contains_key(&texture)
	}

	pub fn is_uav_bound(&self, texture: ResourceId) -> bool {
		self.uavs.contains_key(&texture)
	}

	pub fn is_uav_buffer_bound(&self, buffer: ResourceId) -> bool {
		self.uav_buffers.iter().any(|b| b.buffer == buffer)
	}

	/// A texture that is bound for reading and writing at the same time, if any.
	pub fn conflict(&self) -> Option<ResourceId> {
		self.srvs.keys().find(|texture| self.uavs.contains_key(texture)).copied()
	}

	pub fn clear(&mut self) {
		let srvs = std::mem::take(&mut self.srvs);
		let uavs = std::mem::take(&mut self.uavs);

		for locations in srvs.into_values().chain(uavs.into_values()) {
			self.recycle(locations);
		}

		self.srv_slots.clear();
		self.uav_slots.clear();
		self.uav_buffers.clear();
	}
}

impl<C: ContextImpl> CmdList<C> {
	/// Unbinds every shader resource view of `texture`. Does nothing when it isn't bound.
	pub(super) fn unbind_srv_texture(&mut self, texture: ResourceId) {
		let Some(locations) = self.hazards.take_srvs(texture) else {
			return;
		};

		for location in &locations {
			log::trace!(target: "rhi::cmd", "Evicting {texture:?} from shader resource slot {} ({:?})", location.slot, location.stages);

			self.bind_texture_view(None, location.slot, location.stages, location.resource_set);
			self.invalidate_resource_set(location.is_compute(), location.resource_set);
		}

		self.hazards.recycle(locations);
	}

	/// Unbinds every unordered access view of `texture`. Does nothing when it isn't bound.
	pub(super) fn unbind_uav_texture(&mut self, texture: ResourceId) {
		let Some(locations) = self.hazards.take_uavs(texture) else {
			return;
		};

		for location in &locations {
			log::trace!(target: "rhi::cmd", "Evicting {texture:?} from unordered access slot {} ({:?})", location.slot, location.stages);

			for stage in location.stages.stages() {
				self.context.set_unordered_access(stage, location.slot, None);
			}
			self.invalidate_resource_set(location.is_compute(), location.resource_set);
		}

		self.hazards.recycle(locations);
	}

	/// Unbinds `buffer` from every graphics and compute unordered access slot.
	pub(super) fn unbind_uav_buffer(&mut self, buffer: ResourceId) {
		for binding in self.hazards.take_uav_buffers(buffer) {
			log::trace!(target: "rhi::cmd", "Evicting {buffer:?} from unordered access slot {} ({:?})", binding.slot, binding.stage);

			self.context.set_unordered_access(binding.stage, binding.slot, None);
			self.invalidate_resource_set(binding.stage == ShaderStage::Compute, binding.resource_set);
		}
	}

	/// Unbinds every graphics unordered access view so its set rebinds after the color targets.
	pub(super) fn unbind_graphics_uavs(&mut self) {
		for (slot, resource_set) in self.hazards.take_graphics_uavs() {
			log::trace!(target: "rhi::cmd", "Releasing graphics unordered access slot {slot}");

			self.context.set_unordered_access(ShaderStage::Fragment, slot, None);
			self.invalidate_resource_set(false, resource_set);
		}
	}

	/// Native stage and slot of an unordered access binding, graphics slots follow the color targets.
	pub(super) fn unordered_access_slot(&self, compute: bool, slot: u32) -> (ShaderStage, u32) {
		if compute {
			(ShaderStage::Compute, slot)
		} else {
			let base = self.framebuffer.as_ref().map_or(0, |fb| fb.color_targets().len() as u32);
			(ShaderStage::Fragment, base + slot)
		}
	}

	/// Marks a resource set for reactivation before the next draw or dispatch.
	pub(super) fn invalidate_resource_set(&mut self, compute: bool, resource_set: u32) {
		let flags = if compute {
			&mut self.invalidated_compute_sets
		} else {
			&mut self.invalidated_graphics_sets
		};

		if let Some(flag) = flags.get_mut(resource_set as usize) {
			log::trace!(target: "rhi::cmd", "Invalidated {} resource set {resource_set}", if compute { "compute" } else { "graphics" });
			*flag = true;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{BufferUsage, TextureUsage};
	use crate::mock;

	fn texture() -> ResourceId {
		mock::texture(TextureUsage::SAMPLED).id()
	}

	#[test]
	fn repeated_locations_are_recorded_once() {
		let mut hazards = HazardTracker::default();
		let texture = texture();

		hazards.track_srv(texture, ShaderStage::Fragment, 0, 0);
		hazards.track_srv(texture, ShaderStage::Fragment, 0, 1);
		hazards.track_srv(texture, ShaderStage::Vertex, 1, 0);

		let locations = hazards.take_srvs(texture).unwrap_or_default();
		assert_eq!(locations.len(), 2);
		assert!(locations.contains(&BoundTextureInfo::new(ShaderStage::Fragment, 0, 1)), "rebinding updates the owning set");
		assert!(!hazards.is_srv_bound(texture));
		assert_eq!(hazards.take_srvs(texture), None, "second take is a no-op");
	}

	#[test]
	fn overwriting_a_slot_forgets_the_previous_texture() {
		let mut hazards = HazardTracker::default();
		let (a, b) = (texture(), texture());

		hazards.track_srv(a, ShaderStage::Fragment, 0, 0);
		hazards.track_srv(a, ShaderStage::Vertex, 0, 0);
		hazards.track_srv(b, ShaderStage::Fragment, 0, 1);

		assert_eq!(hazards.take_srvs(a), Some(vec![BoundTextureInfo::new(ShaderStage::Vertex, 0, 0)]));
		assert!(hazards.is_srv_bound(b));

		hazards.release_srv(ShaderStage::Fragment, 0);
		assert!(!hazards.is_srv_bound(b));
	}

	#[test]
	fn location_lists_are_pooled() {
		let mut hazards = HazardTracker::default();
		let texture = texture();

		hazards.track_uav(texture, ShaderStage::Compute, 0, 0);
		hazards.clear();
		assert_eq!(hazards.pool.len(), 1);

		hazards.track_uav(texture, ShaderStage::Compute, 0, 0);
		assert!(hazards.pool.is_empty());
		assert!(hazards.is_uav_bound(texture));
	}

	#[test]
	fn uav_buffers_are_removed_from_every_slot() {
		let mut hazards = HazardTracker::default();
		let a = mock::buffer(64, BufferUsage::STRUCTURED_READ_WRITE).id();
		let b = mock::buffer(64, BufferUsage::STRUCTURED_READ_WRITE).id();

		hazards.track_uav_buffer(a, ShaderStage::Fragment, 1, 0);
		hazards.track_uav_buffer(b, ShaderStage::Fragment, 2, 0);
		hazards.track_uav_buffer(a, ShaderStage::Fragment, 3, 1);
		hazards.track_uav_buffer(a, ShaderStage::Compute, 0, 0);

		let mut removed = hazards.take_uav_buffers(a).into_iter().map(|b| (b.stage == ShaderStage::Compute, b.slot)).collect::<Vec<_>>();
		removed.sort();
		assert_eq!(removed, [(false, 1), (false, 3), (true, 0)]);
		assert!(!hazards.is_uav_buffer_bound(a));
		assert!(hazards.is_uav_buffer_bound(b));
	}

	#[test]
	fn texture_and_buffer_uavs_displace_each_other() {
		let mut hazards = HazardTracker::default();
		let texture = texture();
		let buffer = mock::buffer(64, BufferUsage::STRUCTURED_READ_WRITE).id();

		hazards.track_uav_buffer(buffer, ShaderStage::Compute, 0, 0);
		hazards.track_uav(texture, ShaderStage::Compute, 0, 0);
		assert!(!hazards.is_uav_buffer_bound(buffer));

		hazards.track_uav_buffer(buffer, ShaderStage::Compute, 0, 0);
		assert!(!hazards.is_uav_bound(texture));
	}

	#[test]
	fn graphics_uavs_are_taken_without_compute_ones() {
		let mut hazards = HazardTracker::default();
		let texture = texture();
		let buffer = mock::buffer(64, BufferUsage::STRUCTURED_READ_WRITE).id();

		hazards.track_uav(texture, ShaderStage::Fragment, 1, 0);
		hazards.track_uav(texture, ShaderStage::Compute, 0, 0);
		hazards.track_uav_buffer(buffer, ShaderStage::Fragment, 2, 1);

		let mut removed = hazards.take_graphics_uavs();
		removed.sort();
		assert_eq!(removed, [(1, 0), (2, 1)]);
		assert_eq!(hazards.take_uavs(texture), Some(vec![BoundTextureInfo::new(ShaderStage::Compute, 0, 0)]));
		assert!(!hazards.is_uav_buffer_bound(buffer));
	}

	#[test]
	fn orphaned_locations_lose_their_set() {
		let mut hazards = HazardTracker::default();
		let texture = texture();

		hazards.track_srv(texture, ShaderStage::Fragment, 0, 2);
		hazards.track_srv(texture, ShaderStage::Compute, 0, 1);
		hazards.orphan(false);

		let mut sets = hazards.take_srvs(texture).unwrap_or_default().iter().map(|l| l.resource_set).collect::<Vec<_>>();
		sets.sort();
		assert_eq!(sets, [1, ORPHANED]);
	}

	#[test]
	fn conflict_reports_textures_in_both_roles() {
		let mut hazards = HazardTracker::default();
		let texture = texture();

		hazards.track_srv(texture, ShaderStage::Fragment, 0, 0);
		assert_eq!(hazards.conflict(), None);

		hazards.track_uav(texture, ShaderStage::Compute, 0, 0);
		assert_eq!(hazards.conflict(), Some(texture));
	}
}
