use std::sync::Arc;

use crate::{ContextImpl, ResourceId, ResourceSet, ShaderStage};

const MAX_CACHED_UNIFORM_BUFFERS: usize = 14;
const MAX_CACHED_TEXTURE_VIEWS: usize = 16;
const MAX_CACHED_SAMPLERS: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Slot<K> {
	/// Nothing is known about the native slot, the next bind always goes through.
	Unknown,
	Bound(Option<K>),
}

/// Shadow copy of a fixed number of native slots.
#[derive(Debug)]
pub(crate) struct SlotCache<K, const N: usize> {
	slots: [Slot<K>; N],
}

impl<K: Copy + PartialEq, const N: usize> SlotCache<K, N> {
	pub fn new() -> Self {
		Self {
			slots: [Slot::Unknown; N],
		}
	}

	/// Records `value` at `slot` and returns whether the native bind has to be issued.
	pub fn update(&mut self, slot: u32, value: Option<K>) -> bool {
		let Some(entry) = self.slots.get_mut(slot as usize) else {
			return true;
		};

		if *entry == Slot::Bound(value) {
			return false;
		}

		*entry = Slot::Bound(value);
		true
	}

	pub fn forget(&mut self, slot: u32) {
		if let Some(entry) = self.slots.get_mut(slot as usize) {
			*entry = Slot::Unknown;
		}
	}

	pub fn clear(&mut self) {
		self.slots = [Slot::Unknown; N];
	}
}

/// Buffer ranges are cached by value, two ranges over the same bytes are the same binding.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct RangeKey {
	pub buffer: ResourceId,
	pub offset: u32,
	pub size: u32,
}

#[derive(Debug)]
struct StageCache {
	uniform_buffers: SlotCache<RangeKey, MAX_CACHED_UNIFORM_BUFFERS>,
	texture_views: SlotCache<ResourceId, MAX_CACHED_TEXTURE_VIEWS>,
	samplers: SlotCache<ResourceId, MAX_CACHED_SAMPLERS>,
}

impl StageCache {
	fn new() -> Self {
		Self {
			uniform_buffers: SlotCache::new(),
			texture_views: SlotCache::new(),
			samplers: SlotCache::new(),
		}
	}

	fn clear(&mut self) {
		self.uniform_buffers.clear();
		self.texture_views.clear();
		self.samplers.clear();
	}
}

/// Cache-and-skip tables for the vertex and fragment stages.
///
/// Every method returns whether the native call has to be issued. Other stages
/// are not cached and always bind.
#[derive(Debug)]
pub(crate) struct BindingTables {
	vertex: StageCache,
	fragment: StageCache,
	enabled: bool,
}

impl BindingTables {
	pub fn new(enabled: bool) -> Self {
		Self {
			vertex: StageCache::new(),
			fragment: StageCache::new(),
			enabled,
		}
	}

	fn stage(&mut self, stage: ShaderStage) -> Option<&mut StageCache> {
		if !self.enabled {
			return None;
		}

		match stage {
			ShaderStage::Vertex => Some(&mut self.vertex),
			ShaderStage::Fragment => Some(&mut self.fragment),
			_ => None,
		}
	}

	pub fn uniform_buffer(&mut self, stage: ShaderStage, slot: u32, range: Option<RangeKey>) -> bool {
		self.stage(stage).is_none_or(|cache| cache.uniform_buffers.update(slot, range))
	}

	pub fn texture_view(&mut self, stage: ShaderStage, slot: u32, view: Option<ResourceId>) -> bool {
		self.stage(stage).is_none_or(|cache| cache.texture_views.update(slot, view))
	}

	/// A buffer view went into a texture slot, the cached view no longer describes it.
	pub fn forget_texture_view(&mut self, stage: ShaderStage, slot: u32) {
		if let Some(cache) = self.stage(stage) {
			cache.texture_views.forget(slot);
		}
	}

	pub fn sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<ResourceId>) -> bool {
		self.stage(stage).is_none_or(|cache| cache.samplers.update(slot, sampler))
	}

	pub fn clear(&mut self) {
		self.vertex.clear();
		self.fragment.clear();
	}
}

/// The resource set and dynamic offsets recorded at one slot.
pub struct BoundResourceSetInfo<C: ContextImpl> {
	pub set: Option<Arc<ResourceSet<C>>>,
	pub offsets: Vec<u32>,
}

impl<C: ContextImpl> BoundResourceSetInfo<C> {
	pub fn new(set: &Arc<ResourceSet<C>>, offsets: &[u32]) -> Self {
		Self {
			set: Some(set.clone()),
			offsets: offsets.to_vec(),
		}
	}

	/// Whether binding `set` with `offsets` would change nothing.
	pub fn matches(&self, set: &Arc<ResourceSet<C>>, offsets: &[u32]) -> bool {
		self.set.as_ref().is_some_and(|bound| Arc::ptr_eq(bound, set)) && self.offsets == offsets
	}

	pub fn is_bound(&self) -> bool {
		self.set.is_some()
	}
}

impl<C: ContextImpl> Clone for BoundResourceSetInfo<C> {
	fn clone(&self) -> Self {
		Self {
			set: self.set.clone(),
			offsets: self.offsets.clone(),
		}
	}
}

impl<C: ContextImpl> Default for BoundResourceSetInfo<C> {
	fn default() -> Self {
		Self {
			set: None,
			offsets: Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::{self, MockContext};
	use crate::{BufferUsage, ResourceKind, ShaderStages};

	fn key(offset: u32, size: u32) -> RangeKey {
		RangeKey {
			buffer: mock::buffer(1024, BufferUsage::UNIFORM).id(),
			offset,
			size,
		}
	}

	#[test]
	fn first_bind_always_goes_through() {
		let mut cache = SlotCache::<u32, 4>::new();

		assert!(cache.update(0, None), "unknown slot must bind even when unbinding");
		assert!(!cache.update(0, None));
		assert!(cache.update(0, Some(7)));
		assert!(!cache.update(0, Some(7)));
	}

	#[test]
	fn slots_past_capacity_are_never_cached() {
		let mut cache = SlotCache::<u32, 2>::new();

		assert!(cache.update(2, Some(1)));
		assert!(cache.update(2, Some(1)));
	}

	#[test]
	fn forget_makes_next_bind_go_through() {
		let mut cache = SlotCache::<u32, 2>::new();

		cache.update(1, Some(3));
		cache.forget(1);
		assert!(cache.update(1, Some(3)));
	}

	#[test]
	fn ranges_compare_by_value() {
		let mut tables = BindingTables::new(true);
		let a = key(128, 64);
		let b = RangeKey { size: 1024, offset: 0, ..a };

		assert!(tables.uniform_buffer(ShaderStage::Vertex, 2, Some(a)));
		assert!(!tables.uniform_buffer(ShaderStage::Vertex, 2, Some(RangeKey { ..a })));
		assert!(tables.uniform_buffer(ShaderStage::Vertex, 2, Some(b)));
	}

	#[test]
	fn only_vertex_and_fragment_are_cached() {
		let mut tables = BindingTables::new(true);
		let k = key(0, 256);

		for stage in [ShaderStage::Geometry, ShaderStage::TessellationControl, ShaderStage::TessellationEvaluation, ShaderStage::Compute] {
			assert!(tables.uniform_buffer(stage, 0, Some(k)));
			assert!(tables.uniform_buffer(stage, 0, Some(k)), "{stage:?} must not be cached");
		}

		assert!(tables.sampler(ShaderStage::Fragment, 0, Some(k.buffer)));
		assert!(!tables.sampler(ShaderStage::Fragment, 0, Some(k.buffer)));
		assert!(tables.sampler(ShaderStage::Vertex, 0, Some(k.buffer)), "stages have separate tables");
	}

	#[test]
	fn disabled_tables_always_bind() {
		let mut tables = BindingTables::new(false);
		let k = key(0, 256);

		assert!(tables.uniform_buffer(ShaderStage::Vertex, 0, Some(k)));
		assert!(tables.uniform_buffer(ShaderStage::Vertex, 0, Some(k)));
	}

	#[test]
	fn bound_set_info_matches_identity_and_offsets() {
		let layout = mock::layout_with(&[mock::element(ResourceKind::UniformBuffer, ShaderStages::VERTEX).dynamic()]);
		let buffer = mock::buffer(1024, BufferUsage::UNIFORM);
		let set = ResourceSet::<MockContext>::new(&layout, vec![buffer.clone().into()]).unwrap();
		let twin = ResourceSet::<MockContext>::new(&layout, vec![buffer.into()]).unwrap();

		let info = BoundResourceSetInfo::new(&set, &[256]);

		assert!(info.matches(&set, &[256]));
		assert!(!info.matches(&set, &[512]));
		assert!(!info.matches(&twin, &[256]), "sets compare by identity");
		assert!(!BoundResourceSetInfo::default().matches(&set, &[]));
	}
}
