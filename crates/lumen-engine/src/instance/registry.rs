use core::ops::Range;
use std::collections::HashMap;

use crate::alloc::RangeAllocator;
use crate::config::{BufferLimits, InstanceBufferConfig};
use crate::device::{DeviceBackend, DeviceBufferDesc, DeviceBufferId};
use crate::error::Result;
use crate::layout::{AttributeSpec, BufferDefinition, BufferKind, ScalarType};

use super::{DefId, Mat4, ModelKey, ModelSource, ObjectId, ObjectKind, OffsetKey, SceneObject, Visibility};

/// Returned by [`InstanceOffsetRegistry::offset`] for unknown keys.
pub const INVALID_OFFSET: u32 = u32::MAX;

/// Tracks where each definition's and each visible object's matrices live in
/// the shared transform buffer.
///
/// Two tables share one [`RangeAllocator`]:
/// - static: bind-pose matrices per model, added on first encounter of a
///   definition and never moved
/// - dynamic: world + piece matrices per visible object, rebuilt every frame
///
/// Dynamic ranges are freed at the start of each frame; because the
/// allocator never relocates live ranges, static offsets stay valid forever.
pub struct InstanceOffsetRegistry {
    definition: BufferDefinition,
    buffer: DeviceBufferId,
    /// Device capacity in matrices.
    capacity: u32,
    growth_increment: u32,

    matrices: RangeAllocator<Mat4>,
    static_offsets: HashMap<ModelKey, u32>,
    def_models: HashMap<DefId, ModelKey>,
    dynamic_offsets: HashMap<ObjectId, u32>,
    dynamic_ranges: Vec<(usize, usize)>,

    /// Matrices changed since the last upload.
    dirty: Option<Range<usize>>,
    /// Set after growth: the device buffer holds nothing valid.
    full_upload: bool,

    scratch: Vec<Mat4>,
}

impl InstanceOffsetRegistry {
    pub fn new<D: DeviceBackend + ?Sized>(
        device: &mut D,
        config: &InstanceBufferConfig,
        limits: &BufferLimits,
    ) -> Result<Self> {
        let spec = AttributeSpec::new(0, ScalarType::FloatMat4, 1).named("transform");
        let definition = BufferDefinition::by_table(BufferKind::Storage, &[spec], limits)?;

        let capacity = config.initial_matrices.max(1);
        let size = definition.checked_byte_size("InstanceBuffer", capacity, limits)?;
        let buffer = device.create_buffer(&DeviceBufferDesc {
            label: "lumen instance transforms",
            kind: BufferKind::Storage,
            size,
        })?;

        Ok(Self {
            definition,
            buffer,
            capacity,
            growth_increment: config.growth_increment.max(1),
            matrices: RangeAllocator::new(),
            static_offsets: HashMap::new(),
            def_models: HashMap::new(),
            dynamic_offsets: HashMap::new(),
            dynamic_ranges: Vec::new(),
            dirty: None,
            full_upload: false,
            scratch: Vec::new(),
        })
    }

    /// Element layout of the transform buffer (one `mat4` per element).
    #[inline]
    pub fn definition(&self) -> &BufferDefinition {
        &self.definition
    }

    #[inline]
    pub fn buffer(&self) -> DeviceBufferId {
        self.buffer
    }

    /// Device capacity in matrices.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Matrices in use on the host, including holes.
    #[inline]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    #[inline]
    pub fn matrices(&self) -> &[Mat4] {
        self.matrices.data()
    }

    #[inline]
    pub fn static_entries(&self) -> usize {
        self.static_offsets.len()
    }

    #[inline]
    pub fn dynamic_entries(&self) -> usize {
        self.dynamic_offsets.len()
    }

    /// Offset of `key`, or [`INVALID_OFFSET`].
    pub fn offset(&self, key: OffsetKey) -> u32 {
        self.try_offset(key).unwrap_or_else(|| {
            log::warn!("no instance offset registered for {key:?}");
            INVALID_OFFSET
        })
    }

    pub fn try_offset(&self, key: OffsetKey) -> Option<u32> {
        match key {
            OffsetKey::Def(def) => self
                .def_models
                .get(&def)
                .and_then(|model| self.static_offsets.get(model))
                .copied(),
            OffsetKey::Object(id) => self.dynamic_offsets.get(&id).copied(),
        }
    }

    /// Returns the static offset of `def`, adding its model's bind pose on
    /// first encounter.
    pub fn register_definition<M: ModelSource + ?Sized>(
        &mut self,
        def: DefId,
        model: ModelKey,
        models: &M,
    ) -> Result<u32> {
        if let Some(&offset) = self.static_offsets.get(&model) {
            self.def_models.entry(def).or_insert(model);
            return Ok(offset);
        }

        self.scratch.clear();
        models.bind_pose(model, &mut self.scratch);
        if self.scratch.is_empty() {
            // A model always has a root piece.
            self.scratch.push(Mat4::IDENTITY);
        }

        let offset = self.push_scratch()?;
        self.static_offsets.insert(model, offset);
        self.def_models.insert(def, model);

        log::debug!(
            "static instance entry for {def:?} ({model:?}): {} matrices at {offset}",
            self.scratch.len()
        );
        Ok(offset)
    }

    /// Drops every dynamic entry. Static entries are untouched.
    pub fn begin_frame(&mut self) {
        // Newest first, so tail ranges shrink the allocator directly.
        for (pos, n) in self.dynamic_ranges.drain(..).rev() {
            self.matrices.free(pos, n);
        }
        self.dynamic_offsets.clear();

        // Frees may have shrunk the tail under the pending range.
        let len = self.matrices.len();
        self.dirty = self
            .dirty
            .take()
            .map(|d| d.start.min(len)..d.end.min(len))
            .filter(|d| !d.is_empty());
    }

    /// Adds a dynamic entry for `object` (world transform followed by piece
    /// transforms) and returns its offset. The object's definition gets a
    /// static entry if it has none yet.
    pub fn add_object<O, M>(&mut self, object: &O, models: &M) -> Result<u32>
    where
        O: SceneObject + ?Sized,
        M: ModelSource + ?Sized,
    {
        let id = object.id();
        let projectile = id.kind == ObjectKind::Projectile;

        if !projectile {
            if let Some((def, model)) = object.definition() {
                self.register_definition(def, model, models)?;
            }
        }

        self.scratch.clear();
        self.scratch.push(object.world_transform());
        if !projectile {
            object.piece_transforms(&mut self.scratch);
        }

        let offset = self.push_scratch()?;
        self.dynamic_ranges.push((offset as usize, self.scratch.len()));
        self.dynamic_offsets.insert(id, offset);
        Ok(offset)
    }

    /// Rebuilds the dynamic table from the visible subset of `objects`.
    /// Returns the number of dynamic entries.
    pub fn rebuild<'o, O, I, M, V>(&mut self, objects: I, models: &M, visible: &V) -> Result<usize>
    where
        O: SceneObject + 'o,
        I: IntoIterator<Item = &'o O>,
        M: ModelSource + ?Sized,
        V: Visibility<O> + ?Sized,
    {
        self.begin_frame();
        for object in objects {
            if visible.is_visible(object) {
                self.add_object(object, models)?;
            }
        }
        Ok(self.dynamic_offsets.len())
    }

    /// Writes pending matrices to the device, growing the buffer first if the
    /// host side outgrew it.
    ///
    /// Only the range touched since the last upload is written, unless the
    /// buffer grew, in which case everything is.
    pub fn upload<D: DeviceBackend + ?Sized>(&mut self, device: &mut D, limits: &BufferLimits) -> Result<()> {
        let required = u32::try_from(self.matrices.len()).unwrap_or(u32::MAX);
        if required > self.capacity {
            let new_capacity = self.capacity.saturating_add(self.growth_increment).max(required);
            let size = self
                .definition
                .checked_byte_size("InstanceBuffer", new_capacity, limits)?;
            device.resize_buffer(self.buffer, size)?;

            log::info!(
                "instance transform buffer grew from {} to {new_capacity} matrices",
                self.capacity
            );
            self.capacity = new_capacity;
            self.full_upload = true;
        }

        let range = if self.full_upload {
            Some(0..self.matrices.len())
        } else {
            self.dirty.take()
        };
        self.dirty = None;
        self.full_upload = false;

        let Some(range) = range.filter(|r| !r.is_empty()) else {
            return Ok(());
        };

        let stride = u64::from(self.definition.stride());
        let bytes: &[u8] = bytemuck::cast_slice(&self.matrices.data()[range.clone()]);
        log::trace!("instance upload: matrices {range:?}");
        device.write_buffer(self.buffer, range.start as u64 * stride, bytes)?;
        Ok(())
    }

    /// Rebuild followed by upload: the per-frame entry point.
    pub fn update<'o, D, O, I, M, V>(
        &mut self,
        device: &mut D,
        limits: &BufferLimits,
        objects: I,
        models: &M,
        visible: &V,
    ) -> Result<usize>
    where
        D: DeviceBackend + ?Sized,
        O: SceneObject + 'o,
        I: IntoIterator<Item = &'o O>,
        M: ModelSource + ?Sized,
        V: Visibility<O> + ?Sized,
    {
        let count = self.rebuild(objects, models, visible)?;
        self.upload(device, limits)?;
        Ok(count)
    }

    pub fn release<D: DeviceBackend + ?Sized>(self, device: &mut D) {
        device.destroy_buffer(self.buffer);
    }

    /// Allocates room for `scratch`, copies it in and marks it dirty.
    fn push_scratch(&mut self) -> Result<u32> {
        let n = self.scratch.len();
        let pos = self.matrices.allocate(n)?;
        self.matrices.data_mut()[pos..pos + n].copy_from_slice(&self.scratch);

        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(pos)..d.end.max(pos + n),
            None => pos..pos + n,
        });
        Ok(u32::try_from(pos).unwrap_or(INVALID_OFFSET))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    struct Models;

    impl ModelSource for Models {
        fn bind_pose(&self, model: ModelKey, out: &mut Vec<Mat4>) {
            for piece in 0..=model.0 {
                out.push(Mat4::from_translation(piece as f32, 0.0, 0.0));
            }
        }
    }

    struct Obj {
        id: ObjectId,
        def: Option<(DefId, ModelKey)>,
        x: f32,
        visible: bool,
    }

    impl Obj {
        fn unit(id: u32, def: u32, model: u32) -> Self {
            Self {
                id: ObjectId::unit(id),
                def: Some((DefId::Unit(def), ModelKey(model))),
                x: id as f32,
                visible: true,
            }
        }

        fn projectile(id: u32) -> Self {
            Self {
                id: ObjectId::projectile(id),
                def: None,
                x: -(id as f32),
                visible: true,
            }
        }
    }

    impl SceneObject for Obj {
        fn id(&self) -> ObjectId {
            self.id
        }

        fn definition(&self) -> Option<(DefId, ModelKey)> {
            self.def
        }

        fn world_transform(&self) -> Mat4 {
            Mat4::from_translation(self.x, 1.0, 0.0)
        }

        fn piece_transforms(&self, out: &mut Vec<Mat4>) {
            if let Some((_, model)) = self.def {
                out.extend((0..=model.0).map(|_| Mat4::IDENTITY));
            }
        }
    }

    fn visible(o: &Obj) -> bool {
        o.visible
    }

    fn registry(dev: &mut HeadlessDevice, initial: u32, increment: u32) -> InstanceOffsetRegistry {
        let config = InstanceBufferConfig {
            initial_matrices: initial,
            growth_increment: increment,
            ..Default::default()
        };
        InstanceOffsetRegistry::new(dev, &config, &BufferLimits::default()).unwrap()
    }

    // ── offsets ───────────────────────────────────────────────────────────

    #[test]
    fn static_then_dynamic_layout() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        // model 1 has two pieces
        let objects = [Obj::unit(1, 10, 1), Obj::unit(2, 11, 1), Obj::projectile(3)];

        assert_eq!(reg.rebuild(&objects, &Models, &visible).unwrap(), 3);

        // Both defs share model 1: one static entry at 0..2.
        assert_eq!(reg.static_entries(), 1);
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Unit(10))), 0);
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Unit(11))), 0);
        assert_eq!(reg.offset(OffsetKey::Object(ObjectId::unit(1))), 2);
        assert_eq!(reg.offset(OffsetKey::Object(ObjectId::unit(2))), 5);
        assert_eq!(reg.offset(OffsetKey::Object(ObjectId::projectile(3))), 8);
        assert_eq!(reg.len(), 9);

        assert_eq!(reg.matrices()[8].translation(), [-3.0, 1.0, 0.0]);
        assert_eq!(reg.matrices()[1].translation(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn unknown_keys_return_sentinel() {
        let mut dev = HeadlessDevice::new();
        let reg = registry(&mut dev, 64, 16);
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Feature(4))), INVALID_OFFSET);
        assert_eq!(reg.try_offset(OffsetKey::Object(ObjectId::feature(4))), None);
    }

    #[test]
    fn invisible_objects_get_no_dynamic_entry() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        let mut hidden = Obj::unit(1, 10, 0);
        hidden.visible = false;
        let objects = [hidden, Obj::unit(2, 20, 0)];

        assert_eq!(reg.rebuild(&objects, &Models, &visible).unwrap(), 1);
        assert_eq!(reg.try_offset(OffsetKey::Object(ObjectId::unit(1))), None);
        assert!(reg.try_offset(OffsetKey::Def(DefId::Unit(10))).is_none());
    }

    // ── frames ────────────────────────────────────────────────────────────

    #[test]
    fn static_offsets_survive_frame_rebuilds() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        let limits = BufferLimits::default();

        let frame1 = [Obj::unit(1, 10, 2), Obj::unit(2, 11, 0)];
        reg.update(&mut dev, &limits, &frame1, &Models, &visible).unwrap();
        let def10 = reg.offset(OffsetKey::Def(DefId::Unit(10)));
        let def11 = reg.offset(OffsetKey::Def(DefId::Unit(11)));

        // A new definition appears while the old objects are gone.
        let frame2 = [Obj::unit(5, 12, 3), Obj::projectile(9)];
        reg.update(&mut dev, &limits, &frame2, &Models, &visible).unwrap();
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Unit(10))), def10);
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Unit(11))), def11);
        assert!(reg.try_offset(OffsetKey::Object(ObjectId::unit(1))).is_none());

        let frame3 = [Obj::unit(1, 10, 2)];
        reg.update(&mut dev, &limits, &frame3, &Models, &visible).unwrap();
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Unit(10))), def10);
        assert_eq!(reg.offset(OffsetKey::Def(DefId::Unit(11))), def11);
        assert_eq!(reg.static_entries(), 3);
        assert_eq!(reg.dynamic_entries(), 1);
    }

    #[test]
    fn dynamic_area_is_reclaimed_each_frame() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        let objects = [Obj::unit(1, 10, 1), Obj::projectile(2)];

        for _ in 0..5 {
            reg.rebuild(&objects, &Models, &visible).unwrap();
            assert_eq!(reg.len(), 2 + 3 + 1);
        }
    }

    // ── upload ────────────────────────────────────────────────────────────

    #[test]
    fn uploads_are_incremental() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        let limits = BufferLimits::default();
        let objects = [Obj::unit(1, 10, 1), Obj::unit(2, 11, 1), Obj::projectile(3)];

        reg.update(&mut dev, &limits, &objects, &Models, &visible).unwrap();
        assert_eq!(dev.stats().bytes_written, 9 * 64);

        reg.update(&mut dev, &limits, &objects, &Models, &visible).unwrap();
        // Static bind poses are not rewritten.
        assert_eq!(dev.stats().bytes_written, 9 * 64 + 7 * 64);

        let raw = dev.contents(reg.buffer()).unwrap();
        assert_eq!(&raw[..9 * 64], bytemuck::cast_slice::<Mat4, u8>(reg.matrices()));
    }

    #[test]
    fn growth_takes_the_larger_of_increment_and_requirement() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 4, 2);
        let limits = BufferLimits::default();

        // 3 static + 4 dynamic = 7 > 4 + 2
        let objects = [Obj::unit(1, 10, 2)];
        reg.update(&mut dev, &limits, &objects, &Models, &visible).unwrap();
        assert_eq!(reg.capacity(), 7);
        assert_eq!(dev.buffer_size(reg.buffer()), Some(7 * 64));

        // 7 + 1 = 8 < 7 + 2
        let more = [Obj::unit(1, 10, 2), Obj::projectile(2)];
        reg.update(&mut dev, &limits, &more, &Models, &visible).unwrap();
        assert_eq!(reg.capacity(), 9);

        // Everything, static content included, is on the device after growth.
        let raw = dev.contents(reg.buffer()).unwrap();
        assert_eq!(&raw[..8 * 64], bytemuck::cast_slice::<Mat4, u8>(reg.matrices()));
        assert_eq!(dev.stats().resizes, 2);
    }

    fn assert_device_matches(dev: &HeadlessDevice, reg: &InstanceOffsetRegistry) {
        let host = bytemuck::cast_slice::<Mat4, u8>(reg.matrices());
        let raw = dev.contents(reg.buffer()).unwrap();
        assert_eq!(&raw[..host.len()], host);
    }

    #[test]
    fn shrinking_rebuild_before_upload() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        let limits = BufferLimits::default();

        let many: Vec<Obj> = (0..10).map(Obj::projectile).collect();
        reg.rebuild(&many, &Models, &visible).unwrap();
        assert_eq!(reg.len(), 10);

        let few = [Obj::projectile(20), Obj::projectile(21)];
        reg.rebuild(&few, &Models, &visible).unwrap();
        assert_eq!(reg.len(), 2);

        reg.upload(&mut dev, &limits).unwrap();
        assert_eq!(dev.stats().bytes_written, 2 * 64);
        assert_device_matches(&dev, &reg);
        assert_eq!(reg.matrices()[1].translation(), [-21.0, 1.0, 0.0]);
    }

    #[test]
    fn begin_frame_alone_leaves_nothing_to_upload() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 64, 16);
        let limits = BufferLimits::default();

        let objects = [Obj::projectile(1), Obj::projectile(2)];
        reg.rebuild(&objects, &Models, &visible).unwrap();
        reg.begin_frame();
        assert!(reg.is_empty());

        reg.upload(&mut dev, &limits).unwrap();
        assert_eq!(dev.stats().writes, 0);
    }

    #[test]
    fn device_tracks_host_under_interleaved_frames() {
        let mut dev = HeadlessDevice::new();
        let mut reg = registry(&mut dev, 4, 3);
        let limits = BufferLimits::default();

        // Deterministic LCG so failures reproduce.
        let mut seed = 0x9e37_79b9_u64;
        let mut next = |m: u64| {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 33) % m
        };

        for round in 0..300u32 {
            let count = next(12) as u32;
            let objects: Vec<Obj> = (0..count)
                .map(|i| {
                    let id = round * 100 + i;
                    match next(3) {
                        0 => Obj::projectile(id),
                        _ => {
                            let def = next(8) as u32;
                            let mut unit = Obj::unit(id, def, def % 4);
                            unit.visible = next(4) != 0;
                            unit
                        }
                    }
                })
                .collect();

            match next(3) {
                0 => {
                    reg.begin_frame();
                    for o in objects.iter().filter(|o| o.visible) {
                        reg.add_object(o, &Models).unwrap();
                    }
                }
                _ => {
                    reg.rebuild(&objects, &Models, &visible).unwrap();
                }
            }

            if next(2) == 0 {
                reg.upload(&mut dev, &limits).unwrap();
                assert!(reg.len() <= reg.capacity() as usize);
                assert_device_matches(&dev, &reg);
            }
        }

        reg.upload(&mut dev, &limits).unwrap();
        assert_device_matches(&dev, &reg);
    }
}
