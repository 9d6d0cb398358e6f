use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::config::{BufferLimits, InstanceBufferConfig};
use crate::device::{DeviceBackend, DeviceBufferDesc, DeviceBufferId, IndexedInstancedDraw};
use crate::error::{DefinitionError, Result};
use crate::instance::{INVALID_OFFSET, InstanceOffsetRegistry, OffsetKey, SceneObject};
use crate::layout::{AttributeSpec, BufferDefinition, BufferKind, ScalarType};

/// Geometry identity of a draw: a range of the shared index buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IndexRange {
    pub first_index: u32,
    pub index_count: u32,
}

/// Per-instance data read by the vertex shader.
///
/// Offsets point into the instance transform buffer; [`INVALID_OFFSET`] marks
/// a missing entry.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// Start of world + piece matrices of the object.
    pub transform_offset: u32,
    /// Start of bind-pose matrices of the object's definition.
    pub def_offset: u32,
    pub team: u32,
    pub aux: u32,
}

impl InstanceRecord {
    /// Vertex layout of a record with attributes at shader locations
    /// `first_location..first_location + 4`.
    pub fn definition(first_location: u32, limits: &BufferLimits) -> Result<BufferDefinition, DefinitionError> {
        let names = ["transform_offset", "def_offset", "team", "aux"];
        let specs: Vec<AttributeSpec> = names
            .iter()
            .zip(first_location..)
            .map(|(name, id)| AttributeSpec::new(id, ScalarType::U32, 1).named(*name))
            .collect();
        BufferDefinition::by_table(BufferKind::Vertex, &specs, limits)
    }
}

/// Groups per-object draw requests by geometry and issues one indexed,
/// instanced draw per group.
///
/// Groups are submitted in the order they were first accumulated. There is
/// no depth sort; the submitter is meant for opaque geometry.
pub struct BatchSubmitter {
    groups: Vec<(IndexRange, Vec<InstanceRecord>)>,
    lookup: HashMap<IndexRange, usize>,

    staging: Vec<InstanceRecord>,
    instance_buffer: DeviceBufferId,
    instance_capacity: usize,
    min_capacity: usize,
}

impl BatchSubmitter {
    pub fn new<D: DeviceBackend + ?Sized>(device: &mut D, config: &InstanceBufferConfig) -> Result<Self> {
        let min_capacity = (config.initial_batch_instances as usize).max(1);
        let instance_buffer = device.create_buffer(&DeviceBufferDesc {
            label: "lumen batch instances",
            kind: BufferKind::Vertex,
            size: (min_capacity * size_of::<InstanceRecord>()) as u64,
        })?;

        Ok(Self {
            groups: Vec::new(),
            lookup: HashMap::new(),
            staging: Vec::new(),
            instance_buffer,
            instance_capacity: min_capacity,
            min_capacity,
        })
    }

    #[inline]
    pub fn instance_buffer(&self) -> DeviceBufferId {
        self.instance_buffer
    }

    #[inline]
    pub fn instance_capacity(&self) -> usize {
        self.instance_capacity
    }

    /// Number of distinct geometry groups accumulated.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of instances accumulated across all groups.
    pub fn pending_instances(&self) -> usize {
        self.groups.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn add(&mut self, range: IndexRange, record: InstanceRecord) {
        let slot = *self.lookup.entry(range).or_insert_with(|| {
            self.groups.push((range, Vec::new()));
            self.groups.len() - 1
        });
        self.groups[slot].1.push(record);
    }

    /// Accumulates `object` with offsets resolved through `registry`.
    pub fn add_object<O: SceneObject + ?Sized>(
        &mut self,
        range: IndexRange,
        object: &O,
        registry: &InstanceOffsetRegistry,
    ) {
        let transform_offset = registry.offset(OffsetKey::Object(object.id()));
        let def_offset = object
            .definition()
            .map(|(def, _)| registry.offset(OffsetKey::Def(def)))
            .unwrap_or(INVALID_OFFSET);

        self.add(
            range,
            InstanceRecord {
                transform_offset,
                def_offset,
                team: object.team(),
                aux: 0,
            },
        );
    }

    /// Drops everything accumulated without drawing.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.lookup.clear();
    }

    /// Uploads the accumulated records and issues one draw per group.
    ///
    /// Returns the number of draws. An empty accumulation issues nothing.
    pub fn submit<D: DeviceBackend + ?Sized>(&mut self, device: &mut D) -> Result<usize> {
        if self.groups.is_empty() {
            return Ok(0);
        }

        self.staging.clear();
        for (_, records) in &self.groups {
            self.staging.extend_from_slice(records);
        }
        self.ensure_instance_capacity(device, self.staging.len())?;
        device.write_buffer(self.instance_buffer, 0, bytemuck::cast_slice(&self.staging))?;

        let mut first_instance = 0u32;
        for (range, records) in &self.groups {
            let instance_count = records.len() as u32;
            device.draw_indexed_instanced(&IndexedInstancedDraw {
                first_index: range.first_index,
                index_count: range.index_count,
                base_vertex: 0,
                first_instance,
                instance_count,
                instance_buffer: self.instance_buffer,
            });
            first_instance += instance_count;
        }

        let draws = self.groups.len();
        log::trace!("submitted {draws} batches, {first_instance} instances");
        self.clear();
        Ok(draws)
    }

    pub fn release<D: DeviceBackend + ?Sized>(self, device: &mut D) {
        device.destroy_buffer(self.instance_buffer);
    }

    fn ensure_instance_capacity<D: DeviceBackend + ?Sized>(
        &mut self,
        device: &mut D,
        required_instances: usize,
    ) -> Result<()> {
        if required_instances <= self.instance_capacity {
            return Ok(());
        }

        let new_cap = required_instances.next_power_of_two().max(self.min_capacity);
        let new_size = (new_cap * size_of::<InstanceRecord>()) as u64;
        device.resize_buffer(self.instance_buffer, new_size)?;

        log::debug!("batch instance buffer grew to {new_cap} records");
        self.instance_capacity = new_cap;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::instance::{DefId, Mat4, ModelKey, ModelSource, ObjectId};

    fn submitter(dev: &mut HeadlessDevice, initial: u32) -> BatchSubmitter {
        let config = InstanceBufferConfig {
            initial_batch_instances: initial,
            ..Default::default()
        };
        BatchSubmitter::new(dev, &config).unwrap()
    }

    fn record(n: u32) -> InstanceRecord {
        InstanceRecord {
            transform_offset: n,
            def_offset: 0,
            team: 0,
            aux: 0,
        }
    }

    const CUBE: IndexRange = IndexRange { first_index: 0, index_count: 36 };
    const QUAD: IndexRange = IndexRange { first_index: 36, index_count: 6 };

    // ── grouping ──────────────────────────────────────────────────────────

    #[test]
    fn groups_draw_in_first_accumulated_order() {
        let mut dev = HeadlessDevice::new();
        let mut batch = submitter(&mut dev, 4);

        batch.add(QUAD, record(1));
        batch.add(CUBE, record(2));
        batch.add(QUAD, record(3));
        assert_eq!(batch.group_count(), 2);
        assert_eq!(batch.pending_instances(), 3);

        assert_eq!(batch.submit(&mut dev).unwrap(), 2);
        let draws = dev.take_draws();
        assert_eq!(draws.len(), 2);
        assert_eq!((draws[0].first_index, draws[0].instance_count), (36, 2));
        assert_eq!((draws[1].first_index, draws[1].first_instance), (0, 2));
        assert_eq!(draws[1].instance_count, 1);

        // Records are laid out group by group.
        let raw = dev.contents(batch.instance_buffer()).unwrap();
        let offsets: Vec<u32> = raw[..48]
            .chunks_exact(16)
            .map(|r| u32::from_le_bytes([r[0], r[1], r[2], r[3]]))
            .collect();
        assert_eq!(offsets, vec![1, 3, 2]);
        assert_eq!(batch.group_count(), 0);
    }

    #[test]
    fn empty_submit_is_a_no_op() {
        let mut dev = HeadlessDevice::new();
        let mut batch = submitter(&mut dev, 4);
        assert_eq!(batch.submit(&mut dev).unwrap(), 0);
        assert!(dev.draws().is_empty());
        assert_eq!(dev.stats().writes, 0);
    }

    #[test]
    fn instance_buffer_grows_to_power_of_two() {
        let mut dev = HeadlessDevice::new();
        let mut batch = submitter(&mut dev, 4);
        for i in 0..5 {
            batch.add(CUBE, record(i));
        }
        batch.submit(&mut dev).unwrap();
        assert_eq!(batch.instance_capacity(), 8);
        assert_eq!(dev.buffer_size(batch.instance_buffer()), Some(128));
    }

    // ── registry ──────────────────────────────────────────────────────────

    struct Models;

    impl ModelSource for Models {
        fn bind_pose(&self, _model: ModelKey, out: &mut Vec<Mat4>) {
            out.push(Mat4::IDENTITY);
        }
    }

    struct Unit(u32);

    impl SceneObject for Unit {
        fn id(&self) -> ObjectId {
            ObjectId::unit(self.0)
        }

        fn definition(&self) -> Option<(DefId, ModelKey)> {
            Some((DefId::Unit(7), ModelKey(0)))
        }

        fn world_transform(&self) -> Mat4 {
            Mat4::IDENTITY
        }

        fn team(&self) -> u32 {
            3
        }
    }

    #[test]
    fn add_object_resolves_registry_offsets() {
        let mut dev = HeadlessDevice::new();
        let mut registry =
            InstanceOffsetRegistry::new(&mut dev, &InstanceBufferConfig::default(), &BufferLimits::default())
                .unwrap();
        let units = [Unit(1), Unit(2)];
        registry.rebuild(&units, &Models, &|_: &Unit| true).unwrap();

        let mut batch = submitter(&mut dev, 4);
        batch.add_object(CUBE, &units[1], &registry);
        batch.add_object(CUBE, &Unit(99), &registry);

        assert_eq!(
            batch.groups[0].1,
            vec![
                InstanceRecord {
                    transform_offset: 2,
                    def_offset: 0,
                    team: 3,
                    aux: 0,
                },
                InstanceRecord {
                    transform_offset: INVALID_OFFSET,
                    def_offset: 0,
                    team: 3,
                    aux: 0,
                },
            ]
        );
    }

    #[test]
    fn record_definition_matches_struct_layout() {
        let def = InstanceRecord::definition(4, &BufferLimits::default()).unwrap();
        assert_eq!(def.stride() as usize, size_of::<InstanceRecord>());
        let attrs = def.vertex_attributes().unwrap();
        assert_eq!(attrs[0].shader_location, 4);
        assert_eq!(attrs[3].offset, 12);
        assert_eq!(attrs[3].format, wgpu::VertexFormat::Uint32);
    }
}
