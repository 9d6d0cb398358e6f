//! Render-thread context.
//!
//! [`RenderContext`] owns the device backend, the engine configuration, the
//! instance offset registry and the batch submitter. There are no globals:
//! every buffer operation takes the context explicitly.

use crate::batch::{BatchSubmitter, IndexRange};
use crate::config::EngineConfig;
use crate::device::DeviceBackend;
use crate::error::Result;
use crate::instance::{InstanceOffsetRegistry, ModelSource, OffsetKey, SceneObject, Visibility};

pub struct RenderContext<D: DeviceBackend> {
    device: D,
    config: EngineConfig,

    registry: InstanceOffsetRegistry,
    batches: BatchSubmitter,
}

impl<D: DeviceBackend> RenderContext<D> {
    /// Creates the shared instance buffers on `device`.
    pub fn new(mut device: D, config: EngineConfig) -> Result<Self> {
        let registry = InstanceOffsetRegistry::new(&mut device, &config.instances, &config.limits)?;
        let batches = BatchSubmitter::new(&mut device, &config.instances)?;

        log::debug!(
            "render context ready: {} instance matrices, {} batch records",
            registry.capacity(),
            batches.instance_capacity()
        );

        Ok(Self {
            device,
            config,
            registry,
            batches,
        })
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &InstanceOffsetRegistry {
        &self.registry
    }

    #[inline]
    pub fn batches(&self) -> &BatchSubmitter {
        &self.batches
    }

    /// Offset of `key` in the instance transform buffer, or
    /// [`crate::instance::INVALID_OFFSET`].
    #[inline]
    pub fn offset(&self, key: OffsetKey) -> u32 {
        self.registry.offset(key)
    }

    /// Rebuilds this frame's instance data from the visible subset of
    /// `objects` and uploads it. Returns the number of visible objects.
    pub fn update_instances<'o, O, I, M, V>(&mut self, objects: I, models: &M, visible: &V) -> Result<usize>
    where
        O: SceneObject + 'o,
        I: IntoIterator<Item = &'o O>,
        M: ModelSource + ?Sized,
        V: Visibility<O> + ?Sized,
    {
        self.registry
            .update(&mut self.device, &self.config.limits, objects, models, visible)
    }

    /// Queues `object` for drawing with the geometry at `range`.
    pub fn queue_draw<O: SceneObject + ?Sized>(&mut self, range: IndexRange, object: &O) {
        self.batches.add_object(range, object, &self.registry);
    }

    /// Issues every queued batch. Returns the number of draws.
    pub fn submit(&mut self) -> Result<usize> {
        self.batches.submit(&mut self.device)
    }

    /// Releases the shared buffers and hands the device back.
    pub fn into_device(self) -> D {
        let Self {
            mut device,
            registry,
            batches,
            ..
        } = self;
        registry.release(&mut device);
        batches.release(&mut device);
        device
    }
}
