//! Engine configuration.
//!
//! Keep these structures small. Limits mirror what a conservative wgpu device
//! guarantees by default; raise them only when the target device reports
//! larger limits.

/// Per-kind limits enforced when a buffer is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLimits {
    /// Maximum number of attributes in a vertex-kind definition.
    ///
    /// Matches `wgpu::Limits::default().max_vertex_attributes`.
    pub max_vertex_attributes: usize,

    /// Maximum number of attributes in a uniform/storage definition.
    pub max_block_attributes: usize,

    /// Maximum component count of a single vertex attribute.
    pub max_vertex_components: u32,

    /// Maximum array length of a single uniform/storage attribute.
    pub max_block_components: u32,

    /// Uniform buffers larger than this are rejected at definition time.
    pub uniform_safe_bytes: u64,

    /// No buffer of any kind may exceed this size.
    pub sane_limit_bytes: u64,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_vertex_attributes: 16,
            max_block_attributes: 1 << 12,
            max_vertex_components: 4,
            max_block_components: 1 << 12,
            uniform_safe_bytes: 64 << 10,
            sane_limit_bytes: 256 << 20,
        }
    }
}

/// Sizing policy for the shared instance buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceBufferConfig {
    /// Initial capacity of the transform buffer, in matrices.
    pub initial_matrices: u32,

    /// Minimum growth step of the transform buffer, in matrices.
    ///
    /// On overflow the buffer grows to `max(capacity + increment, required)`.
    pub growth_increment: u32,

    /// Initial capacity of the batch per-instance buffer, in records.
    pub initial_batch_instances: u32,
}

impl Default for InstanceBufferConfig {
    fn default() -> Self {
        Self {
            initial_matrices: 1 << 14,
            growth_increment: 1 << 12,
            initial_batch_instances: 64,
        }
    }
}

/// Binding slot layout for uniform/storage range bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    /// First binding index available to scripted uniform ranges.
    ///
    /// Indices below this value are reserved for engine-owned uniforms.
    pub uniform_base: u32,

    /// First binding index available to scripted storage ranges.
    pub storage_base: u32,

    /// Required alignment of a bound range's byte offset.
    ///
    /// Matches `min_uniform_buffer_offset_alignment` on most adapters.
    pub offset_alignment: u64,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            uniform_base: 5,
            storage_base: 4,
            offset_alignment: 256,
        }
    }
}

/// Aggregate configuration handed to [`crate::context::RenderContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub limits: BufferLimits,
    pub instances: InstanceBufferConfig,
    pub binding: BindingConfig,
}
