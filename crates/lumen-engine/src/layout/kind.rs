use core::fmt;

/// What a buffer is bound as.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    Storage,
}

/// Offset assignment rule of a buffer kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LayoutRule {
    /// Vertex and index data: attributes aligned to their scalar width.
    Tight,
    /// Uniform and storage blocks: every attribute on a 16-byte boundary.
    Block,
}

/// Alignment of every attribute in a [`LayoutRule::Block`] layout.
pub const BLOCK_ALIGNMENT: u32 = 16;

impl BufferKind {
    #[inline]
    pub const fn rule(self) -> LayoutRule {
        match self {
            Self::Vertex | Self::Index => LayoutRule::Tight,
            Self::Uniform | Self::Storage => LayoutRule::Block,
        }
    }

    /// Device usages for a buffer of this kind.
    ///
    /// Every buffer is a copy source and destination so host uploads and
    /// forced reads work regardless of kind.
    pub fn usages(self) -> wgpu::BufferUsages {
        let copy = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        copy | match self {
            Self::Vertex => wgpu::BufferUsages::VERTEX,
            Self::Index => wgpu::BufferUsages::INDEX,
            Self::Uniform => wgpu::BufferUsages::UNIFORM,
            Self::Storage => wgpu::BufferUsages::STORAGE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Index => "index",
            Self::Uniform => "uniform",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
