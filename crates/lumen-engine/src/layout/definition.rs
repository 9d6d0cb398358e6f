use core::fmt;

use crate::config::BufferLimits;
use crate::error::DefinitionError;

use super::{AttributeDescriptor, AttributeSpec, BLOCK_ALIGNMENT, BufferKind, LayoutRule, ScalarType};

/// Ordered attribute set of a buffer plus its derived element stride.
///
/// Attributes are stored in ascending id order, which is also ascending byte
/// order. A definition is immutable; buffer objects hold it by value.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDefinition {
    kind: BufferKind,
    attributes: Vec<AttributeDescriptor>,
    stride: u32,
    restart_index: Option<u32>,
}

impl BufferDefinition {
    /// Lays out an explicit attribute table.
    ///
    /// Specs are ordered by id before layout. Index buffers must use
    /// [`BufferDefinition::index`].
    pub fn by_table(
        kind: BufferKind,
        specs: &[AttributeSpec],
        limits: &BufferLimits,
    ) -> Result<Self, DefinitionError> {
        const OP: &str = "DefineByTable";

        if kind == BufferKind::Index {
            return Err(DefinitionError::UnsupportedKind { op: OP, kind });
        }
        if specs.is_empty() {
            return Err(DefinitionError::Empty { op: OP });
        }

        let (max_attributes, max_components) = match kind.rule() {
            LayoutRule::Tight => (limits.max_vertex_attributes, limits.max_vertex_components),
            LayoutRule::Block => (limits.max_block_attributes, limits.max_block_components),
        };
        if specs.len() > max_attributes {
            return Err(DefinitionError::TooManyAttributes {
                op: OP,
                kind,
                count: specs.len(),
                max: max_attributes,
            });
        }

        let mut sorted: Vec<&AttributeSpec> = specs.iter().collect();
        sorted.sort_by_key(|s| s.id);
        if let Some(pair) = sorted.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(DefinitionError::DuplicateAttribute { op: OP, id: pair[0].id });
        }

        for spec in &sorted {
            if !scalar_allowed(kind, spec.scalar) {
                return Err(DefinitionError::UnsupportedType {
                    op: OP,
                    kind,
                    scalar: spec.scalar,
                });
            }
            if spec.components == 0 || spec.components > max_components {
                return Err(DefinitionError::InvalidComponentCount {
                    op: OP,
                    id: spec.id,
                    count: spec.components,
                    max: max_components,
                });
            }
        }

        let definition = Self::place(kind, sorted.into_iter());
        log::debug!(
            "{OP}: {kind} definition with {} attributes, stride {}",
            definition.attributes.len(),
            definition.stride
        );
        Ok(definition)
    }

    /// `n` float vec4-shaped attributes with ids `0..n`.
    ///
    /// Tight kinds get `f32 x 4`, block kinds one `vec4` each.
    pub fn by_count(kind: BufferKind, n: u32, limits: &BufferLimits) -> Result<Self, DefinitionError> {
        let (scalar, components) = match kind.rule() {
            LayoutRule::Tight => (ScalarType::F32, 4),
            LayoutRule::Block => (ScalarType::FloatVec4, 1),
        };
        let specs: Vec<AttributeSpec> = (0..n)
            .map(|id| AttributeSpec::new(id, scalar, components))
            .collect();

        Self::by_table(kind, &specs, limits).map_err(|e| rename_op(e, "DefineByCount"))
    }

    /// Single-attribute index definition (`u8`, `u16` or `u32`).
    pub fn index(scalar: ScalarType) -> Result<Self, DefinitionError> {
        let restart = match scalar {
            ScalarType::U8 => u32::from(u8::MAX),
            ScalarType::U16 => u32::from(u16::MAX),
            ScalarType::U32 => u32::MAX,
            _ => {
                return Err(DefinitionError::UnsupportedType {
                    op: "DefineIndex",
                    kind: BufferKind::Index,
                    scalar,
                });
            }
        };

        let spec = AttributeSpec::new(0, scalar, 1).named("index");
        let mut definition = Self::place(BufferKind::Index, std::iter::once(&spec));
        definition.restart_index = Some(restart);
        Ok(definition)
    }

    /// Cursor-based offset assignment. Inputs are already validated and sorted.
    fn place<'a>(kind: BufferKind, specs: impl Iterator<Item = &'a AttributeSpec>) -> Self {
        let rule = kind.rule();
        let mut cursor = 0u32;
        let mut attributes = Vec::new();

        for spec in specs {
            let align = match rule {
                LayoutRule::Tight => spec.scalar.byte_size(),
                LayoutRule::Block => BLOCK_ALIGNMENT,
            };
            let offset = cursor.next_multiple_of(align);
            let size = spec.scalar.byte_size() * spec.components;
            cursor = offset + size;

            let name = if spec.name.is_empty() {
                format!("attr{}", spec.id)
            } else {
                spec.name.clone()
            };
            attributes.push(AttributeDescriptor {
                id: spec.id,
                scalar: spec.scalar,
                components: spec.components,
                normalized: spec.normalized && rule == LayoutRule::Tight,
                name,
                offset,
                size,
            });
        }

        Self {
            kind,
            attributes,
            stride: cursor,
            restart_index: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[inline]
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, id: u32) -> Option<&AttributeDescriptor> {
        self.attributes
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.attributes[i])
    }

    /// Bytes per element.
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Scalar values consumed per element by all attributes.
    pub fn lanes_per_element(&self) -> u32 {
        self.attributes.iter().map(AttributeDescriptor::lanes).sum()
    }

    #[inline]
    pub fn byte_size(&self, element_count: u32) -> u64 {
        u64::from(self.stride) * u64::from(element_count)
    }

    /// Validates an allocation of `element_count` elements against `limits`
    /// and returns its byte size.
    pub fn checked_byte_size(
        &self,
        op: &'static str,
        element_count: u32,
        limits: &BufferLimits,
    ) -> Result<u64, DefinitionError> {
        if element_count == 0 {
            return Err(DefinitionError::InvalidElementCount { op, count: element_count });
        }

        let bytes = self.byte_size(element_count);
        let limit = match self.kind {
            BufferKind::Uniform => limits.uniform_safe_bytes.min(limits.sane_limit_bytes),
            _ => limits.sane_limit_bytes,
        };
        if bytes > limit {
            return Err(DefinitionError::TooLarge {
                op,
                kind: self.kind,
                bytes,
                limit,
            });
        }
        Ok(bytes)
    }

    /// Primitive-restart value of an index definition.
    #[inline]
    pub fn primitive_restart_index(&self) -> Option<u32> {
        self.restart_index
    }

    /// wgpu index format of an index definition.
    ///
    /// `u8` indices are valid data but cannot be bound as an index buffer.
    pub fn index_format(&self) -> Result<wgpu::IndexFormat, DefinitionError> {
        const OP: &str = "IndexFormat";
        if self.kind != BufferKind::Index {
            return Err(DefinitionError::UnsupportedKind { op: OP, kind: self.kind });
        }
        match self.attributes[0].scalar {
            ScalarType::U16 => Ok(wgpu::IndexFormat::Uint16),
            ScalarType::U32 => Ok(wgpu::IndexFormat::Uint32),
            scalar => Err(DefinitionError::UnsupportedType {
                op: OP,
                kind: self.kind,
                scalar,
            }),
        }
    }

    /// Vertex fetch description of a vertex definition.
    ///
    /// Attribute ids become shader locations.
    pub fn vertex_attributes(&self) -> Result<Vec<wgpu::VertexAttribute>, DefinitionError> {
        const OP: &str = "VertexLayout";
        if self.kind != BufferKind::Vertex {
            return Err(DefinitionError::UnsupportedKind { op: OP, kind: self.kind });
        }

        self.attributes
            .iter()
            .map(|a| {
                let format = vertex_format(a).ok_or(DefinitionError::UnsupportedType {
                    op: OP,
                    kind: self.kind,
                    scalar: a.scalar,
                })?;
                Ok(wgpu::VertexAttribute {
                    format,
                    offset: u64::from(a.offset),
                    shader_location: a.id,
                })
            })
            .collect()
    }

    /// Textual layout dump for `element_count` elements.
    pub fn dump(&self, element_count: u32) -> LayoutDump<'_> {
        LayoutDump {
            definition: self,
            element_count,
        }
    }
}

/// Display adapter returned by [`BufferDefinition::dump`].
pub struct LayoutDump<'a> {
    definition: &'a BufferDefinition,
    element_count: u32,
}

impl fmt::Display for LayoutDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.definition;
        writeln!(
            f,
            "{} buffer: elements={} stride={} bytes={}",
            d.kind,
            self.element_count,
            d.stride,
            d.byte_size(self.element_count)
        )?;
        if let Some(restart) = d.restart_index {
            writeln!(f, "  primitive restart index={restart}")?;
        }
        for a in &d.attributes {
            writeln!(
                f,
                "  [{}] {:<12} type={:<5} components={:<4} normalized={:<5} offset={:<6} size={}",
                a.id, a.name, a.scalar, a.components, a.normalized, a.offset, a.size
            )?;
        }
        Ok(())
    }
}

fn scalar_allowed(kind: BufferKind, scalar: ScalarType) -> bool {
    match kind {
        BufferKind::Vertex => !scalar.is_aggregate(),
        BufferKind::Index => matches!(scalar, ScalarType::U8 | ScalarType::U16 | ScalarType::U32),
        BufferKind::Uniform | BufferKind::Storage => scalar.is_aggregate(),
    }
}

fn rename_op(err: DefinitionError, op: &'static str) -> DefinitionError {
    use DefinitionError as E;
    match err {
        E::AlreadyDefined { .. } => E::AlreadyDefined { op },
        E::NotDefined { .. } => E::NotDefined { op },
        E::UnsupportedType { kind, scalar, .. } => E::UnsupportedType { op, kind, scalar },
        E::TooManyAttributes { kind, count, max, .. } => E::TooManyAttributes { op, kind, count, max },
        E::DuplicateAttribute { id, .. } => E::DuplicateAttribute { op, id },
        E::InvalidComponentCount { id, count, max, .. } => E::InvalidComponentCount { op, id, count, max },
        E::Empty { .. } => E::Empty { op },
        E::InvalidElementCount { count, .. } => E::InvalidElementCount { op, count },
        E::TooLarge { kind, bytes, limit, .. } => E::TooLarge { op, kind, bytes, limit },
        E::UnknownAttribute { id, .. } => E::UnknownAttribute { op, id },
        E::AttributeTypeMismatch { id, expected, found, .. } => {
            E::AttributeTypeMismatch { op, id, expected, found }
        }
        E::UnsupportedKind { kind, .. } => E::UnsupportedKind { op, kind },
    }
}

fn vertex_format(a: &AttributeDescriptor) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let format = match (a.scalar, a.components, a.normalized) {
        (ScalarType::F32, 1, _) => F::Float32,
        (ScalarType::F32, 2, _) => F::Float32x2,
        (ScalarType::F32, 3, _) => F::Float32x3,
        (ScalarType::F32, 4, _) => F::Float32x4,

        (ScalarType::U32, 1, false) => F::Uint32,
        (ScalarType::U32, 2, false) => F::Uint32x2,
        (ScalarType::U32, 3, false) => F::Uint32x3,
        (ScalarType::U32, 4, false) => F::Uint32x4,
        (ScalarType::I32, 1, false) => F::Sint32,
        (ScalarType::I32, 2, false) => F::Sint32x2,
        (ScalarType::I32, 3, false) => F::Sint32x3,
        (ScalarType::I32, 4, false) => F::Sint32x4,

        (ScalarType::U16, 1, false) => F::Uint16,
        (ScalarType::U16, 2, false) => F::Uint16x2,
        (ScalarType::U16, 4, false) => F::Uint16x4,
        (ScalarType::U16, 1, true) => F::Unorm16,
        (ScalarType::U16, 2, true) => F::Unorm16x2,
        (ScalarType::U16, 4, true) => F::Unorm16x4,
        (ScalarType::I16, 1, false) => F::Sint16,
        (ScalarType::I16, 2, false) => F::Sint16x2,
        (ScalarType::I16, 4, false) => F::Sint16x4,
        (ScalarType::I16, 1, true) => F::Snorm16,
        (ScalarType::I16, 2, true) => F::Snorm16x2,
        (ScalarType::I16, 4, true) => F::Snorm16x4,

        (ScalarType::U8, 1, false) => F::Uint8,
        (ScalarType::U8, 2, false) => F::Uint8x2,
        (ScalarType::U8, 4, false) => F::Uint8x4,
        (ScalarType::U8, 1, true) => F::Unorm8,
        (ScalarType::U8, 2, true) => F::Unorm8x2,
        (ScalarType::U8, 4, true) => F::Unorm8x4,
        (ScalarType::I8, 1, false) => F::Sint8,
        (ScalarType::I8, 2, false) => F::Sint8x2,
        (ScalarType::I8, 4, false) => F::Sint8x4,
        (ScalarType::I8, 1, true) => F::Snorm8,
        (ScalarType::I8, 2, true) => F::Snorm8x2,
        (ScalarType::I8, 4, true) => F::Snorm8x4,

        _ => return None,
    };
    Some(format)
}
