use core::ops::Range;

use crate::context::RenderContext;
use crate::device::DeviceBackend;
use crate::error::{BufferError, DefinitionError, Result};
use crate::instance::OffsetKey;
use crate::layout::{AttributeSpec, BufferDefinition, BufferKind, ScalarType};

use super::{BoundRange, BufferObject, BufferSize};

enum State {
    Undefined,
    Ready(BufferObject),
    /// A define call failed; the handle stays unusable.
    Poisoned,
}

/// Scripting-facing buffer handle.
///
/// A handle is created for one buffer kind and defined exactly once. After a
/// successful define it owns a [`BufferObject`]; after a failed define every
/// further call fails.
pub struct ScriptBuffer {
    kind: BufferKind,
    label: String,
    state: State,
}

impl ScriptBuffer {
    pub fn new(kind: BufferKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            state: State::Undefined,
        }
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, State::Poisoned)
    }

    pub fn object(&self) -> Option<&BufferObject> {
        match &self.state {
            State::Ready(obj) => Some(obj),
            _ => None,
        }
    }

    /// Defines the buffer from an attribute table and allocates it.
    pub fn define_by_table<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        specs: &[AttributeSpec],
        element_count: u32,
    ) -> Result<()> {
        const OP: &str = "DefineByTable";
        self.define(ctx, OP, element_count, |kind, ctx| {
            BufferDefinition::by_table(kind, specs, &ctx.config().limits)
        })
    }

    /// Defines the buffer as `n` float vec4-shaped attributes and allocates it.
    pub fn define_by_count<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        n: u32,
        element_count: u32,
    ) -> Result<()> {
        const OP: &str = "DefineByCount";
        self.define(ctx, OP, element_count, |kind, ctx| {
            BufferDefinition::by_count(kind, n, &ctx.config().limits)
        })
    }

    /// Defines an index buffer; `scalar` defaults to `u16`.
    pub fn define_index<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        scalar: Option<ScalarType>,
        element_count: u32,
    ) -> Result<()> {
        const OP: &str = "DefineIndex";
        self.define(ctx, OP, element_count, |kind, _| {
            if kind != BufferKind::Index {
                return Err(DefinitionError::UnsupportedKind { op: OP, kind });
            }
            BufferDefinition::index(scalar.unwrap_or(ScalarType::U16))
        })
    }

    fn define<D, F>(&mut self, ctx: &mut RenderContext<D>, op: &'static str, element_count: u32, build: F) -> Result<()>
    where
        D: DeviceBackend,
        F: FnOnce(BufferKind, &RenderContext<D>) -> std::result::Result<BufferDefinition, DefinitionError>,
    {
        if !matches!(self.state, State::Undefined) {
            return Err(DefinitionError::AlreadyDefined { op }.into());
        }

        let allocated = build(self.kind, &*ctx).map_err(BufferError::from).and_then(|definition| {
            let limits = ctx.config().limits.clone();
            BufferObject::allocate(ctx.device_mut(), &self.label, definition, element_count, &limits)
        });

        match allocated {
            Ok(obj) => {
                self.state = State::Ready(obj);
                Ok(())
            }
            Err(e) => {
                log::debug!("{op} failed for {:?}: {e}", self.label);
                self.state = State::Poisoned;
                Err(e)
            }
        }
    }

    fn ready(&self, op: &'static str) -> Result<&BufferObject> {
        self.object().ok_or_else(|| DefinitionError::NotDefined { op }.into())
    }

    fn ready_mut(&mut self, op: &'static str) -> Result<&mut BufferObject> {
        match &mut self.state {
            State::Ready(obj) => Ok(obj),
            _ => Err(DefinitionError::NotDefined { op }.into()),
        }
    }

    /// See [`BufferObject::upload`].
    pub fn upload<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        values: &[f64],
        attribute: Option<u32>,
        element_offset: u32,
        source: Option<Range<usize>>,
    ) -> Result<u32> {
        let obj = self.ready_mut("Upload")?;
        obj.upload(ctx.device_mut(), values, attribute, element_offset, source)
    }

    /// See [`BufferObject::download`].
    pub fn download<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        attribute: Option<u32>,
        element_offset: u32,
        element_count: Option<u32>,
        force_device_read: bool,
    ) -> Result<Vec<f64>> {
        let obj = self.ready_mut("Download")?;
        obj.download(ctx.device_mut(), attribute, element_offset, element_count, force_device_read)
    }

    /// See [`BufferObject::bind_range`].
    pub fn bind_range<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        slot: u32,
        element_offset: u32,
        element_count: Option<u32>,
    ) -> Result<BoundRange> {
        let obj = self.ready_mut("BindRange")?;
        let binding = ctx.config().binding.clone();
        obj.bind_range(ctx.device_mut(), &binding, slot, element_offset, element_count)
    }

    pub fn unbind_range<D: DeviceBackend>(&self, ctx: &mut RenderContext<D>, bound: &BoundRange) -> Result<()> {
        self.ready("UnbindRange")?.unbind_range(ctx.device_mut(), bound)
    }

    /// Writes the registry offset of `key` into a `u32` attribute for each
    /// element in `elements` (default: every element).
    ///
    /// Unknown keys write the not-found sentinel, which shaders can test for.
    pub fn fill_offset<D: DeviceBackend>(
        &mut self,
        ctx: &mut RenderContext<D>,
        attribute: u32,
        key: OffsetKey,
        elements: Option<Range<u32>>,
    ) -> Result<u32> {
        let obj = self.ready_mut("FillOffset")?;
        let offset = ctx.registry().offset(key);
        let elements = elements.unwrap_or(0..obj.element_count());
        obj.fill_u32_attribute(ctx.device_mut(), attribute, offset, elements)
    }

    /// Textual layout dump.
    pub fn dump_layout(&self) -> Result<String> {
        let obj = self.ready("DumpLayout")?;
        let text = obj.definition().dump(obj.element_count()).to_string();
        log::info!("{:?}\n{text}", self.label);
        Ok(text)
    }

    pub fn size_query<D: DeviceBackend>(&self, ctx: &RenderContext<D>) -> Result<BufferSize> {
        Ok(self.ready("SizeQuery")?.size_query(ctx.device()))
    }

    /// Frees the device buffer and shadow. The handle returns to the
    /// undefined state only if it was defined; a poisoned handle stays so.
    pub fn release<D: DeviceBackend>(&mut self, ctx: &mut RenderContext<D>) {
        if !self.is_defined() {
            return;
        }
        if let State::Ready(obj) = std::mem::replace(&mut self.state, State::Undefined) {
            obj.release(ctx.device_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::device::HeadlessDevice;
    use crate::instance::{DefId, INVALID_OFFSET};

    fn ctx() -> RenderContext<HeadlessDevice> {
        RenderContext::new(HeadlessDevice::new(), EngineConfig::default()).unwrap()
    }

    fn pos_uv() -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::new(0, ScalarType::F32, 3).named("pos"),
            AttributeSpec::new(1, ScalarType::F32, 2).named("uv"),
        ]
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn define_allocates_once() {
        let mut ctx = ctx();
        let mut buf = ScriptBuffer::new(BufferKind::Vertex, "mesh");
        buf.define_by_table(&mut ctx, &pos_uv(), 4).unwrap();

        let size = buf.size_query(&ctx).unwrap();
        assert_eq!(size.logical_bytes, 80);
        assert_eq!(size.device_bytes, 80);

        assert_eq!(
            buf.define_by_count(&mut ctx, 2, 4),
            Err(BufferError::Definition(DefinitionError::AlreadyDefined { op: "DefineByCount" }))
        );
    }

    #[test]
    fn failed_define_poisons_the_handle() {
        let mut ctx = ctx();
        let before = ctx.device().live_buffers();
        let mut buf = ScriptBuffer::new(BufferKind::Uniform, "ubo");
        let bad = [AttributeSpec::new(0, ScalarType::F32, 1)];
        assert!(buf.define_by_table(&mut ctx, &bad, 1).is_err());
        assert!(buf.is_poisoned());

        let good = [AttributeSpec::new(0, ScalarType::FloatVec4, 1)];
        assert!(matches!(
            buf.define_by_table(&mut ctx, &good, 1),
            Err(BufferError::Definition(DefinitionError::AlreadyDefined { .. }))
        ));
        assert!(matches!(
            buf.upload(&mut ctx, &[1.0; 4], None, 0, None),
            Err(BufferError::Definition(DefinitionError::NotDefined { .. }))
        ));
        assert_eq!(ctx.device().live_buffers(), before);
    }

    #[test]
    fn release_frees_device_memory() {
        let mut ctx = ctx();
        let before = ctx.device().live_buffers();
        let mut buf = ScriptBuffer::new(BufferKind::Index, "indices");
        buf.define_index(&mut ctx, None, 6).unwrap();
        assert_eq!(buf.object().map(|o| o.stride()), Some(2));
        assert_eq!(ctx.device().live_buffers(), before + 1);

        buf.release(&mut ctx);
        assert!(!buf.is_defined());
        assert_eq!(ctx.device().live_buffers(), before);
    }

    #[test]
    fn define_index_requires_index_kind() {
        let mut ctx = ctx();
        let mut buf = ScriptBuffer::new(BufferKind::Vertex, "verts");
        assert!(matches!(
            buf.define_index(&mut ctx, Some(ScalarType::U32), 6),
            Err(BufferError::Definition(DefinitionError::UnsupportedKind { .. }))
        ));
        assert!(buf.is_poisoned());
    }

    // ── operations ────────────────────────────────────────────────────────

    #[test]
    fn upload_download_and_dump() {
        let mut ctx = ctx();
        let mut buf = ScriptBuffer::new(BufferKind::Vertex, "mesh");
        buf.define_by_table(&mut ctx, &pos_uv(), 4).unwrap();

        let values: Vec<f64> = (0..20).map(f64::from).collect();
        assert_eq!(buf.upload(&mut ctx, &values, None, 0, None).unwrap(), 4);
        assert_eq!(buf.download(&mut ctx, Some(0), 1, Some(1), true).unwrap(), vec![5.0, 6.0, 7.0]);

        let dump = buf.dump_layout().unwrap();
        assert!(dump.contains("stride=20"));
        assert!(dump.contains("uv"));
    }

    #[test]
    fn undefined_handles_reject_operations() {
        let mut ctx = ctx();
        let mut buf = ScriptBuffer::new(BufferKind::Storage, "ssbo");
        assert!(buf.dump_layout().is_err());
        assert!(buf.size_query(&ctx).is_err());
        assert!(buf.bind_range(&mut ctx, 0, 0, None).is_err());
    }

    #[test]
    fn bind_range_uses_context_binding_config() {
        let mut ctx = ctx();
        let mut buf = ScriptBuffer::new(BufferKind::Storage, "ssbo");
        buf.define_by_count(&mut ctx, 16, 2).unwrap();
        let bound = buf.bind_range(&mut ctx, 2, 0, None).unwrap();
        assert_eq!(bound.index(), 6);
        buf.unbind_range(&mut ctx, &bound).unwrap();
    }

    #[test]
    fn fill_offset_writes_sentinel_for_unknown_keys() {
        let mut ctx = ctx();
        let mut buf = ScriptBuffer::new(BufferKind::Vertex, "instances");
        let specs = [AttributeSpec::new(0, ScalarType::U32, 1)];
        buf.define_by_table(&mut ctx, &specs, 2).unwrap();

        let key = OffsetKey::Def(DefId::Unit(99));
        assert_eq!(buf.fill_offset(&mut ctx, 0, key, None).unwrap(), 2);
        assert_eq!(
            buf.download(&mut ctx, None, 0, None, false).unwrap(),
            vec![f64::from(INVALID_OFFSET); 2]
        );
    }
}
