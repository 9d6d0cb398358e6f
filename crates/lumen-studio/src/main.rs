use anyhow::{Context, Result, ensure};
use lumen_engine::batch::IndexRange;
use lumen_engine::buffer::ScriptBuffer;
use lumen_engine::device::{DeviceBackend, DeviceInit, HeadlessDevice, WgpuDevice};
use lumen_engine::instance::{DefId, Mat4, ModelKey, ModelSource, ObjectId, OffsetKey, SceneObject};
use lumen_engine::layout::{AttributeSpec, BufferKind, ScalarType};
use lumen_engine::logging::{LoggingConfig, init_logging};
use lumen_engine::{EngineConfig, RenderContext};

/// Probe scene: a handful of units sharing two models plus a projectile.
struct ProbeObject {
    id: ObjectId,
    def: Option<(DefId, ModelKey)>,
    position: [f32; 3],
}

impl SceneObject for ProbeObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn definition(&self) -> Option<(DefId, ModelKey)> {
        self.def
    }

    fn world_transform(&self) -> Mat4 {
        let [x, y, z] = self.position;
        Mat4::from_translation(x, y, z)
    }

    fn piece_transforms(&self, out: &mut Vec<Mat4>) {
        if let Some((_, model)) = self.def {
            out.extend((0..ProbeModels::pieces(model)).map(|i| Mat4::from_translation(0.0, i as f32, 0.0)));
        }
    }
}

struct ProbeModels;

impl ProbeModels {
    fn pieces(model: ModelKey) -> u32 {
        model.0 + 1
    }
}

impl ModelSource for ProbeModels {
    fn bind_pose(&self, model: ModelKey, out: &mut Vec<Mat4>) {
        out.extend((0..Self::pieces(model)).map(|_| Mat4::IDENTITY));
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    match WgpuDevice::request_blocking(DeviceInit::default()) {
        Ok(device) => run(device),
        Err(e) => {
            log::warn!("no usable GPU ({e:#}); falling back to the headless device");
            run(HeadlessDevice::new())
        }
    }
}

fn run<D: DeviceBackend>(device: D) -> Result<()> {
    let mut ctx = RenderContext::new(device, EngineConfig::default())
        .context("failed to create render context")?;

    probe_buffers(&mut ctx)?;
    probe_instances(&mut ctx)?;

    log::info!("probe finished");
    Ok(())
}

/// Define, upload, download and dump one vertex and one storage buffer.
fn probe_buffers<D: DeviceBackend>(ctx: &mut RenderContext<D>) -> Result<()> {
    let mut mesh = ScriptBuffer::new(BufferKind::Vertex, "probe mesh");
    mesh.define_by_table(
        ctx,
        &[
            AttributeSpec::new(0, ScalarType::F32, 3).named("pos"),
            AttributeSpec::new(1, ScalarType::F32, 2).named("uv"),
            AttributeSpec::new(2, ScalarType::U8, 4).named("color").normalized(true),
        ],
        4,
    )?;

    let values: Vec<f64> = (0..4)
        .flat_map(|i| {
            let f = f64::from(i);
            [f, f + 0.5, 0.0, f / 4.0, 1.0 - f / 4.0, 255.0, 128.0, 257.0, -1.0]
        })
        .collect();
    let written = mesh.upload(ctx, &values, None, 0, None)?;
    let readback = mesh.download(ctx, None, 0, None, true)?;
    log::info!("mesh: wrote {written} elements, color of element 0 reads back as {:?}", &readback[5..9]);
    ensure!(readback[7] == 1.0, "u8 narrowing did not wrap");

    mesh.dump_layout()?;
    let size = mesh.size_query(ctx)?;
    log::info!("mesh size: {size:?}");

    let mut transforms = ScriptBuffer::new(BufferKind::Storage, "probe transforms");
    transforms.define_by_table(
        ctx,
        &[AttributeSpec::new(0, ScalarType::FloatMat4, 4).named("bones")],
        8,
    )?;
    let identity: Vec<f64> = Mat4::IDENTITY
        .cols
        .iter()
        .flatten()
        .map(|&v| f64::from(v))
        .cycle()
        .take(16 * 4 * 8)
        .collect();
    transforms.upload(ctx, &identity, None, 0, None)?;
    let bound = transforms.bind_range(ctx, 0, 1, Some(2))?;
    log::info!(
        "bones bound at index {} ({} bytes from offset {})",
        bound.index(),
        bound.binding.size,
        bound.binding.offset
    );
    transforms.unbind_range(ctx, &bound)?;
    transforms.dump_layout()?;

    mesh.release(ctx);
    transforms.release(ctx);
    Ok(())
}

/// Two frames of instance rebuilds with draw batching.
fn probe_instances<D: DeviceBackend>(ctx: &mut RenderContext<D>) -> Result<()> {
    const BODY: IndexRange = IndexRange { first_index: 0, index_count: 36 };
    const SHELL: IndexRange = IndexRange { first_index: 36, index_count: 12 };

    let mut scene = vec![
        ProbeObject {
            id: ObjectId::unit(1),
            def: Some((DefId::Unit(10), ModelKey(2))),
            position: [0.0, 0.0, 0.0],
        },
        ProbeObject {
            id: ObjectId::unit(2),
            def: Some((DefId::Unit(11), ModelKey(2))),
            position: [4.0, 0.0, 0.0],
        },
        ProbeObject {
            id: ObjectId::feature(7),
            def: Some((DefId::Feature(3), ModelKey(0))),
            position: [-4.0, 0.0, 2.0],
        },
        ProbeObject {
            id: ObjectId::projectile(100),
            def: None,
            position: [1.0, 3.0, 0.0],
        },
    ];

    let mut static_offset = None;
    for frame in 0..2 {
        let visible = |o: &ProbeObject| o.position[0] >= -5.0;
        let count = ctx.update_instances(&scene, &ProbeModels, &visible)?;

        for object in &scene {
            let range = if object.def.is_some() { BODY } else { SHELL };
            ctx.queue_draw(range, object);
        }
        let draws = ctx.submit()?;

        let def_offset = ctx.offset(OffsetKey::Def(DefId::Unit(10)));
        log::info!(
            "frame {frame}: {count} visible, {draws} draws, unit def offset {def_offset}, {} matrices",
            ctx.registry().len()
        );
        ensure!(
            static_offset.replace(def_offset).is_none_or(|prev| prev == def_offset),
            "static offset moved between frames"
        );

        // Move things and drop the projectile for the next frame.
        scene.retain(|o| o.def.is_some());
        for object in &mut scene {
            object.position[0] += 1.0;
        }
    }
    Ok(())
}
