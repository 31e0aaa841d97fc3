use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use image::imageops::flip_vertical_in_place;
use image::RgbaImage;
use renderer::{
    CallStats, HeadlessSurface, InternalFormat, PixelBuffer, PixelType, ReadConfig, Stack,
};
use scheduler::{FrameDriver, Reschedule, Schedule};
use stackconfig::LiveConfig;
use template::TextureFormat;
use tracing_subscriber::EnvFilter;

use crate::cli::{CompileArgs, ReplayArgs};
use crate::scenes::{Scene, SceneKind};

const REFRESH: Duration = Duration::from_micros(16_667);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn list_scenes() -> Result<()> {
    println!("Bundled scenes:");
    for kind in SceneKind::ALL {
        println!("  {:<16} {}", kind.name(), kind.description());
    }
    Ok(())
}

pub fn compile(args: CompileArgs) -> Result<()> {
    let scene = Scene::build(args.scene)
        .with_context(|| format!("failed to build scene '{}'", args.scene.name()))?;
    for pass in &scene.passes {
        let vertex = pass.vertex.compile();
        let fragment = pass.fragment.compile();
        println!("// ---- {} vertex ({:?}) ----", pass.label, pass.target);
        println!("{}", vertex.source());
        println!("// ---- {} fragment ----", pass.label);
        println!("{}", fragment.source());
    }
    Ok(())
}

pub fn replay(args: ReplayArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => LiveConfig::load(path)
            .with_context(|| format!("failed to load config at {}", path.display()))?,
        None => LiveConfig::default(),
    };
    let (width, height) = args.size;
    let surface = HeadlessSurface::new(width, height);
    let gl = surface.context_handle().clone();
    let mut stack =
        Stack::new(&surface, config.stack_options()).context("failed to create stack")?;

    let scene = Scene::build(args.scene)
        .with_context(|| format!("failed to build scene '{}'", args.scene.name()))?;
    scene
        .mount(&mut stack, &config)
        .with_context(|| format!("failed to mount scene '{}'", scene.kind.name()))?;
    tracing::info!(
        scene = scene.kind.name(),
        programs = stack.programs().len(),
        links = stack.manager().links(),
        "scene mounted"
    );

    let schedule = config.schedule();
    let mut driver = FrameDriver::new(schedule)
        .context("invalid schedule")?
        .with_clear(config.clear_policy());
    let time = scene.time.clone();
    driver.on_render(move || time.set(time.get() + REFRESH.as_secs_f32()));

    let start = Instant::now();
    for frame in 0..args.frames {
        let before = gl.stats();
        let drawn = match schedule {
            Schedule::Continuous { .. } => {
                let now = start + REFRESH * frame;
                let before_frames = driver.frames();
                if driver.on_display_refresh(now, &mut stack) == Reschedule::Stop {
                    break;
                }
                driver.frames() > before_frames
            }
            Schedule::OnDemand => driver.notify_change(&mut stack),
        };
        report_frame(frame, drawn, &gl.stats().since(&before), args.json)?;
    }
    driver.stop();

    let read = config.read_config();
    let pixels = stack.read(read).context("readback failed")?;
    tracing::info!(
        values = pixels.len(),
        format = ?read.format,
        data_type = ?read.data_type,
        "read back final frame"
    );

    if let Some(path) = &args.export {
        export_png(&mut stack, path)?;
        println!("exported {}", path.display());
    }
    Ok(())
}

fn report_frame(frame: u32, drawn: bool, stats: &CallStats, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "frame": frame,
            "drawn": drawn,
            "stats": stats,
        });
        println!(
            "{}",
            serde_json::to_string(&line).context("failed to serialize frame statistics")?
        );
    } else {
        println!(
            "frame {frame:>3}: drawn={drawn} draws={} buffer_uploads={} texture_uploads={} uniforms={} links={}",
            stats.draws,
            stats.buffer_uploads,
            stats.texture_uploads,
            stats.uniform_pushes,
            stats.links
        );
    }
    Ok(())
}

fn export_png(stack: &mut Stack, path: &Path) -> Result<()> {
    let (width, height) = stack.size();
    let pixels = stack
        .read(ReadConfig {
            format: TextureFormat::Rgba,
            data_type: PixelType::UnsignedByte,
            internal_format: InternalFormat::Rgba8,
            ..ReadConfig::default()
        })
        .context("readback for export failed")?;
    let PixelBuffer::U8(bytes) = pixels else {
        bail!("export readback returned float pixels");
    };
    let mut image = RgbaImage::from_raw(width, height, bytes)
        .context("readback size does not match the surface")?;
    // GL rows start at the bottom.
    flip_vertical_in_place(&mut image);
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
