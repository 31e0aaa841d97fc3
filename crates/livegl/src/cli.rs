use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::scenes::SceneKind;

#[derive(Parser, Debug)]
#[command(
    name = "livegl",
    author,
    version,
    about = "Compile and replay GLSL template scenes",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the bundled scenes.
    Scenes,
    /// Print the generated vertex and fragment sources of a scene.
    Compile(CompileArgs),
    /// Build a scene against the recording context and drive frames through it.
    Replay(ReplayArgs),
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Scene name (`hello-world`, `cube`, `render-texture`).
    #[arg(value_name = "SCENE", value_parser = parse_scene)]
    pub scene: SceneKind,
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Scene name (`hello-world`, `cube`, `render-texture`).
    #[arg(value_name = "SCENE", value_parser = parse_scene)]
    pub scene: SceneKind,

    /// Number of frames to drive.
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub frames: u32,

    /// Stack, program and readback settings (TOML).
    #[arg(long, value_name = "FILE", env = "LIVEGL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Surface size (e.g. `320x240`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "100x100")]
    pub size: (u32, u32),

    /// Write the final frame to a PNG file.
    #[arg(long, value_name = "PATH", value_parser = parse_export_path)]
    pub export: Option<PathBuf>,

    /// Print per-frame statistics as JSON lines.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_scene(value: &str) -> Result<SceneKind, String> {
    let normalized = value.trim().to_ascii_lowercase();
    SceneKind::ALL
        .into_iter()
        .find(|kind| kind.name() == normalized)
        .ok_or_else(|| {
            let names: Vec<&str> = SceneKind::ALL.iter().map(|kind| kind.name()).collect();
            format!("unknown scene '{normalized}'; expected one of {}", names.join(", "))
        })
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in surface size".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in surface size".to_string())?;
    if width == 0 || height == 0 {
        return Err("surface size must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_export_path(value: &str) -> Result<PathBuf, String> {
    let path = Path::new(value);
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Ok(path.to_path_buf()),
        None => Err("export path has no extension; expected .png".to_string()),
        Some(other) => Err(format!(
            "unsupported export format '.{other}'; expected .png"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_names() {
        assert_eq!(parse_scene("cube").unwrap(), SceneKind::Cube);
        assert_eq!(parse_scene(" Hello-World ").unwrap(), SceneKind::HelloWorld);
        let err = parse_scene("teapot").unwrap_err();
        assert!(err.contains("render-texture"), "{err}");
    }

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_size("320x240").unwrap(), (320, 240));
        assert_eq!(parse_size("64X64").unwrap(), (64, 64));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("wide").is_err());
    }

    #[test]
    fn export_requires_png() {
        assert!(parse_export_path("frame.png").is_ok());
        assert!(parse_export_path("frame.PNG").is_ok());
        assert!(parse_export_path("frame.exr").is_err());
        assert!(parse_export_path("frame").is_err());
    }
}
