//! TOML configuration for stacks, programs and readback.
//!
//! ```toml
//! version = 1
//!
//! [stack]
//! float_extension = true
//! clear = true
//! schedule = "continuous"
//! fps = 30
//!
//! [program]
//! cache = true
//! mode = "triangle-strip"
//!
//! [readback]
//! format = "rgba"
//! data_type = "FLOAT"
//! internal_format = "RGBA32F"
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use renderer::{Draw, InternalFormat, PixelType, ProgramConfig, ReadConfig, StackOptions};
use scheduler::{ClearPolicy, Schedule};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use template::{DrawMode, TextureFormat};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleMode {
    Continuous,
    #[default]
    OnDemand,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveConfig {
    pub version: u32,
    #[serde(default)]
    pub stack: StackSection,
    #[serde(default)]
    pub program: ProgramSection,
    #[serde(default)]
    pub readback: ReadConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StackSection {
    pub float_extension: bool,
    pub half_float_extension: bool,
    /// Clear to opaque black before each frame.
    pub clear: bool,
    #[serde(deserialize_with = "deserialize_schedule")]
    pub schedule: ScheduleMode,
    /// Frame cap for continuous schedules; `0` or `"uncapped"` disables it.
    #[serde(deserialize_with = "deserialize_fps_opt")]
    pub fps: Option<f32>,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            float_extension: true,
            half_float_extension: false,
            clear: true,
            schedule: ScheduleMode::OnDemand,
            fps: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgramSection {
    pub cache: bool,
    /// Overrides attribute mode hints when set.
    pub mode: Option<DrawMode>,
}

fn deserialize_schedule<'de, D>(deserializer: D) -> Result<ScheduleMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_schedule(&raw).map_err(de::Error::custom)
}

fn parse_schedule(raw: &str) -> Result<ScheduleMode, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "continuous" | "always" | "raf" => Ok(ScheduleMode::Continuous),
        "on-demand" | "ondemand" | "on_demand" | "demand" => Ok(ScheduleMode::OnDemand),
        other => Err(format!("invalid schedule '{other}'")),
    }
}

fn deserialize_fps_opt<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<f32>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a frame rate as a number or \"uncapped\"")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            match v.trim().to_ascii_lowercase().as_str() {
                "uncapped" | "off" | "none" => Ok(None),
                other => other
                    .parse::<f32>()
                    .map(Some)
                    .map_err(|err| E::custom(format!("invalid fps '{v}': {err}"))),
            }
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v as f32))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v as f32))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v as f32))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl LiveConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LiveConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if let Some(fps) = self.stack.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("stack.fps must be >= 0".into()));
            }
            if self.stack.schedule == ScheduleMode::OnDemand && fps > 0.0 {
                return Err(ConfigError::Invalid(
                    "stack.fps only applies to the continuous schedule".into(),
                ));
            }
        }

        let readback = &self.readback;
        if readback.width == Some(0) || readback.height == Some(0) {
            return Err(ConfigError::Invalid(
                "readback width and height must be > 0".into(),
            ));
        }
        if readback.format == TextureFormat::Luminance {
            return Err(ConfigError::Invalid(
                "readback format 'luminance' cannot be read back".into(),
            ));
        }
        let float_target = readback.internal_format.is_float();
        if float_target != (readback.data_type == PixelType::Float) {
            return Err(ConfigError::Invalid(format!(
                "readback data_type {:?} does not match internal_format {:?}",
                readback.data_type, readback.internal_format
            )));
        }
        if float_target && !self.float_target_enabled(readback.internal_format) {
            return Err(ConfigError::Invalid(format!(
                "readback internal_format {:?} needs the matching stack float extension",
                readback.internal_format
            )));
        }

        Ok(())
    }

    fn float_target_enabled(&self, internal: InternalFormat) -> bool {
        if internal.is_half_float() {
            self.stack.half_float_extension || self.stack.float_extension
        } else {
            self.stack.float_extension
        }
    }

    pub fn stack_options(&self) -> StackOptions {
        StackOptions {
            float_extension: self.stack.float_extension,
            half_float_extension: self.stack.half_float_extension,
        }
    }

    pub fn schedule(&self) -> Schedule {
        match self.stack.schedule {
            ScheduleMode::Continuous => Schedule::Continuous {
                fps: self.stack.fps.filter(|fps| *fps > 0.0),
            },
            ScheduleMode::OnDemand => Schedule::OnDemand,
        }
    }

    pub fn clear_policy<F>(&self) -> ClearPolicy<F> {
        if self.stack.clear {
            ClearPolicy::Default
        } else {
            ClearPolicy::Off
        }
    }

    pub fn read_config(&self) -> ReadConfig {
        self.readback
    }

    /// Program settings for `draw`, with the configured mode and caching.
    pub fn program_config(&self, draw: Draw) -> ProgramConfig {
        let config = ProgramConfig::new(draw).cached(self.program.cache);
        match self.program.mode {
            Some(mode) => config.mode(mode),
            None => config,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            version: 1,
            stack: StackSection::default(),
            program: ProgramSection::default(),
            readback: ReadConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = LiveConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.stack, StackSection::default());
        assert_eq!(config.stack_options(), StackOptions::default());
        assert_eq!(config.schedule(), Schedule::OnDemand);
        assert_eq!(config.read_config(), ReadConfig::default());
        assert!(!config.program.cache);
        assert_eq!(config.program.mode, None);
        assert_eq!(config.program_config(Draw::arrays(3)).mode, None);
    }

    #[test]
    fn parses_every_section() {
        let config = LiveConfig::from_toml_str(
            r#"
version = 1

[stack]
float_extension = true
half_float_extension = true
clear = false
schedule = "Continuous"
fps = 30

[program]
cache = true
mode = "line-strip"

[readback]
width = 64
height = 32
format = "red"
data_type = "FLOAT"
internal_format = "R32F"
"#,
        )
        .unwrap();

        assert_eq!(config.schedule(), Schedule::Continuous { fps: Some(30.0) });
        assert!(matches!(config.clear_policy::<()>(), ClearPolicy::Off));
        assert!(config.stack_options().half_float_extension);

        let read = config.read_config();
        assert_eq!(read.width, Some(64));
        assert_eq!(read.format, TextureFormat::Red);
        assert_eq!(read.internal_format, InternalFormat::R32F);

        let program = config.program_config(Draw::arrays(4));
        assert_eq!(program.mode, Some(DrawMode::LineStrip));
        assert!(program.cache_enabled);
    }

    #[test]
    fn uncapped_fps_spellings() {
        let config = LiveConfig::from_toml_str(
            r#"
version = 1
[stack]
schedule = "continuous"
fps = "uncapped"
"#,
        )
        .unwrap();
        assert_eq!(config.schedule(), Schedule::continuous());

        let config = LiveConfig::from_toml_str(
            r#"
version = 1
[stack]
schedule = "continuous"
fps = 0
"#,
        )
        .unwrap();
        assert_eq!(config.schedule(), Schedule::continuous());
    }

    #[test]
    fn rejects_unknown_version() {
        let err = LiveConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("version 2")));
    }

    #[test]
    fn rejects_unknown_schedule() {
        let err = LiveConfig::from_toml_str(
            r#"
version = 1
[stack]
schedule = "sometimes"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_fps_on_demand() {
        let err = LiveConfig::from_toml_str(
            r#"
version = 1
[stack]
fps = 60
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_mismatched_readback_types() {
        let err = LiveConfig::from_toml_str(
            r#"
version = 1
[readback]
data_type = "FLOAT"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("RGBA8") || message.contains("Rgba8")));
    }

    #[test]
    fn float_readback_needs_the_extension() {
        let err = LiveConfig::from_toml_str(
            r#"
version = 1
[stack]
float_extension = false
[readback]
data_type = "FLOAT"
internal_format = "RGBA32F"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("extension")));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version = 1\n[program]\ncache = true").unwrap();
        let config = LiveConfig::load(file.path()).unwrap();
        assert!(config.program.cache);

        let missing = LiveConfig::load(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
