use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn livegl() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_livegl"));
    command.env_remove("LIVEGL_CONFIG").env("RUST_LOG", "warn");
    command
}

#[test]
fn scenes_lists_every_bundled_scene() {
    let output = livegl()
        .arg("scenes")
        .output()
        .expect("failed to run livegl scenes");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["hello-world", "cube", "render-texture"] {
        assert!(stdout.contains(name), "missing {name} in {stdout}");
    }
}

#[test]
fn compile_prints_synthesized_declarations() {
    let output = livegl()
        .args(["compile", "cube"])
        .output()
        .expect("failed to run livegl compile");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("uniform mat4 u_model;"), "{stdout}");
    assert!(stdout.contains("in vec3 a_position;"), "{stdout}");
}

#[test]
fn replay_exports_a_png() {
    let root = TempDir::new().unwrap();
    let export = root.path().join("frame.png");

    let output = livegl()
        .args(["replay", "render-texture", "--frames", "2", "--size", "32x16"])
        .arg("--export")
        .arg(&export)
        .output()
        .expect("failed to run livegl replay");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("drawn=true").count(), 2, "{stdout}");
    let bytes = fs::read(&export).unwrap();
    assert_eq!(&bytes[1..4], b"PNG");
}

#[test]
fn replay_honours_a_continuous_config() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("live.toml");
    fs::write(
        &config,
        r#"
version = 1

[stack]
schedule = "continuous"
fps = 30

[program]
cache = true
"#,
    )
    .unwrap();

    let output = livegl()
        .args(["replay", "hello-world", "--frames", "4", "--json"])
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run livegl replay");
    assert!(output.status.success());

    // 60 Hz refreshes under a 30 fps cap draw every other frame.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let drawn: Vec<bool> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["drawn"].as_bool().unwrap()
        })
        .collect();
    assert_eq!(drawn, vec![true, false, true, false]);
}

#[test]
fn replay_rejects_an_invalid_config() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("live.toml");
    fs::write(&config, "version = 2\n").unwrap();

    let output = livegl()
        .args(["replay", "cube"])
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run livegl replay");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported config version 2"), "{stderr}");
}
