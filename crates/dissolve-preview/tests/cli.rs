use std::process::Command;

fn preview() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dissolve-preview"))
}

#[test]
fn help_lists_the_transition_flags() {
    let output = preview().arg("--help").output().expect("run dissolve-preview");
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for flag in ["--duration", "--easing", "--still", "--size", "--loop"] {
        assert!(help.contains(flag), "missing {flag} in help output");
    }
}

#[test]
fn rejects_malformed_size() {
    let output = preview()
        .args(["media.png", "mask.png", "--size", "0x480"])
        .output()
        .expect("run dissolve-preview");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("greater than zero"), "unexpected stderr: {stderr}");
}

#[test]
fn missing_media_fails_before_rendering() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("still.png");
    let output = preview()
        .arg(dir.path().join("absent-media.png"))
        .arg(dir.path().join("absent-mask.png"))
        .arg("--still")
        .arg(&out)
        .output()
        .expect("run dissolve-preview");
    assert!(!output.status.success());
    assert!(!out.exists());
}

#[test]
fn requires_media_and_mask() {
    let output = preview().output().expect("run dissolve-preview");
    assert!(!output.status.success());
}
