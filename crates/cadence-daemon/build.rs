use std::process::Command;

fn main() {
    // Packaged builds without a checkout set CADENCE_GIT_SHA themselves.
    println!("cargo:rerun-if-env-changed=CADENCE_GIT_SHA");
    let sha = std::env::var("CADENCE_GIT_SHA").ok().or_else(describe);
    let sha = sha.unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=CADENCE_GIT_SHA={sha}");

    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");
}

fn describe() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout).trim().to_owned();
    (!text.is_empty()).then_some(text)
}
