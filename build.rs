use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let sha = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "dev".to_string());
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).is_some();
    let build = if dirty && sha != "dev" {
        format!("{sha}-dirty")
    } else {
        sha
    };

    println!("cargo:rustc-env=TRIP_PLANNER_GIT_SHA={build}");
}
