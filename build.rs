// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=QUIETCAM_VERSION");

    // Packagers can pin the version string
    let version = match std::env::var("QUIETCAM_VERSION") {
        Ok(v) => v,
        Err(_) => git_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn git_version() -> String {
    // "v0.1.0" at a tag, "v0.1.0-5-gabcdef1" after it
    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    let Some(described) = described else {
        return format!("{}-unknown", env!("CARGO_PKG_VERSION"));
    };

    let described = described.strip_prefix('v').unwrap_or(&described);

    // "0.1.0-5-gabcdef1" becomes "0.1.0-dirty-abcdef1"
    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        let hash = parts[0].strip_prefix('g').unwrap_or(parts[0]);
        return format!("{}-dirty-{}", parts[2], hash);
    }

    if described.contains('.') {
        let hash = commit_hash().unwrap_or_else(|| "unknown".to_string());
        format!("{}-{}", described, hash)
    } else {
        // No tag reachable, describe returned the bare hash
        format!("{}-{}", env!("CARGO_PKG_VERSION"), described)
    }
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
