// Licensed under the Apache-2.0 license

use crate::PROJECT_ROOT;
use anyhow::{bail, Result};
use std::process::Command;

pub(crate) fn clippy() -> Result<()> {
    clippy_with(&[])?;
    // hardware backends only compile with the feature on
    clippy_with(&["--features", "aes-player/fpga"])
}

fn clippy_with(extra: &[&str]) -> Result<()> {
    println!("Running: cargo clippy {}", extra.join(" "));
    let mut args = vec!["clippy", "--workspace", "--all-targets"];
    args.extend(extra);
    args.extend(["--", "-D", "warnings", "--no-deps"]);
    let status = Command::new("cargo")
        .current_dir(&*PROJECT_ROOT)
        .args(args)
        .status()?;

    if !status.success() {
        bail!("cargo clippy failed");
    }
    Ok(())
}
