// Licensed under the Apache-2.0 license

use crate::PROJECT_ROOT;
use anyhow::{bail, Result};
use std::process::Command;

pub(crate) fn test(fpga: bool) -> Result<()> {
    cargo_test()?;
    if fpga {
        check_fpga()?;
    }
    Ok(())
}

fn cargo_test() -> Result<()> {
    println!("Running: cargo test");
    let status = Command::new("cargo")
        .current_dir(&*PROJECT_ROOT)
        .args(["test", "--workspace"])
        .status()?;

    if !status.success() {
        bail!("cargo test failed");
    }
    Ok(())
}

/// The board build links against the AXI DMA userspace library, so off the
/// board it can only be type-checked.
fn check_fpga() -> Result<()> {
    println!("Running: cargo check --features aes-player/fpga");
    let status = Command::new("cargo")
        .current_dir(&*PROJECT_ROOT)
        .args(["check", "--workspace", "--features", "aes-player/fpga"])
        .status()?;

    if !status.success() {
        bail!("fpga build check failed");
    }
    Ok(())
}
