// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

mod cargo_lock;
mod clippy;
mod format;
mod header;
mod precheckin;
mod test;

pub static PROJECT_ROOT: LazyLock<PathBuf> = LazyLock::new(|| {
    Path::new(&env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
});

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run clippy on all targets
    Clippy,
    /// Check that the Cargo.lock file is up to date
    CargoLock,
    /// Check source code format
    Format,
    /// Check all the license headers
    HeaderCheck,
    /// Add license headers to files that lack them
    HeaderFix,
    /// Run all checks before opening a pull request
    Precheckin,
    /// Run tests
    Test {
        /// Also type-check the build with the `fpga` feature
        #[arg(long, default_value_t = false)]
        fpga: bool,
    },
}

fn main() {
    let cli = Xtask::parse();
    let result = match &cli.xtask {
        Commands::Clippy => clippy::clippy(),
        Commands::CargoLock => cargo_lock::cargo_lock(),
        Commands::Format => format::format(),
        Commands::HeaderCheck => header::check(),
        Commands::HeaderFix => header::fix(),
        Commands::Precheckin => precheckin::precheckin(),
        Commands::Test { fpga } => test::test(*fpga),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {e:#}");
        std::process::exit(-1);
    });
}
