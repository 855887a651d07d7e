// Licensed under the Apache-2.0 license

use crate::PROJECT_ROOT;
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const REQUIRED_TEXT: &str = "Licensed under the Apache-2.0 license";
/// Lines searched for the header.
const HEADER_LINES: usize = 3;
const EXTENSIONS: &[&str] = &["rs", "toml", "sh", "yml", "yaml"];
const IGNORED_DIRS: &[&str] = &[".git", "examples", "target"];

pub(crate) fn fix() -> Result<()> {
    println!("Running: license header fix");
    let mut failed = false;
    for file in find_files(&PROJECT_ROOT)? {
        if check_file(&file).is_err() {
            println!("Fixing header in {}", relative(&file));
            fix_file(&file)?;
        }
        if let Err(e) = check_file(&file) {
            println!("{e:#}");
            failed = true;
        }
    }
    if failed {
        bail!("License header fix failed; please fix the above files manually.");
    }
    Ok(())
}

pub(crate) fn check() -> Result<()> {
    println!("Running: license header check");
    let mut failed = false;
    for file in find_files(&PROJECT_ROOT)? {
        if let Err(e) = check_file(&file) {
            println!("{e:#}");
            failed = true;
        }
    }
    if failed {
        bail!("Some files are missing the license header; to fix, run \"cargo xtask header-fix\" from the repo root");
    }
    Ok(())
}

fn relative(path: &Path) -> String {
    path.strip_prefix(&*PROJECT_ROOT)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn check_contents(path: &Path, contents: impl BufRead) -> Result<()> {
    for line in contents.lines().take(HEADER_LINES) {
        let line = line.with_context(|| format!("{:?}", relative(path)))?;
        if line.contains(REQUIRED_TEXT) {
            return Ok(());
        }
    }
    Err(anyhow!(
        "File {:?} doesn't contain {REQUIRED_TEXT:?} in the first {HEADER_LINES} lines",
        relative(path)
    ))
}

fn check_file(path: &Path) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("{:?}", relative(path)))?;
    check_contents(path, BufReader::new(file))
}

fn header_for(path: &Path) -> Result<String> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("rs") => Ok(format!("// {REQUIRED_TEXT}\n")),
        Some("toml" | "sh" | "yml" | "yaml") => Ok(format!("# {REQUIRED_TEXT}\n")),
        other => bail!("Unknown extension {other:?}"),
    }
}

fn fix_file(path: &Path) -> Result<()> {
    let mut contents = header_for(path)?.into_bytes();
    let mut previous = fs::read(path).with_context(|| format!("{:?}", relative(path)))?;
    // keep a blank line between the header and the first real line
    if previous.first() != Some(&b'\n') {
        contents.push(b'\n');
    }
    contents.append(&mut previous);
    fs::write(path, contents).with_context(|| format!("{:?}", relative(path)))
}

fn allow(entry: &DirEntry) -> bool {
    !(entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name)))
}

fn find_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut result = vec![];
    for entry in WalkDir::new(dir).into_iter().filter_entry(allow) {
        let entry = entry.with_context(|| format!("walking {:?}", relative(dir)))?;
        let matches = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext));
        if entry.file_type().is_file() && matches {
            result.push(entry.into_path());
        }
    }
    result.sort();
    Ok(result)
}
