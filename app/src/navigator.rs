// Licensed under the Apache-2.0 license

//! Flattened, sorted view of a directory tree with a file cursor.

use crate::xattr;
use log::warn;
use std::ops::Range;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<T> {
    pub path: PathBuf,
    /// Name indented with the tree drawing for its depth.
    pub label: String,
    pub is_dir: bool,
    pub encrypted: bool,
    /// Status message shown after the name.
    pub suffix: String,
    pub tag: T,
}

impl<T> Entry<T> {
    fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Directory listing whose cursor only ever rests on files. Hidden entries
/// are left out. Every entry carries a tag and a status suffix owned by the
/// caller; both survive [`DirectoryNavigator::reload`].
pub struct DirectoryNavigator<T> {
    root: PathBuf,
    entries: Vec<Entry<T>>,
    current: Option<usize>,
    scroll_height: usize,
}

impl<T: Copy + Default + PartialEq> DirectoryNavigator<T> {
    pub fn open(root: impl Into<PathBuf>, scroll_height: usize) -> Self {
        let mut navigator = Self {
            root: root.into(),
            entries: Vec::new(),
            current: None,
            scroll_height: scroll_height.max(1),
        };
        navigator.reload();
        navigator
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-reads the tree. The cursor stays on the same path when it still
    /// exists, otherwise it moves to the first file.
    pub fn reload(&mut self) {
        let selected = self.current().map(|e| e.path.clone());
        let mut entries = scan(&self.root);
        for entry in entries.iter_mut() {
            if let Some(old) = self.entries.iter().find(|old| old.path == entry.path) {
                entry.tag = old.tag;
                entry.suffix = old.suffix.clone();
            }
        }
        self.entries = entries;
        self.current = selected
            .and_then(|path| self.position(&path))
            .filter(|i| self.entries[*i].is_file())
            .or_else(|| self.entries.iter().position(Entry::is_file));
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    /// Moves the cursor to the next file in `direction`. Returns false at
    /// either end.
    pub fn navigate(&mut self, direction: Direction) -> bool {
        let found = match (direction, self.current) {
            (_, None) => self.entries.iter().position(Entry::is_file),
            (Direction::Down, Some(cur)) => self.entries[cur + 1..]
                .iter()
                .position(Entry::is_file)
                .map(|i| cur + 1 + i),
            (Direction::Up, Some(cur)) => self.entries[..cur].iter().rposition(Entry::is_file),
        };
        match found {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&Entry<T>> {
        self.current.map(|i| &self.entries[i])
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn entries(&self) -> &[Entry<T>] {
        &self.entries
    }

    pub fn entry(&self, path: &Path) -> Option<&Entry<T>> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn set_scroll_height(&mut self, scroll_height: usize) {
        self.scroll_height = scroll_height.max(1);
    }

    /// Rows to draw so that the cursor stays in view.
    pub fn window(&self) -> Range<usize> {
        let cur = self.current.unwrap_or(0);
        let start = (cur + 1).saturating_sub(self.scroll_height);
        start..self.entries.len().min(start + self.scroll_height)
    }

    pub fn set_suffix(&mut self, path: &Path, suffix: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(entry) => {
                entry.suffix = suffix.into();
                true
            }
            None => false,
        }
    }

    pub fn set_tag(&mut self, path: &Path, tag: T) -> bool {
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(entry) => {
                entry.tag = tag;
                true
            }
            None => false,
        }
    }

    pub fn has_tag(&self, tag: T) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    pub fn change_tags(&mut self, from: T, to: T) {
        for entry in self.entries.iter_mut().filter(|e| e.tag == from) {
            entry.tag = to;
        }
    }
}

fn scan<T: Default>(root: &Path) -> Vec<Entry<T>> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for item in walker {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                warn!("Failed to list {}: {}", root.display(), err);
                let path = err.path().unwrap_or(root).to_path_buf();
                entries.push(Entry {
                    label: format!("[ Error opening directory {} ]", path.display()),
                    path,
                    is_dir: true,
                    encrypted: false,
                    suffix: String::new(),
                    tag: T::default(),
                });
                continue;
            }
        };

        let depth = item.depth();
        let is_dir = item.file_type().is_dir();
        let label = if depth == 0 {
            root.display().to_string()
        } else {
            format!(
                "{}  ╟─ {}",
                "  ║".repeat(depth - 1),
                item.file_name().to_string_lossy()
            )
        };
        entries.push(Entry {
            encrypted: !is_dir && xattr::is_encrypted(item.path()),
            path: item.into_path(),
            label,
            is_dir,
            suffix: String::new(),
            tag: T::default(),
        });
    }
    entries
}
