//! File trees as `relative path -> content`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use steward_core::hash::content_hash;
use steward_core::Result;
use tracing::debug;
use walkdir::WalkDir;

/// Directory names never considered part of a tree.
const ALWAYS_SKIPPED: &[&str] = &[".git"];

#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    pub hash: String,
    pub bytes: Vec<u8>,
}

impl FileEntry {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            hash: content_hash(&bytes),
            bytes,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SourceTree {
    root: PathBuf,
    files: BTreeMap<String, FileEntry>,
}

impl SourceTree {
    /// Walk `root`, skipping `.git` and any top-level directory in `exclude`.
    pub fn scan(root: impl AsRef<Path>, exclude: &[&str]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut files = BTreeMap::new();
        if !root.exists() {
            return Ok(Self { root, files });
        }

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                if e.depth() == 0 {
                    return true;
                }
                !(e.file_type().is_dir()
                    && (ALWAYS_SKIPPED.contains(&name.as_ref())
                        || (e.depth() == 1 && exclude.contains(&name.as_ref()))))
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative(&root, entry.path());
            files.insert(rel, FileEntry::new(std::fs::read(entry.path())?));
        }
        debug!(root = %root.display(), files = files.len(), "tree scanned");
        Ok(Self { root, files })
    }

    /// Read only `paths` under `root`; absent files are left out.
    pub fn read_existing<'p>(
        root: impl AsRef<Path>,
        paths: impl IntoIterator<Item = &'p str>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut files = BTreeMap::new();
        for rel in paths {
            match std::fs::read(root.join(rel)) {
                Ok(bytes) => {
                    files.insert(rel.to_string(), FileEntry::new(bytes));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self { root, files })
    }

    pub fn from_files<P, B>(root: impl AsRef<Path>, files: impl IntoIterator<Item = (P, B)>) -> Self
    where
        P: Into<String>,
        B: Into<Vec<u8>>,
    {
        Self {
            root: root.as_ref().to_path_buf(),
            files: files
                .into_iter()
                .map(|(p, b)| (p.into(), FileEntry::new(b.into())))
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
