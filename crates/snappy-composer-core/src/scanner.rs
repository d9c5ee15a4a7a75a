use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::pattern::{set_start, FilePattern};

/// Identity of a set across scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetKey {
    pub run: u32,
    pub set_start: u32,
}

/// Files of one run sharing a set-start index. Rebuilt on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    pub run: u32,
    pub set_start: u32,
    pub files: BTreeSet<PathBuf>,
    /// The file whose index equals `set_start`, once it has been seen.
    pub first_file: Option<PathBuf>,
}

impl FileSet {
    pub fn new(run: u32, set_start: u32) -> Self {
        Self {
            run,
            set_start,
            files: BTreeSet::new(),
            first_file: None,
        }
    }

    pub fn key(&self) -> SetKey {
        SetKey {
            run: self.run,
            set_start: self.set_start,
        }
    }

    pub fn is_complete(&self, set_size: u32) -> bool {
        self.files.len() >= set_size as usize
    }

    /// `<output_dir>/<first file stem>.<extension>`, if the first file is known.
    pub fn output_path(&self, output_dir: &Path, extension: &str) -> Option<PathBuf> {
        let stem = self.first_file.as_ref()?.file_stem()?;
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(extension);
        Some(output_dir.join(name))
    }
}

/// List `dir` and group every file matching `pattern` into sets of `set_size`,
/// sorted by `(run, set_start)`.
pub fn scan_and_group(
    dir: &Path,
    pattern: &FilePattern,
    set_size: u32,
) -> io::Result<Vec<FileSet>> {
    let mut sets: BTreeMap<SetKey, FileSet> = BTreeMap::new();

    let entries = fs::read_dir(dir).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Error reading directory {}: {}", dir.display(), err),
        )
    })?;

    for entry_result in entries {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                error!("Error reading entry in directory {}: {}", dir.display(), err);
                continue;
            }
        };

        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(err) => {
                error!("Error getting file type for {}: {}", entry.path().display(), err);
                continue;
            }
        }

        let file_name = entry.file_name();
        let Some((run, index)) = file_name.to_str().and_then(|name| pattern.match_name(name))
        else {
            continue;
        };

        let set_start = set_start(index, set_size);
        let path = entry.path();
        let set = sets
            .entry(SetKey { run, set_start })
            .or_insert_with(|| FileSet::new(run, set_start));
        if index == set_start {
            set.first_file = Some(path.clone());
        }
        set.files.insert(path);
    }

    debug!("{} sets grouped from {}", sets.len(), dir.display());
    Ok(sets.into_values().collect())
}
