use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;
use zip::read::ZipFile;

use crate::error::RatError;

fn open_archive(zip_path: &Path) -> Result<ZipArchive<File>, RatError> {
    let file = File::open(zip_path)
        .map_err(|err| RatError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    ZipArchive::new(file)
        .map_err(|err| RatError::Archive(format!("{}: {err}", zip_path.display())))
}

fn fs_error(action: &str, path: &Path, err: io::Error) -> RatError {
    RatError::Filesystem(format!("{action} {}: {err}", path.display()))
}

/// A failed read of the entry means the archive is damaged; anything else is on our side.
fn copy_error(entry: &str, err: io::Error) -> RatError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            RatError::Archive(format!("entry {entry}: {err}"))
        }
        _ => RatError::Filesystem(format!("extract {entry}: {err}")),
    }
}

/// Unpacks every entry below `target_dir` and returns the number of files written.
/// Entries whose names escape `target_dir` abort the extraction.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, RatError> {
    let mut archive = open_archive(zip_path)?;
    let mut written = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| RatError::Archive(err.to_string()))?;
        let destination = entry_destination(&entry, target_dir)?;

        if entry.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|err| fs_error("create", &destination, err))?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| fs_error("create", parent, err))?;
        }
        let mut out =
            File::create(&destination).map_err(|err| fs_error("create", &destination, err))?;
        io::copy(&mut entry, &mut out).map_err(|err| copy_error(entry.name(), err))?;
        written += 1;
    }
    Ok(written)
}

fn entry_destination<R: io::Read>(
    entry: &ZipFile<'_, R>,
    target_dir: &Path,
) -> Result<PathBuf, RatError> {
    entry
        .enclosed_name()
        .map(|relative| target_dir.join(relative))
        .ok_or_else(|| {
            RatError::Archive(format!("entry {} escapes the extraction folder", entry.name()))
        })
}

/// Reads every file entry to the end so CRC and length mismatches surface.
pub fn validate_zip(zip_path: &Path) -> Result<(), RatError> {
    let mut archive = open_archive(zip_path)?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| RatError::Archive(err.to_string()))?;
        if !entry.is_dir() {
            io::copy(&mut entry, &mut io::sink())
                .map_err(|err| RatError::Archive(format!("entry {}: {err}", entry.name())))?;
        }
    }
    Ok(())
}

/// Depth-first walk over the regular files below a root. Unreadable directories are skipped.
pub struct WalkFiles {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl Iterator for WalkFiles {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(file) = self.files.pop() {
                return Some(file);
            }
            let dir = self.dirs.pop()?;
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    self.dirs.push(path);
                } else {
                    self.files.push(path);
                }
            }
        }
    }
}

pub fn walk_files(root: &Path) -> WalkFiles {
    WalkFiles {
        dirs: vec![root.to_path_buf()],
        files: Vec::new(),
    }
}

/// Recursively collects files whose name ends with `suffix` (ASCII case-insensitive), sorted.
pub fn find_files(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let suffix = suffix.to_ascii_lowercase();
    let mut out = walk_files(root)
        .filter(|path| has_suffix(path, &suffix))
        .collect::<Vec<_>>();
    out.sort();
    out
}

/// Stops at the first match.
pub fn contains_file(root: &Path, suffix: &str) -> bool {
    let suffix = suffix.to_ascii_lowercase();
    walk_files(root).any(|path| has_suffix(&path, &suffix))
}

/// Non-recursive variant: files directly inside `dir`.
pub fn list_files(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let suffix = suffix.to_ascii_lowercase();
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_suffix(path, &suffix))
        .collect::<Vec<_>>();
    out.sort();
    out
}

fn has_suffix(path: &Path, lower_suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_ascii_lowercase().ends_with(lower_suffix))
        .unwrap_or(false)
}
