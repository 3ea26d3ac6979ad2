use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MirrorError, Result};

/// Compress the mirrored tree into a deflate zip at `archive_path`.
///
/// Entry names are root-relative with forward slashes and written in sorted
/// order, so the same tree always produces the same entry listing. If
/// anything fails the partial archive is removed; the tree on disk is the
/// fallback and is never touched.
pub fn archive_tree(root: &Path, archive_path: &Path) -> Result<()> {
    match write_archive(root, archive_path) {
        Ok(count) => {
            info!(path = %archive_path.display(), entries = count, "archive written");
            Ok(())
        }
        Err(err) => {
            let _ = std::fs::remove_file(archive_path);
            Err(err)
        }
    }
}

fn write_archive(root: &Path, archive_path: &Path) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort();

    let out = File::create(archive_path).map_err(|e| MirrorError::fs(archive_path.to_path_buf(), e))?;
    let mut writer = ZipWriter::new(out);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for rel in &files {
        let source = root.join(rel);
        debug!(entry = %rel.display(), "adding to archive");
        writer
            .start_file(entry_name(rel), options)
            .map_err(|e| MirrorError::archive(archive_path.to_path_buf(), e))?;
        let mut input = File::open(&source).map_err(|e| MirrorError::fs(source.clone(), e))?;
        io::copy(&mut input, &mut writer)
            .map_err(|e| MirrorError::archive(archive_path.to_path_buf(), ZipError::from(e)))?;
    }
    writer
        .finish()
        .map_err(|e| MirrorError::archive(archive_path.to_path_buf(), e))?;
    Ok(files.len())
}

/// Walk `dir` and push every file path relative to `root`.
fn collect_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| MirrorError::fs(dir.to_path_buf(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| MirrorError::fs(dir.to_path_buf(), e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(())
}

fn entry_name(rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}
