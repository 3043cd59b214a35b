//! In-place unpacking of downloaded single-file archives.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use log::info;

use crate::constants::ARCHIVE_EXTS;

/// True when the name carries one of the suffixes we unpack after
/// download.
pub fn is_archive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_EXTS.iter().any(|ext| lower.ends_with(ext))
}

/// Extracts an archive into `dest`. The caller deletes the archive file
/// afterwards; extraction never touches it.
pub fn unpack_archive(path: &Path, dest: &Path) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let file =
        File::open(path).with_context(|| format!("Failed to open archive: {}", path.display()))?;

    if name.ends_with(".zip") {
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("Not a zip archive: {}", path.display()))?;
        archive
            .extract(dest)
            .with_context(|| format!("Failed to extract {}", path.display()))?;
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        tar::Archive::new(GzDecoder::new(file))
            .unpack(dest)
            .with_context(|| format!("Failed to extract {}", path.display()))?;
    } else if name.ends_with(".tar") {
        tar::Archive::new(file)
            .unpack(dest)
            .with_context(|| format!("Failed to extract {}", path.display()))?;
    } else {
        bail!("Unsupported archive: {}", path.display());
    }

    info!("Unpacked {} into {}", path.display(), dest.display());
    Ok(())
}
