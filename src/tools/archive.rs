//! Zip compression and extraction.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::{format_size, Finding, ToolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub compressed: u64,
}

fn require_zip(path: &Path) -> Result<(), ToolError> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if is_zip {
        Ok(())
    } else {
        Err(ToolError::UnsupportedArchive(path.to_path_buf()))
    }
}

/// Archive name for a path: `/` separated, relative to `base`
fn entry_name(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Pack files and directories into a zip. Directories keep their own name as the top-level folder.
pub fn compress(inputs: &[PathBuf], output: &Path) -> Result<Vec<ArchiveEntry>> {
    require_zip(output)?;
    for input in inputs {
        if !input.exists() {
            return Err(ToolError::NotFound(input.clone()).into());
        }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let output_canonical = output.canonicalize().ok();

    let mut written = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let canonical = input.canonicalize()?;
            let base = canonical.parent().unwrap_or(&canonical).to_path_buf();
            for entry in WalkDir::new(&canonical).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if output_canonical.as_deref() == Some(path) {
                    continue;
                }
                let Some(name) = entry_name(path, &base) else { continue };
                if entry.file_type().is_dir() {
                    zip.add_directory(format!("{}/", name), options)?;
                } else if entry.file_type().is_file() {
                    zip.start_file(name.clone(), options)?;
                    let size = io::copy(&mut File::open(path)?, &mut zip)?;
                    written.push(ArchiveEntry { name, size, compressed: 0 });
                }
            }
        } else {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "file".into());
            zip.start_file(name.clone(), options)?;
            let size = io::copy(&mut File::open(input)?, &mut zip)?;
            written.push(ArchiveEntry { name, size, compressed: 0 });
        }
    }
    zip.finish()?;
    tracing::info!("wrote {} entries to {}", written.len(), output.display());
    Ok(written)
}

/// Extract into `output_dir`; entries whose names would escape it are rejected
pub fn extract(archive_path: &Path, output_dir: &Path) -> Result<Vec<ArchiveEntry>> {
    require_zip(archive_path)?;
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(output_dir)?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            anyhow::bail!("archive entry escapes the output directory: {}", entry.name());
        };
        let dest = output_dir.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest).with_context(|| format!("creating {}", dest.display()))?;
        let size = io::copy(&mut entry, &mut out)?;
        extracted.push(ArchiveEntry {
            name: entry.name().to_string(),
            size,
            compressed: entry.compressed_size(),
        });
    }
    tracing::info!("extracted {} files to {}", extracted.len(), output_dir.display());
    Ok(extracted)
}

pub fn list(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    require_zip(archive_path)?;
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        entries.push(ArchiveEntry {
            name: entry.name().to_string(),
            size: entry.size(),
            compressed: entry.compressed_size(),
        });
    }
    Ok(entries)
}

pub fn findings(entries: &[ArchiveEntry], verb: &str) -> Vec<Finding> {
    let mut findings: Vec<Finding> = entries
        .iter()
        .map(|e| {
            let finding = Finding::ok(format!("{} ({})", e.name, format_size(e.size)));
            let finding = if e.compressed > 0 {
                finding.with_detail(format!("compressed to {}", format_size(e.compressed)))
            } else {
                finding
            };
            finding.with_tool("archive")
        })
        .collect();
    let total: u64 = entries.iter().map(|e| e.size).sum();
    findings.push(
        Finding::info(format!("{} {} files, {}", verb, entries.len(), format_size(total))).with_tool("archive"),
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn compress_and_extract_tree() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data");
        fs::create_dir_all(data.join("nested")).unwrap();
        fs::write(data.join("a.txt"), "alpha").unwrap();
        fs::write(data.join("nested/b.txt"), "beta").unwrap();
        let loose = root.path().join("loose.md");
        fs::write(&loose, "# readme").unwrap();

        let zip_path = root.path().join("out/bundle.zip");
        let written = compress(&[data.clone(), loose], &zip_path).unwrap();
        assert_eq!(written.len(), 3);

        let names: Vec<String> = list(&zip_path).unwrap().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"data/a.txt".to_string()));
        assert!(names.contains(&"data/nested/b.txt".to_string()));
        assert!(names.contains(&"loose.md".to_string()));

        let dest = root.path().join("restored");
        let extracted = extract(&zip_path, &dest).unwrap();
        assert_eq!(extracted.len(), 3);
        assert_eq!(fs::read_to_string(dest.join("data/nested/b.txt")).unwrap(), "beta");
        assert_eq!(fs::read_to_string(dest.join("loose.md")).unwrap(), "# readme");
    }

    #[test]
    fn rejects_non_zip_formats() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("a.txt");
        fs::write(&file, "x").unwrap();

        let err = compress(&[file.clone()], &root.path().join("out.tar.gz")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::UnsupportedArchive(_))));
        assert!(extract(&root.path().join("x.rar"), root.path()).is_err());
    }

    #[test]
    fn missing_input_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(compress(&[root.path().join("ghost")], &root.path().join("o.zip")).is_err());
    }

    #[test]
    fn extract_rejects_path_traversal() {
        let root = tempfile::tempdir().unwrap();
        let zip_path = root.path().join("evil.zip");
        {
            let mut zip = ZipWriter::new(File::create(&zip_path).unwrap());
            zip.start_file("../escape.txt", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"gotcha").unwrap();
            zip.finish().unwrap();
        }

        let dest = root.path().join("dest");
        assert!(extract(&zip_path, &dest).is_err());
        assert!(!root.path().join("escape.txt").exists());
    }
}
