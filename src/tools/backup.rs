//! Timestamped full and incremental backups of a file or directory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{copy_preserving_mtime, format_size, Finding, ToolError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Full,
    Incremental,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub destination: PathBuf,
    pub copied: usize,
    pub skipped: usize,
    pub bytes: u64,
}

pub fn backup(source: &Path, target: &Path, mode: BackupMode, timestamp_format: &str, dry_run: bool) -> Result<BackupSummary> {
    let stamp = Local::now().format(timestamp_format).to_string();
    backup_at(source, target, mode, &stamp, dry_run)
}

/// Same as [`backup`] with an explicit timestamp string
pub fn backup_at(source: &Path, target: &Path, mode: BackupMode, stamp: &str, dry_run: bool) -> Result<BackupSummary> {
    if !source.exists() {
        return Err(ToolError::NotFound(source.to_path_buf()).into());
    }
    if !dry_run {
        std::fs::create_dir_all(target).with_context(|| format!("creating {}", target.display()))?;
    }

    let summary = if source.is_file() {
        backup_file(source, target, mode, stamp, dry_run)?
    } else {
        backup_dir(source, target, mode, stamp, dry_run)?
    };
    tracing::info!(
        "backup {} -> {}: {} copied, {} unchanged",
        source.display(),
        summary.destination.display(),
        summary.copied,
        summary.skipped
    );
    Ok(summary)
}

fn name_parts(path: &Path) -> (String, String) {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    (stem, ext)
}

fn backup_file(source: &Path, target: &Path, mode: BackupMode, stamp: &str, dry_run: bool) -> Result<BackupSummary> {
    let (stem, ext) = name_parts(source);
    let infix = match mode {
        BackupMode::Full => "",
        BackupMode::Incremental => "inc_",
    };
    let destination = target.join(format!("{}_{}{}{}", stem, infix, stamp, ext));
    if destination.exists() {
        bail!("backup destination already exists: {}", destination.display());
    }

    if mode == BackupMode::Incremental {
        if let Some(previous) = latest_file_backup(target, &stem, &ext, stamp) {
            if same_content(source, &previous)? {
                return Ok(BackupSummary { destination: previous, copied: 0, skipped: 1, bytes: 0 });
            }
        }
    }

    let bytes = if dry_run {
        std::fs::metadata(source)?.len()
    } else {
        copy_preserving_mtime(source, &destination)?
    };
    Ok(BackupSummary { destination, copied: 1, skipped: 0, bytes })
}

/// `candidate` has the shape of `stamp`: same length, digits exactly where `stamp` has digits
fn looks_like_stamp(candidate: &str, stamp: &str) -> bool {
    candidate.len() == stamp.len()
        && candidate
            .chars()
            .zip(stamp.chars())
            .all(|(c, s)| c.is_ascii_digit() == s.is_ascii_digit() && (s.is_ascii_digit() || c == s))
}

fn latest_file_backup(target: &Path, stem: &str, ext: &str, stamp: &str) -> Option<PathBuf> {
    let prefix = format!("{}_", stem);
    let mut candidates: Vec<(String, PathBuf)> = std::fs::read_dir(target)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let rest = name.strip_prefix(&prefix)?.strip_suffix(ext)?;
            let found = rest.strip_prefix("inc_").unwrap_or(rest);
            looks_like_stamp(found, stamp).then(|| (found.to_string(), e.path()))
        })
        .collect();
    candidates.sort();
    candidates.pop().map(|(_, p)| p)
}

/// Earlier backups of a directory, newest first by their name's timestamp
fn previous_dir_backups(target: &Path, name: &str, stamp: &str) -> Vec<PathBuf> {
    let full = format!("{}_backup_", name);
    let inc = format!("{}_inc_", name);
    let mut found: Vec<(String, PathBuf)> = match std::fs::read_dir(target) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let dir_name = e.file_name().to_string_lossy().to_string();
                let found = dir_name.strip_prefix(&full).or_else(|| dir_name.strip_prefix(&inc))?;
                looks_like_stamp(found, stamp).then(|| (found.to_string(), e.path()))
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    found.sort();
    found.into_iter().rev().map(|(_, p)| p).collect()
}

fn backup_dir(source: &Path, target: &Path, mode: BackupMode, stamp: &str, dry_run: bool) -> Result<BackupSummary> {
    let name = source
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "backup".into());
    let label = match mode {
        BackupMode::Full => "backup",
        BackupMode::Incremental => "inc",
    };
    let destination = target.join(format!("{}_{}_{}", name, label, stamp));
    if destination.exists() {
        bail!("backup destination already exists: {}", destination.display());
    }

    let previous = match mode {
        BackupMode::Full => Vec::new(),
        BackupMode::Incremental => previous_dir_backups(target, &name, stamp),
    };

    let mut summary = BackupSummary { destination: destination.clone(), ..Default::default() };
    if !dry_run {
        std::fs::create_dir_all(&destination)?;
    }

    // A target nested in the source must not be backed up into itself
    let target_canonical = target.canonicalize().ok();
    let walker = WalkDir::new(source).sort_by_file_name().into_iter().filter_entry(|e| {
        match (&target_canonical, e.path().canonicalize()) {
            (Some(t), Ok(p)) => p != *t,
            _ => true,
        }
    });
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(source)?;

        if let Some(prior) = previous.iter().map(|b| b.join(rel)).find(|p| p.is_file()) {
            if same_content(entry.path(), &prior)? {
                summary.skipped += 1;
                continue;
            }
        }

        let dest = destination.join(rel);
        let bytes = if dry_run {
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            copy_preserving_mtime(entry.path(), &dest)
                .with_context(|| format!("copying {}", entry.path().display()))?
        };
        tracing::debug!("backed up {}", rel.display());
        summary.copied += 1;
        summary.bytes += bytes;
    }
    Ok(summary)
}

/// Byte-for-byte comparison
pub fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let (ma, mb) = (std::fs::metadata(a)?, std::fs::metadata(b)?);
    if ma.len() != mb.len() {
        return Ok(false);
    }
    let mut ra = BufReader::new(File::open(a)?);
    let mut rb = BufReader::new(File::open(b)?);
    let mut ba = [0u8; 8192];
    let mut bb = [0u8; 8192];
    loop {
        let n = ra.read(&mut ba)?;
        if n == 0 {
            return Ok(true);
        }
        rb.read_exact(&mut bb[..n])?;
        if ba[..n] != bb[..n] {
            return Ok(false);
        }
    }
}

pub fn findings(summary: &BackupSummary, dry_run: bool) -> Vec<Finding> {
    let verb = if dry_run { "Would copy" } else { "Copied" };
    let mut findings = vec![Finding::ok(format!(
        "{} {} files ({})",
        verb,
        summary.copied,
        format_size(summary.bytes)
    ))
    .with_detail(summary.destination.display().to_string())
    .with_tool("backup")];
    if summary.skipped > 0 {
        findings.push(Finding::info(format!("{} unchanged files skipped", summary.skipped)).with_tool("backup"));
    }
    findings
}
