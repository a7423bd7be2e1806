//! Duplicate file detection.
//!
//! Files are grouped by size first; only sizes shared by more than one file
//! are hashed. Hash groups with more than one member are duplicates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::checksum::{hash_file, HashAlgorithm};
use super::{format_size, require_dir, Finding, ToolError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    /// Keep the file with the oldest modification time
    #[default]
    Oldest,
    /// Keep the file with the newest modification time
    Newest,
    /// Keep the file with the shortest path
    ShortestPath,
}

#[derive(Debug, Clone, Default)]
pub struct DedupFilter {
    /// Lowercase extensions with a leading dot; empty means all files
    pub extensions: Vec<String>,
    pub min_size: u64,
    pub max_size: Option<u64>,
}

impl DedupFilter {
    pub fn normalize_extensions(raw: &[String]) -> Vec<String> {
        raw.iter()
            .map(|e| {
                let e = e.trim().to_lowercase();
                if e.starts_with('.') { e } else { format!(".{}", e) }
            })
            .collect()
    }

    fn accepts(&self, path: &Path, size: u64) -> bool {
        if size < self.min_size {
            return false;
        }
        if let Some(max) = self.max_size {
            if size > max {
                return false;
            }
        }
        if self.extensions.is_empty() {
            return true;
        }
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        self.extensions.contains(&ext)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    pub files: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn reclaimable(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }
}

#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_seen: usize,
    pub files_hashed: usize,
}

/// Group candidate files under `dir` by size
pub fn scan(dir: &Path, filter: &DedupFilter) -> Result<(HashMap<u64, Vec<PathBuf>>, usize), ToolError> {
    require_dir(dir)?;
    let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();
    let mut seen = 0;

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::debug!("cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !filter.accepts(entry.path(), size) {
            continue;
        }
        seen += 1;
        by_size.entry(size).or_default().push(entry.into_path());
    }
    Ok((by_size, seen))
}

/// Duplicate groups sorted by reclaimable space, largest first
pub fn find_duplicates(
    dir: &Path,
    filter: &DedupFilter,
    algo: HashAlgorithm,
    chunk_size: usize,
) -> Result<(Vec<DuplicateGroup>, ScanStats), ToolError> {
    let (by_size, seen) = scan(dir, filter)?;
    let mut stats = ScanStats { files_seen: seen, files_hashed: 0 };
    let mut by_hash: HashMap<(u64, String), Vec<PathBuf>> = HashMap::new();

    for (size, files) in by_size.into_iter().filter(|(_, files)| files.len() > 1) {
        for file in files {
            stats.files_hashed += 1;
            match hash_file(&file, algo, chunk_size) {
                Ok(hash) => by_hash.entry((size, hash)).or_default().push(file),
                Err(e) => tracing::warn!("cannot hash {}: {}", file.display(), e),
            }
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_hash
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|((size, hash), mut files)| {
            files.sort();
            DuplicateGroup { hash, size, files }
        })
        .collect();
    groups.sort_by(|a, b| b.reclaimable().cmp(&a.reclaimable()).then_with(|| a.files.cmp(&b.files)));

    tracing::info!(
        "{} duplicate groups among {} files ({} hashed)",
        groups.len(),
        stats.files_seen,
        stats.files_hashed
    );
    Ok((groups, stats))
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// The file that survives deletion; ties fall back to path order
pub fn select_keeper(group: &DuplicateGroup, keep: KeepStrategy) -> &Path {
    let files = &group.files;
    let chosen = match keep {
        KeepStrategy::Oldest => files.iter().min_by(|a, b| modified(a).cmp(&modified(b)).then_with(|| a.cmp(b))),
        KeepStrategy::Newest => files.iter().max_by(|a, b| modified(a).cmp(&modified(b)).then_with(|| b.cmp(a))),
        KeepStrategy::ShortestPath => files
            .iter()
            .min_by(|a, b| a.as_os_str().len().cmp(&b.as_os_str().len()).then_with(|| a.cmp(b))),
    };
    chosen.map(|p| p.as_path()).unwrap_or_else(|| Path::new(""))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    WouldDelete,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub path: PathBuf,
    pub kept: PathBuf,
    pub outcome: DeleteOutcome,
}

pub fn delete_duplicates(groups: &[DuplicateGroup], keep: KeepStrategy, dry_run: bool) -> Vec<DeleteResult> {
    let mut results = Vec::new();
    for group in groups {
        let keeper = select_keeper(group, keep).to_path_buf();
        for file in group.files.iter().filter(|f| **f != keeper) {
            let outcome = if dry_run {
                DeleteOutcome::WouldDelete
            } else {
                match std::fs::remove_file(file) {
                    Ok(()) => DeleteOutcome::Deleted,
                    Err(e) => {
                        tracing::warn!("cannot delete {}: {}", file.display(), e);
                        DeleteOutcome::Failed(e.to_string())
                    }
                }
            };
            results.push(DeleteResult {
                path: file.clone(),
                kept: keeper.clone(),
                outcome,
            });
        }
    }
    results
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DedupReport {
    pub scan_time: String,
    pub algorithm: HashAlgorithm,
    pub total_duplicate_groups: usize,
    pub total_duplicate_files: usize,
    pub reclaimable_bytes: u64,
    pub groups: Vec<DuplicateGroup>,
}

impl DedupReport {
    pub fn new(groups: &[DuplicateGroup], algorithm: HashAlgorithm) -> Self {
        Self {
            scan_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            algorithm,
            total_duplicate_groups: groups.len(),
            total_duplicate_files: groups.iter().map(|g| g.files.len()).sum(),
            reclaimable_bytes: groups.iter().map(|g| g.reclaimable()).sum(),
            groups: groups.to_vec(),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub fn group_findings(groups: &[DuplicateGroup]) -> Vec<Finding> {
    if groups.is_empty() {
        return vec![Finding::ok("No duplicate files found").with_tool("dedup")];
    }
    let mut findings: Vec<Finding> = groups
        .iter()
        .map(|g| {
            let mut lines: Vec<String> = g.files.iter().take(5).map(|f| f.display().to_string()).collect();
            if g.files.len() > 5 {
                lines.push(format!("... {} more", g.files.len() - 5));
            }
            Finding::warning(format!(
                "{} copies of {} ({} reclaimable)",
                g.files.len(),
                format_size(g.size),
                format_size(g.reclaimable())
            ))
            .with_detail(lines.join("\n      "))
            .with_tool("dedup")
        })
        .collect();
    let total: u64 = groups.iter().map(|g| g.reclaimable()).sum();
    findings.push(
        Finding::info(format!("{} duplicate groups, {} reclaimable", groups.len(), format_size(total)))
            .with_tool("dedup"),
    );
    findings
}

pub fn delete_findings(results: &[DeleteResult]) -> Vec<Finding> {
    results
        .iter()
        .map(|r| {
            let kept = format!("kept {}", r.kept.display());
            let finding = match &r.outcome {
                DeleteOutcome::Deleted => Finding::ok(format!("Deleted {}", r.path.display())).with_detail(kept),
                DeleteOutcome::WouldDelete => {
                    Finding::info(format!("Would delete {}", r.path.display())).with_detail(kept)
                }
                DeleteOutcome::Failed(e) => {
                    Finding::error(format!("Failed to delete {}", r.path.display())).with_detail(e.clone())
                }
            };
            finding.with_tool("dedup")
        })
        .collect()
}
