//! Watch a directory tree and report file changes as they happen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;

use super::{Finding, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    MovedFrom,
    MovedTo,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::MovedFrom => "moved_from",
            ChangeKind::MovedTo => "moved_to",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: DateTime<Local>,
    /// Size after the change; 0 once the file is gone
    pub size: u64,
}

/// Include/ignore globs, matched against the trailing components of a path
/// (`*.rs` looks at the file name, `target/*` at the last two components)
#[derive(Debug, Clone)]
pub struct EventFilter {
    patterns: Vec<glob::Pattern>,
    ignore: Vec<glob::Pattern>,
}

fn compile(raw: &[String]) -> Result<Vec<glob::Pattern>, ToolError> {
    raw.iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| ToolError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn tail_matches(pattern: &glob::Pattern, path: &Path) -> bool {
    let depth = pattern.as_str().split('/').filter(|s| !s.is_empty()).count().max(1);
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.len() < depth {
        return false;
    }
    pattern.matches(&parts[parts.len() - depth..].join("/"))
}

impl EventFilter {
    /// No include patterns means every file
    pub fn new(patterns: &[String], ignore: &[String]) -> Result<Self, ToolError> {
        Ok(Self {
            patterns: compile(patterns)?,
            ignore: compile(ignore)?,
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if self.ignore.iter().any(|p| tail_matches(p, path)) {
            return false;
        }
        self.patterns.is_empty() || self.patterns.iter().any(|p| tail_matches(p, path))
    }
}

/// File-level changes carried by one notify event; directories are dropped
pub fn classify(event: &Event) -> Vec<(ChangeKind, PathBuf)> {
    let files = |kind: ChangeKind| -> Vec<(ChangeKind, PathBuf)> {
        event
            .paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| (kind, p.clone()))
            .collect()
    };
    match &event.kind {
        EventKind::Create(_) => files(ChangeKind::Created),
        EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Remove(_) => event.paths.iter().map(|p| (ChangeKind::Deleted, p.clone())).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|p| (ChangeKind::MovedFrom, p.clone())).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => files(ChangeKind::MovedTo),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            if let [from, to, ..] = event.paths.as_slice() {
                if !to.is_dir() {
                    out.push((ChangeKind::MovedFrom, from.clone()));
                    out.push((ChangeKind::MovedTo, to.clone()));
                }
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| {
                let kind = if p.exists() { ChangeKind::MovedTo } else { ChangeKind::MovedFrom };
                (kind, p.clone())
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => files(ChangeKind::Modified),
        _ => Vec::new(),
    }
}

/// notify watcher feeding a tokio channel
pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
    receiver: mpsc::Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    pub fn new(root: &Path, recursive: bool) -> Result<Self> {
        if !root.exists() {
            return Err(ToolError::NotFound(root.to_path_buf()).into());
        }
        let (tx, rx) = mpsc::channel(256);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })
        .context("starting file watcher")?;
        let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        watcher
            .watch(root, mode)
            .with_context(|| format!("watching {}", root.display()))?;
        tracing::info!("watching {} (recursive: {})", root.display(), recursive);
        Ok(Self { _watcher: watcher, receiver: rx })
    }

    pub async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        self.receiver.recv().await
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub patterns: Vec<String>,
    pub ignore: Vec<String>,
    pub recursive: bool,
    /// Shell command run per event; `{file}`, `{type}` and `{timestamp}` are substituted
    pub command: Option<String>,
}

pub fn render_command(template: &str, event: &FileEvent) -> String {
    template
        .replace("{file}", &event.path.display().to_string())
        .replace("{type}", event.kind.label())
        .replace("{timestamp}", &event.timestamp.to_rfc3339())
}

async fn run_command(template: &str, event: &FileEvent) {
    let command = render_command(template, event);
    match tokio::process::Command::new("sh").arg("-c").arg(&command).output().await {
        Ok(o) if o.status.success() => tracing::info!("ran `{}`", command),
        Ok(o) => tracing::warn!("`{}` failed: {}", command, String::from_utf8_lossy(&o.stderr).trim()),
        Err(e) => tracing::warn!("`{}` could not start: {}", command, e),
    }
}

/// Collect events until `duration` elapses (or Ctrl-C when there is none)
pub async fn watch(root: &Path, opts: &WatchOptions, duration: Option<Duration>) -> Result<Vec<FileEvent>> {
    let filter = EventFilter::new(&opts.patterns, &opts.ignore)?;
    let mut watcher = FileWatcher::new(root, opts.recursive)?;
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut events = Vec::new();
    loop {
        let next = tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            next = watcher.next_event() => next,
        };
        let raw = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!("watch error: {}", e);
                continue;
            }
            None => break,
        };
        for (kind, path) in classify(&raw) {
            if !filter.accepts(&path) {
                continue;
            }
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let event = FileEvent { kind, path, timestamp: Local::now(), size };
            tracing::info!("{}: {}", kind.label(), event.path.display());
            if let Some(template) = &opts.command {
                run_command(template, &event).await;
            }
            events.push(event);
        }
    }
    Ok(events)
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchReport {
    pub generated_at: DateTime<Local>,
    pub root: PathBuf,
    pub total: usize,
    pub by_type: BTreeMap<&'static str, usize>,
    pub events: Vec<FileEvent>,
}

impl WatchReport {
    pub fn new(root: &Path, events: Vec<FileEvent>) -> Self {
        let mut by_type = BTreeMap::new();
        for e in &events {
            *by_type.entry(e.kind.label()).or_insert(0) += 1;
        }
        Self {
            generated_at: Local::now(),
            root: root.to_path_buf(),
            total: events.len(),
            by_type,
            events,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Totals per change type and the ten latest events
pub fn findings(report: &WatchReport) -> Vec<Finding> {
    let mut findings = vec![Finding::info(format!("{} events", report.total)).with_tool("watch")];
    for (kind, count) in &report.by_type {
        findings.push(Finding::info(format!("{}: {}", kind, count)).with_tool("watch"));
    }
    let skip = report.events.len().saturating_sub(10);
    for e in &report.events[skip..] {
        findings.push(
            Finding::ok(format!("[{}] {}: {}", e.timestamp.format("%H:%M:%S"), e.kind.label(), e.path.display()))
                .with_tool("watch"),
        );
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;

    #[test]
    fn filter_matches_path_tails() {
        let f = EventFilter::new(&["*.rs".into(), "docs/*.md".into()], &["target/*".into(), "*.swp".into()]).unwrap();
        assert!(f.accepts(Path::new("/p/src/main.rs")));
        assert!(f.accepts(Path::new("/p/docs/intro.md")));
        assert!(!f.accepts(Path::new("/p/README.md")));
        assert!(!f.accepts(Path::new("/p/target/build.rs")));
        assert!(!f.accepts(Path::new("/p/src/.main.rs.swp")));

        let all = EventFilter::new(&[], &[]).unwrap();
        assert!(all.accepts(Path::new("anything")));
        assert!(EventFilter::new(&["[".into()], &[]).is_err());
    }

    #[test]
    fn classify_maps_notify_kinds() {
        let p = PathBuf::from("/nowhere/a.txt");
        let q = PathBuf::from("/nowhere/b.txt");
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(p.clone());
        assert_eq!(classify(&created), vec![(ChangeKind::Created, p.clone())]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(p.clone())
            .add_path(q.clone());
        assert_eq!(classify(&renamed), vec![(ChangeKind::MovedFrom, p.clone()), (ChangeKind::MovedTo, q)]);

        let removed_dir = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(p.clone());
        assert!(classify(&removed_dir).is_empty());
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(p);
        assert!(classify(&access).is_empty());
    }

    #[test]
    fn command_placeholders() {
        let event = FileEvent {
            kind: ChangeKind::Modified,
            path: PathBuf::from("/d/x.txt"),
            timestamp: Local::now(),
            size: 3,
        };
        let cmd = render_command("echo {type} {file}", &event);
        assert_eq!(cmd, "echo modified /d/x.txt");
    }

    #[test]
    fn report_counts_by_type() {
        let at = Local::now();
        let ev = |kind| FileEvent { kind, path: PathBuf::from("f"), timestamp: at, size: 0 };
        let report = WatchReport::new(
            Path::new("/r"),
            vec![ev(ChangeKind::Created), ev(ChangeKind::Modified), ev(ChangeKind::Modified)],
        );
        assert_eq!(report.total, 3);
        assert_eq!(report.by_type["modified"], 2);
        assert_eq!(findings(&report).len(), 1 + 2 + 3);
    }

    #[tokio::test]
    async fn watch_reports_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let writer_root = root.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            std::fs::write(writer_root.join("new.txt"), "hi").unwrap();
            std::fs::write(writer_root.join("scratch.tmp"), "x").unwrap();
        });

        let opts = WatchOptions { ignore: vec!["*.tmp".into()], recursive: true, ..Default::default() };
        let events = watch(&root, &opts, Some(Duration::from_millis(1500))).await.unwrap();

        assert!(events
            .iter()
            .any(|e| e.kind == ChangeKind::Created && e.path.file_name().unwrap() == "new.txt"));
        assert!(events.iter().all(|e| e.path.extension().map_or(true, |x| x != "tmp")));
    }

    #[test]
    fn missing_root_is_rejected() {
        assert!(FileWatcher::new(Path::new("/definitely/not/here"), true).is_err());
    }
}
