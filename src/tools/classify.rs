//! Sort files into folders by extension or by a JSON rule file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{copy_preserving_mtime, require_dir, Finding};

pub const NO_EXTENSION: &str = "no_ext";
pub const UNMATCHED: &str = "other";

/// One rule; exactly one of `ext`, `contains`, `date` is consulted, in that order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
    pub ext: Option<String>,
    pub contains: Option<String>,
    /// `YYYY-MM-DD` of the file's local modification date
    pub date: Option<String>,
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading rules {}: {}", path.display(), e))?;
        let rules: RuleSet = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing rules {}: {}", path.display(), e))?;
        Ok(rules)
    }

    /// Folder of the first matching rule, or `other`
    pub fn folder_for(&self, path: &Path) -> String {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let ext = extension_of(path);
        let mut date: Option<String> = None;

        for rule in &self.rules {
            let matched = if let Some(want) = &rule.ext {
                let want = want.trim_start_matches('.');
                ext.as_deref().map(|e| e.eq_ignore_ascii_case(want)).unwrap_or(false).then(|| want.to_string())
            } else if let Some(needle) = &rule.contains {
                name.contains(needle.as_str()).then(|| needle.clone())
            } else if let Some(want) = &rule.date {
                let actual = date.get_or_insert_with(|| modified_date(path));
                (actual.as_str() == want.as_str()).then(|| want.clone())
            } else {
                None
            };
            if let Some(default_folder) = matched {
                return rule.folder.clone().unwrap_or(default_folder);
            }
        }
        UNMATCHED.to_string()
    }
}

#[derive(Debug, Clone)]
pub enum ClassifyMode {
    ByExtension,
    ByRules(RuleSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyPlan {
    pub from: PathBuf,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyOutcome {
    Copied(PathBuf),
    Moved(PathBuf),
    Planned(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ClassifyResult {
    pub from: PathBuf,
    pub outcome: ClassifyOutcome,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_string()).filter(|e| !e.is_empty())
}

fn modified_date(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Decide a folder for every file under `source`; `target` is skipped when nested inside it
pub fn plan(source: &Path, target: &Path, mode: &ClassifyMode) -> anyhow::Result<Vec<ClassifyPlan>> {
    require_dir(source)?;
    let target_canonical = target.canonicalize().ok();

    let mut plans = Vec::new();
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
        let path = entry.into_path();
        let folder = match mode {
            ClassifyMode::ByExtension => extension_of(&path).unwrap_or_else(|| NO_EXTENSION.to_string()),
            ClassifyMode::ByRules(rules) => rules.folder_for(&path),
        };
        tracing::debug!("{} -> {}", path.display(), folder);
        plans.push(ClassifyPlan { from: path, folder });
    }
    Ok(plans)
}

/// First free `name`, `name_1`, `name_2`, ... in `dir` (suffix goes before the extension)
pub fn unique_destination(dir: &Path, file_name: &str, taken: &HashSet<PathBuf>) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() && !taken.contains(&candidate) {
        return candidate;
    }
    let as_path = Path::new(file_name);
    let stem = as_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = as_path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() && !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Cross-device moves need copy + remove
            copy_preserving_mtime(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

pub fn execute(plans: &[ClassifyPlan], target: &Path, move_files: bool, dry_run: bool) -> Vec<ClassifyResult> {
    let mut taken: HashSet<PathBuf> = HashSet::new();
    let mut results = Vec::with_capacity(plans.len());

    for plan in plans {
        let dir = target.join(&plan.folder);
        let name = plan.from.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let dest = unique_destination(&dir, &name, &taken);
        taken.insert(dest.clone());

        let outcome = if dry_run {
            ClassifyOutcome::Planned(dest)
        } else {
            let result = std::fs::create_dir_all(&dir).and_then(|_| {
                if move_files {
                    move_file(&plan.from, &dest)
                } else {
                    copy_preserving_mtime(&plan.from, &dest).map(|_| ())
                }
            });
            match result {
                Ok(()) if move_files => ClassifyOutcome::Moved(dest),
                Ok(()) => ClassifyOutcome::Copied(dest),
                Err(e) => {
                    tracing::warn!("cannot place {}: {}", plan.from.display(), e);
                    ClassifyOutcome::Failed(e.to_string())
                }
            }
        };
        results.push(ClassifyResult { from: plan.from.clone(), outcome });
    }
    results
}

pub fn findings(results: &[ClassifyResult]) -> Vec<Finding> {
    let mut findings: Vec<Finding> = results
        .iter()
        .map(|r| {
            let from = r.from.display();
            let finding = match &r.outcome {
                ClassifyOutcome::Copied(to) => Finding::ok(format!("{} → {}", from, to.display())),
                ClassifyOutcome::Moved(to) => Finding::ok(format!("{} ⇒ {}", from, to.display())),
                ClassifyOutcome::Planned(to) => Finding::info(format!("{} → {}", from, to.display())),
                ClassifyOutcome::Failed(e) => Finding::error(from.to_string()).with_detail(e.clone()),
            };
            finding.with_tool("classify")
        })
        .collect();
    let failed = results.iter().filter(|r| matches!(r.outcome, ClassifyOutcome::Failed(_))).count();
    findings.push(
        Finding::info(format!("{} files classified, {} failed", results.len() - failed, failed)).with_tool("classify"),
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, name).unwrap();
        path
    }

    #[test]
    fn by_extension_copies_into_ext_folders() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "a.jpg");
        write(src.path(), "nested/b.txt");
        write(src.path(), "Makefile");

        let plans = plan(src.path(), out.path(), &ClassifyMode::ByExtension).unwrap();
        let results = execute(&plans, out.path(), false, false);

        assert!(results.iter().all(|r| matches!(r.outcome, ClassifyOutcome::Copied(_))));
        assert!(out.path().join("jpg/a.jpg").exists());
        assert!(out.path().join("txt/b.txt").exists());
        assert!(out.path().join("no_ext/Makefile").exists());
        assert!(src.path().join("a.jpg").exists());
    }

    #[test]
    fn rules_first_match_wins_and_unmatched_go_to_other() {
        let rules: RuleSet = serde_json::from_str(
            r#"{"rules": [
                {"ext": "jpg", "folder": "images"},
                {"contains": "report"},
                {"ext": "pdf", "folder": "docs"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(rules.folder_for(Path::new("/x/cat.JPG")), "images");
        assert_eq!(rules.folder_for(Path::new("/x/report_q1.pdf")), "report");
        assert_eq!(rules.folder_for(Path::new("/x/manual.pdf")), "docs");
        assert_eq!(rules.folder_for(Path::new("/x/song.mp3")), "other");
    }

    #[test]
    fn date_rule_uses_modification_day() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "log.txt");
        let today = Local::now().format("%Y-%m-%d").to_string();
        let rules = RuleSet {
            rules: vec![Rule { date: Some(today), folder: Some("today".into()), ..Default::default() }],
        };
        assert_eq!(rules.folder_for(&file), "today");
    }

    #[test]
    fn move_with_name_collisions() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let a = write(src.path(), "one/data.csv");
        let b = write(src.path(), "two/data.csv");
        write(out.path(), "csv/data.csv");

        let plans = plan(src.path(), out.path(), &ClassifyMode::ByExtension).unwrap();
        let results = execute(&plans, out.path(), true, false);

        assert_eq!(results.len(), 2);
        assert!(!a.exists() && !b.exists());
        assert!(out.path().join("csv/data_1.csv").exists());
        assert!(out.path().join("csv/data_2.csv").exists());
    }

    #[test]
    fn dry_run_plans_without_touching_disk() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "a.md");
        write(src.path(), "sub/a.md");

        let plans = plan(src.path(), out.path(), &ClassifyMode::ByExtension).unwrap();
        let results = execute(&plans, out.path(), true, true);

        let targets: Vec<PathBuf> = results
            .iter()
            .map(|r| match &r.outcome {
                ClassifyOutcome::Planned(p) => p.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(targets, vec![out.path().join("md/a.md"), out.path().join("md/a_1.md")]);
        assert!(!out.path().join("md").exists());
    }

    #[test]
    fn nested_target_is_not_reclassified() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt");
        write(src.path(), "sorted/txt/old.txt");

        let target = src.path().join("sorted");
        let plans = plan(src.path(), &target, &ClassifyMode::ByExtension).unwrap();
        assert_eq!(plans.len(), 1);
        assert!(plans[0].from.ends_with("a.txt"));
    }
}
