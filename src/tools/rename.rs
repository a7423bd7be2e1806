//! Batch renamer
//!
//! Builds a list of rename plans from one of three modes (regex substitution,
//! name template, prefix/suffix) and then previews or applies them. Existing
//! files are never overwritten.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{require_dir, Finding, ToolError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaseMode {
    #[default]
    None,
    Lower,
    Upper,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl RenamePlan {
    fn new(from: &Path, new_name: &str) -> Self {
        let parent = from.parent().unwrap_or_else(|| Path::new(""));
        Self {
            from: from.to_path_buf(),
            to: parent.join(new_name),
        }
    }

    fn from_name(&self) -> String {
        display_name(&self.from)
    }

    fn to_name(&self) -> String {
        display_name(&self.to)
    }

    /// The target must stay in the source's directory and have a usable name
    fn target_is_valid(&self) -> bool {
        let same_dir = self.to.parent() == self.from.parent();
        let named = self
            .to
            .file_name()
            .map(|n| !n.is_empty() && n != "." && n != "..")
            .unwrap_or(false);
        same_dir && named
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    Previewed,
    SkippedUnchanged,
    SkippedExists,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RenameResult {
    pub plan: RenamePlan,
    pub outcome: RenameOutcome,
}

/// Files in `dir` matching a glob pattern, sorted by path
pub fn collect_files(dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>, ToolError> {
    require_dir(dir)?;

    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let full = if recursive {
        format!("{}/**/{}", base, pattern)
    } else {
        format!("{}/{}", base, pattern)
    };

    let paths = glob::glob(&full).map_err(|e| ToolError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::debug!("skipping unreadable entry: {}", e),
        }
    }
    files.sort();
    files.dedup();
    tracing::info!("{} files match `{}` in {}", files.len(), pattern, dir.display());
    Ok(files)
}

/// Regex substitution over each file name; `$1` / `${name}` expand capture groups
pub fn plan_regex(files: &[PathBuf], pattern: &str, replacement: &str) -> Result<Vec<RenamePlan>, ToolError> {
    let regex = Regex::new(pattern).map_err(|e| ToolError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    Ok(files
        .iter()
        .map(|file| {
            let name = display_name(file);
            let new_name = regex.replace_all(&name, replacement);
            RenamePlan::new(file, &new_name)
        })
        .collect())
}

/// Render a name template for each file, numbering from `start`
pub fn plan_template(
    files: &[PathBuf],
    template: &str,
    start: usize,
    case: CaseMode,
) -> Result<Vec<RenamePlan>, ToolError> {
    let template = NameTemplate::parse(template)?;

    Ok(files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            let (stem, ext) = split_name(file);
            let rendered = template.render(start + i, &stem, &ext);
            RenamePlan::new(file, &apply_case(&rendered, case))
        })
        .collect())
}

/// `prefix + stem + suffix + ext`
pub fn plan_affix(files: &[PathBuf], prefix: &str, suffix: &str) -> Vec<RenamePlan> {
    files
        .iter()
        .map(|file| {
            let (stem, ext) = split_name(file);
            RenamePlan::new(file, &format!("{}{}{}{}", prefix, stem, suffix, ext))
        })
        .collect()
}

/// How new names are derived
#[derive(Debug, Clone)]
pub enum RenameMode {
    Regex { pattern: String, replacement: String },
    Template { template: String, start: usize, case: CaseMode },
    Affix { prefix: String, suffix: String },
}

pub fn plan(files: &[PathBuf], mode: &RenameMode) -> Result<Vec<RenamePlan>, ToolError> {
    match mode {
        RenameMode::Regex { pattern, replacement } => plan_regex(files, pattern, replacement),
        RenameMode::Template { template, start, case } => plan_template(files, template, *start, *case),
        RenameMode::Affix { prefix, suffix } => Ok(plan_affix(files, prefix, suffix)),
    }
}

pub fn apply_case(name: &str, mode: CaseMode) -> String {
    match mode {
        CaseMode::None => name.to_string(),
        CaseMode::Lower => name.to_lowercase(),
        CaseMode::Upper => name.to_uppercase(),
        CaseMode::Title => {
            let mut out = String::with_capacity(name.len());
            let mut prev_alpha = false;
            for c in name.chars() {
                if c.is_alphabetic() {
                    if prev_alpha {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    prev_alpha = true;
                } else {
                    out.push(c);
                    prev_alpha = false;
                }
            }
            out
        }
    }
}

/// Preview or apply the plans in order.
///
/// A target that already exists, or was claimed by an earlier plan in the
/// same batch, is skipped. Individual failures do not stop the batch.
pub fn execute(plans: Vec<RenamePlan>, dry_run: bool) -> Vec<RenameResult> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut results = Vec::with_capacity(plans.len());

    for plan in plans {
        let outcome = decide(&plan, &claimed, dry_run);
        match &outcome {
            RenameOutcome::Renamed | RenameOutcome::Previewed => {
                claimed.insert(plan.to.clone());
                tracing::debug!("{} -> {}", plan.from.display(), plan.to.display());
            }
            RenameOutcome::SkippedExists => {
                tracing::warn!("target exists, skipping: {}", plan.to.display());
            }
            RenameOutcome::Failed(reason) => {
                tracing::warn!("rename failed {}: {}", plan.from.display(), reason);
            }
            RenameOutcome::SkippedUnchanged => {}
        }
        results.push(RenameResult { plan, outcome });
    }

    if !dry_run {
        let renamed = results.iter().filter(|r| r.outcome == RenameOutcome::Renamed).count();
        tracing::info!("renamed {}/{} files", renamed, results.len());
    }
    results
}

fn decide(plan: &RenamePlan, claimed: &HashSet<PathBuf>, dry_run: bool) -> RenameOutcome {
    if plan.from == plan.to {
        return RenameOutcome::SkippedUnchanged;
    }
    if !plan.target_is_valid() {
        return RenameOutcome::Failed(format!("invalid target name `{}`", plan.to_name()));
    }
    if claimed.contains(&plan.to) || target_exists(plan) {
        return RenameOutcome::SkippedExists;
    }
    if dry_run {
        return RenameOutcome::Previewed;
    }
    match std::fs::rename(&plan.from, &plan.to) {
        Ok(()) => RenameOutcome::Renamed,
        Err(e) => RenameOutcome::Failed(e.to_string()),
    }
}

// Case-only renames on case-insensitive filesystems resolve to the source itself.
fn target_exists(plan: &RenamePlan) -> bool {
    if !plan.to.exists() {
        return false;
    }
    match (plan.from.canonicalize(), plan.to.canonicalize()) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}

pub fn findings(results: &[RenameResult]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for result in results {
        let arrow = format!("{} → {}", result.plan.from_name(), result.plan.to_name());
        let finding = match &result.outcome {
            RenameOutcome::Renamed => Finding::ok(arrow),
            RenameOutcome::Previewed => Finding::info(arrow),
            RenameOutcome::SkippedUnchanged => continue,
            RenameOutcome::SkippedExists => {
                Finding::warning(arrow).with_detail("target already exists, skipped")
            }
            RenameOutcome::Failed(reason) => Finding::error(arrow).with_detail(reason.clone()),
        };
        findings.push(finding.with_tool("rename"));
    }
    if findings.is_empty() {
        findings.push(Finding::info("Nothing to rename").with_tool("rename"));
    }
    findings
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Number { width: usize },
    Stem,
    Ext,
}

/// Parsed `{n}` / `{n:03}` / `{name}` / `{ext}` template; `{{` and `}}` escape braces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    segments: Vec<Segment>,
}

impl NameTemplate {
    pub fn parse(template: &str) -> Result<Self, ToolError> {
        let invalid = |reason: &str| ToolError::InvalidPattern {
            pattern: template.to_string(),
            reason: reason.to_string(),
        };

        if template.is_empty() {
            return Err(invalid("template is empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("unmatched `}`")),
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for k in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    if !closed {
                        return Err(invalid("unclosed `{`"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::placeholder(&key).ok_or_else(|| {
                        invalid(&format!("unknown placeholder `{{{}}}`", key))
                    })?);
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    fn placeholder(key: &str) -> Option<Segment> {
        match key.split_once(':') {
            None => match key {
                "n" => Some(Segment::Number { width: 0 }),
                "name" => Some(Segment::Stem),
                "ext" => Some(Segment::Ext),
                _ => None,
            },
            Some(("n", spec)) if !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit()) => {
                spec.parse().ok().map(|width| Segment::Number { width })
            }
            Some(_) => None,
        }
    }

    pub fn render(&self, n: usize, stem: &str, ext: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Number { width } => out.push_str(&format!("{:0width$}", n, width = *width)),
                Segment::Stem => out.push_str(stem),
                Segment::Ext => out.push_str(ext),
            }
        }
        out
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Stem and extension with its leading dot (`"photo"`, `".jpg"`)
fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, name).unwrap();
        path
    }

    #[test]
    fn template_renders_placeholders() {
        let t = NameTemplate::parse("img_{n:03}_{name}{ext}").unwrap();
        assert_eq!(t.render(7, "beach", ".JPG"), "img_007_beach.JPG");

        let t = NameTemplate::parse("{n}-{name}").unwrap();
        assert_eq!(t.render(12, "a", ".txt"), "12-a");
    }

    #[test]
    fn template_escapes_braces() {
        let t = NameTemplate::parse("{{draft}}_{name}{ext}").unwrap();
        assert_eq!(t.render(1, "x", ".md"), "{draft}_x.md");
    }

    #[test]
    fn template_rejects_bad_placeholders() {
        for bad in ["", "{size}", "{name", "name}", "{n:x}", "{ext:2}"] {
            assert!(
                matches!(NameTemplate::parse(bad), Err(ToolError::InvalidPattern { .. })),
                "expected `{}` to be rejected",
                bad
            );
        }
    }

    #[test]
    fn case_modes() {
        assert_eq!(apply_case("My File.TXT", CaseMode::Lower), "my file.txt");
        assert_eq!(apply_case("My File.txt", CaseMode::Upper), "MY FILE.TXT");
        assert_eq!(apply_case("hello_wORLD.txt", CaseMode::Title), "Hello_World.Txt");
        assert_eq!(apply_case("2nd take", CaseMode::Title), "2Nd Take");
        assert_eq!(apply_case("Keep", CaseMode::None), "Keep");
    }

    #[test]
    fn regex_plan_expands_groups() {
        let files = vec![PathBuf::from("/d/IMG_2024_001.jpg"), PathBuf::from("/d/notes.txt")];
        let plans = plan_regex(&files, r"IMG_(\d+)_(\d+)", "photo-$1-$2").unwrap();

        assert_eq!(plans[0].to, PathBuf::from("/d/photo-2024-001.jpg"));
        assert_eq!(plans[1].to, plans[1].from);
    }

    #[test]
    fn regex_plan_expands_named_and_braced_groups() {
        let files = vec![PathBuf::from("/d/2024-07-20 trip.jpg")];
        let plans = plan_regex(&files, r"(?P<y>\d{4})-(?P<m>\d\d)-\d\d (?P<what>\w+)", "${what}_${y}${m}").unwrap();
        assert_eq!(plans[0].to, PathBuf::from("/d/trip_202407.jpg"));

        // `$1_` is a group named `1_`; braces keep the number apart
        let files = vec![PathBuf::from("/d/a-b.txt")];
        assert_eq!(plan_regex(&files, r"(\w)-(\w)", "${1}_$2").unwrap()[0].to, PathBuf::from("/d/a_b.txt"));
        assert_eq!(plan_regex(&files, r"(\w)-(\w)", "$1_$2").unwrap()[0].to, PathBuf::from("/d/b.txt"));
    }

    #[test]
    fn regex_plan_rejects_invalid_regex() {
        let err = plan_regex(&[PathBuf::from("/d/a")], "(unclosed", "x").unwrap_err();
        assert!(matches!(err, ToolError::InvalidPattern { .. }));
    }

    #[test]
    fn template_plan_numbers_and_cases() {
        let files = vec![PathBuf::from("/d/A.PNG"), PathBuf::from("/d/B.PNG")];
        let plans = plan_template(&files, "shot_{n:02}{ext}", 9, CaseMode::Lower).unwrap();

        assert_eq!(plans[0].to, PathBuf::from("/d/shot_09.png"));
        assert_eq!(plans[1].to, PathBuf::from("/d/shot_10.png"));
    }

    #[test]
    fn affix_plan_keeps_extension() {
        let plans = plan_affix(&[PathBuf::from("/d/report.final.pdf")], "2024_", "_v2");
        assert_eq!(plans[0].to, PathBuf::from("/d/2024_report.final_v2.pdf"));
    }

    #[test]
    fn collect_files_by_glob() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "b.log");
        touch(dir.path(), "sub/c.txt");

        let flat = collect_files(dir.path(), "*.txt", false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.txt")]);

        let deep = collect_files(dir.path(), "*.txt", true).unwrap();
        assert_eq!(deep.len(), 2);
        assert!(deep.contains(&dir.path().join("sub").join("c.txt")));
    }

    #[test]
    fn collect_files_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "a.txt");
        assert!(matches!(collect_files(&file, "*", false), Err(ToolError::NotADirectory(_))));
    }

    #[test]
    fn dry_run_leaves_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.txt");
        let plans = plan_affix(&[a.clone()], "new_", "");

        let results = execute(plans, true);

        assert_eq!(results[0].outcome, RenameOutcome::Previewed);
        assert!(a.exists());
        assert!(!dir.path().join("new_a.txt").exists());
    }

    #[test]
    fn execute_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.txt");
        touch(dir.path(), "b.txt");
        let plans = plan_regex(&[a.clone()], "^a", "b").unwrap();

        let results = execute(plans, false);

        assert_eq!(results[0].outcome, RenameOutcome::SkippedExists);
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "b.txt");
        assert!(a.exists());
    }

    #[test]
    fn execute_skips_second_claim_on_same_target() {
        let dir = tempfile::tempdir().unwrap();
        let x = touch(dir.path(), "x1.txt");
        let y = touch(dir.path(), "x2.txt");
        let plans = plan_regex(&[x, y.clone()], r"x\d", "same").unwrap();

        let results = execute(plans, false);

        assert_eq!(results[0].outcome, RenameOutcome::Renamed);
        assert_eq!(results[1].outcome, RenameOutcome::SkippedExists);
        assert!(dir.path().join("same.txt").exists());
        assert!(y.exists());
    }

    #[test]
    fn execute_rejects_separator_in_new_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.txt");
        let plans = plan_regex(&[a.clone()], "^a", "sub/a").unwrap();

        let results = execute(plans, false);

        assert!(matches!(results[0].outcome, RenameOutcome::Failed(_)));
        assert!(a.exists());
    }

    #[test]
    fn findings_reflect_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.txt");
        let results = execute(plan_affix(&[a], "z", ""), false);

        let findings = findings(&results);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "a.txt → za.txt");
        assert_eq!(findings[0].severity, crate::tools::Severity::Ok);
    }

    #[test]
    fn mode_dispatches_to_planner() {
        let files = vec![PathBuf::from("/d/photo.png")];
        let mode = RenameMode::Template { template: "{n:02}{ext}".into(), start: 3, case: CaseMode::Upper };
        assert_eq!(plan(&files, &mode).unwrap()[0].to, PathBuf::from("/d/03.PNG"));

        let mode = RenameMode::Affix { prefix: "old_".into(), suffix: String::new() };
        assert_eq!(plan(&files, &mode).unwrap()[0].to, PathBuf::from("/d/old_photo.png"));

        let mode = RenameMode::Regex { pattern: "(".into(), replacement: String::new() };
        assert!(plan(&files, &mode).is_err());
    }
}
