//! File search by name or content across one or more roots.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use colored::Colorize;
use regex::{Regex, RegexBuilder};
use walkdir::WalkDir;

use super::{is_hidden, Finding, ToolError};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Match file contents instead of file names
    pub content: bool,
    /// Treat the query as a regular expression
    pub regex: bool,
    pub ignore_case: bool,
    pub skip_hidden: bool,
    /// Content search skips files larger than this
    pub max_file_size: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            content: false,
            regex: false,
            ignore_case: false,
            skip_hidden: true,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHit {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub path: PathBuf,
    /// Empty for name matches
    pub hits: Vec<ContentHit>,
}

#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub matches: Vec<SearchMatch>,
    pub missing_roots: Vec<PathBuf>,
    pub files_scanned: usize,
}

/// Compiled query; plain strings are escaped so both modes share one matcher
pub struct Matcher {
    regex: Regex,
}

impl Matcher {
    pub fn new(query: &str, regex: bool, ignore_case: bool) -> Result<Self, ToolError> {
        let source = if regex { query.to_string() } else { regex::escape(query) };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| ToolError::InvalidPattern {
                pattern: query.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Wrap every match in red
    pub fn highlight(&self, text: &str) -> String {
        self.regex
            .replace_all(text, |caps: &regex::Captures| caps[0].red().bold().to_string())
            .into_owned()
    }
}

pub fn search(roots: &[PathBuf], query: &str, opts: &SearchOptions) -> Result<SearchOutcome, ToolError> {
    let matcher = Matcher::new(query, opts.regex, opts.ignore_case)?;
    let mut outcome = SearchOutcome::default();
    let mut found: BTreeMap<PathBuf, Vec<ContentHit>> = BTreeMap::new();

    for root in roots {
        if !root.exists() {
            tracing::warn!("search root does not exist: {}", root.display());
            outcome.missing_roots.push(root.clone());
            continue;
        }

        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !(opts.skip_hidden && e.depth() > 0 && is_hidden(e.path())));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("walk error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            outcome.files_scanned += 1;

            let path = entry.path();
            let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            if found.contains_key(&canonical) {
                continue;
            }

            if opts.content {
                let hits = scan_content(path, &matcher, opts.max_file_size);
                if !hits.is_empty() {
                    found.insert(canonical, hits);
                }
            } else {
                let name = entry.file_name().to_string_lossy();
                if matcher.is_match(&name) {
                    found.insert(canonical, Vec::new());
                }
            }
        }
    }

    outcome.matches = found
        .into_iter()
        .map(|(path, hits)| SearchMatch { path, hits })
        .collect();
    tracing::info!(
        "{} matches in {} files",
        outcome.matches.len(),
        outcome.files_scanned
    );
    Ok(outcome)
}

fn scan_content(path: &Path, matcher: &Matcher, max_size: u64) -> Vec<ContentHit> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > max_size => {
            tracing::debug!("skipping large file {} ({} bytes)", path.display(), meta.len());
            return Vec::new();
        }
        Err(e) => {
            tracing::debug!("cannot stat {}: {}", path.display(), e);
            return Vec::new();
        }
        _ => {}
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("cannot open {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut hits = Vec::new();
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                line_no += 1;
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if matcher.is_match(line) {
                    hits.push(ContentHit {
                        line: line_no,
                        text: line.to_string(),
                    });
                }
            }
            Err(e) => {
                tracing::debug!("read error in {}: {}", path.display(), e);
                break;
            }
        }
    }
    hits
}

pub fn findings(outcome: &SearchOutcome) -> Vec<Finding> {
    let mut findings = Vec::new();
    for root in &outcome.missing_roots {
        findings.push(Finding::warning(format!("Path does not exist: {}", root.display())).with_tool("search"));
    }
    for m in &outcome.matches {
        let mut finding = Finding::ok(m.path.display().to_string());
        if !m.hits.is_empty() {
            let lines: Vec<String> = m.hits.iter().take(5).map(|h| format!("{}: {}", h.line, h.text.trim())).collect();
            let mut detail = lines.join("\n      ");
            if m.hits.len() > 5 {
                detail.push_str(&format!("\n      ... {} more", m.hits.len() - 5));
            }
            finding = finding.with_detail(detail);
        }
        findings.push(finding.with_tool("search"));
    }
    findings.push(
        Finding::info(format!(
            "{} matching files ({} scanned)",
            outcome.matches.len(),
            outcome.files_scanned
        ))
        .with_tool("search"),
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {\n    println!(\"TODO later\");\n}\n").unwrap();
        fs::write(dir.path().join("src/lib.rs"), "// nothing\n").unwrap();
        fs::write(dir.path().join("notes.md"), "todo: write docs\nTODO: tests\n").unwrap();
        fs::write(dir.path().join(".git/config"), "TODO hidden\n").unwrap();
        dir
    }

    #[test]
    fn name_search_substring() {
        let dir = fixture();
        let out = search(&[dir.path().to_path_buf()], "main", &SearchOptions::default()).unwrap();
        assert_eq!(out.matches.len(), 1);
        assert!(out.matches[0].path.ends_with("src/main.rs"));
    }

    #[test]
    fn name_search_regex() {
        let dir = fixture();
        let opts = SearchOptions { regex: true, ..Default::default() };
        let out = search(&[dir.path().to_path_buf()], r"\.rs$", &opts).unwrap();
        assert_eq!(out.matches.len(), 2);
    }

    #[test]
    fn content_search_reports_lines_and_skips_hidden() {
        let dir = fixture();
        let opts = SearchOptions { content: true, ..Default::default() };
        let out = search(&[dir.path().to_path_buf()], "TODO", &opts).unwrap();

        assert_eq!(out.matches.len(), 2);
        let notes = out.matches.iter().find(|m| m.path.ends_with("notes.md")).unwrap();
        assert_eq!(notes.hits, vec![ContentHit { line: 2, text: "TODO: tests".into() }]);
    }

    #[test]
    fn content_search_ignore_case() {
        let dir = fixture();
        let opts = SearchOptions { content: true, ignore_case: true, ..Default::default() };
        let out = search(&[dir.path().to_path_buf()], "todo", &opts).unwrap();
        let notes = out.matches.iter().find(|m| m.path.ends_with("notes.md")).unwrap();
        assert_eq!(notes.hits.len(), 2);
    }

    #[test]
    fn hidden_included_when_requested() {
        let dir = fixture();
        let opts = SearchOptions { content: true, skip_hidden: false, ..Default::default() };
        let out = search(&[dir.path().to_path_buf()], "TODO hidden", &opts).unwrap();
        assert_eq!(out.matches.len(), 1);
    }

    #[test]
    fn overlapping_roots_are_deduplicated_and_missing_roots_reported() {
        let dir = fixture();
        let roots = vec![
            dir.path().to_path_buf(),
            dir.path().join("src"),
            dir.path().join("nope"),
        ];
        let out = search(&roots, "main", &SearchOptions::default()).unwrap();
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.missing_roots, vec![dir.path().join("nope")]);
    }

    #[test]
    fn large_files_skipped_in_content_mode() {
        let dir = fixture();
        let opts = SearchOptions { content: true, max_file_size: 8, ..Default::default() };
        let out = search(&[dir.path().to_path_buf()], "TODO", &opts).unwrap();
        assert!(out.matches.is_empty());
    }

    #[test]
    fn literal_query_is_escaped() {
        let m = Matcher::new("a.b", false, false).unwrap();
        assert!(m.is_match("xa.by"));
        assert!(!m.is_match("axb"));
    }

    #[test]
    fn highlight_keeps_text() {
        colored::control::set_override(false);
        let m = Matcher::new("ab", false, false).unwrap();
        assert_eq!(m.highlight("xabyab"), "xabyab");
    }
}
