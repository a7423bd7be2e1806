//! In-memory CSV processing: clean, filter, sort, rename, select, merge, summarize,
//! validate and sample.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{Finding, ToolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Empty,
    Boolean,
    Integer,
    Float,
    String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnType,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub columns: usize,
    pub column_summaries: Vec<ColumnSummary>,
}

/// Split `key=value` arguments
pub fn parse_pair(raw: &str) -> Result<(String, String), ToolError> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| ToolError::InvalidPattern {
            pattern: raw.to_string(),
            reason: "expected COLUMN=VALUE".into(),
        })
}

fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn infer_type(values: impl Iterator<Item = String>) -> ColumnType {
    let mut kind = ColumnType::Empty;
    for value in values {
        let v = value.trim();
        if v.is_empty() {
            continue;
        }
        let this = if v.parse::<i64>().is_ok() {
            ColumnType::Integer
        } else if v.parse::<f64>().is_ok() {
            ColumnType::Float
        } else if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false") {
            ColumnType::Boolean
        } else {
            ColumnType::String
        };
        kind = match (kind, this) {
            (ColumnType::Empty, t) => t,
            (a, b) if a == b => a,
            (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => ColumnType::Float,
            _ => ColumnType::String,
        };
        if kind == ColumnType::String {
            break;
        }
    }
    kind
}

/// Column type a validation rule asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    Int,
    Float,
    Bool,
    Str,
}

impl ExpectedType {
    /// Empty cells are left to `not_null`; a float column may hold integers
    fn accepts(&self, kind: ColumnType) -> bool {
        match self {
            ExpectedType::Int => matches!(kind, ColumnType::Integer | ColumnType::Empty),
            ExpectedType::Float => matches!(kind, ColumnType::Float | ColumnType::Integer | ColumnType::Empty),
            ExpectedType::Bool => matches!(kind, ColumnType::Boolean | ColumnType::Empty),
            ExpectedType::Str => kind == ColumnType::String,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ExpectedType::Int => "int",
            ExpectedType::Float => "float",
            ExpectedType::Bool => "bool",
            ExpectedType::Str => "str",
        }
    }
}

impl FromStr for ExpectedType {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(ExpectedType::Int),
            "float" | "number" => Ok(ExpectedType::Float),
            "bool" | "boolean" => Ok(ExpectedType::Bool),
            "str" | "string" => Ok(ExpectedType::Str),
            other => Err(ToolError::InvalidPattern {
                pattern: other.to_string(),
                reason: "expected int, float, bool or str".into(),
            }),
        }
    }
}

/// Checks for `csv validate`, from a JSON rules file and/or flags
///
/// ```json
/// { "unique": ["id"], "types": {"age": "int"}, "not_null": ["id", "name"] }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Report missing values for every column
    pub nulls: bool,
    pub unique: Vec<String>,
    pub types: BTreeMap<String, ExpectedType>,
    pub not_null: Vec<String>,
}

impl ValidationRules {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading rules {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing rules {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        !self.nulls && self.unique.is_empty() && self.types.is_empty() && self.not_null.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed(String),
    /// Informational, e.g. a missing-value count
    Noted(String),
    MissingColumn,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: &'static str,
    pub column: String,
    pub status: CheckStatus,
}

/// How many rows `sample` takes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleSize {
    Count(usize),
    /// Share of the rows, in (0, 1]
    Fraction(f64),
}

impl SampleSize {
    pub fn new(count: Option<usize>, fraction: Option<f64>) -> Result<Self, ToolError> {
        match (count, fraction) {
            (Some(n), None) => Ok(SampleSize::Count(n)),
            (None, Some(f)) if f > 0.0 && f <= 1.0 => Ok(SampleSize::Fraction(f)),
            (None, Some(f)) => Err(ToolError::InvalidSample(format!("fraction {} is outside (0, 1]", f))),
            _ => Err(ToolError::InvalidSample("give exactly one of --n or --frac".into())),
        }
    }
}

fn pick(indices: &[usize], amount: usize, rng: &mut StdRng) -> Vec<usize> {
    let amount = amount.min(indices.len());
    let mut chosen: Vec<usize> = rand::seq::index::sample(rng, indices.len(), amount)
        .into_iter()
        .map(|i| indices[i])
        .collect();
    chosen.sort_unstable();
    chosen
}

impl Table {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("{} line {}", path.display(), idx + 2))?;
            let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        tracing::info!("loaded {} rows, {} columns from {}", rows.len(), headers.len(), path.display());
        Ok(Self { headers, rows })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<usize, ToolError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ToolError::UnknownColumn(name.to_string()))
    }

    /// Trim cells and drop exact duplicate rows (first occurrence kept); returns rows removed
    pub fn clean(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let rows = std::mem::take(&mut self.rows);
        for mut row in rows {
            for cell in row.iter_mut() {
                let trimmed = cell.trim();
                if trimmed.len() != cell.len() {
                    *cell = trimmed.to_string();
                }
            }
            if seen.insert(row.clone()) {
                self.rows.push(row);
            }
        }
        before - self.rows.len()
    }

    /// Keep rows where every `column == value`
    pub fn filter(&mut self, conditions: &[(String, String)]) -> Result<usize, ToolError> {
        let resolved: Vec<(usize, &str)> = conditions
            .iter()
            .map(|(c, v)| self.column(c).map(|i| (i, v.as_str())))
            .collect::<Result<_, _>>()?;
        self.rows.retain(|row| resolved.iter().all(|(i, v)| row[*i] == *v));
        Ok(self.rows.len())
    }

    /// Stable multi-column sort; numeric when both cells parse as numbers
    pub fn sort(&mut self, columns: &[String], descending: bool) -> Result<(), ToolError> {
        let idx: Vec<usize> = columns.iter().map(|c| self.column(c)).collect::<Result<_, _>>()?;
        self.rows.sort_by(|a, b| {
            let ord = idx
                .iter()
                .map(|i| compare_cells(&a[*i], &b[*i]))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal);
            if descending { ord.reverse() } else { ord }
        });
        Ok(())
    }

    pub fn rename(&mut self, mapping: &[(String, String)]) -> Result<(), ToolError> {
        for (old, new) in mapping {
            let i = self.column(old)?;
            self.headers[i] = new.clone();
        }
        Ok(())
    }

    /// Keep only the listed columns, in the listed order
    pub fn select(&mut self, columns: &[String]) -> Result<(), ToolError> {
        let idx: Vec<usize> = columns.iter().map(|c| self.column(c)).collect::<Result<_, _>>()?;
        self.headers = idx.iter().map(|i| self.headers[*i].clone()).collect();
        for row in self.rows.iter_mut() {
            *row = idx.iter().map(|i| row[*i].clone()).collect();
        }
        Ok(())
    }

    /// Append rows of another table with identical headers
    pub fn append(&mut self, other: Table, source: &Path) -> Result<(), ToolError> {
        if other.headers != self.headers {
            return Err(ToolError::MergeMismatch { file: source.to_path_buf() });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Random subset of rows, kept in file order; the same seed gives the same rows.
    /// With `stratify`, each distinct value of that column is sampled on its own
    /// (groups in value order, `Count` capped per group, `Fraction` rounded down).
    pub fn sample(&self, size: SampleSize, stratify: Option<&str>, seed: u64) -> Result<Table, ToolError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let chosen: Vec<usize> = match stratify {
            None => {
                let all: Vec<usize> = (0..self.rows.len()).collect();
                let amount = match size {
                    SampleSize::Count(n) => n,
                    SampleSize::Fraction(f) => (self.rows.len() as f64 * f).round() as usize,
                };
                pick(&all, amount, &mut rng)
            }
            Some(column) => {
                let col = self.column(column)?;
                let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
                for (i, row) in self.rows.iter().enumerate() {
                    groups.entry(row[col].as_str()).or_default().push(i);
                }
                groups
                    .values()
                    .flat_map(|members| {
                        let amount = match size {
                            SampleSize::Count(n) => n,
                            SampleSize::Fraction(f) => (members.len() as f64 * f).floor() as usize,
                        };
                        pick(members, amount, &mut rng)
                    })
                    .collect()
            }
        };
        tracing::debug!("sampled {} of {} rows", chosen.len(), self.rows.len());
        Ok(Table {
            headers: self.headers.clone(),
            rows: chosen.into_iter().map(|i| self.rows[i].clone()).collect(),
        })
    }

    /// Run every check in `rules`; missing columns are reported, not fatal
    pub fn validate(&self, rules: &ValidationRules) -> Vec<CheckResult> {
        let mut results = Vec::new();
        let result = |check: &'static str, column: &str, status: CheckStatus| CheckResult {
            check,
            column: column.to_string(),
            status,
        };

        if rules.nulls {
            for (i, name) in self.headers.iter().enumerate() {
                let missing = self.rows.iter().filter(|r| r[i].trim().is_empty()).count();
                let status = if missing == 0 {
                    CheckStatus::Passed
                } else {
                    CheckStatus::Noted(format!("{} missing", missing))
                };
                results.push(result("nulls", name, status));
            }
        }

        for name in &rules.unique {
            let status = match self.column(name) {
                Err(_) => CheckStatus::MissingColumn,
                Ok(i) => {
                    let mut counts: HashMap<&str, usize> = HashMap::new();
                    for row in &self.rows {
                        *counts.entry(row[i].as_str()).or_default() += 1;
                    }
                    let mut dups: Vec<&str> = counts.iter().filter(|(_, n)| **n > 1).map(|(v, _)| *v).collect();
                    dups.sort_unstable();
                    if dups.is_empty() {
                        CheckStatus::Passed
                    } else {
                        let shown: Vec<&str> = dups.iter().take(5).copied().collect();
                        CheckStatus::Failed(format!("{} duplicated values: {}", dups.len(), shown.join(", ")))
                    }
                }
            };
            results.push(result("unique", name, status));
        }

        for (name, want) in &rules.types {
            let status = match self.column(name) {
                Err(_) => CheckStatus::MissingColumn,
                Ok(i) => {
                    let kind = infer_type(self.rows.iter().map(|r| r[i].clone()));
                    if want.accepts(kind) {
                        CheckStatus::Passed
                    } else {
                        let found = serde_json::to_value(kind)
                            .ok()
                            .and_then(|v| v.as_str().map(String::from))
                            .unwrap_or_default();
                        CheckStatus::Failed(format!("expected {}, found {}", want.name(), found))
                    }
                }
            };
            results.push(result("type", name, status));
        }

        for name in &rules.not_null {
            let status = match self.column(name) {
                Err(_) => CheckStatus::MissingColumn,
                Ok(i) => match self.rows.iter().position(|r| r[i].trim().is_empty()) {
                    // Header is line 1
                    Some(first) => CheckStatus::Failed(format!("empty value at line {}", first + 2)),
                    None => CheckStatus::Passed,
                },
            };
            results.push(result("not_null", name, status));
        }
        results
    }

    /// Write as CSV, or as a JSON array of records when `path` ends in `.json`
    pub fn save_as(&self, path: &Path) -> Result<()> {
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            return self.save(path);
        }
        let records: Vec<serde_json::Map<String, serde_json::Value>> = self
            .rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row)
                    .map(|(h, v)| (h.clone(), serde_json::Value::String(v.clone())))
                    .collect()
            })
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&records)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn summary(&self) -> TableSummary {
        let column_summaries = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnSummary {
                name: name.clone(),
                kind: infer_type(self.rows.iter().map(|r| r[i].clone())),
                missing: self.rows.iter().filter(|r| r[i].trim().is_empty()).count(),
            })
            .collect();
        TableSummary {
            rows: self.rows.len(),
            columns: self.headers.len(),
            column_summaries,
        }
    }
}

/// Concatenate several CSV files sharing one header row
pub fn merge(files: &[PathBuf]) -> Result<Table> {
    let (first, rest) = files.split_first().context("no input files")?;
    let mut table = Table::load(first)?;
    for file in rest {
        table.append(Table::load(file)?, file)?;
    }
    Ok(table)
}

/// `<stem>_processed.csv` beside the input
pub fn default_output(input: &Path) -> PathBuf {
    output_with_suffix(input, "processed")
}

/// `<stem>_<suffix>.csv` beside the input
pub fn output_with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "output".into());
    input.with_file_name(format!("{}_{}.csv", stem, suffix))
}

pub fn validation_findings(results: &[CheckResult]) -> Vec<Finding> {
    results
        .iter()
        .map(|r| {
            let title = format!("{} `{}`", r.check, r.column);
            let finding = match &r.status {
                CheckStatus::Passed => Finding::ok(title),
                CheckStatus::Noted(detail) => Finding::warning(title).with_detail(detail.clone()),
                CheckStatus::Failed(detail) => Finding::error(title).with_detail(detail.clone()),
                CheckStatus::MissingColumn => Finding::error(title).with_detail("column not found"),
            };
            finding.with_tool("csv")
        })
        .collect()
}

pub fn summary_findings(summary: &TableSummary) -> Vec<Finding> {
    let mut findings = vec![Finding::info(format!("{} rows × {} columns", summary.rows, summary.columns)).with_tool("csv")];
    for col in &summary.column_summaries {
        let kind = serde_json::to_value(col.kind)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let finding = if col.missing > 0 {
            Finding::warning(format!("{}: {} ({} missing)", col.name, kind, col.missing))
        } else {
            Finding::ok(format!("{}: {}", col.name, kind))
        };
        findings.push(finding.with_tool("csv"));
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample() -> Table {
        Table {
            headers: vec!["name".into(), "city".into(), "age".into()],
            rows: vec![
                vec!["bob".into(), "Paris".into(), "9".into()],
                vec!["amy".into(), "Oslo".into(), "31".into()],
                vec![" bob ".into(), "Paris".into(), "9".into()],
                vec!["cid".into(), "Paris".into(), "".into()],
            ],
        }
    }

    #[test]
    fn clean_trims_and_dedups() {
        let mut t = sample();
        assert_eq!(t.clean(), 1);
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.rows[0][0], "bob");
    }

    #[test]
    fn filter_all_conditions() {
        let mut t = sample();
        t.clean();
        let left = t.filter(&[("city".into(), "Paris".into()), ("name".into(), "cid".into())]).unwrap();
        assert_eq!(left, 1);
        assert!(matches!(t.filter(&[("zip".into(), "1".into())]), Err(ToolError::UnknownColumn(_))));
    }

    #[test]
    fn sort_numeric_then_text() {
        let mut t = sample();
        t.clean();
        t.sort(&["age".into()], false).unwrap();
        let ages: Vec<&str> = t.rows.iter().map(|r| r[2].as_str()).collect();
        // "" does not parse, so it compares as text against the numbers
        assert_eq!(ages, vec!["", "9", "31"]);

        t.sort(&["city".into(), "name".into()], true).unwrap();
        assert_eq!(t.rows[0][0], "cid");
    }

    #[test]
    fn rename_and_select() {
        let mut t = sample();
        t.rename(&[("name".into(), "who".into())]).unwrap();
        t.select(&["age".into(), "who".into()]).unwrap();
        assert_eq!(t.headers, vec!["age", "who"]);
        assert_eq!(t.rows[1], vec!["31", "amy"]);
    }

    #[test]
    fn summary_infers_types_and_missing() {
        let t = Table {
            headers: vec!["i".into(), "f".into(), "b".into(), "s".into(), "e".into()],
            rows: vec![
                vec!["1".into(), "1.5".into(), "true".into(), "x".into(), "".into()],
                vec!["2".into(), "2".into(), "FALSE".into(), "3".into(), "".into()],
            ],
        };
        let kinds: Vec<ColumnType> = t.summary().column_summaries.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ColumnType::Integer, ColumnType::Float, ColumnType::Boolean, ColumnType::String, ColumnType::Empty]
        );
        assert_eq!(t.summary().column_summaries[4].missing, 2);
    }

    #[test]
    fn load_save_and_merge_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        let c = dir.path().join("c.csv");
        fs::write(&a, "id,name\n1,\"Smith, J\"\n").unwrap();
        fs::write(&b, "id,name\n2,Lee\n3\n").unwrap();
        fs::write(&c, "id,title\n4,x\n").unwrap();

        let merged = merge(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(merged.rows.len(), 3);
        assert_eq!(merged.rows[0][1], "Smith, J");
        assert_eq!(merged.rows[2], vec!["3", ""]);

        let err = merge(&[a.clone(), c]).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::MergeMismatch { .. })));

        let out = default_output(&a);
        assert_eq!(out, dir.path().join("a_processed.csv"));
        merged.save(&out).unwrap();
        assert_eq!(Table::load(&out).unwrap(), merged);
    }

    fn numbered(n: usize) -> Table {
        Table {
            headers: vec!["id".into(), "label".into()],
            rows: (0..n)
                .map(|i| vec![i.to_string(), if i % 4 == 0 { "rare".into() } else { "common".into() }])
                .collect(),
        }
    }

    #[test]
    fn sample_is_seeded_and_keeps_file_order() {
        let t = numbered(100);
        let a = t.sample(SampleSize::Count(10), None, 7).unwrap();
        let b = t.sample(SampleSize::Count(10), None, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rows.len(), 10);
        let ids: Vec<usize> = a.rows.iter().map(|r| r[0].parse().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(t.sample(SampleSize::Fraction(0.25), None, 1).unwrap().rows.len(), 25);
        // Asking for more than exists takes everything
        assert_eq!(t.sample(SampleSize::Count(500), None, 1).unwrap().rows.len(), 100);
    }

    #[test]
    fn stratified_sample_covers_every_group() {
        let t = numbered(100);
        let s = t.sample(SampleSize::Count(3), Some("label"), 3).unwrap();
        assert_eq!(s.rows.len(), 6);
        // Groups come out in value order
        assert!(s.rows[..3].iter().all(|r| r[1] == "common"));
        assert!(s.rows[3..].iter().all(|r| r[1] == "rare"));

        let f = t.sample(SampleSize::Fraction(0.1), Some("label"), 3).unwrap();
        assert_eq!(f.rows.len(), 7 + 2);
        assert!(matches!(t.sample(SampleSize::Count(1), Some("nope"), 0), Err(ToolError::UnknownColumn(_))));
    }

    #[test]
    fn sample_size_arguments() {
        assert_eq!(SampleSize::new(Some(5), None).unwrap(), SampleSize::Count(5));
        assert!(SampleSize::new(None, Some(1.5)).is_err());
        assert!(SampleSize::new(None, Some(0.0)).is_err());
        assert!(SampleSize::new(Some(1), Some(0.5)).is_err());
        assert!(SampleSize::new(None, None).is_err());
    }

    #[test]
    fn validate_reports_each_check() {
        let t = Table {
            headers: vec!["id".into(), "age".into(), "name".into()],
            rows: vec![
                vec!["1".into(), "30".into(), "amy".into()],
                vec!["2".into(), "x".into(), "".into()],
                vec!["2".into(), "41".into(), "cid".into()],
            ],
        };
        let rules: ValidationRules = serde_json::from_str(
            r#"{"unique": ["id", "name"], "types": {"age": "int", "id": "float", "zip": "str"}, "not_null": ["name"]}"#,
        )
        .unwrap();
        let results = t.validate(&rules);
        let status = |check: &str, column: &str| {
            results
                .iter()
                .find(|r| r.check == check && r.column == column)
                .map(|r| r.status.clone())
                .unwrap()
        };

        assert_eq!(status("unique", "id"), CheckStatus::Failed("1 duplicated values: 2".into()));
        assert_eq!(status("unique", "name"), CheckStatus::Passed);
        assert_eq!(status("type", "age"), CheckStatus::Failed("expected int, found string".into()));
        assert_eq!(status("type", "id"), CheckStatus::Passed);
        assert_eq!(status("type", "zip"), CheckStatus::MissingColumn);
        assert_eq!(status("not_null", "name"), CheckStatus::Failed("empty value at line 3".into()));

        let findings = validation_findings(&results);
        assert_eq!(findings.iter().filter(|f| f.severity == crate::tools::Severity::Error).count(), 4);
    }

    #[test]
    fn null_counts_are_notes() {
        let mut rules = ValidationRules { nulls: true, ..Default::default() };
        let results = sample().validate(&rules);
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].status, CheckStatus::Noted("1 missing".into()));
        assert_eq!(results[0].status, CheckStatus::Passed);

        rules.nulls = false;
        assert!(rules.is_empty());
        assert_eq!("Integer".parse::<ExpectedType>().unwrap(), ExpectedType::Int);
        assert!("date".parse::<ExpectedType>().is_err());
    }

    #[test]
    fn save_as_json_records() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("s.json");
        numbered(2).save_as(&out).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value[1]["id"], "1");
        assert_eq!(value[0]["label"], "rare");
        assert_eq!(output_with_suffix(Path::new("/d/data.csv"), "sample"), PathBuf::from("/d/data_sample.csv"));
    }

    #[test]
    fn pair_parsing() {
        assert_eq!(parse_pair("city=New York").unwrap(), ("city".into(), "New York".into()));
        assert_eq!(parse_pair("k=").unwrap(), ("k".into(), "".into()));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }
}
