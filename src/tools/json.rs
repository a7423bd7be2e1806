//! JSON formatting, path queries, key search, merging and structural diff.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{format_size, Finding, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MergeStrategy {
    /// Top-level keys of later documents overwrite earlier ones
    Replace,
    /// Objects merge recursively
    Deep,
    /// Arrays are extended
    Append,
}

/// Read a document from `path`, or stdin when `path` is `None` or `-`
pub fn load(path: Option<&Path>) -> Result<Value> {
    match path.filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw).context("reading stdin")?;
            serde_json::from_str(&raw).context("parsing stdin")
        }
    }
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

pub fn format(value: &Value, indent: usize, sort_keys: bool) -> Result<String> {
    let owned;
    let value = if sort_keys {
        owned = sorted(value);
        &owned
    } else {
        value
    };
    let pad = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&pad);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

pub fn minify(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(usize),
}

fn path_error(path: &str, reason: impl Into<String>) -> ToolError {
    ToolError::JsonPath { path: path.to_string(), reason: reason.into() }
}

/// `a.b[0].c` → [Key(a), Key(b), Index(0), Key(c)]
fn parse_path(path: &str) -> Result<Vec<Step>, ToolError> {
    let mut steps = Vec::new();
    let mut chars = path.chars().peekable();
    let mut key = String::new();
    let mut after_index = false;

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && !after_index {
                    return Err(path_error(path, "empty key"));
                }
                if !key.is_empty() {
                    steps.push(Step::Key(std::mem::take(&mut key)));
                }
                after_index = false;
                if chars.peek().is_none() {
                    return Err(path_error(path, "trailing '.'"));
                }
            }
            '[' => {
                if !key.is_empty() {
                    steps.push(Step::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) => digits.push(d),
                        None => return Err(path_error(path, "unclosed '['")),
                    }
                }
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| path_error(path, format!("bad index '{}'", digits)))?;
                steps.push(Step::Index(index));
                after_index = true;
            }
            ']' => return Err(path_error(path, "unexpected ']'")),
            _ => {
                if after_index {
                    return Err(path_error(path, "expected '.' or '[' after index"));
                }
                key.push(c);
            }
        }
    }
    if !key.is_empty() {
        steps.push(Step::Key(key));
    }
    if steps.is_empty() {
        return Err(path_error(path, "empty path"));
    }
    Ok(steps)
}

pub fn get_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value, ToolError> {
    let mut current = value;
    for step in parse_path(path)? {
        current = match (&step, current) {
            (Step::Key(k), Value::Object(map)) => {
                map.get(k).ok_or_else(|| path_error(path, format!("no key '{}'", k)))?
            }
            (Step::Index(i), Value::Array(items)) => items
                .get(*i)
                .ok_or_else(|| path_error(path, format!("index {} out of bounds (len {})", i, items.len())))?,
            (Step::Key(k), _) => return Err(path_error(path, format!("'{}' applied to a non-object", k))),
            (Step::Index(i), _) => return Err(path_error(path, format!("[{}] applied to a non-array", i))),
        };
    }
    Ok(current)
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Every path at which `key` occurs, depth-first in document order
pub fn find_keys(value: &Value, key: &str) -> Vec<String> {
    fn walk(value: &Value, key: &str, prefix: &str, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    let path = join_key(prefix, k);
                    if k == key {
                        out.push(path.clone());
                    }
                    walk(v, key, &path, out);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    walk(v, key, &format!("{}[{}]", prefix, i), out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(value, key, "", &mut out);
    out
}

fn deep_merge(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Object(b), Value::Object(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (slot, other) => *slot = other,
    }
}

pub fn merge(base: &mut Value, other: Value, strategy: MergeStrategy) -> Result<()> {
    match strategy {
        MergeStrategy::Replace => match (base, other) {
            (Value::Object(b), Value::Object(o)) => {
                for (k, v) in o {
                    b.insert(k, v);
                }
            }
            (slot, other) => *slot = other,
        },
        MergeStrategy::Deep => deep_merge(base, other),
        MergeStrategy::Append => {
            let Value::Array(items) = base else {
                anyhow::bail!("append merge needs an array as the first document");
            };
            match other {
                Value::Array(more) => items.extend(more),
                single => items.push(single),
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JsonDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

impl JsonDiff {
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

pub fn compare(a: &Value, b: &Value) -> JsonDiff {
    fn walk(a: &Value, b: &Value, prefix: &str, diff: &mut JsonDiff) {
        match (a, b) {
            (Value::Object(left), Value::Object(right)) => {
                for (k, lv) in left {
                    let path = join_key(prefix, k);
                    match right.get(k) {
                        Some(rv) => walk(lv, rv, &path, diff),
                        None => diff.removed.push(path),
                    }
                }
                for k in right.keys().filter(|k| !left.contains_key(*k)) {
                    diff.added.push(join_key(prefix, k));
                }
            }
            _ => {
                let path = if prefix.is_empty() { "$".to_string() } else { prefix.to_string() };
                if a == b {
                    diff.unchanged.push(path);
                } else {
                    diff.modified.push(path);
                }
            }
        }
    }
    let mut diff = JsonDiff::default();
    walk(a, b, "", &mut diff);
    diff
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonSummary {
    pub kind: &'static str,
    pub count: usize,
    pub depth: usize,
    pub size: usize,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

pub fn summary(value: &Value) -> JsonSummary {
    let count = match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 1,
    };
    JsonSummary {
        kind: type_name(value),
        count,
        depth: depth(value),
        size: serde_json::to_string(value).map(|s| s.len()).unwrap_or(0),
    }
}

pub fn summary_findings(s: &JsonSummary) -> Vec<Finding> {
    vec![
        Finding::info(format!("type: {}", s.kind)).with_tool("json"),
        Finding::info(format!("elements: {}", s.count)).with_tool("json"),
        Finding::info(format!("depth: {}", s.depth)).with_tool("json"),
        Finding::info(format!("size: {}", format_size(s.size as u64))).with_tool("json"),
    ]
}

pub fn diff_findings(diff: &JsonDiff) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(diff.added.iter().map(|p| Finding::warning(format!("+ {}", p)).with_tool("json")));
    findings.extend(diff.removed.iter().map(|p| Finding::warning(format!("- {}", p)).with_tool("json")));
    findings.extend(diff.modified.iter().map(|p| Finding::warning(format!("~ {}", p)).with_tool("json")));
    let headline = format!(
        "{} added, {} removed, {} modified, {} unchanged",
        diff.added.len(),
        diff.removed.len(),
        diff.modified.len(),
        diff.unchanged.len()
    );
    findings.push(if diff.is_identical() {
        Finding::ok(headline).with_tool("json")
    } else {
        Finding::info(headline).with_tool("json")
    });
    findings
}
