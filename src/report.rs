use chrono::Utc;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;
use crate::tools::{Finding, Severity};

#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: String,
    pub hostname: String,
    pub sections: Vec<ReportSection>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub name: String,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub failed: usize,
    pub warning: usize,
    pub info: usize,
    pub ok: usize,
}

pub struct Reporter {
    sections: Vec<ReportSection>,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, name: &str, findings: Vec<Finding>) {
        self.sections.push(ReportSection {
            name: name.to_string(),
            findings,
        });
    }

    /// True when any finding failed; commands turn this into a non-zero exit
    pub fn has_failures(&self) -> bool {
        self.sections
            .iter()
            .flat_map(|s| &s.findings)
            .any(|f| f.severity == Severity::Error)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for finding in self.sections.iter().flat_map(|s| &s.findings) {
            summary.total += 1;
            match finding.severity {
                Severity::Error => summary.failed += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
                Severity::Ok => summary.ok += 1,
            }
        }
        summary
    }

    fn build_report(&self) -> Report {
        use sysinfo::System;
        Report {
            generated_at: Utc::now().to_rfc3339(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
            sections: self.sections.clone(),
            summary: self.summary(),
        }
    }

    pub fn print(&self, format: &OutputFormat) {
        match format {
            OutputFormat::Json => {
                let report = self.build_report();
                if let Ok(json) = serde_json::to_string_pretty(&report) {
                    println!("{}", json);
                }
            }
            OutputFormat::Minimal => {
                let summary = self.summary();
                for section in &self.sections {
                    for finding in &section.findings {
                        println!("[{}] {}: {}", finding.severity.label(), section.name, finding.title);
                    }
                }
                println!();
                println!(
                    "Total: {} | Failed: {} | Warning: {} | Info: {} | Ok: {}",
                    summary.total, summary.failed, summary.warning, summary.info, summary.ok,
                );
            }
            OutputFormat::Pretty => {
                for section in &self.sections {
                    eprintln!();
                    eprintln!("  {}", format!("── {} ──", section.name).bold());
                    for finding in &section.findings {
                        let icon = finding.severity.icon();
                        let label = finding.severity.colored_label();
                        eprintln!("  {} {} {}", icon, label, finding.title);
                        if let Some(detail) = &finding.detail {
                            eprintln!("      {}", detail.dimmed());
                        }
                    }
                }

                let summary = self.summary();
                eprintln!();
                eprintln!("  ── Summary ──");
                eprintln!("  {} Total: {}", "→".dimmed(), summary.total);
                if summary.failed > 0 {
                    eprintln!("  {} Failed: {}", "✗".red(), summary.failed);
                }
                if summary.warning > 0 {
                    eprintln!("  {} Warnings: {}", "!".yellow(), summary.warning);
                }
                eprintln!("  {} Info: {}", "i".blue(), summary.info);
                eprintln!("  {} Ok: {}", "✓".green(), summary.ok);
                eprintln!();
            }
        }
    }

    pub fn save_json(&self, path: &str) -> anyhow::Result<()> {
        let report = self.build_report();
        let json = serde_json::to_string_pretty(&report)?;
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Reporter {
        let mut reporter = Reporter::new();
        reporter.add_section(
            "Checksums",
            vec![
                Finding::ok("a.txt"),
                Finding::error("b.txt").with_detail("mismatch"),
                Finding::info("2 entries"),
            ],
        );
        reporter.add_section("Extra", vec![Finding::warning("skipped c.txt")]);
        reporter
    }

    #[test]
    fn summary_counts_by_severity() {
        let summary = sample().summary();
        assert_eq!(
            summary,
            ReportSummary { total: 4, failed: 1, warning: 1, info: 1, ok: 1 }
        );
    }

    #[test]
    fn failures_detected() {
        assert!(sample().has_failures());

        let mut clean = Reporter::new();
        clean.add_section("Ports", vec![Finding::ok("22 open")]);
        assert!(!clean.has_failures());
    }

    #[test]
    fn save_json_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("out.json");

        sample().save_json(path.to_str().unwrap()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total"], 4);
        assert_eq!(value["sections"][0]["findings"][1]["severity"], "error");
    }
}
