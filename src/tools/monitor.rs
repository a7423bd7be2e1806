//! System resource sampling, threshold alerts and the live dashboard.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use sysinfo::{Disks, System};

use super::{format_size, Finding};
use crate::config::MonitorConfig;

#[derive(Debug, Clone, Serialize)]
pub struct DiskUsage {
    pub mount: String,
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Local>,
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub disks: Vec<DiskUsage>,
    pub processes: Vec<ProcessUsage>,
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub cpu_brand: String,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, mins)
    } else {
        format!("{}h {}m", hours, mins)
    }
}

/// Keeps sysinfo state between samples so CPU usage is measured over the interval
pub struct Sampler {
    sys: System,
    top: usize,
}

impl Sampler {
    /// Primes CPU counters; the first reading is only valid after a short delay
    pub async fn new(top: usize) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_millis(250))).await;
        Self { sys, top }
    }

    pub fn sample(&mut self) -> SystemSnapshot {
        self.sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        build_snapshot(&self.sys, &disks, self.top)
    }

    pub fn host_info(&self) -> HostInfo {
        HostInfo {
            hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
            os: format!(
                "{} {}",
                System::name().unwrap_or_else(|| "Unknown".into()),
                System::os_version().unwrap_or_default()
            )
            .trim()
            .to_string(),
            kernel: System::kernel_version().unwrap_or_else(|| "?".into()),
            cpu_brand: self
                .sys
                .cpus()
                .first()
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_else(|| "Unknown".into()),
        }
    }
}

fn build_snapshot(sys: &System, disks: &Disks, top: usize) -> SystemSnapshot {
    let cpu_count = sys.cpus().len();
    let cpu_percent = if cpu_count > 0 {
        sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32
    } else {
        0.0
    };

    let disks = disks
        .list()
        .iter()
        .filter(|d| d.total_space() > 0)
        .map(|d| {
            let used = d.total_space().saturating_sub(d.available_space());
            DiskUsage {
                mount: d.mount_point().display().to_string(),
                total: d.total_space(),
                used,
                percent: percent(used, d.total_space()),
            }
        })
        .collect();

    let mut processes: Vec<ProcessUsage> = sys
        .processes()
        .iter()
        .map(|(pid, p)| ProcessUsage {
            pid: pid.as_u32(),
            name: p.name().to_string_lossy().to_string(),
            cpu_percent: p.cpu_usage(),
            memory: p.memory(),
        })
        .collect();
    processes.sort_by(|a, b| b.cpu_percent.partial_cmp(&a.cpu_percent).unwrap_or(std::cmp::Ordering::Equal));
    processes.truncate(top);

    SystemSnapshot {
        timestamp: Local::now(),
        cpu_percent,
        cpu_count,
        memory_total: sys.total_memory(),
        memory_used: sys.used_memory(),
        memory_percent: percent(sys.used_memory(), sys.total_memory()),
        swap_total: sys.total_swap(),
        swap_used: sys.used_swap(),
        disks,
        processes,
        uptime: System::uptime(),
    }
}

/// CPU, memory and per-disk usage against the configured thresholds
pub fn evaluate(snapshot: &SystemSnapshot, limits: &MonitorConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    let cpu = format!("CPU {:.1}% ({} cores)", snapshot.cpu_percent, snapshot.cpu_count);
    findings.push(if snapshot.cpu_percent > limits.cpu_threshold {
        Finding::warning(cpu).with_detail(format!("above {:.0}% threshold", limits.cpu_threshold))
    } else {
        Finding::ok(cpu)
    });

    let mem = format!(
        "Memory {:.1}% ({} / {})",
        snapshot.memory_percent,
        format_size(snapshot.memory_used),
        format_size(snapshot.memory_total)
    );
    findings.push(if snapshot.memory_percent > limits.memory_threshold as f64 {
        Finding::warning(mem).with_detail(format!("above {:.0}% threshold", limits.memory_threshold))
    } else {
        Finding::ok(mem)
    });

    for disk in &snapshot.disks {
        let title = format!(
            "Disk {} {:.1}% ({} / {})",
            disk.mount,
            disk.percent,
            format_size(disk.used),
            format_size(disk.total)
        );
        findings.push(if disk.percent > limits.disk_threshold as f64 {
            Finding::warning(title).with_detail(format!("above {:.0}% threshold", limits.disk_threshold))
        } else {
            Finding::ok(title)
        });
    }

    findings.into_iter().map(|f| f.with_tool("monitor")).collect()
}

pub fn status_findings(host: &HostInfo, snapshot: &SystemSnapshot) -> Vec<Finding> {
    vec![
        Finding::info(format!("Host: {}", host.hostname)),
        Finding::info(format!("OS: {}", host.os)),
        Finding::info(format!("Kernel: {}", host.kernel)),
        Finding::info(format!(
            "CPU: {} ({} threads, {:.0}% avg)",
            host.cpu_brand, snapshot.cpu_count, snapshot.cpu_percent
        )),
        Finding::info(format!(
            "RAM: {} / {} ({:.0}%)",
            format_size(snapshot.memory_used),
            format_size(snapshot.memory_total),
            snapshot.memory_percent
        )),
        Finding::info(format!(
            "Swap: {} / {}",
            format_size(snapshot.swap_used),
            format_size(snapshot.swap_total)
        )),
        Finding::info(format!("Uptime: {}", format_uptime(snapshot.uptime))),
    ]
    .into_iter()
    .map(|f| f.with_tool("status"))
    .collect()
}

/// Take `duration / interval` samples (at least one), `interval` apart
pub async fn collect(sampler: &mut Sampler, interval: Duration, duration: Duration) -> Vec<SystemSnapshot> {
    let count = if interval.is_zero() {
        1
    } else {
        (duration.as_millis() / interval.as_millis().max(1)).max(1) as usize
    };
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        ticker.tick().await;
        let snap = sampler.sample();
        tracing::info!(
            "sample {}/{}: cpu {:.1}% mem {:.1}%",
            i + 1,
            count,
            snap.cpu_percent,
            snap.memory_percent
        );
        samples.push(snap);
    }
    samples
}

/// Write samples as a JSON array or as CSV rows, chosen by extension
pub fn save_samples(samples: &[SystemSnapshot], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(samples)?;
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        }
        "csv" => {
            let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
            writer.write_record([
                "timestamp",
                "cpu_percent",
                "memory_percent",
                "memory_used",
                "swap_used",
                "max_disk_percent",
            ])?;
            for s in samples {
                let max_disk = s.disks.iter().map(|d| d.percent).fold(0.0, f64::max);
                writer.write_record([
                    s.timestamp.to_rfc3339(),
                    format!("{:.1}", s.cpu_percent),
                    format!("{:.1}", s.memory_percent),
                    s.memory_used.to_string(),
                    s.swap_used.to_string(),
                    format!("{:.1}", max_disk),
                ])?;
            }
            writer.flush()?;
        }
        _ => anyhow::bail!("unsupported output format for {} (use .json or .csv)", path.display()),
    }
    Ok(())
}

/// Live dashboard; `q` or `Esc` quits
pub async fn monitor_tui(limits: &MonitorConfig) -> Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    };
    use ratatui::{prelude::*, widgets::*};
    use std::io;

    let mut sampler = Sampler::new(limits.top_processes.max(1)).await;
    let hostname = sampler.host_info().hostname;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(limits.refresh_interval.max(100));
    let mut snap = sampler.sample();
    let mut last_tick = std::time::Instant::now();

    let level = |value: f64, threshold: f32| {
        if value > threshold as f64 {
            Color::Red
        } else if value > threshold as f64 * 0.75 {
            Color::Yellow
        } else {
            Color::Green
        }
    };

    let result: Result<()> = loop {
        let drawn = terminal.draw(|frame| {
            let disk_rows = snap.disks.len().min(6) as u16;
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Length(3),
                    Constraint::Length(3),
                    Constraint::Length(disk_rows + 2),
                    Constraint::Min(6),
                    Constraint::Length(3),
                ])
                .split(frame.area());

            let title = Block::default()
                .borders(Borders::ALL)
                .title(format!(" toolkeep monitor: {} ", hostname))
                .title_alignment(Alignment::Center)
                .border_type(BorderType::Rounded);
            frame.render_widget(title, chunks[0]);

            let cpu = Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(format!(" CPU ({} cores) ", snap.cpu_count)))
                .gauge_style(Style::default().fg(level(snap.cpu_percent as f64, limits.cpu_threshold)))
                .percent(snap.cpu_percent.clamp(0.0, 100.0) as u16);
            frame.render_widget(cpu, chunks[1]);

            let mem = Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(format!(
                    " Memory {} / {}  Swap {} / {}  Up {} ",
                    format_size(snap.memory_used),
                    format_size(snap.memory_total),
                    format_size(snap.swap_used),
                    format_size(snap.swap_total),
                    format_uptime(snap.uptime)
                )))
                .gauge_style(Style::default().fg(level(snap.memory_percent, limits.memory_threshold)))
                .percent(snap.memory_percent.clamp(0.0, 100.0) as u16);
            frame.render_widget(mem, chunks[2]);

            let disk_lines: Vec<Line> = snap
                .disks
                .iter()
                .take(6)
                .map(|d| {
                    Line::from(vec![
                        Span::styled(format!("{:<20}", d.mount), Style::default().fg(Color::Cyan)),
                        Span::styled(
                            format!("{:>5.1}%  ", d.percent),
                            Style::default().fg(level(d.percent, limits.disk_threshold)),
                        ),
                        Span::raw(format!("{} / {}", format_size(d.used), format_size(d.total))),
                    ])
                })
                .collect();
            let disks = Paragraph::new(disk_lines).block(Block::default().borders(Borders::ALL).title(" Disks "));
            frame.render_widget(disks, chunks[3]);

            let rows: Vec<Row> = snap
                .processes
                .iter()
                .map(|p| {
                    Row::new(vec![
                        Cell::from(p.pid.to_string()),
                        Cell::from(p.name.clone()),
                        Cell::from(format!("{:.1}%", p.cpu_percent)),
                        Cell::from(format_size(p.memory)),
                    ])
                })
                .collect();
            let table = Table::new(
                rows,
                [Constraint::Length(8), Constraint::Min(20), Constraint::Length(10), Constraint::Length(12)],
            )
            .header(
                Row::new(vec!["PID", "Name", "CPU", "Memory"])
                    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Processes (top {} by CPU) ", snap.processes.len())),
            );
            frame.render_widget(table, chunks[4]);

            let footer = Paragraph::new("  Press 'q' to quit")
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(footer, chunks[5]);
        });
        if let Err(e) = drawn {
            break Err(e.into());
        }

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        break Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            },
            Ok(false) => {}
            Err(e) => break Err(e.into()),
        }

        if last_tick.elapsed() >= tick_rate {
            snap = sampler.sample();
            last_tick = std::time::Instant::now();
        }
    };

    // Restore the terminal even when drawing failed
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}
