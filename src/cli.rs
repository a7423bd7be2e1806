use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config::Config;
use crate::report::Reporter;
use crate::tools::backup::BackupMode;
use crate::tools::checksum::HashAlgorithm;
use crate::tools::dedup::{DedupFilter, DedupReport, KeepStrategy};
use crate::tools::dns::RecordType;
use crate::tools::json::MergeStrategy;
use crate::tools::rename::{CaseMode, RenameMode};
use crate::tools::table::{SampleSize, Table, ValidationRules};
use crate::tools::{
    archive, backup, checksum, classify, crypt, dedup, dns, http, json, monitor, ports, rename, search, table, watch,
    Finding,
};

#[derive(Parser)]
#[command(
    name = "toolkeep",
    about = "Everyday file, data, network and system utilities",
    version,
    after_help = "Examples:\n  toolkeep rename ./photos --template 'trip_{n:03}{ext}'   Preview a batch rename\n  toolkeep search TODO src --content                      Search file contents\n  toolkeep checksum generate dist -o SHA256SUMS -a sha256  Write a checksum manifest\n  toolkeep dedup ~/Downloads --report dupes.json          Find duplicate files\n  toolkeep csv data.csv --clean --sort age --summary      Clean and sort a CSV\n  toolkeep json query config.json servers[0].host         Query a JSON path\n  toolkeep ports localhost -p 1-1024                      Scan TCP ports\n  toolkeep csv validate data.csv --unique id              Check a CSV for duplicates\n  toolkeep watch ./src -p '*.rs' --duration 60            Report file changes\n  toolkeep monitor --tui                                  Live system dashboard"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Suppress banner output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "pretty")]
    pub format: OutputFormat,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Dry run: show what would change without touching any file
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Also save the report as JSON to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub save: Option<String>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Minimal,
}

#[derive(Subcommand)]
pub enum Command {
    /// Batch rename files by regex, template or prefix/suffix
    Rename {
        /// Directory holding the files
        dir: PathBuf,
        /// Glob selecting files inside the directory
        #[arg(short, long, default_value = "*")]
        pattern: String,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Regex applied to each file name
        #[arg(long, conflicts_with_all = ["template", "prefix", "suffix"])]
        regex: Option<String>,
        /// Replacement for --regex: $1, ${name}; write ${1} when a letter, digit or _ follows
        /// (`$1_x` reads as a group named `1_x`)
        #[arg(long, requires = "regex")]
        replace: Option<String>,
        /// Name template: {n}, {n:03}, {name}, {ext}
        #[arg(short, long, conflicts_with_all = ["prefix", "suffix"])]
        template: Option<String>,
        /// First sequence number for {n}
        #[arg(long)]
        start: Option<usize>,
        /// Case conversion for template renames (alone: applied to the current names)
        #[arg(long, conflicts_with_all = ["regex", "prefix", "suffix"])]
        case: Option<CaseMode>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        suffix: Option<String>,
        /// Apply the renames (default is preview only)
        #[arg(long)]
        execute: bool,
    },

    /// Find files by name or content
    Search {
        /// Text or regex to look for
        query: String,
        /// Roots to search
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
        /// Match file contents instead of names
        #[arg(short, long)]
        content: bool,
        /// Treat the query as a regular expression
        #[arg(short, long)]
        regex: bool,
        #[arg(short, long)]
        ignore_case: bool,
        /// Include dot-files and dot-directories
        #[arg(long)]
        hidden: bool,
        /// Skip files larger than this many bytes in content mode
        #[arg(long)]
        max_size: Option<u64>,
    },

    /// Generate or verify checksum manifests
    Checksum {
        #[command(subcommand)]
        action: ChecksumCommand,
    },

    /// Find (and optionally delete) duplicate files
    Dedup {
        dir: PathBuf,
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,
        /// Which copy survives --delete
        #[arg(long)]
        keep: Option<KeepStrategy>,
        /// Only consider these extensions (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
        #[arg(long)]
        min_size: Option<u64>,
        #[arg(long)]
        max_size: Option<u64>,
        /// Delete every duplicate except the kept one
        #[arg(long)]
        delete: bool,
        /// Save a JSON report of the groups
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Sort files into folders by extension or rules
    Classify {
        source: PathBuf,
        target: PathBuf,
        /// JSON rule file
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Move instead of copy
        #[arg(long = "move")]
        move_files: bool,
    },

    /// Timestamped full or incremental backups
    Backup {
        source: PathBuf,
        target: PathBuf,
        #[arg(short, long, default_value = "full")]
        mode: BackupMode,
    },

    /// Create, extract or list zip archives
    Archive {
        #[command(subcommand)]
        action: ArchiveCommand,
    },

    /// Clean, filter, sort, merge and summarize CSV files; validate or sample one
    #[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
    Csv {
        #[command(subcommand)]
        check: Option<CsvCommand>,
        /// Input files; several files are merged first
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Trim cells and drop duplicate rows
        #[arg(long)]
        clean: bool,
        /// Keep rows where COLUMN=VALUE (repeatable)
        #[arg(long)]
        filter: Vec<String>,
        /// Sort by these columns (comma-separated)
        #[arg(long, value_delimiter = ',')]
        sort: Vec<String>,
        #[arg(long)]
        descending: bool,
        /// Rename a column OLD=NEW (repeatable)
        #[arg(long)]
        rename: Vec<String>,
        /// Keep only these columns (comma-separated)
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
        /// Print column types and missing values
        #[arg(long)]
        summary: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report file changes under a directory as they happen
    Watch {
        path: PathBuf,
        /// Only report files matching this glob (repeatable; `*.rs`, `docs/*.md`)
        #[arg(short, long)]
        pattern: Vec<String>,
        /// Skip files matching this glob (repeatable, added to the config list)
        #[arg(short, long)]
        ignore: Vec<String>,
        /// Watch only the top directory
        #[arg(long)]
        no_recursive: bool,
        /// Shell command per event; {file}, {type} and {timestamp} are substituted
        #[arg(short = 'x', long)]
        exec: Option<String>,
        /// Stop after this many seconds (default: Ctrl-C)
        #[arg(short, long)]
        duration: Option<u64>,
        /// Save the event report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encrypt a file with a password (Argon2id + AES-256-GCM)
    Encrypt {
        input: PathBuf,
        /// Default: <input>.enc
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Default: $TOOLKEEP_PASSWORD, then a prompt
        #[arg(long)]
        password: Option<String>,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Decrypt a file written by `encrypt`
    Decrypt {
        input: PathBuf,
        /// Default: the input without .enc
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        force: bool,
    },

    /// Format, query, merge and compare JSON documents
    Json {
        #[command(subcommand)]
        action: JsonCommand,
    },

    /// TCP connect scan
    Ports {
        host: String,
        /// Ports: 22,80,443 or 1-1024 (default: common services)
        #[arg(short, long)]
        ports: Option<String>,
        /// Connect timeout per port (ms)
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Resolve A/AAAA records
    Dns {
        domain: Option<String>,
        /// File with one domain per line
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short = 't', long = "type", default_value = "any")]
        record_type: RecordType,
    },

    /// Send HTTP requests and measure latency
    Http {
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request header "Name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body, or @file to read it from a file
        #[arg(short, long)]
        data: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Fail unless the response has this status
        #[arg(long)]
        expect_status: Option<u16>,
        /// Send the request N times and report latency
        #[arg(long)]
        repeat: Option<usize>,
        /// Print the response body to stdout
        #[arg(long)]
        body: bool,
    },

    /// System resource check, periodic sampling or live dashboard
    Monitor {
        /// Live dashboard
        #[arg(long, conflicts_with_all = ["once", "duration"])]
        tui: bool,
        /// Single snapshot (default)
        #[arg(long, conflicts_with = "duration")]
        once: bool,
        /// Seconds between samples
        #[arg(long, default_value_t = 1)]
        interval: u64,
        /// Sample for this many seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Save samples to a .json or .csv file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current system status
    Status,

    /// Write the default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ChecksumCommand {
    /// Hash files (directories recurse) into "<hex>  <path>" lines
    Generate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,
        /// Manifest path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check files against a manifest
    Verify {
        manifest: PathBuf,
        /// Defaults to the manifest extension, then config
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,
    },
}

#[derive(Subcommand)]
pub enum ArchiveCommand {
    /// Pack files and directories into a .zip
    Compress {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Unpack a .zip
    Extract {
        archive: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Show the entries of a .zip
    List { archive: PathBuf },
}

#[derive(Subcommand)]
pub enum CsvCommand {
    /// Check missing values, uniqueness and column types
    Validate {
        file: PathBuf,
        /// Missing values per column (the default when no other check is given)
        #[arg(long)]
        nulls: bool,
        /// Columns whose values must be unique (comma-separated)
        #[arg(long, value_delimiter = ',')]
        unique: Vec<String>,
        /// Expected type COLUMN=int|float|bool|str (repeatable)
        #[arg(long = "type", value_name = "COLUMN=TYPE")]
        types: Vec<String>,
        /// Columns that must not be empty (comma-separated)
        #[arg(long, value_delimiter = ',')]
        not_null: Vec<String>,
        /// JSON rules: {"unique": [..], "types": {..}, "not_null": [..]}
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Random sample of rows, optionally per group
    Sample {
        file: PathBuf,
        /// Number of rows (per group with --stratify)
        #[arg(short = 'n', long = "rows", conflicts_with = "frac")]
        rows: Option<usize>,
        /// Fraction of rows, 0 < F <= 1
        #[arg(long)]
        frac: Option<f64>,
        /// Sample each value of this column separately
        #[arg(long)]
        stratify: Option<String>,
        /// Random seed (default from config)
        #[arg(long)]
        seed: Option<u64>,
        /// .csv or .json (default: <stem>_sample.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum JsonCommand {
    /// Pretty-print (reads stdin when FILE is omitted or "-")
    Format {
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 2)]
        indent: usize,
        #[arg(long)]
        sort_keys: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compact output
    Minify {
        file: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the value at a path like a.b[0].c
    Query { file: PathBuf, path: String },
    /// List every path where KEY occurs
    Find { file: PathBuf, key: String },
    /// Merge documents left to right
    Merge {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "deep")]
        strategy: MergeStrategy,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Structural diff of two documents
    Compare { left: PathBuf, right: PathBuf },
    /// Type, size and depth of a document
    Summary { file: Option<PathBuf> },
}

impl Cli {
    pub fn load_config(&self) -> anyhow::Result<Config> {
        // init creates the file, so it must not require one
        if matches!(self.command, Some(Command::Init { .. })) {
            return Ok(Config::default());
        }
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load_or_default(),
        }
    }

    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self.command {
            Some(Command::Rename {
                ref dir,
                ref pattern,
                recursive,
                ref regex,
                ref replace,
                ref template,
                start,
                case,
                ref prefix,
                ref suffix,
                execute,
            }) => {
                let case = case.unwrap_or(config.rename.case);
                let mode = match (regex, template, prefix, suffix) {
                    (Some(pattern), _, _, _) => RenameMode::Regex {
                        pattern: pattern.clone(),
                        replacement: replace.clone().unwrap_or_default(),
                    },
                    (None, Some(template), _, _) => RenameMode::Template {
                        template: template.clone(),
                        start: start.unwrap_or(config.rename.start_number),
                        case,
                    },
                    (None, None, None, None) if case != CaseMode::None => RenameMode::Template {
                        template: "{name}{ext}".into(),
                        start: 1,
                        case,
                    },
                    (None, None, None, None) => {
                        anyhow::bail!("nothing to do: give --regex, --template, --prefix/--suffix or --case")
                    }
                    (None, None, prefix, suffix) => RenameMode::Affix {
                        prefix: prefix.clone().unwrap_or_default(),
                        suffix: suffix.clone().unwrap_or_default(),
                    },
                };
                self.cmd_rename(dir, pattern, recursive, &mode, execute)
            }
            Some(Command::Search {
                ref query,
                ref paths,
                content,
                regex,
                ignore_case,
                hidden,
                max_size,
            }) => {
                let opts = search::SearchOptions {
                    content,
                    regex,
                    ignore_case,
                    skip_hidden: !hidden && config.search.skip_hidden,
                    max_file_size: max_size.unwrap_or(config.search.max_file_size),
                };
                self.cmd_search(query, paths, &opts)
            }
            Some(Command::Checksum { ref action }) => self.cmd_checksum(&config, action),
            Some(Command::Dedup {
                ref dir,
                algorithm,
                keep,
                ref ext,
                min_size,
                max_size,
                delete,
                ref report,
            }) => {
                let filter = DedupFilter {
                    extensions: DedupFilter::normalize_extensions(ext),
                    min_size: min_size.unwrap_or(config.dedup.min_size),
                    max_size,
                };
                let algorithm = algorithm.unwrap_or(config.dedup.algorithm);
                let keep = keep.unwrap_or(config.dedup.keep);
                self.cmd_dedup(&config, dir, &filter, algorithm, keep, delete, report.as_deref())
            }
            Some(Command::Classify {
                ref source,
                ref target,
                ref rules,
                move_files,
            }) => self.cmd_classify(source, target, rules.as_deref(), move_files),
            Some(Command::Backup {
                ref source,
                ref target,
                mode,
            }) => self.cmd_backup(&config, source, target, mode),
            Some(Command::Archive { ref action }) => self.cmd_archive(action),
            Some(Command::Csv { check: Some(ref check), .. }) => self.cmd_csv_check(&config, check),
            Some(Command::Csv {
                check: None,
                ref files,
                clean,
                ref filter,
                ref sort,
                descending,
                ref rename,
                ref select,
                summary,
                ref output,
            }) => {
                let ops = CsvOps {
                    clean,
                    filter: filter.iter().map(|f| table::parse_pair(f)).collect::<Result<_, _>>()?,
                    sort: sort.clone(),
                    descending,
                    rename: rename.iter().map(|f| table::parse_pair(f)).collect::<Result<_, _>>()?,
                    select: select.clone(),
                };
                self.cmd_csv(files, &ops, summary, output.as_deref())
            }
            Some(Command::Watch {
                ref path,
                ref pattern,
                ref ignore,
                no_recursive,
                ref exec,
                duration,
                ref output,
            }) => {
                let mut ignore_all = config.watch.ignore.clone();
                ignore_all.extend(ignore.iter().cloned());
                let opts = watch::WatchOptions {
                    patterns: pattern.clone(),
                    ignore: ignore_all,
                    recursive: config.watch.recursive && !no_recursive,
                    command: exec.clone(),
                };
                self.cmd_watch(path, opts, duration.map(Duration::from_secs), output.as_deref())
                    .await
            }
            Some(Command::Encrypt {
                ref input,
                ref output,
                ref password,
                force,
            }) => self.cmd_crypt(true, input, output.as_deref(), password.as_deref(), force),
            Some(Command::Decrypt {
                ref input,
                ref output,
                ref password,
                force,
            }) => self.cmd_crypt(false, input, output.as_deref(), password.as_deref(), force),
            Some(Command::Json { ref action }) => self.cmd_json(action),
            Some(Command::Ports {
                ref host,
                ports: ref port_spec,
                timeout,
                concurrency,
            }) => {
                let list = match port_spec {
                    Some(spec) => ports::parse_ports(spec)?,
                    None => ports::common_ports(),
                };
                let timeout = Duration::from_millis(timeout.unwrap_or(config.ports.timeout_ms));
                let concurrency = concurrency.unwrap_or(config.ports.concurrency);
                self.cmd_ports(host, &list, timeout, concurrency).await
            }
            Some(Command::Dns {
                ref domain,
                ref file,
                record_type,
            }) => self.cmd_dns(domain.as_deref(), file.as_deref(), record_type).await,
            Some(Command::Http {
                ref url,
                ref method,
                ref headers,
                ref data,
                timeout,
                expect_status,
                repeat,
                body,
            }) => {
                let timeout = Duration::from_secs(timeout.unwrap_or(config.http.timeout_secs));
                let spec = http::RequestSpec {
                    method: http::parse_method(method)?,
                    url: url.clone(),
                    headers: http::parse_headers(headers)?,
                    body: http::resolve_body(data.as_deref())?,
                    timeout,
                };
                self.cmd_http(&spec, expect_status, repeat, body).await
            }
            Some(Command::Monitor {
                tui,
                once: _,
                interval,
                duration,
                ref output,
            }) => self.cmd_monitor(&config, tui, interval, duration, output.as_deref()).await,
            Some(Command::Status) => self.cmd_status(&config).await,
            Some(Command::Init { force }) => self.cmd_init(force),
            None => {
                // Default: quick status
                self.cmd_status(&config).await
            }
        }
    }

    /// Write the JSON report when `--save` was given
    fn save_report(&self, reporter: &Reporter) -> anyhow::Result<()> {
        if let Some(path) = &self.save {
            reporter.save_json(path)?;
            eprintln!("  {} Report saved: {}", "✓".green(), path);
        }
        Ok(())
    }

    /// Print the report; any Error finding turns into a non-zero exit
    fn finish(&self, reporter: &Reporter) -> anyhow::Result<()> {
        reporter.print(&self.format);
        self.save_report(reporter)?;
        if reporter.has_failures() {
            anyhow::bail!("{} item(s) failed", reporter.summary().failed);
        }
        Ok(())
    }

    fn cmd_rename(
        &self,
        dir: &std::path::Path,
        pattern: &str,
        recursive: bool,
        mode: &RenameMode,
        execute: bool,
    ) -> anyhow::Result<()> {
        let preview = self.dry_run || !execute;
        eprintln!("{}", format!("  ── Rename: {} ──", dir.display()).cyan().bold());

        let files = rename::collect_files(dir, pattern, recursive)?;
        let plans = rename::plan(&files, mode)?;
        let results = rename::execute(plans, preview);

        let mut reporter = Reporter::new();
        reporter.add_section("Rename", rename::findings(&results));
        if preview && !results.is_empty() {
            eprintln!("  {} Preview only; pass {} to apply", "!".yellow(), "--execute".bold());
        }
        self.finish(&reporter)
    }

    fn cmd_search(&self, query: &str, paths: &[PathBuf], opts: &search::SearchOptions) -> anyhow::Result<()> {
        eprintln!("{}", format!("  ── Search: {} ──", query).cyan().bold());
        let outcome = search::search(paths, query, opts)?;

        if matches!(self.format, OutputFormat::Pretty) {
            // grep-style listing with highlighted matches
            let matcher = search::Matcher::new(query, opts.regex, opts.ignore_case)?;
            for m in &outcome.matches {
                if m.hits.is_empty() {
                    println!("{}", matcher.highlight(&m.path.display().to_string()));
                }
                for hit in &m.hits {
                    println!("{}:{}: {}", m.path.display(), hit.line.to_string().dimmed(), matcher.highlight(&hit.text));
                }
            }
            for root in &outcome.missing_roots {
                eprintln!("  {} Path does not exist: {}", "!".yellow(), root.display());
            }
            eprintln!(
                "  {} {} matching files ({} scanned)",
                "→".dimmed(),
                outcome.matches.len(),
                outcome.files_scanned
            );
        }

        let mut reporter = Reporter::new();
        reporter.add_section("Search", search::findings(&outcome));
        if matches!(self.format, OutputFormat::Pretty) {
            return self.save_report(&reporter);
        }
        self.finish(&reporter)
    }

    fn cmd_checksum(&self, config: &Config, action: &ChecksumCommand) -> anyhow::Result<()> {
        let chunk = config.checksum.chunk_size;
        match action {
            ChecksumCommand::Generate { files, algorithm, output } => {
                let algo = algorithm.unwrap_or(config.checksum.algorithm);
                eprintln!("{}", format!("  ── Checksum: generate ({}) ──", algo.name()).green().bold());
                let entries = checksum::generate(files, algo, chunk);

                match output {
                    Some(path) if !self.dry_run => {
                        let mut file = std::fs::File::create(path)
                            .with_context(|| format!("creating {}", path.display()))?;
                        let base = match path.parent() {
                            Some(dir) if !dir.as_os_str().is_empty() => dir,
                            _ => std::path::Path::new("."),
                        };
                        let n = checksum::write_manifest(&entries, Some(base), &mut file)?;
                        eprintln!("  {} {} checksums written to {}", "✓".green(), n, path.display());
                    }
                    _ => {
                        checksum::write_manifest(&entries, None, &mut std::io::stdout().lock())?;
                    }
                }

                let failures: Vec<Finding> = entries
                    .iter()
                    .filter_map(|e| e.hash.as_ref().err().map(|err| (e, err)))
                    .map(|(e, err)| Finding::error(e.path.display().to_string()).with_detail(err.clone()))
                    .collect();
                let mut reporter = Reporter::new();
                if failures.is_empty() {
                    // Manifest already went to its destination; only honour --save
                    let hashed = entries.iter().map(|e| Finding::ok(e.path.display().to_string())).collect();
                    reporter.add_section("Checksum", hashed);
                    return self.save_report(&reporter);
                }
                reporter.add_section("Checksum", failures);
                self.finish(&reporter)
            }
            ChecksumCommand::Verify { manifest, algorithm } => {
                let algo = algorithm
                    .or_else(|| HashAlgorithm::from_extension(manifest))
                    .unwrap_or(config.checksum.algorithm);
                eprintln!("{}", format!("  ── Checksum: verify ({}) ──", algo.name()).green().bold());
                let entries = checksum::verify(manifest, algo, chunk)?;
                let mut reporter = Reporter::new();
                reporter.add_section("Verify", checksum::verify_findings(&entries));
                self.finish(&reporter)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn cmd_dedup(
        &self,
        config: &Config,
        dir: &std::path::Path,
        filter: &DedupFilter,
        algorithm: HashAlgorithm,
        keep: KeepStrategy,
        delete: bool,
        report: Option<&std::path::Path>,
    ) -> anyhow::Result<()> {
        eprintln!("{}", format!("  ── Dedup: {} ──", dir.display()).yellow().bold());
        let (groups, stats) = dedup::find_duplicates(dir, filter, algorithm, config.checksum.chunk_size)?;
        eprintln!(
            "  {} {} files seen, {} hashed",
            "→".dimmed(),
            stats.files_seen,
            stats.files_hashed
        );

        let mut reporter = Reporter::new();
        reporter.add_section("Duplicates", dedup::group_findings(&groups));

        if let Some(path) = report {
            DedupReport::new(&groups, algorithm).save(path)?;
            eprintln!("  {} Report saved: {}", "✓".green(), path.display());
        }
        if delete {
            let results = dedup::delete_duplicates(&groups, keep, self.dry_run);
            reporter.add_section("Deleted", dedup::delete_findings(&results));
        }
        self.finish(&reporter)
    }

    fn cmd_classify(
        &self,
        source: &std::path::Path,
        target: &std::path::Path,
        rules: Option<&std::path::Path>,
        move_files: bool,
    ) -> anyhow::Result<()> {
        eprintln!("{}", format!("  ── Classify: {} ──", source.display()).magenta().bold());
        let mode = match rules {
            Some(path) => classify::ClassifyMode::ByRules(classify::RuleSet::load(path)?),
            None => classify::ClassifyMode::ByExtension,
        };
        let plans = classify::plan(source, target, &mode)?;
        let results = classify::execute(&plans, target, move_files, self.dry_run);

        let mut reporter = Reporter::new();
        reporter.add_section("Classify", classify::findings(&results));
        self.finish(&reporter)
    }

    fn cmd_backup(
        &self,
        config: &Config,
        source: &std::path::Path,
        target: &std::path::Path,
        mode: BackupMode,
    ) -> anyhow::Result<()> {
        eprintln!("{}", format!("  ── Backup: {} ──", source.display()).blue().bold());
        let summary = backup::backup(source, target, mode, &config.backup.timestamp_format, self.dry_run)?;
        let mut reporter = Reporter::new();
        reporter.add_section("Backup", backup::findings(&summary, self.dry_run));
        self.finish(&reporter)
    }

    fn cmd_archive(&self, action: &ArchiveCommand) -> anyhow::Result<()> {
        let mut reporter = Reporter::new();
        match action {
            ArchiveCommand::Compress { inputs, output } => {
                eprintln!("{}", format!("  ── Archive: {} ──", output.display()).blue().bold());
                if self.dry_run {
                    let planned = inputs
                        .iter()
                        .map(|i| Finding::info(format!("would add {}", i.display())).with_tool("archive"))
                        .collect();
                    reporter.add_section("Archive", planned);
                } else {
                    let entries = archive::compress(inputs, output)?;
                    reporter.add_section("Archive", archive::findings(&entries, "Archived"));
                }
            }
            ArchiveCommand::Extract { archive: path, output } => {
                eprintln!("{}", format!("  ── Extract: {} ──", path.display()).blue().bold());
                if self.dry_run {
                    let entries = archive::list(path)?;
                    reporter.add_section("Extract", archive::findings(&entries, "Would extract"));
                } else {
                    let entries = archive::extract(path, output)?;
                    reporter.add_section("Extract", archive::findings(&entries, "Extracted"));
                }
            }
            ArchiveCommand::List { archive: path } => {
                eprintln!("{}", format!("  ── Archive: {} ──", path.display()).blue().bold());
                let entries = archive::list(path)?;
                reporter.add_section("Entries", archive::findings(&entries, "Listed"));
            }
        }
        self.finish(&reporter)
    }

    fn cmd_csv(
        &self,
        files: &[PathBuf],
        ops: &CsvOps,
        summary: bool,
        output: Option<&std::path::Path>,
    ) -> anyhow::Result<()> {
        eprintln!("{}", "  ── CSV ──".green().bold());
        let mut data = if files.len() > 1 {
            table::merge(files)?
        } else {
            Table::load(&files[0])?
        };
        let changed = ops.apply(&mut data)? || files.len() > 1;

        let mut reporter = Reporter::new();
        if changed || output.is_some() {
            let out = output
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| table::default_output(&files[0]));
            let finding = if self.dry_run {
                Finding::info(format!("would write {} rows to {}", data.rows.len(), out.display()))
            } else {
                data.save(&out)?;
                Finding::ok(format!("{} rows written to {}", data.rows.len(), out.display()))
            };
            reporter.add_section("Output", vec![finding.with_tool("csv")]);
        }
        if summary || !changed {
            reporter.add_section("Summary", table::summary_findings(&data.summary()));
        }
        self.finish(&reporter)
    }

    fn cmd_csv_check(&self, config: &Config, check: &CsvCommand) -> anyhow::Result<()> {
        match check {
            CsvCommand::Validate {
                file,
                nulls,
                unique,
                types,
                not_null,
                rules,
            } => {
                eprintln!("{}", format!("  ── CSV: validate {} ──", file.display()).green().bold());
                let mut checks = match rules {
                    Some(path) => ValidationRules::load(path)?,
                    None => ValidationRules::default(),
                };
                checks.nulls |= *nulls;
                checks.unique.extend(unique.iter().cloned());
                checks.not_null.extend(not_null.iter().cloned());
                for raw in types {
                    let (column, kind) = table::parse_pair(raw)?;
                    checks.types.insert(column, kind.parse()?);
                }
                if checks.is_empty() {
                    checks.nulls = true;
                }

                let data = Table::load(file)?;
                let mut reporter = Reporter::new();
                reporter.add_section("Validation", table::validation_findings(&data.validate(&checks)));
                self.finish(&reporter)
            }
            CsvCommand::Sample {
                file,
                rows,
                frac,
                stratify,
                seed,
                output,
            } => {
                eprintln!("{}", format!("  ── CSV: sample {} ──", file.display()).green().bold());
                let size = SampleSize::new(*rows, *frac)?;
                let data = Table::load(file)?;
                let picked = data.sample(size, stratify.as_deref(), seed.unwrap_or(config.csv.sample_seed))?;
                let out = output.clone().unwrap_or_else(|| table::output_with_suffix(file, "sample"));

                let finding = if self.dry_run {
                    Finding::info(format!("would write {} of {} rows to {}", picked.rows.len(), data.rows.len(), out.display()))
                } else {
                    picked.save_as(&out)?;
                    Finding::ok(format!("{} of {} rows written to {}", picked.rows.len(), data.rows.len(), out.display()))
                };
                let mut reporter = Reporter::new();
                reporter.add_section("Sample", vec![finding.with_tool("csv")]);
                self.finish(&reporter)
            }
        }
    }

    async fn cmd_watch(
        &self,
        root: &std::path::Path,
        mut opts: watch::WatchOptions,
        duration: Option<Duration>,
        output: Option<&std::path::Path>,
    ) -> anyhow::Result<()> {
        eprintln!("{}", format!("  ── Watch: {} ──", root.display()).cyan().bold());
        if self.dry_run && opts.command.is_some() {
            eprintln!("  {} Dry run: --exec commands are not run", "!".yellow());
            opts.command = None;
        }
        match duration {
            Some(d) => eprintln!("  {} Watching for {}s", "→".dimmed(), d.as_secs()),
            None => eprintln!("  {} Watching until Ctrl-C", "→".dimmed()),
        }

        let events = watch::watch(root, &opts, duration).await?;
        let report = watch::WatchReport::new(root, events);
        if let Some(path) = output {
            if self.dry_run {
                eprintln!("  {} would save {} events to {}", "!".yellow(), report.total, path.display());
            } else {
                report.save(path)?;
                eprintln!("  {} Event report saved: {}", "✓".green(), path.display());
            }
        }

        let mut reporter = Reporter::new();
        reporter.add_section("Changes", watch::findings(&report));
        self.finish(&reporter)
    }

    fn cmd_crypt(
        &self,
        encrypt: bool,
        input: &std::path::Path,
        output: Option<&std::path::Path>,
        password: Option<&str>,
        force: bool,
    ) -> anyhow::Result<()> {
        let verb = if encrypt { "Encrypted" } else { "Decrypted" };
        eprintln!("{}", format!("  ── {}: {} ──", if encrypt { "Encrypt" } else { "Decrypt" }, input.display()).yellow().bold());
        let out = output
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| crypt::default_output(input, encrypt));

        let mut reporter = Reporter::new();
        if self.dry_run {
            reporter.add_section(
                "Crypt",
                vec![Finding::info(format!("would write {}", out.display())).with_tool("crypt")],
            );
            return self.finish(&reporter);
        }

        let password = crypt::resolve_password(password, encrypt)?;
        let summary = if encrypt {
            crypt::encrypt_file(input, &out, &password, force)?
        } else {
            crypt::decrypt_file(input, &out, &password, force)?
        };
        reporter.add_section("Crypt", crypt::findings(&summary, verb));
        self.finish(&reporter)
    }

    fn cmd_json(&self, action: &JsonCommand) -> anyhow::Result<()> {
        match action {
            JsonCommand::Format {
                file,
                indent,
                sort_keys,
                output,
            } => {
                let value = json::load(file.as_deref())?;
                self.emit(&json::format(&value, *indent, *sort_keys)?, output.as_deref())
            }
            JsonCommand::Minify { file, output } => {
                let value = json::load(file.as_deref())?;
                self.emit(&json::minify(&value)?, output.as_deref())
            }
            JsonCommand::Query { file, path } => {
                let value = json::load(Some(file.as_path()))?;
                let found = json::get_path(&value, path)?;
                match found {
                    serde_json::Value::String(s) => println!("{}", s),
                    other => println!("{}", serde_json::to_string_pretty(other)?),
                }
                Ok(())
            }
            JsonCommand::Find { file, key } => {
                let value = json::load(Some(file.as_path()))?;
                let paths = json::find_keys(&value, key);
                if paths.is_empty() {
                    eprintln!("  {} key '{}' not found", "!".yellow(), key);
                }
                for path in paths {
                    println!("{}", path);
                }
                Ok(())
            }
            JsonCommand::Merge { files, strategy, output } => {
                let mut merged = json::load(Some(files[0].as_path()))?;
                for file in &files[1..] {
                    let next = json::load(Some(file.as_path()))?;
                    json::merge(&mut merged, next, *strategy)
                        .with_context(|| format!("merging {}", file.display()))?;
                }
                self.emit(&json::format(&merged, 2, false)?, output.as_deref())
            }
            JsonCommand::Compare { left, right } => {
                eprintln!("{}", "  ── JSON compare ──".green().bold());
                let diff = json::compare(&json::load(Some(left.as_path()))?, &json::load(Some(right.as_path()))?);
                let mut reporter = Reporter::new();
                reporter.add_section("Differences", json::diff_findings(&diff));
                self.finish(&reporter)
            }
            JsonCommand::Summary { file } => {
                let value = json::load(file.as_deref())?;
                let mut reporter = Reporter::new();
                reporter.add_section("Summary", json::summary_findings(&json::summary(&value)));
                self.finish(&reporter)
            }
        }
    }

    /// Machine output goes to stdout unless an output file is given
    fn emit(&self, text: &str, output: Option<&std::path::Path>) -> anyhow::Result<()> {
        match output {
            Some(path) if self.dry_run => {
                eprintln!("  {} would write {} bytes to {}", "!".yellow(), text.len(), path.display());
            }
            Some(path) => {
                std::fs::write(path, format!("{}\n", text)).with_context(|| format!("writing {}", path.display()))?;
                eprintln!("  {} Written: {}", "✓".green(), path.display());
            }
            None => println!("{}", text),
        }
        Ok(())
    }

    async fn cmd_ports(&self, host: &str, list: &[u16], timeout: Duration, concurrency: usize) -> anyhow::Result<()> {
        eprintln!(
            "{}",
            format!("  ── Ports: {} ({} ports) ──", host, list.len()).red().bold()
        );
        let states = ports::scan(host, list, timeout, concurrency).await?;
        let mut reporter = Reporter::new();
        reporter.add_section("Ports", ports::findings(host, &states));
        self.finish(&reporter)
    }

    async fn cmd_dns(
        &self,
        domain: Option<&str>,
        file: Option<&std::path::Path>,
        record_type: RecordType,
    ) -> anyhow::Result<()> {
        let mut domains: Vec<String> = domain.map(|d| vec![d.to_string()]).unwrap_or_default();
        if let Some(path) = file {
            domains.extend(dns::load_domains(path)?);
        }
        if domains.is_empty() {
            anyhow::bail!("give a domain or --file");
        }
        eprintln!("{}", format!("  ── DNS: {} domains ──", domains.len()).cyan().bold());
        let lookups = dns::lookup_all(&domains, record_type).await;
        let mut reporter = Reporter::new();
        reporter.add_section("DNS", dns::findings(&lookups));
        self.finish(&reporter)
    }

    async fn cmd_http(
        &self,
        spec: &http::RequestSpec,
        expect_status: Option<u16>,
        repeat: Option<usize>,
        show_body: bool,
    ) -> anyhow::Result<()> {
        eprintln!("{}", format!("  ── HTTP: {} {} ──", spec.method, spec.url).magenta().bold());
        let client = http::client(spec.timeout)?;
        let mut reporter = Reporter::new();

        match repeat {
            Some(n) if n > 1 => {
                let stats = http::repeat(&client, spec, n, expect_status).await;
                reporter.add_section("Performance", http::stats_findings(&stats));
            }
            _ => {
                let resp = http::send(&client, spec).await?;
                if show_body {
                    println!("{}", resp.body);
                }
                reporter.add_section("Response", http::response_findings(&resp, expect_status));
            }
        }
        self.finish(&reporter)
    }

    async fn cmd_monitor(
        &self,
        config: &Config,
        tui: bool,
        interval: u64,
        duration: Option<u64>,
        output: Option<&std::path::Path>,
    ) -> anyhow::Result<()> {
        if tui {
            eprintln!("{}", "  ── Monitor: live ──".magenta().bold());
            return monitor::monitor_tui(&config.monitor).await;
        }

        let mut sampler = monitor::Sampler::new(config.monitor.top_processes).await;
        let samples = match duration {
            Some(secs) => {
                eprintln!(
                    "{}",
                    format!("  ── Monitor: sampling every {}s for {}s ──", interval, secs).magenta().bold()
                );
                monitor::collect(&mut sampler, Duration::from_secs(interval), Duration::from_secs(secs)).await
            }
            None => {
                eprintln!("{}", "  ── Monitor: snapshot ──".magenta().bold());
                vec![sampler.sample()]
            }
        };

        if let Some(path) = output {
            if self.dry_run {
                eprintln!("  {} would save {} samples to {}", "!".yellow(), samples.len(), path.display());
            } else {
                monitor::save_samples(&samples, path)?;
                eprintln!("  {} {} samples saved: {}", "✓".green(), samples.len(), path.display());
            }
        }

        let mut reporter = Reporter::new();
        if let Some(last) = samples.last() {
            reporter.add_section("Resources", monitor::evaluate(last, &config.monitor));
            let top = last
                .processes
                .iter()
                .map(|p| {
                    Finding::info(format!("{} (PID {}) {:.1}% CPU", p.name, p.pid, p.cpu_percent))
                        .with_tool("monitor")
                })
                .collect();
            reporter.add_section("Top processes", top);
        }
        self.finish(&reporter)
    }

    async fn cmd_status(&self, config: &Config) -> anyhow::Result<()> {
        eprintln!("{}", "  ── System Status ──".green().bold());
        let mut sampler = monitor::Sampler::new(config.monitor.top_processes).await;
        let snapshot = sampler.sample();

        let mut reporter = Reporter::new();
        reporter.add_section("System", monitor::status_findings(&sampler.host_info(), &snapshot));
        reporter.print(&self.format);
        self.save_report(&reporter)?;
        eprintln!("  {} Run {} for the list of tools", "→".green(), "toolkeep --help".bold());
        Ok(())
    }

    fn cmd_init(&self, force: bool) -> anyhow::Result<()> {
        let path = self.config.clone().unwrap_or_else(Config::default_path);
        if path.exists() && !force {
            eprintln!("  {} Config already exists: {} (use --force to overwrite)", "!".yellow(), path.display());
            return Ok(());
        }
        if self.dry_run {
            eprintln!("  {} Would write config: {}", "!".yellow(), path.display());
            return Ok(());
        }
        Config::default().save_to(&path)?;
        eprintln!("  {} Config created: {}", "✓".green(), path.display());
        Ok(())
    }
}

/// Table transformations in the order they are applied
struct CsvOps {
    clean: bool,
    filter: Vec<(String, String)>,
    sort: Vec<String>,
    descending: bool,
    rename: Vec<(String, String)>,
    select: Vec<String>,
}

impl CsvOps {
    /// Returns whether any operation ran
    fn apply(&self, data: &mut Table) -> anyhow::Result<bool> {
        let mut changed = false;
        if self.clean {
            let removed = data.clean();
            eprintln!("  {} clean: {} duplicate rows removed", "→".dimmed(), removed);
            changed = true;
        }
        if !self.filter.is_empty() {
            let left = data.filter(&self.filter)?;
            eprintln!("  {} filter: {} rows kept", "→".dimmed(), left);
            changed = true;
        }
        if !self.sort.is_empty() {
            data.sort(&self.sort, self.descending)?;
            changed = true;
        }
        if !self.rename.is_empty() {
            data.rename(&self.rename)?;
            changed = true;
        }
        if !self.select.is_empty() {
            data.select(&self.select)?;
            changed = true;
        }
        Ok(changed)
    }
}
