//! Checksum manifests: generate `<hex>  <path>` lines and verify them later.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::Digest;
use walkdir::WalkDir;

use super::{Finding, ToolError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Guess from a manifest file extension (`files.sha256`, `SUMS.b3`)
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md5" => Some(HashAlgorithm::Md5),
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha256" => Some(HashAlgorithm::Sha256),
            "b3" | "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algo: HashAlgorithm) -> Self {
        match algo {
            HashAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            HashAlgorithm::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Stream a file through the hasher in `chunk_size` reads; lowercase hex
pub fn hash_file(path: &Path, algo: HashAlgorithm, chunk_size: usize) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algo);
    let mut buf = vec![0u8; chunk_size.max(512)];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

#[derive(Debug)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub hash: Result<String, String>,
}

/// Hash every input; directories expand to their files in path order
pub fn generate(inputs: &[PathBuf], algo: HashAlgorithm, chunk_size: usize) -> Vec<ManifestEntry> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut inner: Vec<PathBuf> = WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            files.append(&mut inner);
        } else {
            files.push(input.clone());
        }
    }

    files
        .into_iter()
        .map(|path| {
            let hash = hash_file(&path, algo, chunk_size).map_err(|e| e.to_string());
            if let Err(e) = &hash {
                tracing::warn!("cannot hash {}: {}", path.display(), e);
            }
            ManifestEntry { path, hash }
        })
        .collect()
}

/// Path as it should appear in a manifest stored in `base`: relative to `base`
/// when the file lives under it, absolute otherwise. Without a base the path is kept.
pub fn manifest_path(path: &Path, base: Option<&Path>) -> PathBuf {
    let Some(base) = base else {
        return path.to_path_buf();
    };
    let (Ok(file), Ok(dir)) = (path.canonicalize(), base.canonicalize()) else {
        return path.to_path_buf();
    };
    match file.strip_prefix(&dir) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => file,
    }
}

/// Write successful entries as `<hex>  <path>` lines. `base` is the directory the
/// manifest will live in, so `verify` finds the files again from there.
pub fn write_manifest(entries: &[ManifestEntry], base: Option<&Path>, out: &mut impl Write) -> std::io::Result<usize> {
    let mut written = 0;
    for entry in entries {
        if let Ok(hash) = &entry.hash {
            writeln!(out, "{}  {}", hash, manifest_path(&entry.path, base).display())?;
            written += 1;
        }
    }
    Ok(written)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    Ok,
    Mismatch { expected: String, actual: String },
    Missing,
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct VerifyEntry {
    pub path: PathBuf,
    pub status: VerifyStatus,
}

/// Parse a manifest line into (hash, path); `*path` (binary mode marker) is accepted
pub fn parse_line(line: &str, line_no: usize) -> Result<(String, String), ToolError> {
    let malformed = || ToolError::MalformedChecksumLine {
        line: line_no,
        content: line.to_string(),
    };
    let (hash, rest) = line.split_once(char::is_whitespace).ok_or_else(malformed)?;
    let path = rest.trim_start();
    let path = path.strip_prefix('*').unwrap_or(path);
    if hash.is_empty() || path.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    Ok((hash.to_ascii_lowercase(), path.to_string()))
}

/// Check every entry of a manifest; relative paths resolve against the manifest's directory
pub fn verify(manifest: &Path, algo: HashAlgorithm, chunk_size: usize) -> anyhow::Result<Vec<VerifyEntry>> {
    let content = std::fs::read_to_string(manifest)
        .map_err(|e| anyhow::anyhow!("reading {}: {}", manifest.display(), e))?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));

    let mut entries = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (expected, name) = parse_line(line, idx + 1)?;
        let listed = PathBuf::from(&name);
        let path = if listed.is_absolute() { listed.clone() } else { base.join(&listed) };

        let status = if !path.exists() {
            VerifyStatus::Missing
        } else {
            match hash_file(&path, algo, chunk_size) {
                Ok(actual) if actual == expected => VerifyStatus::Ok,
                Ok(actual) => VerifyStatus::Mismatch { expected, actual },
                Err(e) => VerifyStatus::Unreadable(e.to_string()),
            }
        };
        tracing::debug!("{}: {:?}", name, status);
        entries.push(VerifyEntry { path: listed, status });
    }
    Ok(entries)
}

pub fn verify_findings(entries: &[VerifyEntry]) -> Vec<Finding> {
    let mut findings: Vec<Finding> = entries
        .iter()
        .map(|entry| {
            let name = entry.path.display().to_string();
            let finding = match &entry.status {
                VerifyStatus::Ok => Finding::ok(name),
                VerifyStatus::Mismatch { expected, actual } => Finding::error(format!("{} checksum mismatch", name))
                    .with_detail(format!("expected {}, got {}", expected, actual)),
                VerifyStatus::Missing => Finding::error(format!("{} is missing", name)),
                VerifyStatus::Unreadable(e) => Finding::error(format!("{} unreadable", name)).with_detail(e.clone()),
            };
            finding.with_tool("checksum")
        })
        .collect();

    let ok = entries.iter().filter(|e| e.status == VerifyStatus::Ok).count();
    findings.push(
        Finding::info(format!("{} checked, {} passed, {} failed", entries.len(), ok, entries.len() - ok))
            .with_tool("checksum"),
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn hash_bytes(data: &[u8], algo: HashAlgorithm) -> String {
        let mut hasher = Hasher::new(algo);
        hasher.update(data);
        hasher.finish()
    }

    #[test]
    fn known_digests_of_abc() {
        assert_eq!(hash_bytes(b"abc", HashAlgorithm::Md5), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hash_bytes(b"abc", HashAlgorithm::Sha1), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hash_bytes(b"abc", HashAlgorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_bytes(b"abc", HashAlgorithm::Blake3).len(), 64);
    }

    #[test]
    fn chunked_file_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        for algo in [HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            assert_eq!(hash_file(&path, algo, 1000).unwrap(), hash_bytes(&data, algo));
        }
    }

    #[test]
    fn algorithm_from_extension() {
        assert_eq!(HashAlgorithm::from_extension(Path::new("x.SHA256")), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_extension(Path::new("x.b3")), Some(HashAlgorithm::Blake3));
        assert_eq!(HashAlgorithm::from_extension(Path::new("x.txt")), None);
    }

    #[test]
    fn parse_line_accepts_binary_marker() {
        let (hash, path) = parse_line("ABCDEF01 *dir/file name.txt", 1).unwrap();
        assert_eq!(hash, "abcdef01");
        assert_eq!(path, "dir/file name.txt");
        assert!(matches!(
            parse_line("nothex  file", 3),
            Err(ToolError::MalformedChecksumLine { line: 3, .. })
        ));
        assert!(parse_line("abcdef", 4).is_err());
    }

    #[test]
    fn generate_then_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("b.txt"), "beta").unwrap();
        fs::write(dir.path().join("c.txt"), "gamma").unwrap();

        let inputs: Vec<PathBuf> = ["a.txt", "b.txt", "c.txt"].iter().map(PathBuf::from).collect();
        let abs: Vec<PathBuf> = inputs.iter().map(|p| dir.path().join(p)).collect();
        let entries = generate(&abs, HashAlgorithm::Sha256, 8192);

        // Manifest with relative paths, resolved against its own directory
        let mut manifest = String::from("# sums\n\n");
        for (entry, rel) in entries.iter().zip(&inputs) {
            manifest.push_str(&format!("{}  {}\n", entry.hash.as_ref().unwrap(), rel.display()));
        }
        let manifest_path = dir.path().join("SUMS.sha256");
        fs::write(&manifest_path, manifest).unwrap();

        fs::write(dir.path().join("b.txt"), "BETA").unwrap();
        fs::remove_file(dir.path().join("c.txt")).unwrap();

        let results = verify(&manifest_path, HashAlgorithm::Sha256, 8192).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, VerifyStatus::Ok);
        assert!(matches!(results[1].status, VerifyStatus::Mismatch { .. }));
        assert_eq!(results[2].status, VerifyStatus::Missing);

        let findings = verify_findings(&results);
        assert_eq!(findings.last().unwrap().title, "3 checked, 1 passed, 2 failed");
    }

    #[test]
    fn generate_expands_directories_and_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("d/sub")).unwrap();
        fs::write(dir.path().join("d/b.txt"), "b").unwrap();
        fs::write(dir.path().join("d/sub/a.txt"), "a").unwrap();

        let entries = generate(&[dir.path().join("d"), dir.path().join("missing")], HashAlgorithm::Md5, 64);
        assert_eq!(entries.len(), 3);
        assert!(entries[2].hash.is_err());

        let mut out = Vec::new();
        let written = write_manifest(&entries, None, &mut out).unwrap();
        assert_eq!(written, 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(&format!("{}  ", hash_bytes(b"b", HashAlgorithm::Md5))));
    }

    #[test]
    fn written_manifest_verifies_from_its_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(dist.join("sub")).unwrap();
        fs::write(dist.join("a.txt"), "alpha").unwrap();
        fs::write(dist.join("sub/b.txt"), "beta").unwrap();
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, "elsewhere").unwrap();

        let inputs = vec![dist.clone(), outside.clone()];
        let entries = generate(&inputs, HashAlgorithm::Sha256, 8192);
        assert_eq!(entries.len(), 3);

        let manifest = dist.join("SUMS.sha256");
        let mut file = fs::File::create(&manifest).unwrap();
        assert_eq!(write_manifest(&entries, Some(&dist), &mut file).unwrap(), 3);
        drop(file);

        let text = fs::read_to_string(&manifest).unwrap();
        assert!(text.contains("  a.txt\n"), "{}", text);
        assert!(text.contains(&format!("  {}\n", Path::new("sub").join("b.txt").display())));
        assert!(text.contains(&format!("  {}\n", outside.canonicalize().unwrap().display())));

        let results = verify(&manifest, HashAlgorithm::Sha256, 8192).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == VerifyStatus::Ok), "{:?}", results);
    }

    #[test]
    fn manifest_path_without_base_is_unchanged() {
        assert_eq!(manifest_path(Path::new("dist/a.txt"), None), PathBuf::from("dist/a.txt"));
    }

    #[test]
    fn verify_rejects_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("bad.md5");
        fs::write(&manifest, "only-one-field\n").unwrap();
        assert!(verify(&manifest, HashAlgorithm::Md5, 8192).is_err());
    }
}
