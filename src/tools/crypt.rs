//! Password-based file encryption (Argon2id key, AES-256-GCM).
//!
//! Layout: `TKENC1` magic, 16-byte salt, 12-byte nonce, ciphertext with tag.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;

use super::{format_size, Finding, ToolError};

const MAGIC: &[u8; 6] = b"TKENC1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

/// Read when --password is not given
pub const PASSWORD_ENV: &str = "TOOLKEEP_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("key derivation failed: {}", e))?;
    Ok(key)
}

fn cipher(password: &str, salt: &[u8]) -> Result<Aes256Gcm> {
    let key = derive_key(password, salt)?;
    Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("bad key: {}", e))
}

pub fn encrypt_bytes(plain: &[u8], password: &str) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher(password, &salt)?
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|_| anyhow!("encryption failed"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// `source` only labels the errors
pub fn decrypt_bytes(data: &[u8], password: &str, source: &Path) -> Result<Vec<u8>> {
    if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(ToolError::NotEncrypted(source.to_path_buf()).into());
    }
    let salt = &data[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let nonce = &data[MAGIC.len() + SALT_LEN..HEADER_LEN];
    let plain = cipher(password, salt)?
        .decrypt(Nonce::from_slice(nonce), &data[HEADER_LEN..])
        .map_err(|_| ToolError::DecryptFailed(source.to_path_buf()))?;
    Ok(plain)
}

/// `<file>.enc` when encrypting; decrypting strips `.enc` or appends `.dec`
pub fn default_output(input: &Path, encrypt: bool) -> PathBuf {
    let name = input.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let out = if encrypt {
        format!("{}.enc", name)
    } else {
        match name.strip_suffix(".enc") {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => format!("{}.dec", name),
        }
    };
    input.with_file_name(out)
}

fn transform(input: &Path, output: &Path, force: bool, f: impl FnOnce(&[u8]) -> Result<Vec<u8>>) -> Result<CryptSummary> {
    if !input.is_file() {
        return Err(ToolError::NotFound(input.to_path_buf()).into());
    }
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let data = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let result = f(&data)?;
    std::fs::write(output, &result).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!("{} -> {} ({} bytes)", input.display(), output.display(), result.len());
    Ok(CryptSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        bytes_in: data.len() as u64,
        bytes_out: result.len() as u64,
    })
}

pub fn encrypt_file(input: &Path, output: &Path, password: &str, force: bool) -> Result<CryptSummary> {
    transform(input, output, force, |data| encrypt_bytes(data, password))
}

pub fn decrypt_file(input: &Path, output: &Path, password: &str, force: bool) -> Result<CryptSummary> {
    transform(input, output, force, |data| decrypt_bytes(data, password, input))
}

/// --password, then `TOOLKEEP_PASSWORD`, then an interactive prompt
pub fn resolve_password(flag: Option<&str>, confirm: bool) -> Result<String> {
    if let Some(p) = flag {
        return non_empty(p.to_string());
    }
    if let Ok(p) = std::env::var(PASSWORD_ENV) {
        return non_empty(p);
    }
    let password = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if again != password {
            bail!("passwords do not match");
        }
    }
    non_empty(password)
}

fn non_empty(password: String) -> Result<String> {
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password)
}

pub fn findings(summary: &CryptSummary, verb: &str) -> Vec<Finding> {
    vec![Finding::ok(format!("{} {}", verb, summary.input.display()))
        .with_detail(format!(
            "{} ({} -> {})",
            summary.output.display(),
            format_size(summary.bytes_in),
            format_size(summary.bytes_out)
        ))
        .with_tool("crypt")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn bytes_survive_encryption() {
        let sealed = encrypt_bytes(b"top secret", "hunter2").unwrap();
        assert_eq!(&sealed[..6], b"TKENC1");
        assert_eq!(sealed.len(), HEADER_LEN + 10 + 16);
        assert_eq!(decrypt_bytes(&sealed, "hunter2", Path::new("x")).unwrap(), b"top secret");

        // Fresh salt and nonce every time
        assert_ne!(encrypt_bytes(b"top secret", "hunter2").unwrap(), sealed);
    }

    #[test]
    fn wrong_password_or_tampering_fails() {
        let mut sealed = encrypt_bytes(b"payload", "right").unwrap();
        let err = decrypt_bytes(&sealed, "wrong", Path::new("f.enc")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::DecryptFailed(_))));

        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert!(decrypt_bytes(&sealed, "right", Path::new("f.enc")).is_err());

        let err = decrypt_bytes(b"plain text file", "right", Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::NotEncrypted(_))));
    }

    #[test]
    fn file_round_trip_and_no_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("notes.txt");
        fs::write(&plain, "meeting at noon").unwrap();

        let sealed_path = default_output(&plain, true);
        assert_eq!(sealed_path, dir.path().join("notes.txt.enc"));
        let summary = encrypt_file(&plain, &sealed_path, "pw", false).unwrap();
        assert_eq!(summary.bytes_in, 15);
        assert!(encrypt_file(&plain, &sealed_path, "pw", false).is_err());

        fs::remove_file(&plain).unwrap();
        let restored = default_output(&sealed_path, false);
        assert_eq!(restored, plain);
        decrypt_file(&sealed_path, &restored, "pw", false).unwrap();
        assert_eq!(fs::read_to_string(&plain).unwrap(), "meeting at noon");

        assert_eq!(default_output(Path::new("/d/blob"), false), PathBuf::from("/d/blob.dec"));
    }

    #[test]
    fn explicit_password_wins() {
        assert_eq!(resolve_password(Some("pw"), true).unwrap(), "pw");
        assert!(resolve_password(Some(""), false).is_err());
    }
}
