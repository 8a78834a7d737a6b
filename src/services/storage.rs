use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::process::Command;
use tracing::debug;

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_text(path: &Path, body: &str) -> anyhow::Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, body)?;
    Ok(())
}

/// Write through `<path>.tmp` and rename into place.
pub fn write_atomic(path: &Path, body: &str) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomic write that leaves the file untouched when the content is identical.
/// Returns whether the file changed.
pub fn write_if_changed(path: &Path, body: &str) -> anyhow::Result<bool> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == body {
            return Ok(false);
        }
    }
    write_atomic(path, body)?;
    Ok(true)
}

pub fn pretty_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Pretty JSON with object keys sorted at every level.
pub fn sorted_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    let v = serde_json::to_value(data)?;
    Ok(serde_json::to_string_pretty(&v)?)
}

pub fn sha256_file(path: &Path) -> anyhow::Result<(String, u64)> {
    let mut f = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    let mut size = 0u64;
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn utc_now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

pub fn utc_today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn git(root: &Path, args: &[&str]) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .ok()?;
    if !out.status.success() {
        debug!(args = ?args, "git command failed");
        return None;
    }
    let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!s.is_empty()).then_some(s)
}

pub fn git_head(root: &Path) -> Option<String> {
    git(root, &["rev-parse", "HEAD"])
}

pub fn git_remote(root: &Path) -> Option<String> {
    git(root, &["config", "--get", "remote.origin.url"])
}

pub fn git_ls_files(root: &Path) -> Option<Vec<String>> {
    git(root, &["ls-files"]).map(|s| s.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_json_orders_keys() {
        #[derive(Serialize)]
        struct S {
            zeta: u8,
            alpha: u8,
        }
        let s = sorted_json(&S { zeta: 1, alpha: 2 }).unwrap();
        assert!(s.find("alpha").unwrap() < s.find("zeta").unwrap());
    }

    #[test]
    fn write_if_changed_reports_unchanged() {
        let tmp = tempfile::TempDir::new().unwrap();
        let p = tmp.path().join("out/x.json");
        assert!(write_if_changed(&p, "{}\n").unwrap());
        assert!(!write_if_changed(&p, "{}\n").unwrap());
        assert!(!tmp.path().join("out/x.json.tmp").exists());
    }

    #[test]
    fn sha256_file_matches_digest_of_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let p = tmp.path().join("a.txt");
        std::fs::write(&p, b"abc").unwrap();
        let (h, n) = sha256_file(&p).unwrap();
        assert_eq!(n, 3);
        assert_eq!(h, sha256_hex(b"abc"));
        assert!(h.starts_with("ba7816bf"));
    }
}
