//! Path normalization for coverage keys.
//!
//! Every file is tracked under one key: forward slashes, no duplicate
//! separators, `.`/`..` resolved lexically, absolute against the working
//! directory. The filesystem is never consulted (no symlink resolution), so
//! two files with the same basename in different directories stay distinct.

use std::path::Path;

#[derive(Debug, Clone)]
pub struct PathNormalizer {
    cwd: String,
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathNormalizer {
    /// Capture the current working directory once.
    pub fn new() -> Self {
        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/".to_string());
        Self::with_cwd(&cwd)
    }

    pub fn with_cwd(cwd: &str) -> Self {
        let cwd = clean(&cwd.replace('\\', "/"));
        let cwd = if is_absolute(&cwd) { cwd } else { clean(&format!("/{cwd}")) };
        Self { cwd }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn normalize(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let slashed = path.replace('\\', "/");
        if is_absolute(&slashed) {
            clean(&slashed)
        } else {
            clean(&format!("{}/{}", self.cwd, slashed))
        }
    }

    pub fn normalize_path(&self, path: &Path) -> String {
        self.normalize(&path.to_string_lossy())
    }
}

/// Normalize against the process working directory.
pub fn normalize(path: &str) -> String {
    PathNormalizer::new().normalize(path)
}

/// `/x`, `//server/share`, or a drive-letter path like `C:/x`.
pub fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || (bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/')
}

fn split_root(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if path.starts_with("//") && !path.starts_with("///") {
        ("//", &path[2..])
    } else if path.starts_with('/') {
        ("/", path.trim_start_matches('/'))
    } else if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        (&path[..2], path[2..].trim_start_matches('/'))
    } else {
        ("", path)
    }
}

/// Collapse separators and resolve `.`/`..` without touching the filesystem.
fn clean(path: &str) -> String {
    let (root, rest) = split_root(path);
    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if root.is_empty() {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match root {
        "" if joined.is_empty() => ".".to_string(),
        "" => joined,
        "/" | "//" => format!("{root}{joined}"),
        drive => format!("{drive}/{joined}"),
    }
}
