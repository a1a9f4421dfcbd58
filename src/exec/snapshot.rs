//! Work-directory listings used to detect files a run created or modified.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::toolchain::shell_quote;

/// Modification stamp and size of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    /// Seconds since the epoch, as reported by the lister
    pub modified: String,
    pub size: u64,
}

/// Files in a directory (and one level of subdirectories), keyed by
/// path relative to that directory. Dotfiles are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirSnapshot {
    pub entries: BTreeMap<String, FileStamp>,
}

impl DirSnapshot {
    /// List a local directory. Unreadable entries are ignored; a missing
    /// directory yields an empty snapshot.
    pub fn capture(dir: &Path) -> Self {
        let mut snapshot = Self::default();
        snapshot.scan(dir, "", 0);
        snapshot
    }

    fn scan(&mut self, dir: &Path, prefix: &str, depth: usize) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            if meta.is_dir() {
                if depth == 0 {
                    self.scan(&entry.path(), &relative, depth + 1);
                }
                continue;
            }
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
                .unwrap_or_default();
            self.entries.insert(
                relative,
                FileStamp {
                    modified,
                    size: meta.len(),
                },
            );
        }
    }

    /// Parse the output of [`listing_command`]: `path\tmtime\tsize` per line.
    pub fn parse_listing(output: &str) -> Self {
        let entries = output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split('\t');
                let path = parts.next()?.trim();
                let modified = parts.next()?.trim();
                let size = parts.next()?.trim().parse().ok()?;
                if path.is_empty() {
                    return None;
                }
                Some((
                    path.to_string(),
                    FileStamp {
                        modified: modified.to_string(),
                        size,
                    },
                ))
            })
            .collect();
        Self { entries }
    }

    /// Files that are new or whose stamp changed since `before`.
    pub fn changed_since(&self, before: &DirSnapshot) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(path, stamp)| before.entries.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Files present now that were absent in `before`.
    pub fn added_since(&self, before: &DirSnapshot) -> Vec<String> {
        self.entries
            .keys()
            .filter(|path| !before.entries.contains_key(*path))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn size_of(&self, path: &str) -> Option<u64> {
        self.entries.get(path).map(|s| s.size)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shell command that prints a listing [`DirSnapshot::parse_listing`] understands.
pub fn listing_command(dir: &str) -> String {
    format!(
        "find {} -mindepth 1 -maxdepth 2 -type f -not -path '*/.*' -printf '%P\\t%T@\\t%s\\n' 2>/dev/null",
        remote_dir_arg(dir)
    )
}

/// Quote a directory for the shell, leaving a leading `~/` expandable.
pub fn remote_dir_arg(dir: &str) -> String {
    match dir.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None if dir == "~" => "~".to_string(),
        None => shell_quote(dir),
    }
}
