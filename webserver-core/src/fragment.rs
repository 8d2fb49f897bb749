//! Reserved-range fragment files
//!
//! Structured records (redirects, proxies, upstreams) are stored one per
//! file in a numbered slot range such as `200-proxy.conf` .. `299-proxy.conf`.
//! A rewrite checks capacity, deletes the whole range and writes the records
//! to consecutive slots from the floor. Files outside the range are never
//! touched.

use regex::Regex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Inclusive slot range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u32,
    pub end: u32,
}

impl SlotRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, slot: u32) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn capacity(&self) -> usize {
        (self.end - self.start + 1) as usize
    }
}

/// Redirect fragments in the site dir
pub const REDIRECT_SLOTS: SlotRange = SlotRange::new(100, 199);
/// Proxy fragments in the site dir
pub const PROXY_SLOTS: SlotRange = SlotRange::new(200, 299);
/// Upstream / balancer fragments in the shared dir
pub const UPSTREAM_SLOTS: SlotRange = SlotRange::new(100, 999);

/// A fragment file found on disk
#[derive(Debug, Clone)]
pub struct Fragment {
    pub slot: u32,
    pub path: PathBuf,
}

/// One reserved range inside a directory.
///
/// `pattern` must capture the slot number in its first group.
pub struct FragmentSet<'a> {
    dir: PathBuf,
    pattern: &'a Regex,
    range: SlotRange,
    kind: &'static str,
}

impl<'a> FragmentSet<'a> {
    pub fn new(dir: impl Into<PathBuf>, pattern: &'a Regex, range: SlotRange, kind: &'static str) -> Self {
        Self {
            dir: dir.into(),
            pattern,
            range,
            kind,
        }
    }

    /// Fragment files in range, ordered by slot. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<Fragment>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut fragments = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(caps) = self.pattern.captures(name) else { continue };
            let Some(slot) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if self.range.contains(slot) {
                fragments.push(Fragment {
                    slot,
                    path: entry.path(),
                });
            }
        }

        fragments.sort_by_key(|f| f.slot);
        Ok(fragments)
    }

    /// Decode every fragment in slot order; unreadable or undecodable files are skipped
    pub fn load<T>(&self, decode: impl Fn(&str) -> Option<T>) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for fragment in self.list()? {
            let content = match fs::read_to_string(&fragment.path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("skipping unreadable {} fragment {}: {}", self.kind, fragment.path.display(), e);
                    continue;
                }
            };
            match decode(&content) {
                Some(record) => records.push(record),
                None => tracing::debug!("skipping unparsable {} fragment {}", self.kind, fragment.path.display()),
            }
        }
        Ok(records)
    }

    /// Delete every fragment in range
    pub fn clear(&self) -> Result<()> {
        for fragment in self.list()? {
            remove_file(&fragment.path)?;
        }
        Ok(())
    }

    /// Replace the range with `records`.
    ///
    /// `encode` returns the file name and content for a record at a slot.
    /// Capacity is checked before anything on disk changes.
    pub fn replace<T>(&self, records: &[T], encode: impl Fn(u32, &T) -> (String, String)) -> Result<()> {
        if records.len() > self.range.capacity() {
            return Err(Error::Capacity {
                kind: self.kind,
                limit: self.range.capacity(),
            });
        }

        let files: Vec<(String, String)> = records
            .iter()
            .zip(self.range.start..)
            .map(|(record, slot)| encode(slot, record))
            .collect();

        self.clear()?;
        fs::create_dir_all(&self.dir)?;
        for (name, content) in &files {
            write_file(&self.dir.join(name), content)?;
        }

        tracing::debug!("wrote {} {} fragments to {}", files.len(), self.kind, self.dir.display());
        Ok(())
    }
}

// ============================================================
// File helpers
// ============================================================

/// Write a config file readable only by its owner.
///
/// Content goes to a hidden sibling first and is renamed into place, so a
/// reader sees either the old file or the complete new one.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidArgument(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Remove a file, treating "already gone" as success
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
