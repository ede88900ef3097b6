//! Rotation group classification
//!
//! Logrotate and friends leave a trail of sibling files behind every active
//! log: numbered generations (`app.log.1`), dated generations
//! (`app.log.20240131`), and gzipped variants of both. This module decides
//! which physical files belong to which logical log and derives the canonical
//! path used as the group identity everywhere else in the system.

use crate::error::{IndexError, Result};
use crate::paths::PathValidator;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Suffix marking a compressed rotation member.
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Estimated expansion ratio for gzipped log data. Used only as a monotonic
/// progress signal, never as a real byte count.
const COMPRESSION_EXPANSION_RATIO: u64 = 3;

/// Rotation date stamps emitted by the common logrotate `dateformat`
/// configurations. Anchored so a stamp must be the entire suffix segment.
static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\d{8}$",                     // YYYYMMDD
        r"^\d{4}-\d{2}-\d{2}$",         // YYYY-MM-DD
        r"^\d{4}\.\d{2}\.\d{2}$",       // YYYY.MM.DD
        r"^\d{4}_\d{2}_\d{2}$",         // YYYY_MM_DD
        r"^\d{10}$",                    // YYYYMMDDHH
        r"^\d{12}$",                    // YYYYMMDDHHMI
        r"^\d{4}-\d{2}-\d{2}_\d{2}$",   // YYYY-MM-DD_HH
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static rotation pattern must compile"))
    .collect()
});

fn is_rotation_date(segment: &str) -> bool {
    DATE_PATTERNS.iter().any(|re| re.is_match(segment))
}

fn is_generation_number(segment: &str) -> bool {
    !segment.is_empty() && segment.len() <= 3 && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Check whether `filename` is a member of the rotation group rooted at
/// `base_name`.
///
/// Membership covers the active file itself, numbered generations of 1-3
/// digits, dated generations, and the gzipped form of either. Anything else
/// (`.old`, double-numbered, alphabetic suffixes) is a different file.
pub fn is_group_member(filename: &str, base_name: &str) -> bool {
    if filename == base_name {
        return true;
    }

    let Some(remainder) = filename.strip_prefix(base_name) else {
        return false;
    };
    let Some(suffix) = remainder.strip_prefix('.') else {
        return false;
    };

    // At most one trailing .gz comes off before classification.
    let stem = suffix.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(suffix);

    is_generation_number(stem) || is_rotation_date(stem)
}

/// Derive the canonical group key for a physical path.
///
/// Strips one trailing `.gz`, then removes a numbered or dated rotation
/// suffix. Dated logs that rotated away their `.log` extension get it back so
/// `messages.20240131` and `messages.log.20240131` land on the same key
/// shape. Idempotent: applying the key to its own output is a no-op.
pub fn canonical_group_key(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };

    let mut base = name.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(name).to_string();

    if let Some(idx) = base.rfind('.') {
        let segment = base[idx + 1..].to_string();
        if is_generation_number(&segment) {
            base.truncate(idx);
        } else if is_rotation_date(&segment) {
            base.truncate(idx);
            if !base.ends_with(".log") {
                base.push_str(".log");
            }
        }
    }

    match path.parent() {
        Some(parent) => parent.join(base),
        None => PathBuf::from(base),
    }
}

/// List every physical file in the canonical path's directory that belongs to
/// its rotation group. Files vanishing mid-listing are skipped.
pub fn group_member_files(canonical: &Path, validator: &PathValidator) -> Result<Vec<PathBuf>> {
    validator.validate(canonical)?;

    let base_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IndexError::InvalidPath(canonical.to_path_buf()))?;
    let dir = canonical
        .parent()
        .ok_or_else(|| IndexError::InvalidPath(canonical.to_path_buf()))?;

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut members = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable directory entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if is_group_member(name, base_name) {
            members.push(entry.path());
        }
    }

    members.sort();
    Ok(members)
}

/// Compute the monotonic work-size estimate for a group.
///
/// Uncompressed members contribute their byte size; gzipped members
/// contribute three times theirs. The result only ever gets compared against
/// a previously observed value, so the expansion ratio does not need to be
/// accurate, only stable.
pub fn group_weight(canonical: &Path, validator: &PathValidator) -> Result<u64> {
    let mut weight: u64 = 0;

    for member in group_member_files(canonical, validator)? {
        let metadata = match std::fs::metadata(&member) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Group member vanished during weight scan: {}", member.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            continue;
        }

        let compressed = member
            .to_str()
            .map(|s| s.ends_with(COMPRESSED_SUFFIX))
            .unwrap_or(false);
        let contribution = if compressed {
            metadata.len().saturating_mul(COMPRESSION_EXPANSION_RATIO)
        } else {
            metadata.len()
        };
        weight = weight.saturating_add(contribution);
    }

    Ok(weight)
}

/// Whether a path names a compressed rotation member.
pub fn is_compressed(path: &Path) -> bool {
    path.to_str()
        .map(|s| s.ends_with(COMPRESSED_SUFFIX))
        .unwrap_or(false)
}
