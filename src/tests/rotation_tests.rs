//! Rotation grouping properties: membership over the full suffix grid,
//! canonical-key idempotence, and weight monotonicity against real files.

use crate::paths::PathValidator;
use crate::rotation::{canonical_group_key, group_weight, is_group_member};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn membership_holds_for_every_rotation_suffix() {
    let bases = ["access.log", "app.log", "messages"];
    let member_suffixes = [
        ".1",
        ".9",
        ".42",
        ".999",
        ".1.gz",
        ".999.gz",
        ".20240131",
        ".2024-01-31",
        ".2024.01.31",
        ".2024_01_31",
        ".2024013105",
        ".202401310515",
        ".2024-01-31_05",
        ".20240131.gz",
        ".2024-01-31.gz",
        ".2024-01-31_05.gz",
    ];

    for base in bases {
        // The active file itself.
        assert!(is_group_member(base, base), "{base} must be its own member");

        for suffix in member_suffixes {
            let name = format!("{base}{suffix}");
            assert!(is_group_member(&name, base), "{name} should belong to {base}");
        }
    }
}

#[test]
fn membership_rejects_foreign_suffixes() {
    let base = "access.log";
    let non_members = [
        "access.log.gz",      // bare .gz without a rotation marker
        "access.log.old",
        "access.log.1.2.gz",  // double-numbered
        "access.log.a.gz",
        "access.log.1234",    // four digits is not a generation number
        "access.log.2024",
        "access.log.2024-1-31",
        "error.log.1",        // different base entirely
        "access.logX.1",
    ];

    for name in non_members {
        assert!(!is_group_member(name, base), "{name} must not belong to {base}");
    }
}

#[test]
fn canonical_key_is_idempotent() {
    let inputs = [
        "/var/log/app.log",
        "/var/log/app.log.1",
        "/var/log/app.log.999.gz",
        "/var/log/app.log.20240131",
        "/var/log/app.log.2024-01-31.gz",
        "/var/log/messages.20240131",
        "/var/log/messages.202401310515.gz",
        "/var/log/strange.name.txt",
        "/var/log/noextension",
    ];

    for input in inputs {
        let once = canonical_group_key(Path::new(input));
        let twice = canonical_group_key(&once);
        assert_eq!(once, twice, "canonical key must be idempotent for {input}");
    }
}

#[test]
fn canonical_key_joins_rotated_members_to_one_group() {
    let members = [
        "/var/log/app.log",
        "/var/log/app.log.1",
        "/var/log/app.log.2.gz",
        "/var/log/app.log.20240131",
        "/var/log/app.log.2024-01-31_05.gz",
    ];

    for member in members {
        assert_eq!(
            canonical_group_key(Path::new(member)),
            PathBuf::from("/var/log/app.log"),
            "{member} should resolve to the group key"
        );
    }
}

fn write_bytes(path: &Path, len: usize) {
    fs::write(path, vec![b'x'; len]).unwrap();
}

#[test]
fn weight_counts_compressed_members_triple() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let validator = PathValidator::new(vec![root.to_path_buf()], &[]).unwrap();

    write_bytes(&root.join("app.log"), 100);
    write_bytes(&root.join("app.log.1"), 50);
    write_bytes(&root.join("app.log.2.gz"), 40);
    // Not a member; must not contribute.
    write_bytes(&root.join("app.log.old"), 500);

    let weight = group_weight(&root.join("app.log"), &validator).unwrap();
    assert_eq!(weight, 100 + 50 + 40 * 3);
}

#[test]
fn weight_grows_with_member_size() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let validator = PathValidator::new(vec![root.to_path_buf()], &[]).unwrap();

    write_bytes(&root.join("app.log"), 100);
    let before = group_weight(&root.join("app.log"), &validator).unwrap();

    write_bytes(&root.join("app.log"), 250);
    let after = group_weight(&root.join("app.log"), &validator).unwrap();

    assert!(after > before, "weight must grow as the active file grows");

    // A new rotated member only adds weight.
    write_bytes(&root.join("app.log.1.gz"), 10);
    let with_member = group_weight(&root.join("app.log"), &validator).unwrap();
    assert!(with_member > after);
}

#[test]
fn weight_requires_whitelisted_path() {
    let temp = TempDir::new().unwrap();
    let validator = PathValidator::new(vec![temp.path().to_path_buf()], &[]).unwrap();

    assert!(group_weight(Path::new("/etc/app.log"), &validator).is_err());
}
