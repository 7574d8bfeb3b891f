use std::{
    fs::{self, File},
    io::BufReader,
    path::{Component, Path, PathBuf},
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use tracing::info;

use crate::error::{Error, Result};

/// Top-level directory name every archive entry must live under.
pub const ARCHIVE_ROOT: &str = "data";

/// Default backup artifact filename.
pub const DEFAULT_ARCHIVE_NAME: &str = "docstash-backup.tar.gz";

/// Staging directory used by restore; skipped by backup and cleaned up
/// on the next restore if a crash left it behind.
const RESTORE_STAGING: &str = ".restore-staging";

/// Archive the entire state directory into a gzipped tar at `dest`,
/// with every entry rooted under [`ARCHIVE_ROOT`].
///
/// Top-level `*.tar.gz` files (previous backup artifacts, including a
/// destination inside the root itself) and restore staging leftovers
/// are excluded so a backup never swallows another backup.
pub fn backup(root: &Path, dest: &Path) -> Result<()> {
    let root = root.canonicalize()?;
    let file = File::create(dest)?;
    let dest_abs = dest.canonicalize()?;

    let enc = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(enc);
    append_dir(
        &mut builder,
        &root,
        Path::new(ARCHIVE_ROOT),
        &dest_abs,
        true,
    )?;
    builder.into_inner()?.finish()?;

    info!(root = %root.display(), dest = %dest_abs.display(), "backup written");
    Ok(())
}

fn append_dir<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    arc: &Path,
    dest: &Path,
    top_level: bool,
) -> Result<()> {
    let mut entries: Vec<_> =
        fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if top_level
            && (name_str.ends_with(".tar.gz") || name_str == RESTORE_STAGING)
        {
            continue;
        }
        if path == dest {
            continue;
        }

        let arc_path = arc.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            builder.append_dir(&arc_path, &path)?;
            append_dir(builder, &path, &arc_path, dest, false)?;
        } else if file_type.is_file() {
            builder.append_path_with_name(&path, &arc_path)?;
        }
    }
    Ok(())
}

/// Replace the state directory at `root` with the contents of a backup
/// archive. Destructive overwrite, no merge.
///
/// Runs in three phases: (1) validate every entry path before a single
/// byte is extracted, rejecting the whole archive on traversal attempts
/// or foreign roots; (2) extract into a staging directory inside the
/// root; (3) clear the live layout and move the staged tree into place.
/// A failure before phase 3 leaves the existing state untouched apart
/// from the staging directory.
pub fn restore(root: &Path, archive: &Path) -> Result<()> {
    validate_archive(archive)?;

    let staging = root.join(RESTORE_STAGING);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let file = File::open(archive)?;
    let mut ar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    for entry in ar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(rel) = entry_rel_path(&path)? else {
            continue;
        };
        let target = staging.join(&rel);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if !entry.header().entry_type().is_file() {
            // Symlinks and specials are not part of the layout.
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    // Swap: clear the live layout (keeping the staging directory and
    // the archive itself, if it lives inside the root), then move the
    // staged tree into place.
    let archive_abs = archive.canonicalize().ok();
    for child in fs::read_dir(root)? {
        let child = child?;
        if child.file_name() == RESTORE_STAGING {
            continue;
        }
        let path = child.path();
        if let Ok(canon) = path.canonicalize()
            && Some(canon.as_path()) == archive_abs.as_deref()
        {
            continue;
        }
        if child.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    for child in fs::read_dir(&staging)? {
        let child = child?;
        fs::rename(child.path(), root.join(child.file_name()))?;
    }
    fs::remove_dir_all(&staging)?;

    info!(root = %root.display(), archive = %archive.display(), "restore complete");
    Ok(())
}

/// First pass over the archive: every entry path must resolve under
/// [`ARCHIVE_ROOT`]. Nothing is extracted here.
fn validate_archive(archive: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut ar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    for entry in ar.entries()? {
        let entry = entry?;
        let path = entry.path().map_err(|e| {
            Error::Integrity(format!("unreadable entry path: {e}"))
        })?;
        entry_rel_path(&path)?;
    }
    Ok(())
}

/// The path of an entry relative to [`ARCHIVE_ROOT`], or `None` for the
/// root entry itself. Rejects absolute paths, `..` anywhere, and paths
/// rooted outside [`ARCHIVE_ROOT`].
fn entry_rel_path(path: &Path) -> Result<Option<PathBuf>> {
    let escape = || {
        Error::Integrity(format!(
            "entry escapes archive root: {}",
            path.display()
        ))
    };

    let mut rel = PathBuf::new();
    let mut saw_root = false;
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::Normal(part) if !saw_root => {
                if part != ARCHIVE_ROOT {
                    return Err(escape());
                }
                saw_root = true;
            }
            Component::Normal(part) => rel.push(part),
            _ => return Err(escape()),
        }
    }
    if !saw_root {
        return Err(escape());
    }

    Ok(if rel.as_os_str().is_empty() {
        None
    } else {
        Some(rel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_path_accepts_rooted_entries() {
        assert_eq!(entry_rel_path(Path::new("data")).unwrap(), None);
        assert_eq!(
            entry_rel_path(Path::new("data/docs/a.txt")).unwrap(),
            Some(PathBuf::from("docs/a.txt"))
        );
        assert_eq!(
            entry_rel_path(Path::new("./data/tags.json")).unwrap(),
            Some(PathBuf::from("tags.json"))
        );
    }

    #[test]
    fn rel_path_rejects_escapes() {
        assert!(entry_rel_path(Path::new("../evil")).is_err());
        assert!(entry_rel_path(Path::new("other_root/x")).is_err());
        assert!(entry_rel_path(Path::new("data/../evil")).is_err());
        assert!(entry_rel_path(Path::new("/data/abs")).is_err());
        assert!(entry_rel_path(Path::new(".")).is_err());
    }

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (rel, bytes) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
    }

    fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        fn walk(dir: &Path, base: &Path, out: &mut Vec<(String, Vec<u8>)>) {
            for entry in fs::read_dir(dir).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, base, out);
                } else {
                    let rel = path
                        .strip_prefix(base)
                        .unwrap()
                        .to_string_lossy()
                        .to_string();
                    out.push((rel, fs::read(&path).unwrap()));
                }
            }
        }
        let mut out = Vec::new();
        walk(root, root, &mut out);
        out.sort();
        out
    }

    #[test]
    fn backup_restore_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        write_tree(
            &src,
            &[
                ("docs/abc.txt", b"hello"),
                ("docs.redb", b"not a real db"),
                ("tags.json", b"[\"finance\"]"),
                ("index/meta.json", b"{}"),
            ],
        );

        let archive = tmp.path().join("backup.tar.gz");
        backup(&src, &archive).unwrap();
        restore(&dst, &archive).unwrap();

        assert_eq!(snapshot(&src), snapshot(&dst));
    }

    #[test]
    fn restore_is_destructive_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        write_tree(&src, &[("docs/new.txt", b"new")]);
        write_tree(
            &dst,
            &[("docs/old.txt", b"old"), ("leftover.bin", b"stale")],
        );

        let archive = tmp.path().join("backup.tar.gz");
        backup(&src, &archive).unwrap();
        restore(&dst, &archive).unwrap();

        assert_eq!(snapshot(&src), snapshot(&dst));
        assert!(!dst.join("leftover.bin").exists());
        assert!(!dst.join("docs/old.txt").exists());
    }

    #[test]
    fn backup_excludes_previous_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        write_tree(&src, &[("docs/a.txt", b"data")]);

        // First backup lands inside the state directory itself.
        let first = src.join(DEFAULT_ARCHIVE_NAME);
        backup(&src, &first).unwrap();
        let second = src.join("second.tar.gz");
        backup(&src, &second).unwrap();

        let file = File::open(&second).unwrap();
        let mut ar = tar::Archive::new(GzDecoder::new(file));
        let names: Vec<String> = ar
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap().path().unwrap().to_string_lossy().to_string()
            })
            .collect();

        assert!(names.iter().any(|n| n.ends_with("a.txt")));
        assert!(!names.iter().any(|n| n.ends_with(".tar.gz")));
    }

    /// Append an entry with a raw header name. `set_path` refuses `..`
    /// components, so hostile archives have to be built by hand.
    fn append_raw<W: std::io::Write>(
        builder: &mut tar::Builder<W>,
        entry_name: &str,
        data: &[u8],
    ) {
        let mut header = tar::Header::new_gnu();
        header.as_gnu_mut().unwrap().name[..entry_name.len()]
            .copy_from_slice(entry_name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn evil_archive(path: &Path, entry_name: &str) {
        let file = File::create(path).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(enc);
        append_raw(&mut builder, entry_name, b"gotcha");
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn restore_rejects_traversal_without_touching_state() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("state");
        fs::create_dir_all(&root).unwrap();
        write_tree(&root, &[("docs/keep.txt", b"precious")]);
        let before = snapshot(&root);

        for name in ["../evil", "other_root/x"] {
            let archive = tmp.path().join("evil.tar.gz");
            evil_archive(&archive, name);

            match restore(&root, &archive) {
                Err(Error::Integrity(_)) => {}
                other => panic!("expected integrity error, got {other:?}"),
            }
            assert_eq!(snapshot(&root), before, "state changed for {name}");
        }
    }

    #[test]
    fn restore_rejects_mixed_archive_entirely() {
        // One good entry plus one escaping entry: nothing may be
        // extracted.
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("state");
        fs::create_dir_all(&root).unwrap();
        let before = snapshot(&root);

        let archive = tmp.path().join("mixed.tar.gz");
        let file = File::create(&archive).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(enc);
        append_raw(&mut builder, "data/docs/fine.txt", b"x");
        append_raw(&mut builder, "../evil", b"x");
        builder.into_inner().unwrap().finish().unwrap();

        assert!(matches!(
            restore(&root, &archive),
            Err(Error::Integrity(_))
        ));
        assert_eq!(snapshot(&root), before);
    }
}
