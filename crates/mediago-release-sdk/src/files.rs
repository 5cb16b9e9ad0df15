//! Filesystem helpers used by the build and release steps.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::types::ReleaseError;

/// Creates `path` and any missing ancestors. No-op if it already exists.
pub fn ensure_dir(path: &Path) -> Result<(), ReleaseError> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Returns whether `path` exists. Never fails.
pub fn path_exists(path: &Path) -> bool {
    path.exists() || path.symlink_metadata().is_ok()
}

/// Removes `path` recursively. No-op if it is absent.
pub fn remove_if_exists(path: &Path) -> Result<(), ReleaseError> {
    let metadata = match path.symlink_metadata() {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Replaces `dest` with a recursive copy of `src`.
///
/// Any existing `dest` tree is removed first. The copy is not atomic: a crash
/// midway leaves a partial `dest`.
pub fn copy_directory(src: &Path, dest: &Path) -> Result<(), ReleaseError> {
    if !src.is_dir() {
        return Err(ReleaseError::SourceMissing {
            path: src.to_path_buf(),
            hint: None,
        });
    }
    remove_if_exists(dest)?;
    ensure_dir(dest)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), ReleaseError> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), ReleaseError> {
    fs::copy(src, dest)?;
    Ok(())
}

/// Removes every directory named `name` anywhere under `root`.
///
/// Matching directories are removed without being descended into. Files with
/// the same name are left alone. A missing `root` is a no-op.
pub fn remove_directories_named(root: &Path, name: &str) -> Result<Vec<PathBuf>, ReleaseError> {
    let mut removed = Vec::new();
    if !root.is_dir() {
        return Ok(removed);
    }

    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name() == name {
            walker.skip_current_dir();
            fs::remove_dir_all(entry.path())?;
            log::debug!("Removed {}", entry.path().display());
            removed.push(entry.into_path());
        }
    }
    Ok(removed)
}

/// Computes `target` relative to the directory `base`.
///
/// Both paths are expected to be absolute (or both relative to the same
/// directory). Used for relocatable symlinks.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = normalize(base);
    let target: Vec<Component<'_>> = normalize(target);

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            other => components.push(other),
        }
    }
    components
}

/// Sets mode `0755` on `path`.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), ReleaseError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Executable bits do not exist on this host.
#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), ReleaseError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(root: &Path) -> Vec<(PathBuf, Option<Vec<u8>>)> {
        let mut entries: Vec<_> = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                let contents = e.file_type().is_file().then(|| fs::read(e.path()).unwrap());
                (rel, contents)
            })
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn test_ensure_dir_creates_ancestors_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_path_exists_never_fails() {
        let temp = TempDir::new().unwrap();
        assert!(path_exists(temp.path()));
        assert!(!path_exists(&temp.path().join("missing/deeper")));
    }

    #[test]
    fn test_remove_if_exists_handles_files_dirs_and_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir_all(dir.join("inner")).unwrap();
        fs::write(dir.join("inner/file.txt"), "x").unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "y").unwrap();

        remove_if_exists(&dir).unwrap();
        remove_if_exists(&file).unwrap();
        remove_if_exists(&temp.path().join("never-existed")).unwrap();

        assert!(!dir.exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_copy_directory_replaces_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("ui/dist");
        fs::create_dir_all(src.join("assets")).unwrap();
        fs::write(src.join("index.html"), "<html></html>").unwrap();
        fs::write(src.join("assets/app.js"), "console.log(1)").unwrap();

        let dest = temp.path().join("assets/ui");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.js"), "old").unwrap();

        copy_directory(&src, &dest).unwrap();

        assert!(!dest.join("stale.js").exists());
        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "<html></html>");
        assert_eq!(
            fs::read_to_string(dest.join("assets/app.js")).unwrap(),
            "console.log(1)"
        );
    }

    #[test]
    fn test_copy_directory_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/one.txt"), "1").unwrap();
        fs::write(src.join("two.txt"), "2").unwrap();
        let dest = temp.path().join("dest");

        copy_directory(&src, &dest).unwrap();
        let once = snapshot(&dest);
        copy_directory(&src, &dest).unwrap();
        let twice = snapshot(&dest);

        assert_eq!(once, twice);
        assert_eq!(once, snapshot(&src));
    }

    #[test]
    fn test_copy_directory_missing_source_fails_identically() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("missing");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("keep.txt"), "keep").unwrap();

        let first = copy_directory(&src, &dest).unwrap_err().to_string();
        let second = copy_directory(&src, &dest).unwrap_err().to_string();

        assert_eq!(first, second);
        assert!(first.contains("does not exist"));
        // The destination is untouched when the source is missing.
        assert!(dest.join("keep.txt").exists());
    }

    #[test]
    fn test_remove_directories_named_at_any_depth() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("npm");
        fs::create_dir_all(root.join("@mediago/player/bin")).unwrap();
        fs::create_dir_all(root.join("@mediago/player-linux-x64/bin/bin")).unwrap();
        fs::create_dir_all(root.join("deep/a/b/c/bin")).unwrap();
        fs::write(root.join("@mediago/player/bin/mediago-player"), "x").unwrap();
        fs::write(root.join("deep/a/bin"), "a file named bin").unwrap();
        fs::write(root.join("@mediago/player/package.json"), "{}").unwrap();

        let removed = remove_directories_named(&root, "bin").unwrap();
        assert_eq!(removed.len(), 3);

        let leftover_dirs: Vec<_> = WalkDir::new(&root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_dir() && e.file_name() == "bin")
            .collect();
        assert!(leftover_dirs.is_empty());
        assert!(root.join("deep/a/bin").is_file());
        assert!(root.join("@mediago/player/package.json").is_file());
    }

    #[test]
    fn test_remove_directories_named_missing_root() {
        let temp = TempDir::new().unwrap();
        let removed = remove_directories_named(&temp.path().join("nope"), "bin").unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(
                Path::new("/p/node_modules/@mediago/player/bin"),
                Path::new("/p/node_modules/@mediago/player-linux-x64/bin/mediago-player"),
            ),
            PathBuf::from("../../player-linux-x64/bin/mediago-player")
        );
        assert_eq!(
            relative_path(Path::new("/a/b"), Path::new("/a/b/c")),
            PathBuf::from("c")
        );
        assert_eq!(
            relative_path(Path::new("/a/./b/../c"), Path::new("/a/d")),
            PathBuf::from("../d")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("tool");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        make_executable(&file).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
