//! Thin file-system helpers used by applications to locate their data.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use walkdir::WalkDir;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Trivalent {
    True,
    False,
    Unknown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryEntry {
    pub title: String,
    pub is_file: Trivalent,
    pub is_directory: Trivalent,
}

/// `Unknown` when the path exists but is not a directory.
pub fn does_directory_exist(path: impl AsRef<Path>) -> Trivalent {
    match std::fs::metadata(path) {
        Err(_) => Trivalent::False,
        Ok(info) if info.is_dir() => Trivalent::True,
        Ok(_) => Trivalent::Unknown,
    }
}

pub fn make_directory(path: impl AsRef<Path>) -> io::Result<()> {
    std::fs::create_dir(path)
}

pub fn current_path() -> io::Result<PathBuf> {
    std::env::current_dir()
}

/// Entries directly inside `path`, sorted by title.
pub fn directory_entries(path: impl AsRef<Path>) -> io::Result<Vec<DirectoryEntry>> {
    let path = canonicalize_path(path);
    let mut entries = Vec::new();
    for entry in WalkDir::new(&path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            log::warn!("Can't list directory {}: {}", path.display(), e);
            io::Error::from(e)
        })?;
        let is_directory = entry.file_type().is_dir();
        entries.push(DirectoryEntry {
            title: entry.file_name().to_string_lossy().into_owned(),
            is_file: if is_directory {
                Trivalent::False
            } else {
                Trivalent::True
            },
            is_directory: if is_directory {
                Trivalent::True
            } else {
                Trivalent::False
            },
        });
    }
    Ok(entries)
}

/// Lexically resolves `.` and `..` components without touching the file system.
pub fn canonicalize_path(path: impl AsRef<Path>) -> PathBuf {
    let parts = normalize(path.as_ref());
    if parts.is_empty() {
        PathBuf::from(".")
    } else {
        parts.iter().collect()
    }
}

/// The path that leads from directory `from` to `to`, or `None` when there is none (different
/// roots, or `from` climbs above its own start).
pub fn relative_path_from_to(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Option<PathBuf> {
    let from = normalize(from.as_ref());
    let to = normalize(to.as_ref());
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    if is_rooted(&from) != is_rooted(&to) || (is_rooted(&from) && common == 0) {
        return None;
    }
    if from[common..].contains(&Component::ParentDir) {
        return None;
    }

    let mut result = PathBuf::new();
    for _ in &from[common..] {
        result.push("..");
    }
    for part in &to[common..] {
        result.push(part);
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    Some(result)
}

fn is_rooted(parts: &[Component<'_>]) -> bool {
    matches!(
        parts.first(),
        Some(Component::RootDir) | Some(Component::Prefix(_))
    )
}

fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }
    parts
}
