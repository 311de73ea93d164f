//! Reproducible archive layout.
//!
//! A stable archive depends only on its logical contents: every entry gets the
//! same timestamp, directories carry a trailing `/`, and entries are sorted by
//! path with the `META-INF/` directory and the manifest moved to the end.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Cursor;

use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

use crate::archive::{ArchiveEntry, EntryContent, read_archive, write_archive};
use crate::error::{VignetteError, VignetteResult};

/// 1989-11-26T00:00:00Z. Some archive readers mishandle a zero timestamp.
pub const STABLE_TIMESTAMP_MILLIS: i64 = 628_041_600_000;

/// Entries that always come last, in this order.
const TRAILING_ENTRIES: [&str; 2] = ["META-INF/", "META-INF/MANIFEST.MF"];

pub fn stable_timestamp() -> VignetteResult<NaiveDateTime> {
    DateTime::from_timestamp_millis(STABLE_TIMESTAMP_MILLIS)
        .map(|timestamp| timestamp.naive_utc())
        .ok_or_else(|| VignetteError::format("stable timestamp is out of range"))
}

/// Normalizes separators and the leading slash; directories end with `/`.
pub fn normalize_path(path: &str, directory: bool) -> String {
    let normalized = path.replace('\\', "/");
    let normalized = normalized.trim_start_matches('/');
    if !directory {
        return normalized.to_owned();
    }
    match normalized.trim_end_matches('/') {
        "" => String::new(),
        body => format!("{body}/"),
    }
}

fn compare_paths(left: &str, right: &str) -> Ordering {
    let rank = |path: &str| TRAILING_ENTRIES.iter().position(|special| *special == path);
    match (rank(left), rank(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        // directories compare without their trailing slash
        (None, None) => left.trim_end_matches('/').cmp(right.trim_end_matches('/')),
    }
}

/// Puts `entries` into their stable order and stamps them.
///
/// Missing parent directories are added. A file path seen twice is an
/// error; repeated directories collapse into one.
pub fn stabilize(entries: Vec<ArchiveEntry>) -> VignetteResult<Vec<ArchiveEntry>> {
    let timestamp = stable_timestamp()?;
    let mut contents: BTreeMap<String, EntryContent> = BTreeMap::new();
    for entry in entries {
        let path = normalize_path(&entry.path, entry.is_directory());
        if path.is_empty() {
            continue;
        }
        match entry.content {
            EntryContent::Directory => {
                contents.entry(path).or_insert(EntryContent::Directory);
            }
            file @ EntryContent::File(_) => {
                if contents.insert(path.clone(), file).is_some() {
                    return Err(VignetteError::DuplicateEntry(path));
                }
            }
        }
    }

    let parents: Vec<String> = contents
        .keys()
        .flat_map(|path| {
            let body = path.trim_end_matches('/');
            body.match_indices('/')
                .map(|(index, _)| body[..=index].to_owned())
                .collect::<Vec<_>>()
        })
        .collect();
    let synthesized = parents.len();
    for parent in parents {
        contents.entry(parent).or_insert(EntryContent::Directory);
    }

    let mut stable: Vec<ArchiveEntry> = contents
        .into_iter()
        .map(|(path, content)| ArchiveEntry {
            path,
            content,
            modified: Some(timestamp),
        })
        .collect();
    stable.sort_by(|left, right| compare_paths(&left.path, &right.path));
    debug!(entries = stable.len(), parents = synthesized, "stabilized archive layout");
    Ok(stable)
}

/// Rewrites a complete archive into its stable form.
pub fn make_stable(archive: &[u8]) -> VignetteResult<Vec<u8>> {
    let entries = stabilize(read_archive(archive)?)?;
    let cursor = write_archive(&entries, Cursor::new(Vec::new()))?;
    Ok(cursor.into_inner())
}
