//! Sibling ordering for directory children
//!
//! Directories are always ordered by name; files follow the directory's
//! sort mode. The folders-first toggle decides which partition leads. Name
//! comparisons go through the display-name policy, so a directory sorted
//! by heading re-orders when a file's first heading changes.

use std::cmp::Ordering;

use crate::config::{Collation, DisplayName, WorkspaceConfig};
use crate::descriptor::{Descriptor, SortDirection, SortKey, SortMode};

/// Sort `children` in place according to `mode` and the ambient config
pub fn sort_children(children: &mut Vec<Descriptor>, mode: SortMode, config: &WorkspaceConfig) {
    let mut dirs: Vec<Descriptor> = Vec::new();
    let mut files: Vec<Descriptor> = Vec::new();
    for child in children.drain(..) {
        if child.is_directory() {
            dirs.push(child);
        } else {
            files.push(child);
        }
    }

    dirs.sort_by(|a, b| compare_names(a, b, config));

    files.sort_by(|a, b| {
        let ordering = match mode.key {
            SortKey::Name => compare_names(a, b, config),
            SortKey::Time => compare_times(a, b, config),
        };
        match mode.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });

    if config.sort_folders_first {
        children.extend(dirs);
        children.extend(files);
    } else {
        children.extend(files);
        children.extend(dirs);
    }
}

fn compare_names(a: &Descriptor, b: &Descriptor, config: &WorkspaceConfig) -> Ordering {
    let a_name = display_name(a, config.display_name);
    let b_name = display_name(b, config.display_name);
    match config.collation {
        Collation::Natural => natural_cmp(a_name, b_name),
        Collation::Ascii => ascii_cmp(a_name, b_name),
    }
}

fn compare_times(a: &Descriptor, b: &Descriptor, config: &WorkspaceConfig) -> Ordering {
    if config.sort_by_creation_time {
        a.creationtime().cmp(&b.creationtime())
    } else {
        a.modtime().cmp(&b.modtime())
    }
}

fn display_name<'a>(descriptor: &'a Descriptor, policy: DisplayName) -> &'a str {
    match descriptor.as_markdown() {
        Some(md) => md.display_name(policy),
        None => descriptor.name(),
    }
}

/// Plain case-insensitive lexicographic comparison
fn ascii_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Numeric-aware, case-insensitive comparison: "file2" before "file10"
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let ai = i;
            let bj = j;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let a_run: String = a[ai..i].iter().collect();
            let b_run: String = b[bj..j].iter().collect();
            let a_trim = a_run.trim_start_matches('0');
            let b_trim = b_run.trim_start_matches('0');
            let ordering = a_trim
                .len()
                .cmp(&b_trim.len())
                .then_with(|| a_trim.cmp(b_trim))
                // Equal values: more leading zeros sorts later
                .then_with(|| a_run.len().cmp(&b_run.len()));
            if ordering != Ordering::Equal {
                return ordering;
            }
        } else {
            let ordering = a[i].cmp(&b[j]);
            if ordering != Ordering::Equal {
                return ordering;
            }
            i += 1;
            j += 1;
        }
    }
    a.len().cmp(&b.len())
}
