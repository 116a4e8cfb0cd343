//! Markdown file parser: derives semantic metadata from file content

use std::fs;
use std::path::Path;

use tracing::trace;

use super::content;
use crate::cache::MetadataCache;
use crate::config::WorkspaceConfig;
use crate::descriptor::{Descriptor, MdFile, NodeStat};
use crate::error::{Result, WorkspaceError};
use crate::fs_utils;

/// Parse the markdown file at `path`.
///
/// Consults the cache first: a stored descriptor whose modtime matches the
/// file's current modtime is adopted without reading the content. A fresh
/// parse is stored back into the cache keyed by path.
pub fn parse(
    path: &Path,
    cache: Option<&mut MetadataCache>,
    config: &WorkspaceConfig,
) -> Result<MdFile> {
    let stat = fs_utils::node_stat(path)?;
    let key = path.to_string_lossy().to_string();

    if let Some(cache) = cache {
        if let Some(Descriptor::Markdown(cached)) = cache.get(&key) {
            if cached.stat.modtime == stat.modtime {
                trace!("cache hit for {}", path.display());
                return Ok(MdFile { stat, ..cached });
            }
        }

        let content = fs::read_to_string(path).map_err(|e| WorkspaceError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let file = from_content(stat, &content, config)?;
        cache.set(&key, Descriptor::Markdown(file.clone()));
        return Ok(file);
    }

    let content = fs::read_to_string(path).map_err(|e| WorkspaceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    from_content(stat, &content, config)
}

/// Derive every metadata field from `content`
pub fn from_content(stat: NodeStat, content: &str, config: &WorkspaceConfig) -> Result<MdFile> {
    let id_re = config.id_regex()?;

    let (bom, text) = content::strip_bom(content);
    let linefeed = content::detect_linefeed(text);
    let (yaml, body) = content::split_frontmatter(text);
    let frontmatter = yaml.and_then(content::parse_frontmatter);

    let id = content::extract_id(&stat.name, body, &id_re, &config.link_start);
    let first_heading = content::extract_first_heading(body);
    let tags = content::extract_tags(body, frontmatter.as_ref());
    let links = content::extract_links(body, &config.link_start, &config.link_end);
    let (word_count, char_count) = content::count_words_chars(body);

    Ok(MdFile {
        stat,
        id,
        tags,
        links,
        word_count,
        char_count,
        first_heading,
        frontmatter,
        bom,
        linefeed,
        modified: false,
    })
}

/// Overwrite the file with `content` and re-derive all metadata.
///
/// The stored byte-order mark is re-attached so a BOM present at load time
/// survives every save.
pub fn save(
    file: &mut MdFile,
    content: &str,
    cache: Option<&mut MetadataCache>,
    config: &WorkspaceConfig,
) -> Result<()> {
    let path = file.stat.path.clone();
    let on_disk = format!("{}{}", file.bom, content);
    fs::write(&path, &on_disk).map_err(|e| WorkspaceError::Write {
        path: path.display().to_string(),
        source: e,
    })?;

    let stat = fs_utils::node_stat(&path)?;
    *file = from_content(stat, &on_disk, config)?;
    file.modified = false;

    if let Some(cache) = cache {
        cache.set(
            &path.to_string_lossy(),
            Descriptor::Markdown(file.clone()),
        );
    }
    Ok(())
}

/// Rename the file on disk and re-derive everything at the new path.
///
/// Derived metadata is never carried over: the id search includes the file
/// name, so a rename can change it.
pub fn rename(
    file: &mut MdFile,
    new_name: &str,
    cache: Option<&mut MetadataCache>,
    config: &WorkspaceConfig,
) -> Result<()> {
    if new_name.is_empty() || new_name.contains(std::path::is_separator) {
        return Err(WorkspaceError::InvalidName {
            name: new_name.to_string(),
        });
    }

    let old_path = file.stat.path.clone();
    let new_path = file.stat.dir.join(new_name);
    if new_path.exists() {
        return Err(WorkspaceError::AlreadyExists {
            path: new_path.display().to_string(),
        });
    }

    fs::rename(&old_path, &new_path).map_err(|e| WorkspaceError::Write {
        path: new_path.display().to_string(),
        source: e,
    })?;

    match cache {
        Some(cache) => {
            cache.delete(&old_path.to_string_lossy());
            *file = parse(&new_path, Some(cache), config)?;
        }
        None => {
            *file = parse(&new_path, None, config)?;
        }
    }
    Ok(())
}
