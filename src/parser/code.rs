//! Code file parser: editing state only, no semantic extraction

use std::fs;
use std::path::Path;

use super::content;
use crate::cache::MetadataCache;
use crate::descriptor::{CodeFile, Descriptor};
use crate::error::{Result, WorkspaceError};
use crate::fs_utils;

/// Parse the code file at `path`, preserving BOM and line-ending style.
///
/// Same cache-or-reparse decision as the markdown parser, keyed on the
/// cached entry being a code descriptor with a matching modtime.
pub fn parse(path: &Path, cache: Option<&mut MetadataCache>) -> Result<CodeFile> {
    let stat = fs_utils::node_stat(path)?;
    let key = path.to_string_lossy().to_string();

    if let Some(cache) = cache {
        if let Some(Descriptor::Code(cached)) = cache.get(&key) {
            if cached.stat.modtime == stat.modtime {
                return Ok(CodeFile { stat, ..cached });
            }
        }

        let file = from_disk(stat, path)?;
        cache.set(&key, Descriptor::Code(file.clone()));
        return Ok(file);
    }

    from_disk(stat, path)
}

fn from_disk(stat: crate::descriptor::NodeStat, path: &Path) -> Result<CodeFile> {
    let raw = fs::read_to_string(path).map_err(|e| WorkspaceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let (bom, text) = content::strip_bom(&raw);
    Ok(CodeFile {
        stat,
        bom,
        linefeed: content::detect_linefeed(text),
        modified: false,
    })
}

/// Overwrite the file with `content`, re-attaching a preserved BOM
pub fn save(file: &mut CodeFile, content: &str, cache: Option<&mut MetadataCache>) -> Result<()> {
    let path = file.stat.path.clone();
    fs::write(&path, format!("{}{}", file.bom, content)).map_err(|e| WorkspaceError::Write {
        path: path.display().to_string(),
        source: e,
    })?;

    file.stat = fs_utils::node_stat(&path)?;
    file.linefeed = content::detect_linefeed(content);
    file.modified = false;

    if let Some(cache) = cache {
        cache.set(&path.to_string_lossy(), Descriptor::Code(file.clone()));
    }
    Ok(())
}
