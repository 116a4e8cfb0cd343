//! Attachment parser: filesystem stat metadata only

use std::path::Path;

use crate::cache::MetadataCache;
use crate::descriptor::{Descriptor, OtherFile};
use crate::error::Result;
use crate::fs_utils;

/// Parse an attachment (any file that is neither markdown nor code).
///
/// No content is read; the cache check exists only for type-compatibility
/// with the other parsers.
pub fn parse(path: &Path, cache: Option<&mut MetadataCache>) -> Result<OtherFile> {
    let stat = fs_utils::node_stat(path)?;
    let key = path.to_string_lossy().to_string();

    if let Some(cache) = cache {
        if let Some(Descriptor::Other(cached)) = cache.get(&key) {
            if cached.stat.modtime == stat.modtime {
                return Ok(OtherFile { stat });
            }
        }
        let file = OtherFile { stat };
        cache.set(&key, Descriptor::Other(file.clone()));
        return Ok(file);
    }

    Ok(OtherFile { stat })
}
