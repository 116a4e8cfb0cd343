//! Content parsers: path + optional content → typed descriptor
//!
//! Each parser follows the same cache-or-reparse decision: if the cached
//! descriptor's stored modtime equals the file's current modtime and the
//! cached type matches, the derived fields are adopted wholesale and the
//! content is never read.

pub mod attachment;
pub mod code;
pub mod content;
pub mod directory;
pub mod markdown;

use std::path::Path;

use crate::cache::MetadataCache;
use crate::config::WorkspaceConfig;
use crate::descriptor::Descriptor;
use crate::error::Result;

/// Extensions parsed as markdown
pub const MARKDOWN_EXTS: &[&str] = &["md", "markdown", "mdown", "txt"];

/// Extensions parsed as code files (editing state only)
pub const CODE_EXTS: &[&str] = &["tex", "json", "yaml", "yml", "toml", "r", "py", "js", "ts"];

fn has_ext(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// True when `path` should be parsed as a markdown file
pub fn is_markdown_path(path: &Path) -> bool {
    has_ext(path, MARKDOWN_EXTS)
}

/// True when `path` should be parsed as a code file
pub fn is_code_path(path: &Path) -> bool {
    has_ext(path, CODE_EXTS)
}

/// Parse a non-directory path with the parser its extension selects
pub fn parse_file(
    path: &Path,
    cache: Option<&mut MetadataCache>,
    config: &WorkspaceConfig,
) -> Result<Descriptor> {
    if is_markdown_path(path) {
        Ok(Descriptor::Markdown(markdown::parse(path, cache, config)?))
    } else if is_code_path(path) {
        Ok(Descriptor::Code(code::parse(path, cache)?))
    } else {
        Ok(Descriptor::Other(attachment::parse(path, cache)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_classification() {
        assert!(is_markdown_path(Path::new("/a/note.md")));
        assert!(is_markdown_path(Path::new("/a/NOTE.MD")));
        assert!(is_code_path(Path::new("/a/data.json")));
        assert!(!is_markdown_path(Path::new("/a/image.png")));
        assert!(!is_code_path(Path::new("/a/no_extension")));
    }
}
