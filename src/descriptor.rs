//! Descriptor data model for the in-memory filesystem mirror
//!
//! A descriptor is the atomic unit of the mirror: one record per filesystem
//! node. Descriptors never hold parent pointers — only their own path and
//! the parent *path* string — so the tree is cycle-free and every variant
//! serializes cleanly into the metadata cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Criterion for ordering siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Time,
}

/// Sort direction; for time sorting, descending means most-recent-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Per-directory sorting choice, persisted in the settings sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortMode {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortMode {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
        }
    }
}

/// Project configuration attached to a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project title shown by the UI layer
    pub title: String,

    /// Export profiles, one per output format
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Ordered list of files included in the project
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Optional style override
    #[serde(default)]
    pub style: Option<String>,

    /// Optional template override
    #[serde(default)]
    pub template: Option<String>,
}

impl ProjectSettings {
    /// A fresh project named after its directory
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            profiles: Vec::new(),
            files: Vec::new(),
            style: None,
            template: None,
        }
    }
}

/// Persisted per-directory settings (`{ sorting, project, icon }`)
///
/// Values equal to `DirSettings::default()` are never written to disk; the
/// sidecar is deleted instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirSettings {
    #[serde(default)]
    pub sorting: SortMode,

    #[serde(default)]
    pub project: Option<ProjectSettings>,

    #[serde(default)]
    pub icon: Option<String>,
}

/// Frontmatter subset retained on markdown descriptors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl Frontmatter {
    /// True when no retained key carries a value
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.keywords.is_empty() && self.tags.is_empty()
    }
}

/// Filesystem stat fields shared by every descriptor variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStat {
    /// Absolute path
    pub path: PathBuf,

    /// Basename
    pub name: String,

    /// Parent path (string reference, never a pointer)
    pub dir: PathBuf,

    /// Size in bytes
    pub size: u64,

    /// Modification time, epoch milliseconds
    pub modtime: i64,

    /// Creation time, epoch milliseconds
    pub creationtime: i64,
}

impl NodeStat {
    /// Rewrite path-derived fields after a rename or move
    pub fn relocate(&mut self, new_path: &Path) {
        self.path = new_path.to_path_buf();
        self.name = new_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.dir = new_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
    }
}

/// Markdown file descriptor with derived semantic metadata
///
/// `id`, `tags` and `links` are derived solely from current file content;
/// they are recomputed on every parse and never hand-edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MdFile {
    #[serde(flatten)]
    pub stat: NodeStat,

    /// First identifier found (filename, then body)
    #[serde(default)]
    pub id: Option<String>,

    /// Deduplicated, case-folded tag set
    #[serde(default)]
    pub tags: Vec<String>,

    /// Outgoing internal link targets
    #[serde(default)]
    pub links: Vec<String>,

    #[serde(default)]
    pub word_count: usize,

    #[serde(default)]
    pub char_count: usize,

    #[serde(default)]
    pub first_heading: Option<String>,

    #[serde(default)]
    pub frontmatter: Option<Frontmatter>,

    /// Byte-order mark prefix, preserved verbatim on save ("" when absent)
    #[serde(default)]
    pub bom: String,

    /// Dominant line-ending sequence of the file
    #[serde(default)]
    pub linefeed: String,

    /// Dirty flag maintained by the editing layer
    #[serde(default)]
    pub modified: bool,
}

impl MdFile {
    /// Display name under the given policy
    pub fn display_name(&self, policy: crate::config::DisplayName) -> &str {
        use crate::config::DisplayName;
        match policy {
            DisplayName::Filename => &self.stat.name,
            DisplayName::Heading => self.first_heading.as_deref().unwrap_or(&self.stat.name),
            DisplayName::Title => self
                .frontmatter
                .as_ref()
                .and_then(|fm| fm.title.as_deref())
                .unwrap_or(&self.stat.name),
        }
    }
}

/// Code file descriptor: editing state only, no semantic extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeFile {
    #[serde(flatten)]
    pub stat: NodeStat,

    #[serde(default)]
    pub bom: String,

    #[serde(default)]
    pub linefeed: String,

    #[serde(default)]
    pub modified: bool,
}

/// Attachment descriptor: stat metadata only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherFile {
    #[serde(flatten)]
    pub stat: NodeStat,
}

/// Directory descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(flatten)]
    pub stat: NodeStat,

    /// Ordered children; every child's `dir` equals this `path`
    #[serde(default)]
    pub children: Vec<Descriptor>,

    /// A `.git` directory lives directly inside
    #[serde(default)]
    pub is_git_repository: bool,

    #[serde(default)]
    pub settings: DirSettings,

    /// Placeholder root whose path does not currently resolve
    #[serde(default)]
    pub not_found: bool,
}

impl Directory {
    /// Placeholder descriptor for a root that cannot be resolved right now
    pub fn missing_root(path: &Path) -> Self {
        let mut stat = NodeStat::default();
        stat.relocate(path);
        Self {
            stat,
            not_found: true,
            ..Self::default()
        }
    }
}

/// One filesystem node in the mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Descriptor {
    Directory(Directory),
    Markdown(MdFile),
    Code(CodeFile),
    Other(OtherFile),
}

impl Descriptor {
    pub fn stat(&self) -> &NodeStat {
        match self {
            Self::Directory(d) => &d.stat,
            Self::Markdown(f) => &f.stat,
            Self::Code(f) => &f.stat,
            Self::Other(f) => &f.stat,
        }
    }

    pub fn stat_mut(&mut self) -> &mut NodeStat {
        match self {
            Self::Directory(d) => &mut d.stat,
            Self::Markdown(f) => &mut f.stat,
            Self::Code(f) => &mut f.stat,
            Self::Other(f) => &mut f.stat,
        }
    }

    pub fn path(&self) -> &Path {
        &self.stat().path
    }

    pub fn name(&self) -> &str {
        &self.stat().name
    }

    pub fn dir(&self) -> &Path {
        &self.stat().dir
    }

    pub fn modtime(&self) -> i64 {
        self.stat().modtime
    }

    pub fn creationtime(&self) -> i64 {
        self.stat().creationtime
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// Short lowercase label for logging and the CLI tree view
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Directory(_) => "directory",
            Self::Markdown(_) => "markdown",
            Self::Code(_) => "code",
            Self::Other(_) => "other",
        }
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut Directory> {
        match self {
            Self::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_markdown(&self) -> Option<&MdFile> {
        match self {
            Self::Markdown(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_markdown_mut(&mut self) -> Option<&mut MdFile> {
        match self {
            Self::Markdown(f) => Some(f),
            _ => None,
        }
    }

    /// Children slice; empty for files
    pub fn children(&self) -> &[Descriptor] {
        match self {
            Self::Directory(d) => &d.children,
            _ => &[],
        }
    }

    /// Depth-first lookup of a node by absolute path
    pub fn find(&self, path: &Path) -> Option<&Descriptor> {
        if self.path() == path {
            return Some(self);
        }
        if !path.starts_with(self.path()) {
            return None;
        }
        for child in self.children() {
            if let Some(found) = child.find(path) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first mutable lookup of a node by absolute path
    pub fn find_mut(&mut self, path: &Path) -> Option<&mut Descriptor> {
        if self.path() == path {
            return Some(self);
        }
        if !path.starts_with(self.path()) {
            return None;
        }
        if let Self::Directory(d) = self {
            for child in &mut d.children {
                if let Some(found) = child.find_mut(path) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Depth-first visit of this node and all descendants
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Descriptor)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}
