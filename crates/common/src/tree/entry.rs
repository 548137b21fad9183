use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::linked_data::Ipld;

/// The two top-level partitions every tree has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Public,
    Private,
}

impl Partition {
    /// Traversal order of the partitions.
    pub const ALL: [Partition; 2] = [Partition::Public, Partition::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Public => "public",
            Partition::Private => "private",
        }
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Partition::Public),
            "private" => Ok(Partition::Private),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("path must have at least one segment")]
    Empty,
    #[error("path {0:?} contains an empty segment")]
    EmptySegment(String),
}

/// A root-relative, non-empty path whose first segment names the partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryPath(Vec<String>);

impl EntryPath {
    pub fn new<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::EmptySegment(segments.join("/")));
        }
        Ok(Self(segments))
    }

    /// The root of a partition.
    pub fn partition_root(partition: Partition) -> Self {
        Self(vec![partition.as_str().to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The partition this path lives in, if the first segment names one.
    pub fn partition(&self) -> Option<Partition> {
        self.0[0].parse().ok()
    }

    /// Segments below the partition root.
    pub fn relative(&self) -> &[String] {
        &self.0[1..]
    }

    pub fn name(&self) -> &str {
        &self.0[self.0.len() - 1]
    }

    pub fn is_partition_root(&self) -> bool {
        self.0.len() == 1
    }

    /// A child path; `name` must be non-empty.
    pub fn join(&self, name: &str) -> Self {
        debug_assert!(!name.is_empty());
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// The ancestor made of the first `len` segments (at least the partition).
    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0[..len.clamp(1, self.0.len())].to_vec())
    }

    /// Whether `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &EntryPath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl FromStr for EntryPath {
    type Err = PathError;

    /// Parses posix style paths such as `/public/notes/todo.md`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        Self::new(trimmed.split('/'))
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ContentError {
    #[error("numbers must be finite, got {0}")]
    NonFinite(f64),
    #[error("integer {0} cannot be stored exactly as a number")]
    IntegerOutOfRange(i128),
    #[error("unrepresentable content: {0}")]
    Unrepresentable(String),
}

/// Largest magnitude at which every integer still has an exact `f64`.
const MAX_EXACT_INTEGER: u128 = 1 << 53;

/// What a file holds.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Bytes(Vec<u8>),
    Text(String),
    Number(f64),
    Boolean(bool),
    Record(BTreeMap<String, FileContent>),
}

/// Discriminant of [`FileContent`], recorded next to links so readers know
/// how to interpret a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Bytes,
    Text,
    Number,
    Boolean,
    Record,
}

impl FileContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            FileContent::Bytes(_) => ContentKind::Bytes,
            FileContent::Text(_) => ContentKind::Text,
            FileContent::Number(_) => ContentKind::Number,
            FileContent::Boolean(_) => ContentKind::Boolean,
            FileContent::Record(_) => ContentKind::Record,
        }
    }

    pub fn to_ipld(&self) -> Result<Ipld, ContentError> {
        Ok(match self {
            FileContent::Bytes(bytes) => Ipld::Bytes(bytes.clone()),
            FileContent::Text(text) => Ipld::String(text.clone()),
            FileContent::Number(n) if !n.is_finite() => return Err(ContentError::NonFinite(*n)),
            FileContent::Number(n) => Ipld::Float(*n),
            FileContent::Boolean(b) => Ipld::Bool(*b),
            FileContent::Record(fields) => Ipld::Map(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_ipld()?)))
                    .collect::<Result<_, ContentError>>()?,
            ),
        })
    }

    pub fn from_ipld(ipld: Ipld) -> Result<Self, ContentError> {
        Ok(match ipld {
            Ipld::Bytes(bytes) => FileContent::Bytes(bytes),
            Ipld::String(text) => FileContent::Text(text),
            Ipld::Float(n) => FileContent::Number(n),
            Ipld::Integer(n) if n.unsigned_abs() > MAX_EXACT_INTEGER => {
                return Err(ContentError::IntegerOutOfRange(n))
            }
            Ipld::Integer(n) => FileContent::Number(n as f64),
            Ipld::Bool(b) => FileContent::Boolean(b),
            Ipld::Map(fields) => FileContent::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, FileContent::from_ipld(v)?)))
                    .collect::<Result<_, ContentError>>()?,
            ),
            Ipld::Null => return Err(ContentError::Unrepresentable("null".into())),
            Ipld::List(_) => return Err(ContentError::Unrepresentable("list".into())),
            Ipld::Link(cid) => return Err(ContentError::Unrepresentable(format!("link {}", cid))),
        })
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        FileContent::Text(text.to_string())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        FileContent::Bytes(bytes)
    }
}

/// A single item of a tree, as produced by a reader and consumed by a writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Directory { path: EntryPath },
    File { path: EntryPath, content: FileContent },
}

impl Entry {
    pub fn path(&self) -> &EntryPath {
        match self {
            Entry::Directory { path } => path,
            Entry::File { path, .. } => path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    /// Build a directory entry from a posix path; panics on an invalid path.
    #[cfg(test)]
    pub(crate) fn dir(path: &str) -> Self {
        Entry::Directory {
            path: path.parse().unwrap(),
        }
    }

    #[cfg(test)]
    pub(crate) fn file(path: &str, content: impl Into<FileContent>) -> Self {
        Entry::File {
            path: path.parse().unwrap(),
            content: content.into(),
        }
    }
}
