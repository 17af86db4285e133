//! Which archive members are extracted to the cache directory

use crate::archive::layout;
use crate::paths::split_list;
use std::collections::BTreeSet;
use std::path::Path;

/// Members selected by the `unzip` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnzipSelection {
    /// Nothing is extracted; imports are served from the archive
    Nothing,
    /// `*`: every member
    All,
    /// Full member paths or top-level names without extension
    Names(BTreeSet<String>),
}

impl UnzipSelection {
    pub fn parse(value: &str) -> Self {
        let names = split_list(value);
        if names.is_empty() {
            Self::Nothing
        } else if names.iter().any(|n| n == "*") {
            Self::All
        } else {
            Self::Names(names.into_iter().collect())
        }
    }

    /// Whether anything is extracted at all
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Nothing)
    }

    /// Add one name to the selection
    pub fn with_name(self, name: &str) -> Self {
        match self {
            Self::All => Self::All,
            Self::Nothing => Self::Names(BTreeSet::from([name.to_string()])),
            Self::Names(mut names) => {
                names.insert(name.to_string());
                Self::Names(names)
            }
        }
    }
}

/// Include/exclude filter over member names. Exclusion wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFilter {
    include: UnzipSelection,
    exclude: BTreeSet<String>,
}

impl MemberFilter {
    pub fn new(include: UnzipSelection, exclude: &str) -> Self {
        Self {
            include,
            exclude: split_list(exclude).into_iter().collect(),
        }
    }

    /// Whether `member` is extracted
    pub fn matches(&self, member: &str) -> bool {
        let member = member.trim_end_matches('/');
        if member.is_empty() || layout::is_bookkeeping(member) {
            return false;
        }
        let top = top_level_stem(member);

        if self.exclude.contains("*")
            || self.exclude.contains(member)
            || self.exclude.contains(top)
        {
            return false;
        }
        match &self.include {
            UnzipSelection::Nothing => false,
            UnzipSelection::All => true,
            UnzipSelection::Names(names) => names.contains(member) || names.contains(top),
        }
    }
}

/// First path segment without its extension: `lxml/etree.so` → `lxml`,
/// `six.py` → `six`
fn top_level_stem(member: &str) -> &str {
    let top = member.split('/').next().unwrap_or(member);
    Path::new(top)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(top)
}
