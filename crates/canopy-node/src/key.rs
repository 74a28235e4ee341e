//! Child keys

use std::fmt::{self, Display, Formatter};

/// Key of a node within its parent
///
/// Integer-like keys address list elements; names address map entries.
/// [`Key::Unallocated`] marks a node created by
/// [`append_child`](crate::TreeNode::append_child) whose index is assigned
/// when it joins a list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// List position
    Index(usize),
    /// Map entry name
    Name(String),
    /// Append sentinel; never stored in a map
    Unallocated,
}

impl Key {
    /// Whether this key selects a list position (including the append sentinel)
    #[inline]
    #[must_use]
    pub fn is_list_key(&self) -> bool {
        matches!(self, Key::Index(_) | Key::Unallocated)
    }

    /// List index, if integer-like
    #[inline]
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            _ => None,
        }
    }

    /// Entry name, if this is a name key
    #[inline]
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            _ => None,
        }
    }

    /// String form used as a plain-data map key
    #[must_use]
    pub fn to_map_key(&self) -> String {
        self.to_string()
    }

    /// Key under which a map stores this entry; indices become names
    pub(crate) fn to_entry_key(&self) -> Option<Key> {
        match self {
            Key::Index(index) => Some(Key::Name(index.to_string())),
            Key::Name(_) => Some(self.clone()),
            Key::Unallocated => None,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{index}"),
            Key::Name(name) => f.write_str(name),
            Key::Unallocated => f.write_str("<unallocated>"),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<u32> for Key {
    fn from(index: u32) -> Self {
        Key::Index(index as usize)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Name(name.clone())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}
