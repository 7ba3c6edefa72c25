//! KeyIndex: tree of every dotted key written through the cache
//!
//! Keys are split on `.` into segments. Each level maps a segment to a
//! [`Node`]. The index is the prefix index the flat store lacks: a cascade
//! delete enumerates entries under a path here instead of scanning the store.
//!
//! Persisted form (JSON): a leaf is `true`, a branch is
//! `{"entry": true, "children": {...}}` with `entry` omitted when false.

use std::collections::BTreeMap;
use std::io;

use dotstore::{Error, Result, Store};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

/// Path separator for hierarchical keys
pub const SEPARATOR: char = '.';

/// Split a key into its path segments
///
/// Rejects empty keys and keys with empty segments (`".a"`, `"a..b"`, `"a."`).
pub fn segments(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split(SEPARATOR).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

/// One position in the key tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An entry exists at this path and nothing is registered below it
    Leaf,
    /// Keys are registered below this path
    Branch(Branch),
}

/// Interior node of the key tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Whether an entry also exists at the branch's own path
    #[serde(default, skip_serializing_if = "is_false")]
    pub entry: bool,
    /// Child segments
    pub children: BTreeMap<String, Node>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Node {
    /// Does an entry exist at exactly this node's path?
    pub fn has_entry(&self) -> bool {
        match self {
            Node::Leaf => true,
            Node::Branch(branch) => branch.entry,
        }
    }

    /// Turn a leaf into a branch that keeps its entry
    fn promote(&mut self) -> &mut Branch {
        if let Node::Leaf = self {
            *self = Node::Branch(Branch {
                entry: true,
                children: BTreeMap::new(),
            });
        }
        match self {
            Node::Branch(branch) => branch,
            Node::Leaf => unreachable!("leaf was promoted above"),
        }
    }

    /// Push the full key of every entry at or below `path`
    fn collect_leaves(&self, path: &str, out: &mut Vec<String>) {
        match self {
            Node::Leaf => out.push(path.to_string()),
            Node::Branch(branch) => {
                if branch.entry {
                    out.push(path.to_string());
                }
                for (segment, child) in &branch.children {
                    child.collect_leaves(&format!("{}{}{}", path, SEPARATOR, segment), out);
                }
            }
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Leaf => serializer.serialize_bool(true),
            Node::Branch(branch) => branch.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeRepr {
    Marker(bool),
    Branch(Branch),
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match NodeRepr::deserialize(deserializer)? {
            NodeRepr::Marker(true) => Ok(Node::Leaf),
            NodeRepr::Marker(false) => Err(D::Error::custom("leaf marker must be `true`")),
            NodeRepr::Branch(branch) => Ok(Node::Branch(branch)),
        }
    }
}

/// What to detach at the end of a path
#[derive(Clone, Copy)]
enum Detach {
    /// The node and everything beneath it
    Subtree,
    /// Only the entry marker; descendants stay registered
    Entry,
}

/// Tree of registered keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyIndex {
    root: BTreeMap<String, Node>,
}

impl KeyIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index persisted under `index_key`, or an empty one if absent
    pub fn load<S: Store + ?Sized>(store: &S, index_key: &str) -> Result<Self> {
        match store.get(index_key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Self::default()),
        }
    }

    /// Rewrite the whole index under `index_key` with no expiry
    ///
    /// Goes through [`Store::put_unbounded`]: the serialized tree grows with
    /// the number of registered keys and must not hit the per-value cap.
    pub fn persist<S: Store + ?Sized>(&self, store: &S, index_key: &str) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        if !store.put_unbounded(index_key, bytes)? {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("store rejected key index write under {}", index_key),
            )));
        }
        Ok(())
    }

    /// Register `key` as an entry, creating intermediate branches
    ///
    /// Returns `false` if the key was already registered. A leaf met on the
    /// way down becomes a branch that keeps its own entry, so a parent and
    /// its children can both hold values.
    pub fn register(&mut self, key: &str) -> Result<bool> {
        let segments = segments(key)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(Error::InvalidKey(key.to_string()));
        };

        let mut children = &mut self.root;
        for segment in parents {
            let node = children
                .entry(segment.to_string())
                .or_insert_with(|| Node::Branch(Branch::default()));
            if let Node::Leaf = node {
                debug!(key, segment, "leaf becomes a branch");
            }
            children = &mut node.promote().children;
        }

        match children.get_mut(*last) {
            None => {
                children.insert(last.to_string(), Node::Leaf);
                Ok(true)
            }
            Some(Node::Branch(branch)) if !branch.entry => {
                debug!(key, "branch gains an entry");
                branch.entry = true;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Register a batch of keys
    ///
    /// Every key is validated before any is inserted. Returns whether any key
    /// was new.
    pub fn register_many<'a, I>(&mut self, keys: I) -> Result<bool>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keys: Vec<&str> = keys.into_iter().collect();
        for key in &keys {
            segments(key)?;
        }

        let mut changed = false;
        for key in keys {
            changed |= self.register(key)?;
        }
        Ok(changed)
    }

    /// Subtree rooted at `key`, if anything is registered there
    pub fn lookup(&self, key: &str) -> Option<&Node> {
        let segments = segments(key).ok()?;
        let (last, parents) = segments.split_last()?;

        let mut children = &self.root;
        for segment in parents {
            match children.get(*segment)? {
                Node::Branch(branch) => children = &branch.children,
                Node::Leaf => return None,
            }
        }
        children.get(*last)
    }

    /// Is an entry registered at exactly `key`?
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some_and(Node::has_entry)
    }

    /// Full keys of every entry at or below `key`, depth first
    pub fn leaves(&self, key: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.lookup(key) {
            node.collect_leaves(key, &mut out);
        }
        out
    }

    /// Full keys of every registered entry, depth first
    pub fn all_leaves(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (segment, node) in &self.root {
            node.collect_leaves(segment, &mut out);
        }
        out
    }

    /// Remove `key` and everything beneath it
    pub fn remove(&mut self, key: &str) -> bool {
        self.detach(key, Detach::Subtree)
    }

    /// Remove only the entry at `key`, keeping anything registered beneath it
    pub fn unregister(&mut self, key: &str) -> bool {
        self.detach(key, Detach::Entry)
    }

    /// Empty the tree
    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.all_leaves().len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn detach(&mut self, key: &str, what: Detach) -> bool {
        match segments(key) {
            Ok(segments) => detach_path(&mut self.root, &segments, what),
            Err(_) => false,
        }
    }
}

/// Detach along `path`, then normalise the node we descended through
fn detach_path(children: &mut BTreeMap<String, Node>, path: &[&str], what: Detach) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return false;
    };

    let detached = if rest.is_empty() {
        let whole = match children.get(*first) {
            None => return false,
            Some(Node::Leaf) => true,
            Some(Node::Branch(_)) => matches!(what, Detach::Subtree),
        };
        if whole {
            children.remove(*first);
            return true;
        }
        match children.get_mut(*first) {
            Some(Node::Branch(branch)) => std::mem::replace(&mut branch.entry, false),
            _ => false,
        }
    } else {
        match children.get_mut(*first) {
            Some(Node::Branch(branch)) => detach_path(&mut branch.children, rest, what),
            _ => false,
        }
    };

    if detached {
        normalise(children, first);
    }
    detached
}

/// Collapse an emptied branch into a leaf (if it holds an entry) or drop it
fn normalise(children: &mut BTreeMap<String, Node>, segment: &str) {
    let collapse = match children.get(segment) {
        Some(Node::Branch(branch)) if branch.children.is_empty() => Some(branch.entry),
        _ => None,
    };

    match collapse {
        Some(true) => {
            children.insert(segment.to_string(), Node::Leaf);
        }
        Some(false) => {
            children.remove(segment);
        }
        None => {}
    }
}
