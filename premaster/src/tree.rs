//! The logical tree and its namespace facets.
//!
//! One logical node (a file's bytes, a directory, a symlink target, the
//! boot catalog) can be visible in up to three on-disc namespaces at once;
//! each visibility is a facet carrying the namespace-specific identifier
//! and metadata. Rock Ridge is not a fourth namespace but an overlay
//! hanging off ISO9660 facets. Nodes and facets live in index arenas and
//! reference each other by index, never by owning pointer, so hard links
//! and the deep-directory relocation DAG need no special cases.

use crate::datetime::RecordTimestamp;
use crate::error::{Error, Result};
use crate::ident::{Escaped, decode_joliet_identifier, encode_joliet_identifier};
use crate::susp::{RockRidge, SlComponent};


pub(crate) type NodeId = usize;
pub(crate) type FacetId = usize;

/// The namespaces a facet can live in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) enum Namespace {
    Iso,
    Joliet,
    Udf,
}
impl Namespace {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Iso => "ISO9660",
            Self::Joliet => "Joliet",
            Self::Udf => "UDF",
        }
    }
}

/// Where a file node's bytes come from.
#[derive(Clone, Debug)]
pub(crate) enum ContentSource {
    /// Caller-supplied bytes, owned by the node.
    Buffer(Vec<u8>),
    /// A region of the opened source stream, read lazily.
    Stream { offset: u64 },
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    File { source: ContentSource, size: u64 },
    Directory,
    Symlink { target: Vec<SlComponent> },
    /// The El Torito boot catalog; its bytes are generated at write time.
    BootCatalog,
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub facets: Vec<FacetId>,
    /// Keeps a facet-less node alive (the boot catalog after its last
    /// hard link is removed).
    pub pinned: bool,
}
impl Node {
    pub fn content_len(&self) -> u64 {
        match &self.kind {
            NodeKind::File { size, .. } => *size,
            NodeKind::Directory => 0,
            NodeKind::Symlink { .. } => 0,
            NodeKind::BootCatalog => crate::vd::BLOCK_SIZE as u64,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Facet {
    pub node: NodeId,
    pub ns: Namespace,
    /// The identifier as compared on disc: raw bytes for ISO9660, UCS-2BE
    /// for Joliet, UTF-8 for UDF (compressed at encode time).
    pub ident: Vec<u8>,
    pub parent: Option<FacetId>,
    pub children: Vec<FacetId>,
    pub hidden: bool,
    pub rr: Option<RockRidge>,
    pub stamp: RecordTimestamp,
    /// Assigned by the planner (or carried over from a parse).
    pub extent: u32,
    /// For a Rock Ridge relocation placeholder: the facet of the
    /// directory it stands in for.
    pub reloc_target: Option<FacetId>,
    /// For a relocated directory: the facet of its logical parent.
    pub reloc_original_parent: Option<FacetId>,
    pub alive: bool,
}

/// The arena holding every node and facet of one image.
#[derive(Clone, Debug, Default)]
pub(crate) struct Arena {
    pub nodes: Vec<Node>,
    pub facets: Vec<Facet>,
    pub iso_root: Option<FacetId>,
    pub joliet_root: Option<FacetId>,
    pub udf_root: Option<FacetId>,
}
impl Arena {
    pub fn new_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            facets: Vec::new(),
            pinned: false,
        });
        self.nodes.len() - 1
    }

    pub fn new_root(&mut self, ns: Namespace, stamp: RecordTimestamp) -> FacetId {
        let node = self.new_node(NodeKind::Directory);
        let facet = self.attach_facet(node, ns, Vec::new(), None, stamp);
        match ns {
            Namespace::Iso => self.iso_root = Some(facet),
            Namespace::Joliet => self.joliet_root = Some(facet),
            Namespace::Udf => self.udf_root = Some(facet),
        }
        facet
    }

    pub fn root(&self, ns: Namespace) -> Option<FacetId> {
        match ns {
            Namespace::Iso => self.iso_root,
            Namespace::Joliet => self.joliet_root,
            Namespace::Udf => self.udf_root,
        }
    }

    /// Creates a facet and inserts it into its parent's children at the
    /// namespace sort position.
    pub fn attach_facet(&mut self, node: NodeId, ns: Namespace, ident: Vec<u8>,
                        parent: Option<FacetId>, stamp: RecordTimestamp) -> FacetId {
        let id = self.facets.len();
        self.facets.push(Facet {
            node,
            ns,
            ident,
            parent,
            children: Vec::new(),
            hidden: false,
            rr: None,
            stamp,
            extent: 0,
            reloc_target: None,
            reloc_original_parent: None,
            alive: true,
        });
        self.nodes[node].facets.push(id);
        if let Some(parent) = parent {
            let ident = self.facets[id].ident.clone();
            let at = self.facets[parent]
                .children
                .binary_search_by(|&c| self.facets[c].ident.as_slice().cmp(ident.as_slice()))
                .unwrap_or_else(|at| at);
            self.facets[parent].children.insert(at, id);
        }
        id
    }

    /// Detaches a facet; the node dies with its last facet unless pinned.
    pub fn remove_facet(&mut self, facet: FacetId) {
        let parent = self.facets[facet].parent;
        if let Some(parent) = parent {
            self.facets[parent].children.retain(|&c| c != facet);
        }
        let node = self.facets[facet].node;
        self.nodes[node].facets.retain(|&f| f != facet);
        self.facets[facet].alive = false;
        self.facets[facet].parent = None;
    }

    pub fn node_of(&self, facet: FacetId) -> &Node {
        &self.nodes[self.facets[facet].node]
    }

    /// Whether a child with this identifier already exists.
    pub fn child_by_ident(&self, dir: FacetId, ident: &[u8]) -> Option<FacetId> {
        self.facets[dir]
            .children
            .iter()
            .copied()
            .find(|&c| self.facets[c].ident == ident)
    }

    /// Splits an absolute path into components.
    pub fn split_path<'p>(path: &'p str, ns: &str) -> Result<Vec<&'p str>> {
        if !path.starts_with('/') {
            return Err(Error::invalid_input(format!(
                "{} path '{}' is not absolute", ns, path,
            )));
        }
        Ok(path.split('/').filter(|c| !c.is_empty()).collect())
    }

    /// Resolves an absolute path in a namespace to a facet.
    pub fn resolve(&self, ns: Namespace, path: &str) -> Result<FacetId> {
        let root = self.root(ns).ok_or_else(|| Error::invalid_input(format!(
            "the {} namespace is not enabled", ns.describe(),
        )))?;
        let mut at = root;
        for component in Self::split_path(path, ns.describe())? {
            let ident = self.encode_component(ns, component)?;
            at = self.child_by_ident(at, &ident).ok_or_else(|| {
                Error::invalid_input(format!(
                    "{} path '{}' does not exist", ns.describe(), path,
                ))
            })?;
        }
        Ok(at)
    }

    /// Resolves the parent directory of a path, returning it with the
    /// encoded leaf identifier.
    pub fn resolve_parent(&self, ns: Namespace, path: &str) -> Result<(FacetId, Vec<u8>)> {
        let root = self.root(ns).ok_or_else(|| Error::invalid_input(format!(
            "the {} namespace is not enabled", ns.describe(),
        )))?;
        let components = Self::split_path(path, ns.describe())?;
        let Some((leaf, dirs)) = components.split_last() else {
            return Err(Error::invalid_input(format!(
                "{} path '{}' names the root", ns.describe(), path,
            )));
        };
        let mut at = root;
        for component in dirs {
            let ident = self.encode_component(ns, component)?;
            at = self.child_by_ident(at, &ident).ok_or_else(|| {
                Error::invalid_input(format!(
                    "{} path '{}' has a missing intermediate directory '{}'",
                    ns.describe(), path, component,
                ))
            })?;
            if !self.node_of(at).is_directory() {
                return Err(Error::invalid_input(format!(
                    "{} path '{}' passes through non-directory '{}'",
                    ns.describe(), path, component,
                )));
            }
        }
        Ok((at, self.encode_component(ns, leaf)?))
    }

    /// Resolves a POSIX path through the Rock Ridge overlay, following
    /// relocation placeholders transparently.
    pub fn resolve_rr(&self, path: &str) -> Result<FacetId> {
        let root = self.iso_root.ok_or_else(|| {
            Error::invalid_input("the ISO9660 namespace has no root")
        })?;
        let mut at = root;
        for component in Self::split_path(path, "Rock Ridge")? {
            let next = self.facets[at].children.iter().copied().find(|&c| {
                self.facets[c]
                    .rr
                    .as_ref()
                    .and_then(|rr| rr.name.as_deref())
                    == Some(component)
            });
            at = next.ok_or_else(|| Error::invalid_input(format!(
                "Rock Ridge path '{}' does not exist", path,
            )))?;
            if let Some(target) = self.facets[at].reloc_target {
                at = target;
            }
        }
        Ok(at)
    }

    fn encode_component(&self, ns: Namespace, component: &str) -> Result<Vec<u8>> {
        match ns {
            Namespace::Iso => Ok(component.as_bytes().to_vec()),
            Namespace::Joliet => encode_joliet_identifier(component),
            Namespace::Udf => Ok(component.as_bytes().to_vec()),
        }
    }

    /// The decoded display name of a facet.
    pub fn display_name(&self, facet: FacetId) -> String {
        let f = &self.facets[facet];
        match f.ns {
            Namespace::Iso => String::from_utf8_lossy(&f.ident).into_owned(),
            Namespace::Joliet => decode_joliet_identifier(&f.ident)
                .unwrap_or_else(|_| format!("{}", Escaped(&f.ident))),
            Namespace::Udf => String::from_utf8_lossy(&f.ident).into_owned(),
        }
    }

    /// The absolute path of a facet in its own namespace.
    pub fn full_path(&self, facet: FacetId) -> String {
        let mut parts = Vec::new();
        let mut at = Some(facet);
        while let Some(f) = at {
            if self.facets[f].parent.is_none() {
                break;
            }
            parts.push(self.display_name(f));
            at = self.facets[f].parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Directory depth of a facet, the root counting as 1.
    pub fn depth(&self, facet: FacetId) -> u32 {
        let mut depth = 1;
        let mut at = facet;
        while let Some(parent) = self.facets[at].parent {
            depth += 1;
            at = parent;
        }
        depth
    }

    /// Directories of a namespace in breadth-first order, root first,
    /// children in sort order. Relocation placeholders do not contribute.
    pub fn dirs_breadth_first(&self, ns: Namespace) -> Vec<FacetId> {
        let Some(root) = self.root(ns) else {
            return Vec::new();
        };
        let mut out = vec![root];
        let mut at = 0;
        while at < out.len() {
            let dir = out[at];
            at += 1;
            for &child in &self.facets[dir].children {
                if self.facets[child].reloc_target.is_some() {
                    continue;
                }
                if self.node_of(child).is_directory() {
                    out.push(child);
                }
            }
        }
        out
    }

    /// Number of links a directory reports in Rock Ridge: itself, its
    /// dot entry, and one per subdirectory.
    pub fn dir_nlink(&self, dir: FacetId) -> u32 {
        let subdirs = self.facets[dir]
            .children
            .iter()
            .filter(|&&c| self.facets[c].reloc_target.is_none()
                && self.node_of(c).is_directory())
            .count() as u32;
        2 + subdirs
    }

    /// Every live facet of a node in a given namespace.
    pub fn node_facets_in(&self, node: NodeId, ns: Namespace) -> Vec<FacetId> {
        self.nodes[node]
            .facets
            .iter()
            .copied()
            .filter(|&f| self.facets[f].ns == ns)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> RecordTimestamp {
        RecordTimestamp::default()
    }

    fn arena_with_root() -> (Arena, FacetId) {
        let mut arena = Arena::default();
        let root = arena.new_root(Namespace::Iso, stamp());
        (arena, root)
    }

    #[test]
    fn test_children_stay_sorted() {
        let (mut arena, root) = arena_with_root();
        for name in [&b"FOO.;1"[..], b"AA.;1", b"BOOT.CAT;1", b"BOOT.;1"] {
            let node = arena.new_node(NodeKind::File {
                source: ContentSource::Buffer(Vec::new()),
                size: 0,
            });
            arena.attach_facet(node, Namespace::Iso, name.to_vec(), Some(root), stamp());
        }
        let names: Vec<_> = arena.facets[root]
            .children
            .iter()
            .map(|&c| arena.facets[c].ident.clone())
            .collect();
        assert_eq!(names, vec![
            b"AA.;1".to_vec(),
            b"BOOT.;1".to_vec(),
            b"BOOT.CAT;1".to_vec(),
            b"FOO.;1".to_vec(),
        ]);
    }

    #[test]
    fn test_resolve_and_full_path() {
        let (mut arena, root) = arena_with_root();
        let dir_node = arena.new_node(NodeKind::Directory);
        let dir = arena.attach_facet(dir_node, Namespace::Iso, b"DIR1".to_vec(), Some(root), stamp());
        let file_node = arena.new_node(NodeKind::File {
            source: ContentSource::Buffer(b"x".to_vec()),
            size: 1,
        });
        let file = arena.attach_facet(file_node, Namespace::Iso, b"FOO.;1".to_vec(), Some(dir), stamp());

        assert_eq!(arena.resolve(Namespace::Iso, "/DIR1/FOO.;1").unwrap(), file);
        assert_eq!(arena.full_path(file), "/DIR1/FOO.;1");
        assert_eq!(arena.depth(dir), 2);
        assert!(arena.resolve(Namespace::Iso, "/MISSING").is_err());
        assert!(arena.resolve(Namespace::Iso, "DIR1").is_err());
    }

    #[test]
    fn test_hard_link_shares_node() {
        let (mut arena, root) = arena_with_root();
        let node = arena.new_node(NodeKind::File {
            source: ContentSource::Buffer(b"hi".to_vec()),
            size: 2,
        });
        arena.attach_facet(node, Namespace::Iso, b"A.;1".to_vec(), Some(root), stamp());
        let second = arena.attach_facet(node, Namespace::Iso, b"B.;1".to_vec(), Some(root), stamp());
        assert_eq!(arena.nodes[node].facets.len(), 2);

        arena.remove_facet(second);
        assert_eq!(arena.nodes[node].facets.len(), 1);
        assert!(!arena.facets[second].alive);
    }

    #[test]
    fn test_breadth_first_order() {
        let (mut arena, root) = arena_with_root();
        let a = arena.new_node(NodeKind::Directory);
        let a = arena.attach_facet(a, Namespace::Iso, b"AA".to_vec(), Some(root), stamp());
        let b = arena.new_node(NodeKind::Directory);
        let b = arena.attach_facet(b, Namespace::Iso, b"BB".to_vec(), Some(root), stamp());
        let nested = arena.new_node(NodeKind::Directory);
        let nested = arena.attach_facet(nested, Namespace::Iso, b"SUB".to_vec(), Some(a), stamp());

        assert_eq!(arena.dirs_breadth_first(Namespace::Iso), vec![root, a, b, nested]);
        assert_eq!(arena.dir_nlink(root), 4);
        assert_eq!(arena.dir_nlink(a), 3);
        assert_eq!(arena.dir_nlink(nested), 2);
    }

    #[test]
    fn test_rr_resolution_follows_relocation() {
        let (mut arena, root) = arena_with_root();

        // the relocated directory lives under RR_MOVED on disc
        let moved_node = arena.new_node(NodeKind::Directory);
        let moved = arena.attach_facet(
            moved_node, Namespace::Iso, b"RR_MOVED".to_vec(), Some(root), stamp(),
        );
        let deep_node = arena.new_node(NodeKind::Directory);
        let deep = arena.attach_facet(
            deep_node, Namespace::Iso, b"DEEP".to_vec(), Some(moved), stamp(),
        );
        arena.facets[deep].rr = Some(RockRidge::for_directory(
            crate::susp::RockRidgeVersion::V1_09, Some("deep".to_owned()), 2, stamp(),
        ));

        // the placeholder sits at the logical location
        let holder = arena.attach_facet(
            deep_node, Namespace::Iso, b"DEEP".to_vec(), Some(root), stamp(),
        );
        arena.facets[holder].rr = Some(RockRidge::for_directory(
            crate::susp::RockRidgeVersion::V1_09, Some("deep".to_owned()), 2, stamp(),
        ));
        arena.facets[holder].reloc_target = Some(deep);

        assert_eq!(arena.resolve_rr("/deep").unwrap(), deep);
    }
}
