//! Positional tree diffing.
//!
//! Sibling lists are aligned by index only: no keys, no subsequence matching.
//! Extra new siblings become appends, extra old siblings become removes, and
//! every paired position is compared by kind, tag and content. Same-tag element
//! pairs get an attribute diff followed by a recursive diff of their children.

use facet::Facet;
use indexmap::IndexMap;

use crate::patch::{Content, NodePath, Patch, PatchSet, Target};
use crate::tree::{Attr, ElementData, Kind, Node, NodeKind, Tree};
use crate::{debug, trace};

/// Errors that abort a diff. No partial patch set is returned.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum DiffError {
    /// cannot diff {kind} node at {path}: kind is not supported
    UnsupportedNodeKind { kind: Kind, path: NodePath },
}

/// Which node kinds a diff may encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub supported: Vec<Kind>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            supported: Kind::ALL.to_vec(),
        }
    }
}

impl DiffOptions {
    /// Kinds a browser document body can construct from patches: elements,
    /// text and comments.
    pub fn html_body() -> Self {
        Self {
            supported: vec![Kind::Element, Kind::Text, Kind::Comment],
        }
    }

    pub fn supports(&self, kind: Kind) -> bool {
        self.supported.contains(&kind)
    }
}

/// Diff two trees' root lists with every node kind allowed.
pub fn diff(old: &Tree, new: &Tree) -> Result<PatchSet, DiffError> {
    diff_with(old, new, &DiffOptions::default())
}

/// Diff two trees' root lists.
///
/// # Example
///
/// ```rust
/// use reheat::{Patch, diff, parse_str};
///
/// let old = parse_str("<ul><li>a</li></ul>").unwrap();
/// let new = parse_str("<ul><li>a</li><li>b</li></ul>").unwrap();
/// let patches = diff(&old, &new).unwrap();
/// assert_eq!(patches.len(), 1);
/// assert!(matches!(&patches.0[0], Patch::Append { .. }));
/// ```
pub fn diff_with(old: &Tree, new: &Tree, options: &DiffOptions) -> Result<PatchSet, DiffError> {
    let mut differ = Differ::new(options);
    let old_roots: Vec<_> = old.roots().collect();
    let new_roots: Vec<_> = new.roots().collect();
    differ.lists(&Target::path(NodePath::root()), &old_roots, &new_roots)?;
    debug!(
        "diffed {} old roots against {} new roots: {} patches",
        old_roots.len(),
        new_roots.len(),
        differ.patches.len()
    );
    Ok(PatchSet(differ.patches))
}

/// Diff the children of two elements. Patches address nodes by their position
/// in `old_parent`'s tree.
pub fn diff_children(
    old_parent: Node<'_>,
    new_parent: Node<'_>,
    options: &DiffOptions,
) -> Result<PatchSet, DiffError> {
    let mut differ = Differ::new(options);
    let path = old_parent.path();
    let old_children: Vec<_> = old_parent.children().collect();
    let new_children: Vec<_> = new_parent.children().collect();
    differ.lists(&Target::of(old_parent, path), &old_children, &new_children)?;
    Ok(PatchSet(differ.patches))
}

struct Differ<'a> {
    options: &'a DiffOptions,
    patches: Vec<Patch>,
}

impl<'a> Differ<'a> {
    fn new(options: &'a DiffOptions) -> Self {
        Self {
            options,
            patches: Vec::new(),
        }
    }

    fn emit(&mut self, patch: Patch) {
        trace!("emit {:?}", patch);
        self.patches.push(patch);
    }

    fn check(&self, kind: Kind, path: &NodePath) -> Result<(), DiffError> {
        if self.options.supports(kind) {
            Ok(())
        } else {
            Err(DiffError::UnsupportedNodeKind {
                kind,
                path: path.clone(),
            })
        }
    }

    /// Check a node about to be shipped as a payload, descendants included.
    fn check_subtree(&self, node: Node<'_>, path: &NodePath) -> Result<(), DiffError> {
        self.check(node.kind(), path)?;
        for (index, child) in node.children().enumerate() {
            self.check_subtree(child, &path.child(index))?;
        }
        Ok(())
    }

    /// Diff two sibling lists under `parent`. Selectors are computed for the
    /// document as it stands when each patch is replayed, so element counts
    /// before a paired position come from `new`.
    fn lists(&mut self, parent: &Target, old: &[Node<'_>], new: &[Node<'_>]) -> Result<(), DiffError> {
        let paired = old.len().min(new.len());

        for (index, &node) in new.iter().enumerate().skip(paired) {
            self.check_subtree(node, &parent.path.child(index))?;
            self.emit(Patch::Append {
                parent: parent.clone(),
                child: Content::from_node(node),
            });
        }

        // Highest index first, so each remove still addresses the node it names.
        let mut elements = old[..paired].iter().filter(|n| is_element(**n)).count();
        let mut trailing = Vec::with_capacity(old.len() - paired);
        for (index, &node) in old.iter().enumerate().skip(paired) {
            trailing.push((index, node, elements));
            elements += usize::from(is_element(node));
        }
        for (index, node, elements_before) in trailing.into_iter().rev() {
            let target = child_target(parent, index, node, elements_before);
            self.check(node.kind(), &target.path)?;
            self.emit(Patch::Remove { node: target });
        }

        let mut elements_before = 0;
        for (index, (&old, &new)) in old.iter().zip(new).enumerate() {
            let target = child_target(parent, index, old, elements_before);
            self.pair(target, old, new)?;
            elements_before += usize::from(is_element(new));
        }
        Ok(())
    }

    fn pair(&mut self, target: Target, old: Node<'_>, new: Node<'_>) -> Result<(), DiffError> {
        self.check(old.kind(), &target.path)?;
        self.check(new.kind(), &target.path)?;

        match (old.data(), new.data()) {
            (NodeKind::Element(a), NodeKind::Element(b)) if a.tag == b.tag => {
                self.attrs(&target, a, b);
                let old_children: Vec<_> = old.children().collect();
                let new_children: Vec<_> = new.children().collect();
                self.lists(&target, &old_children, &new_children)
            }
            (NodeKind::Element(_), _) | (_, NodeKind::Element(_)) => self.replace(target, new),
            (a, b) if a == b => Ok(()),
            _ => self.replace(target, new),
        }
    }

    fn replace(&mut self, old: Target, new: Node<'_>) -> Result<(), DiffError> {
        self.check_subtree(new, &old.path)?;
        self.emit(Patch::Replace {
            old,
            new: Content::from_node(new),
        });
        Ok(())
    }

    /// Name-keyed attribute diff: removals first, then one assignment per added
    /// or changed value.
    fn attrs(&mut self, target: &Target, old: &ElementData, new: &ElementData) {
        let before: IndexMap<&str, &str> = old
            .attrs
            .iter()
            .map(|attr| (attr.name.as_str(), attr.value.as_str()))
            .collect();
        let after: IndexMap<&str, &str> = new
            .attrs
            .iter()
            .map(|attr| (attr.name.as_str(), attr.value.as_str()))
            .collect();

        for &name in before.keys() {
            if !after.contains_key(name) {
                self.emit(Patch::RemoveAttr {
                    node: target.clone(),
                    name: name.into(),
                });
            }
        }
        for (&name, &value) in &after {
            if before.get(name) != Some(&value) {
                self.emit(Patch::SetAttr {
                    node: target.clone(),
                    attr: Attr::new(name, value),
                });
            }
        }
    }
}

fn is_element(node: Node<'_>) -> bool {
    node.kind() == Kind::Element
}

/// Target for the `index`th child of `parent`, with `elements_before` element
/// siblings ahead of it at replay time.
fn child_target(parent: &Target, index: usize, node: Node<'_>, elements_before: usize) -> Target {
    let selector = node.as_element().map(|elem| {
        let step = format!("{}:nth-child({})", elem.tag, elements_before + 1);
        match &parent.selector {
            Some(outer) => format!("{outer} > {step}"),
            None => step,
        }
    });
    Target {
        path: parent.path.child(index),
        selector,
    }
}
