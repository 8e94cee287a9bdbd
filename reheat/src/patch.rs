//! Patch operations and the contract for applying them to a live document.
//!
//! Patches carry structural addresses ([`NodePath`], plus the element's
//! positional selector when the target is an element), never live handles. A
//! [`Backend`] resolves those addresses against whatever document it manages and
//! performs the primitive mutations.

use compact_str::CompactString;
use facet::Facet;
use smallvec::SmallVec;
use std::fmt;

use crate::serialize;
use crate::tree::{Attr, Kind, Node, NodeKind};
use crate::{debug, trace};

/// A path to a node: root index, then child indices. Empty means the mount root.
///
/// Uses SmallVec<[u32; 16]> to avoid heap allocations for typical DOM depths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Facet)]
#[facet(transparent)]
pub struct NodePath(pub SmallVec<[u32; 16]>);

impl NodePath {
    /// The mount root: parent of every root-level node.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// True for the mount root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of the `index`th child of this node.
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.0.push(index as u32);
        path
    }
}

impl<const N: usize> From<[u32; N]> for NodePath {
    fn from(indices: [u32; N]) -> Self {
        Self(indices.into_iter().collect())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("root");
        }
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", idx)?;
        }
        Ok(())
    }
}

/// Where a patch applies.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Target {
    pub path: NodePath,
    /// Positional selector, present when the target is an element.
    pub selector: Option<String>,
}

impl Target {
    pub fn path(path: NodePath) -> Self {
        Self {
            path,
            selector: None,
        }
    }

    pub(crate) fn of(node: Node<'_>, path: NodePath) -> Self {
        Self {
            path,
            selector: node.as_element().map(|elem| elem.selector().to_owned()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Some(selector) => write!(f, "{} ({selector})", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// A detached, owned copy of a node subtree, used as the payload of
/// `Append` and `Replace`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Content {
    /// An element with its tag, attributes, and nested children
    Element {
        tag: CompactString,
        attrs: Vec<Attr>,
        children: Vec<Content>,
    },
    Text(CompactString),
    Comment(CompactString),
    ProcessingInstruction {
        target: CompactString,
        inst: CompactString,
    },
    Directive(CompactString),
}

impl Content {
    /// Copy `node` and its descendants out of their tree.
    pub fn from_node(node: Node<'_>) -> Self {
        match node.data() {
            NodeKind::Element(elem) => Content::Element {
                tag: elem.tag.clone(),
                attrs: elem.attrs.clone(),
                children: node.children().map(Content::from_node).collect(),
            },
            NodeKind::Text(text) => Content::Text(text.clone()),
            NodeKind::Comment(text) => Content::Comment(text.clone()),
            NodeKind::ProcessingInstruction { target, inst } => Content::ProcessingInstruction {
                target: target.clone(),
                inst: inst.clone(),
            },
            NodeKind::Directive(text) => Content::Directive(text.clone()),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Content::Element { .. } => Kind::Element,
            Content::Text(_) => Kind::Text,
            Content::Comment(_) => Kind::Comment,
            Content::ProcessingInstruction { .. } => Kind::ProcessingInstruction,
            Content::Directive(_) => Kind::Directive,
        }
    }

    /// Serialized markup, suitable for building the live node via innerHTML-style
    /// construction.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out, None);
        out
    }

    /// Serialized markup of the children only (empty for non-elements).
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        if let Content::Element { tag, children, .. } = self {
            for child in children {
                child.write_html(&mut out, Some(tag));
            }
        }
        out
    }

    fn write_html(&self, out: &mut String, parent_tag: Option<&str>) {
        match self {
            Content::Element {
                tag,
                attrs,
                children,
            } => {
                serialize::write_start_tag(
                    out,
                    tag,
                    attrs.iter().map(|a| (a.name.as_str(), a.value.as_str())),
                );
                if serialize::is_void_element(tag) && children.is_empty() {
                    return;
                }
                for child in children {
                    child.write_html(out, Some(tag));
                }
                serialize::write_end_tag(out, tag);
            }
            Content::Text(text) => serialize::write_text(out, text, parent_tag),
            Content::Comment(text) => serialize::write_comment(out, text),
            Content::ProcessingInstruction { target, inst } => {
                serialize::write_processing_instruction(out, target, inst)
            }
            Content::Directive(text) => serialize::write_directive(out, text),
        }
    }
}

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Patch {
    /// Insert `child` as the new last child of `parent` (the mount root when the
    /// parent path is empty).
    Append { parent: Target, child: Content },
    /// Delete a node and its subtree.
    Remove { node: Target },
    /// Swap the node at `old` for a fresh `new` subtree.
    Replace { old: Target, new: Content },
    /// Create or overwrite an attribute.
    SetAttr { node: Target, attr: Attr },
    RemoveAttr { node: Target, name: CompactString },
}

impl Patch {
    /// The node this patch locates before mutating.
    pub fn target(&self) -> &Target {
        match self {
            Patch::Append { parent, .. } => parent,
            Patch::Remove { node } => node,
            Patch::Replace { old, .. } => old,
            Patch::SetAttr { node, .. } => node,
            Patch::RemoveAttr { node, .. } => node,
        }
    }
}

/// An ordered, replayable sequence of patches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
#[facet(transparent)]
pub struct PatchSet(pub Vec<Patch>);

impl PatchSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.0.iter()
    }

    /// Apply every patch in order. Stops at the first patch whose target cannot
    /// be located or whose mutation fails; earlier patches stay applied.
    pub fn apply<B: Backend>(&self, backend: &mut B) -> Result<(), ApplyError> {
        for (index, patch) in self.0.iter().enumerate() {
            debug!("applying patch {}: {:?}", index, patch);
            apply_patch(backend, index, patch).inspect_err(|_e| {
                debug!("patch {} failed: {}", index, _e);
            })?;
        }
        Ok(())
    }

    /// Encode for delivery to a remote applier.
    pub fn to_postcard(&self) -> Vec<u8> {
        facet_postcard::to_vec(self).expect("PatchSet serialization should not fail")
    }

    /// Decode a patch set produced by [`PatchSet::to_postcard`].
    pub fn from_postcard(
        bytes: &[u8],
    ) -> Result<Self, facet_postcard::DeserializeError<facet_postcard::PostcardError>> {
        facet_postcard::from_slice(bytes)
    }
}

impl From<Vec<Patch>> for PatchSet {
    fn from(patches: Vec<Patch>) -> Self {
        Self(patches)
    }
}

impl IntoIterator for PatchSet {
    type Item = Patch;
    type IntoIter = std::vec::IntoIter<Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A mutable document that patches can be applied to.
///
/// Callers must serialize [`PatchSet::apply`] calls against one backend.
pub trait Backend {
    /// Handle to a live node.
    type Node: Clone;
    type Error: fmt::Display;

    /// Resolve a structural path; the empty path is the mount root.
    fn locate(&self, path: &NodePath) -> Option<Self::Node>;

    /// Resolve a patch target. Backends with a selector engine may prefer
    /// `target.selector`.
    fn locate_target(&self, target: &Target) -> Option<Self::Node> {
        self.locate(&target.path)
    }

    /// Build a detached live node (and its subtree) from a payload.
    fn create(&mut self, content: &Content) -> Result<Self::Node, Self::Error>;

    fn append_child(&mut self, parent: &Self::Node, child: Self::Node) -> Result<(), Self::Error>;

    fn remove_child(&mut self, node: &Self::Node) -> Result<(), Self::Error>;

    /// Put `new` where `old` is and drop `old`.
    fn replace_child(&mut self, old: &Self::Node, new: Self::Node) -> Result<(), Self::Error>;

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str)
    -> Result<(), Self::Error>;

    fn remove_attribute(&mut self, node: &Self::Node, name: &str) -> Result<(), Self::Error>;
}

/// Why a patch set stopped applying.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum ApplyError {
    /// patch {index}: no live node at {target}
    TargetNotFound { index: usize, target: String },

    /// patch {index}: {reason}
    Backend { index: usize, reason: String },
}

impl ApplyError {
    /// Position of the failed patch in its set.
    pub fn index(&self) -> usize {
        match self {
            ApplyError::TargetNotFound { index, .. } | ApplyError::Backend { index, .. } => *index,
        }
    }
}

fn apply_patch<B: Backend>(backend: &mut B, index: usize, patch: &Patch) -> Result<(), ApplyError> {
    let target = patch.target();
    let node = backend
        .locate_target(target)
        .ok_or_else(|| ApplyError::TargetNotFound {
            index,
            target: target.to_string(),
        })?;
    trace!("patch {} resolved {}", index, target);

    let failed = |e: B::Error| ApplyError::Backend {
        index,
        reason: e.to_string(),
    };
    match patch {
        Patch::Append { child, .. } => {
            let child = backend.create(child).map_err(failed)?;
            backend.append_child(&node, child).map_err(failed)
        }
        Patch::Remove { .. } => backend.remove_child(&node).map_err(failed),
        Patch::Replace { new, .. } => {
            let new = backend.create(new).map_err(failed)?;
            backend.replace_child(&node, new).map_err(failed)
        }
        Patch::SetAttr { attr, .. } => backend
            .set_attribute(&node, &attr.name, &attr.value)
            .map_err(failed),
        Patch::RemoveAttr { name, .. } => backend.remove_attribute(&node, name).map_err(failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_node_path_display() {
        assert_eq!(NodePath::root().to_string(), "root");
        assert_eq!(NodePath::from([0, 2, 1]).to_string(), "0.2.1");
        assert_eq!(NodePath::root().child(3).child(0), NodePath::from([3, 0]));
        assert!(NodePath::root().is_root());
        assert!(!NodePath::root().child(0).is_root());
    }

    #[test]
    fn test_content_html() {
        let content = Content::Element {
            tag: "p".into(),
            attrs: vec![Attr::new("class", "a&b")],
            children: vec![
                Content::Text("1 < 2".into()),
                Content::Element {
                    tag: "br".into(),
                    attrs: vec![],
                    children: vec![],
                },
                Content::Comment(" c ".into()),
            ],
        };
        assert_eq!(
            content.to_html(),
            r#"<p class="a&amp;b">1 &lt; 2<br><!-- c --></p>"#
        );
        assert_eq!(content.inner_html(), "1 &lt; 2<br><!-- c -->");
    }

    #[test]
    fn test_script_content_is_raw() {
        let content = Content::Element {
            tag: "script".into(),
            attrs: vec![],
            children: vec![Content::Text("if (a < b) {}".into())],
        };
        assert_eq!(content.to_html(), "<script>if (a < b) {}</script>");
    }

    #[test]
    fn test_postcard_roundtrip() {
        let patches = PatchSet(vec![
            Patch::SetAttr {
                node: Target {
                    path: NodePath::from([0]),
                    selector: Some("div:nth-child(1)".to_string()),
                },
                attr: Attr::new("data-x", "1"),
            },
            Patch::Remove {
                node: Target::path(NodePath::from([0, 3])),
            },
        ]);
        let bytes = patches.to_postcard();
        let decoded = PatchSet::from_postcard(&bytes).expect("should decode");
        assert_eq!(decoded, patches);
    }
}
