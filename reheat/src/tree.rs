//! The parsed tree: an indextree arena of nodes plus the source it came from.
//!
//! Ownership flows parent to child through the arena; a node's parent is a
//! non-owning [`NodeId`] lookup. Root-level siblings are kept in document order in
//! [`Tree::roots`] and have no parent.

use compact_str::CompactString;
use facet::Facet;
use indextree::{Arena, NodeId};
use std::fmt;
use std::ops::Range;

use crate::patch::NodePath;
use crate::serialize;
use crate::source::SourceReader;

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum Kind {
    Element,
    Text,
    Comment,
    ProcessingInstruction,
    Directive,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Element,
        Kind::Text,
        Kind::Comment,
        Kind::ProcessingInstruction,
        Kind::Directive,
    ];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Element => "element",
            Kind::Text => "text",
            Kind::Comment => "comment",
            Kind::ProcessingInstruction => "processing instruction",
            Kind::Directive => "directive",
        };
        f.write_str(name)
    }
}

/// An attribute name-value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct Attr {
    pub name: CompactString,
    pub value: CompactString,
}

impl Attr {
    pub fn new(name: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// What lives in each arena slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(ElementData),
    /// Unescaped character data.
    Text(CompactString),
    /// Content between `<!--` and `-->`.
    Comment(CompactString),
    ProcessingInstruction {
        target: CompactString,
        inst: CompactString,
    },
    /// Raw declaration content between `<!` and `>`, e.g. `DOCTYPE html`.
    Directive(CompactString),
}

impl NodeKind {
    pub fn kind(&self) -> Kind {
        match self {
            NodeKind::Element(_) => Kind::Element,
            NodeKind::Text(_) => Kind::Text,
            NodeKind::Comment(_) => Kind::Comment,
            NodeKind::ProcessingInstruction { .. } => Kind::ProcessingInstruction,
            NodeKind::Directive(_) => Kind::Directive,
        }
    }
}

/// Element tag, attributes and the source metadata computed while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: CompactString,
    pub attrs: Vec<Attr>,
    pub(crate) start: usize,
    pub(crate) end: Option<usize>,
    pub(crate) inner_start: usize,
    pub(crate) inner_end: Option<usize>,
    pub(crate) auto_closed: bool,
    pub(crate) selector: String,
}

impl ElementData {
    /// First attribute named `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Byte span of the whole element in source, known only once its closing tag
    /// (or self-closing start tag) has been read.
    pub fn source_span(&self) -> Option<Range<usize>> {
        self.end.map(|end| self.start..end)
    }

    /// Byte span between the start tag and the closing tag.
    pub fn inner_span(&self) -> Option<Range<usize>> {
        self.inner_end.map(|end| self.inner_start..end)
    }

    /// True when the closing tag was not present in source.
    pub fn is_auto_closed(&self) -> bool {
        self.auto_closed
    }

    /// Positional selector (`tag:nth-child(k)` chain from the document root).
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

/// A parsed document: zero or more root nodes and the source they came from.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) arena: Arena<NodeKind>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) source: SourceReader,
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            arena: Arena::new(),
            roots: Vec::new(),
            source: SourceReader::default(),
        }
    }
}

impl Tree {
    /// Number of root-level nodes.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn root(&self, index: usize) -> Option<Node<'_>> {
        self.roots.get(index).map(|&id| self.node(id))
    }

    pub fn roots(&self) -> impl ExactSizeIterator<Item = Node<'_>> + '_ {
        self.roots.iter().map(|&id| self.node(id))
    }

    pub(crate) fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    /// Wrap a node id from this tree's arena.
    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { tree: self, id }
    }

    /// Resolve a root index followed by child indices.
    pub fn get(&self, path: &NodePath) -> Option<Node<'_>> {
        let (&first, rest) = path.0.split_first()?;
        let mut current = *self.roots.get(first as usize)?;
        for &index in rest {
            current = current.children(&self.arena).nth(index as usize)?;
        }
        Some(self.node(current))
    }

    /// The markup this tree was parsed from.
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Serialized markup of every root, in order.
    pub fn html(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            root.write_html(&mut out);
        }
        out
    }

    /// Recursively compare against `other`, ignoring parent links and source
    /// offsets. Reports the first difference found.
    pub fn compare(&self, other: &Tree) -> Result<(), Mismatch> {
        compare_lists(
            &NodePath::root(),
            self.roots().collect(),
            other.roots().collect(),
        )
    }

    /// Indented rendering of the tree for logs and test failures.
    pub fn dump(&self) -> TreeDump<'_> {
        TreeDump { tree: self }
    }
}

/// A borrowed handle to one node of a [`Tree`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    pub fn data(&self) -> &'a NodeKind {
        self.tree.arena[self.id].get()
    }

    pub fn kind(&self) -> Kind {
        self.data().kind()
    }

    pub fn as_element(&self) -> Option<&'a ElementData> {
        match self.data() {
            NodeKind::Element(elem) => Some(elem),
            _ => None,
        }
    }

    /// Parent element, or `None` for roots.
    pub fn parent(&self) -> Option<Node<'a>> {
        self.tree.arena[self.id]
            .parent()
            .map(|id| self.tree.node(id))
    }

    /// Children in order; empty for everything but elements.
    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + use<'a> {
        let tree = self.tree;
        self.id.children(&tree.arena).map(move |id| tree.node(id))
    }

    pub(crate) fn child_ids(&self) -> Vec<NodeId> {
        self.id.children(&self.tree.arena).collect()
    }

    /// Position among siblings, or among the tree's roots for a root.
    pub fn index(&self) -> usize {
        match self.tree.arena[self.id].parent() {
            Some(parent) => parent
                .children(&self.tree.arena)
                .position(|id| id == self.id)
                .unwrap_or_default(),
            None => self
                .tree
                .roots
                .iter()
                .position(|&id| id == self.id)
                .unwrap_or_default(),
        }
    }

    /// Structural address from the document root.
    pub fn path(&self) -> NodePath {
        let mut indices = vec![self.index() as u32];
        let mut current = self.parent();
        while let Some(node) = current {
            indices.push(node.index() as u32);
            current = node.parent();
        }
        indices.reverse();
        NodePath(indices.into_iter().collect())
    }

    /// Exact source markup when the element's closing tag was present, otherwise
    /// markup reconstructed from tag name, attributes and children.
    pub fn html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    pub(crate) fn write_html(&self, out: &mut String) {
        match self.data() {
            NodeKind::Element(elem) => match elem.source_span() {
                Some(span) => out.push_str(self.tree.source.slice(span)),
                None => {
                    serialize::write_start_tag(
                        out,
                        &elem.tag,
                        elem.attrs.iter().map(|a| (a.name.as_str(), a.value.as_str())),
                    );
                    for child in self.children() {
                        child.write_html(out);
                    }
                }
            },
            NodeKind::Text(text) => {
                let parent = self.parent().and_then(|p| p.as_element());
                serialize::write_text(out, text, parent.map(|e| e.tag.as_str()));
            }
            NodeKind::Comment(text) => serialize::write_comment(out, text),
            NodeKind::ProcessingInstruction { target, inst } => {
                serialize::write_processing_instruction(out, target, inst)
            }
            NodeKind::Directive(text) => serialize::write_directive(out, text),
        }
    }

    /// Recursively compare against `other`, ignoring parent links and offsets.
    pub fn compare(&self, other: &Node<'_>) -> Result<(), Mismatch> {
        compare_nodes(&self.path(), *self, *other)
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("data", self.data())
            .finish()
    }
}

/// First structural difference found by [`Tree::compare`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("at {path}: {message}")]
pub struct Mismatch {
    pub path: NodePath,
    pub message: String,
}

fn compare_lists(path: &NodePath, ours: Vec<Node<'_>>, theirs: Vec<Node<'_>>) -> Result<(), Mismatch> {
    if ours.len() != theirs.len() {
        return Err(Mismatch {
            path: path.clone(),
            message: format!("{} children vs {} children", ours.len(), theirs.len()),
        });
    }
    for (index, (a, b)) in ours.into_iter().zip(theirs).enumerate() {
        compare_nodes(&path.child(index), a, b)?;
    }
    Ok(())
}

fn compare_nodes(path: &NodePath, a: Node<'_>, b: Node<'_>) -> Result<(), Mismatch> {
    let mismatch = |message: String| Mismatch {
        path: path.clone(),
        message,
    };
    match (a.data(), b.data()) {
        (NodeKind::Element(x), NodeKind::Element(y)) => {
            if x.tag != y.tag {
                return Err(mismatch(format!("<{}> vs <{}>", x.tag, y.tag)));
            }
            if x.attrs.len() != y.attrs.len() {
                return Err(mismatch(format!(
                    "{} attrs vs {} attrs",
                    x.attrs.len(),
                    y.attrs.len()
                )));
            }
            for (i, (p, q)) in x.attrs.iter().zip(&y.attrs).enumerate() {
                if p != q {
                    return Err(mismatch(format!(
                        "attr {i} was {}={:?} vs {}={:?}",
                        p.name, p.value, q.name, q.value
                    )));
                }
            }
            compare_lists(path, a.children().collect(), b.children().collect())
        }
        (NodeKind::Text(x), NodeKind::Text(y))
        | (NodeKind::Comment(x), NodeKind::Comment(y))
        | (NodeKind::Directive(x), NodeKind::Directive(y)) => {
            if x == y {
                Ok(())
            } else {
                Err(mismatch(format!("{:?} vs {:?}", x, y)))
            }
        }
        (
            NodeKind::ProcessingInstruction { target, inst },
            NodeKind::ProcessingInstruction {
                target: other_target,
                inst: other_inst,
            },
        ) => {
            if target == other_target && inst == other_inst {
                Ok(())
            } else {
                Err(mismatch(format!(
                    "<?{target} {inst}?> vs <?{other_target} {other_inst}?>"
                )))
            }
        }
        (x, y) => Err(mismatch(format!("{} vs {}", x.kind(), y.kind()))),
    }
}

/// Display adapter returned by [`Tree::dump`].
pub struct TreeDump<'a> {
    tree: &'a Tree,
}

impl fmt::Display for TreeDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in self.tree.roots() {
            fmt_node(f, root, 0)?;
        }
        Ok(())
    }
}

fn fmt_node(f: &mut fmt::Formatter<'_>, node: Node<'_>, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match node.data() {
        NodeKind::Element(elem) => {
            write!(f, "{indent}<{}", elem.tag)?;
            for attr in &elem.attrs {
                write!(f, " {}={:?}", attr.name, attr.value)?;
            }
            let closed = if elem.auto_closed { " (auto-closed)" } else { "" };
            writeln!(f, ">{closed}")?;
            for child in node.children() {
                fmt_node(f, child, depth + 1)?;
            }
        }
        NodeKind::Text(text) => writeln!(f, "{indent}TEXT: {text:?}")?,
        NodeKind::Comment(text) => writeln!(f, "{indent}COMMENT: {text:?}")?,
        NodeKind::ProcessingInstruction { target, inst } => {
            writeln!(f, "{indent}PI: {target} {inst:?}")?
        }
        NodeKind::Directive(text) => writeln!(f, "{indent}DIRECTIVE: {text:?}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::parse_str;
    use facet_testhelpers::test;

    #[test]
    fn test_parent_and_children() {
        let tree = parse_str("<ul><li>a</li><li>b</li></ul>").unwrap();
        let ul = tree.root(0).unwrap();
        assert!(ul.parent().is_none());

        let items: Vec<_> = ul.children().collect();
        assert_eq!(items.len(), 2);
        let parent = items[1].parent().expect("li has a parent");
        assert_eq!(parent.id(), ul.id());
        assert_eq!(items[1].index(), 1);
    }

    #[test]
    fn test_path_and_get_agree() {
        let tree = parse_str("<p>x</p><div><span>a</span><em>b</em></div>").unwrap();
        let div = tree.root(1).unwrap();
        let em = div.children().nth(1).unwrap();
        let path = em.path();
        assert_eq!(path.to_string(), "1.1");
        assert_eq!(tree.get(&path).map(|n| n.id()), Some(em.id()));
        assert!(tree.get(&crate::NodePath::root()).is_none());
    }

    #[test]
    fn test_compare_reports_first_difference() {
        let a = parse_str("<div><p class=\"x\">a</p></div>").unwrap();
        let b = parse_str("<div><p class=\"y\">a</p></div>").unwrap();
        let mismatch = a.compare(&b).unwrap_err();
        assert_eq!(mismatch.path.to_string(), "0.0");
        assert!(mismatch.message.contains("class"), "{mismatch}");

        let c = parse_str("<div><p class=\"x\">a</p></div>").unwrap();
        assert!(a.compare(&c).is_ok());
    }

    #[test]
    fn test_compare_is_tag_case_sensitive() {
        let upper = parse_str("<DIV>a</DIV>").unwrap();
        let lower = parse_str("<div>a</div>").unwrap();
        let mismatch = upper.compare(&lower).unwrap_err();
        assert_eq!(mismatch.to_string(), "at 0: <DIV> vs <div>");
        let _: &dyn std::error::Error = &mismatch;
    }

    #[test]
    fn test_dump_shows_structure() {
        let tree = parse_str("<div id=\"a\">hi<br></div>").unwrap();
        let dump = tree.dump().to_string();
        assert_eq!(
            dump,
            "<div id=\"a\">\n  TEXT: \"hi\"\n  <br> (auto-closed)\n"
        );
    }
}
