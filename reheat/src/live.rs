//! An in-memory mutable document that patch sets can be applied to.
//!
//! [`LiveDocument`] plays the part a browser DOM plays in production: it is
//! built from a parsed [`Tree`], mutated only through the [`Backend`]
//! primitives, and serialized back out with [`LiveDocument::to_html`].

use compact_str::CompactString;
use facet::Facet;
use indexmap::IndexMap;
use indextree::{Arena, NodeId};

use crate::debug;
use crate::parser::{ParseError, parse_str};
use crate::patch::{Backend, Content, NodePath, Target};
use crate::serialize;
use crate::tree::{Node, NodeKind, Tree};

/// Document = Arena plus an invisible root whose children are the top-level nodes.
#[derive(Debug, Clone)]
pub struct LiveDocument {
    arena: Arena<LiveNode>,
    root: NodeId,
}

/// What goes in each arena slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveNode {
    /// Mount root (invisible, parent of the top-level nodes)
    Document,
    Element {
        tag: CompactString,
        /// IndexMap keeps insertion order for consistent serialization
        attrs: IndexMap<CompactString, CompactString>,
    },
    Text(CompactString),
    Comment(CompactString),
    ProcessingInstruction {
        target: CompactString,
        inst: CompactString,
    },
    Directive(CompactString),
}

/// Primitive mutations a [`LiveDocument`] refuses.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum LiveError {
    /// the document root cannot be removed or replaced
    DocumentRoot,

    /// node is not an element
    NotAnElement,

    /// only elements and the document root can have children
    NotAContainer,
}

impl Default for LiveDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveDocument {
    /// An empty document.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(LiveNode::Document);
        Self { arena, root }
    }

    /// Mirror a parsed tree.
    pub fn from_tree(tree: &Tree) -> Self {
        let mut doc = Self::new();
        for node in tree.roots() {
            let id = doc.copy_node(node);
            doc.root.append(id, &mut doc.arena);
        }
        doc
    }

    /// Parse markup straight into a live document.
    pub fn parse(markup: &str) -> Result<Self, ParseError> {
        Ok(Self::from_tree(&parse_str(markup)?))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> &LiveNode {
        self.arena[id].get()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Attribute value on an element.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.get(id) {
            LiveNode::Element { attrs, .. } => attrs.get(name).map(|value| value.as_str()),
            _ => None,
        }
    }

    /// Resolve a root index followed by child indices; the empty path is the
    /// document root.
    pub fn locate(&self, path: &NodePath) -> Option<NodeId> {
        let mut current = self.root;
        for &index in &path.0 {
            current = current.children(&self.arena).nth(index as usize)?;
        }
        Some(current)
    }

    /// Resolve a positional selector such as
    /// `main:nth-child(1) > ul:nth-child(2) > li:nth-child(1)`, where each
    /// position counts element siblings only.
    pub fn select(&self, selector: &str) -> Option<NodeId> {
        let mut current = self.root;
        for fragment in selector.split(" > ") {
            let (tag, position) = fragment.trim().rsplit_once(":nth-child(")?;
            let position: usize = position.strip_suffix(')')?.parse().ok()?;
            current = current
                .children(&self.arena)
                .filter(|&id| matches!(self.get(id), LiveNode::Element { .. }))
                .nth(position.checked_sub(1)?)?;
            match self.get(current) {
                LiveNode::Element { tag: found, .. } if found.eq_ignore_ascii_case(tag) => {}
                _ => return None,
            }
        }
        Some(current)
    }

    /// Serialize the top-level nodes.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.root.children(&self.arena) {
            self.serialize_node(&mut out, child, None);
        }
        out
    }

    fn copy_node(&mut self, node: Node<'_>) -> NodeId {
        let live = match node.data() {
            NodeKind::Element(elem) => LiveNode::Element {
                tag: elem.tag.clone(),
                attrs: elem
                    .attrs
                    .iter()
                    .map(|attr| (attr.name.clone(), attr.value.clone()))
                    .collect(),
            },
            NodeKind::Text(text) => LiveNode::Text(text.clone()),
            NodeKind::Comment(text) => LiveNode::Comment(text.clone()),
            NodeKind::ProcessingInstruction { target, inst } => LiveNode::ProcessingInstruction {
                target: target.clone(),
                inst: inst.clone(),
            },
            NodeKind::Directive(text) => LiveNode::Directive(text.clone()),
        };
        let id = self.arena.new_node(live);
        for child in node.children() {
            let child_id = self.copy_node(child);
            id.append(child_id, &mut self.arena);
        }
        id
    }

    fn build(&mut self, content: &Content) -> NodeId {
        match content {
            Content::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.arena.new_node(LiveNode::Element {
                    tag: tag.clone(),
                    attrs: attrs
                        .iter()
                        .map(|attr| (attr.name.clone(), attr.value.clone()))
                        .collect(),
                });
                for child in children {
                    let child_id = self.build(child);
                    id.append(child_id, &mut self.arena);
                }
                id
            }
            Content::Text(text) => self.arena.new_node(LiveNode::Text(text.clone())),
            Content::Comment(text) => self.arena.new_node(LiveNode::Comment(text.clone())),
            Content::ProcessingInstruction { target, inst } => {
                self.arena.new_node(LiveNode::ProcessingInstruction {
                    target: target.clone(),
                    inst: inst.clone(),
                })
            }
            Content::Directive(text) => self.arena.new_node(LiveNode::Directive(text.clone())),
        }
    }

    fn element_attrs(
        &mut self,
        id: NodeId,
    ) -> Result<&mut IndexMap<CompactString, CompactString>, LiveError> {
        match self.arena[id].get_mut() {
            LiveNode::Element { attrs, .. } => Ok(attrs),
            _ => Err(LiveError::NotAnElement),
        }
    }

    fn serialize_node(&self, out: &mut String, id: NodeId, parent_tag: Option<&str>) {
        match self.get(id) {
            LiveNode::Document => {
                for child in id.children(&self.arena) {
                    self.serialize_node(out, child, None);
                }
            }
            LiveNode::Element { tag, attrs } => {
                serialize::write_start_tag(
                    out,
                    tag,
                    attrs.iter().map(|(name, value)| (name.as_str(), value.as_str())),
                );
                let mut children = id.children(&self.arena).peekable();
                if serialize::is_void_element(tag) && children.peek().is_none() {
                    return;
                }
                for child in children {
                    self.serialize_node(out, child, Some(tag));
                }
                serialize::write_end_tag(out, tag);
            }
            LiveNode::Text(text) => serialize::write_text(out, text, parent_tag),
            LiveNode::Comment(text) => serialize::write_comment(out, text),
            LiveNode::ProcessingInstruction { target, inst } => {
                serialize::write_processing_instruction(out, target, inst)
            }
            LiveNode::Directive(text) => serialize::write_directive(out, text),
        }
    }
}

impl Backend for LiveDocument {
    type Node = NodeId;
    type Error = LiveError;

    fn locate(&self, path: &NodePath) -> Option<NodeId> {
        LiveDocument::locate(self, path)
    }

    fn locate_target(&self, target: &Target) -> Option<NodeId> {
        self.locate(&target.path).or_else(|| {
            let selector = target.selector.as_deref()?;
            debug!("path {} not found, trying selector {}", target.path, selector);
            self.select(selector)
        })
    }

    fn create(&mut self, content: &Content) -> Result<NodeId, LiveError> {
        Ok(self.build(content))
    }

    fn append_child(&mut self, parent: &NodeId, child: NodeId) -> Result<(), LiveError> {
        match self.get(*parent) {
            LiveNode::Document | LiveNode::Element { .. } => {
                parent.append(child, &mut self.arena);
                Ok(())
            }
            _ => Err(LiveError::NotAContainer),
        }
    }

    fn remove_child(&mut self, node: &NodeId) -> Result<(), LiveError> {
        if *node == self.root {
            return Err(LiveError::DocumentRoot);
        }
        node.remove_subtree(&mut self.arena);
        Ok(())
    }

    fn replace_child(&mut self, old: &NodeId, new: NodeId) -> Result<(), LiveError> {
        if *old == self.root {
            return Err(LiveError::DocumentRoot);
        }
        old.insert_before(new, &mut self.arena);
        old.remove_subtree(&mut self.arena);
        Ok(())
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), LiveError> {
        self.element_attrs(*node)?.insert(name.into(), value.into());
        Ok(())
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<(), LiveError> {
        self.element_attrs(*node)?.shift_remove(name);
        Ok(())
    }
}
