//! Markup parser built on html5ever's tokenizer.
//!
//! html5ever's tree builder restructures documents (implied `<html>`/`<body>`,
//! foster parenting, adoption agency), which would break the one-to-one mapping
//! between source text and nodes. We only borrow its tokenizer and entity
//! table, and build the tree ourselves in [`ArenaSink`].
//!
//! The tokenizer is fed one character at a time, so when the sink receives a
//! token the [`SourceReader`] offset is exactly the end of that token in the
//! source. Start offsets come from the first `<` fed since the previous token
//! was emitted; scanning backwards from the end would land inside attribute
//! values or comments that contain `<`.

use compact_str::CompactString;
use facet::Facet;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use indextree::{Arena, NodeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use tendril::StrTendril;

use crate::serialize::is_void_element;
use crate::source::SourceReader;
use crate::tree::{Attr, ElementData, NodeKind, Tree};
use crate::{debug, trace};

/// Errors that abort a parse.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum ParseError {
    /// input is not valid UTF-8 (first invalid byte at {offset})
    InvalidUtf8 { offset: usize },

    /// markup was malformed: found closing tag {name} before a corresponding opening tag
    UnexpectedEndTag { name: String },

    /// markup was malformed: found closing tag {found} before the closing tag for {open}
    MismatchedEndTag { found: String, open: String },

    /// unsupported token {token} at byte {offset}
    UnsupportedToken { token: String, offset: usize },
}

impl ParseError {
    /// True for the end-tag errors, where the markup itself is inconsistent.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ParseError::UnexpectedEndTag { .. } | ParseError::MismatchedEndTag { .. }
        )
    }
}

/// Parse a UTF-8 byte buffer into a [`Tree`].
pub fn parse(source: &[u8]) -> Result<Tree, ParseError> {
    let text = std::str::from_utf8(source).map_err(|e| ParseError::InvalidUtf8 {
        offset: e.valid_up_to(),
    })?;
    parse_str(text)
}

/// Parse markup into a [`Tree`].
///
/// # Example
///
/// ```rust
/// let tree = reheat::parse_str(r#"<ul><li class="a">one</li></ul>"#).unwrap();
/// let li = tree.root(0).unwrap().children().next().unwrap();
/// assert_eq!(li.as_element().unwrap().selector(), "ul:nth-child(1) > li:nth-child(1)");
/// assert_eq!(li.html(), r#"<li class="a">one</li>"#);
/// ```
pub fn parse_str(source: &str) -> Result<Tree, ParseError> {
    debug!("parsing {} bytes", source.len());
    let tokenizer = Tokenizer::new(ArenaSink::new(source), TokenizerOpts::default());
    let input = BufferQueue::default();

    loop {
        let next = tokenizer.sink.reader.borrow_mut().next_char();
        let Some((span, ch)) = next else {
            break;
        };
        input.push_back(StrTendril::from_slice(&source[span.clone()]));
        let _ = tokenizer.feed(&input);
        if ch == '<' {
            tokenizer.sink.note_angle(span.start);
        }
        tokenizer.sink.check()?;
    }
    tokenizer.end();

    let tree = tokenizer.sink.finish()?;
    debug!("parsed {} roots", tree.len());
    Ok(tree)
}

/// Token sink that builds the arena while the tokenizer runs.
struct ArenaSink {
    reader: RefCell<SourceReader>,
    builder: RefCell<Builder>,
}

impl ArenaSink {
    fn new(source: &str) -> Self {
        Self {
            reader: RefCell::new(SourceReader::new(source)),
            builder: RefCell::new(Builder::new()),
        }
    }

    /// Record a `<` that was just fed. Only the first one since the last emitted
    /// token counts: later ones sit inside the markup it opened.
    fn note_angle(&self, at: usize) {
        let mut builder = self.builder.borrow_mut();
        if builder.markup_start.is_none() {
            builder.markup_start = Some(at);
        }
    }

    fn check(&self) -> Result<(), ParseError> {
        match self.builder.borrow_mut().error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn finish(&self) -> Result<Tree, ParseError> {
        let mut builder = self.builder.borrow_mut();
        if let Some(err) = builder.error.take() {
            return Err(err);
        }
        builder.finish_input();
        Ok(Tree {
            arena: mem::replace(&mut builder.arena, Arena::new()),
            roots: mem::take(&mut builder.roots),
            source: mem::take(&mut *self.reader.borrow_mut()),
        })
    }
}

impl TokenSink for ArenaSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let reader = self.reader.borrow();
        let mut builder = self.builder.borrow_mut();
        if builder.error.is_some() {
            return TokenSinkResult::Continue;
        }
        let offset = reader.offset();

        let result = match token {
            Token::CharacterTokens(text) => {
                builder.settle_void();
                builder.push_text(&text);
                Ok(TokenSinkResult::Continue)
            }
            Token::NullCharacterToken => {
                builder.settle_void();
                builder.markup_start = None;
                Ok(TokenSinkResult::Continue)
            }
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => Ok(builder.start_tag(&reader, tag, offset)),
                TagKind::EndTag => builder
                    .end_tag(&reader, tag, offset)
                    .map(|()| TokenSinkResult::Continue),
            },
            Token::CommentToken(text) => builder
                .comment(&reader, &text, offset)
                .map(|()| TokenSinkResult::Continue),
            Token::DoctypeToken(_) => {
                builder.doctype(&reader, offset);
                Ok(TokenSinkResult::Continue)
            }
            Token::EOFToken => {
                builder.finish_input();
                Ok(TokenSinkResult::Continue)
            }
            Token::ParseError(_msg) => {
                trace!("tokenizer recovered at byte {}: {}", offset, _msg);
                Ok(TokenSinkResult::Continue)
            }
        };

        result.unwrap_or_else(|err| {
            debug!("parse failed at byte {}: {}", offset, err);
            builder.error = Some(err);
            TokenSinkResult::Continue
        })
    }
}

/// Tree construction state.
struct Builder {
    arena: Arena<NodeKind>,
    roots: Vec<NodeId>,
    /// Current open parent; `None` means the next node is a root.
    open: Option<NodeId>,
    /// Void element whose start tag was the last token; closed by the next token
    /// unless that token is its own end tag.
    pending_void: Option<NodeId>,
    /// Character data not yet attached.
    text: Option<CompactString>,
    /// First `<` fed since the last emitted token.
    markup_start: Option<usize>,
    /// Element children seen so far, per parent and at root level.
    element_children: HashMap<NodeId, usize>,
    root_elements: usize,
    error: Option<ParseError>,
}

impl Builder {
    fn new() -> Self {
        Self {
            arena: Arena::new(),
            roots: Vec::new(),
            open: None,
            pending_void: None,
            text: None,
            markup_start: None,
            element_children: HashMap::new(),
            root_elements: 0,
            error: None,
        }
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.arena.get(id)?.get() {
            NodeKind::Element(elem) => Some(elem),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.arena.get_mut(id)?.get_mut() {
            NodeKind::Element(elem) => Some(elem),
            _ => None,
        }
    }

    fn attach(&mut self, kind: NodeKind) -> NodeId {
        let id = self.arena.new_node(kind);
        match self.open {
            Some(parent) => parent.append(id, &mut self.arena),
            None => self.roots.push(id),
        }
        id
    }

    fn take_markup_start(&mut self, reader: &SourceReader, offset: usize) -> usize {
        self.markup_start
            .take()
            .or_else(|| reader.rfind(b'<', offset))
            .unwrap_or(offset)
    }

    fn push_text(&mut self, text: &str) {
        self.markup_start = None;
        self.text
            .get_or_insert_with(CompactString::default)
            .push_str(text);
    }

    fn flush_text(&mut self) {
        if let Some(text) = self.text.take()
            && !text.is_empty()
        {
            self.attach(NodeKind::Text(text));
        }
    }

    fn settle_void(&mut self) {
        let Some(id) = self.pending_void.take() else {
            return;
        };
        if let Some(elem) = self.element_mut(id) {
            trace!("auto-closing <{}>", elem.tag);
            elem.auto_closed = true;
        }
        self.open = self.arena[id].parent();
    }

    /// Number of element children under `parent`, or element roots.
    /// One-based position of the next element child of `parent`.
    fn next_element_position(&mut self, parent: Option<NodeId>) -> usize {
        let count = match parent {
            Some(parent) => self.element_children.entry(parent).or_default(),
            None => &mut self.root_elements,
        };
        *count += 1;
        *count
    }

    fn start_tag(&mut self, reader: &SourceReader, tag: Tag, offset: usize) -> TokenSinkResult<()> {
        self.settle_void();
        self.flush_text();

        let start = self.take_markup_start(reader, offset);
        let name = source_name(reader, start + 1, &tag.name);
        let attrs = tag
            .attrs
            .iter()
            .map(|attr| Attr::new(&*attr.name.local, &*attr.value))
            .collect();

        let position = self.next_element_position(self.open);
        let fragment = format!("{}:nth-child({})", name, position);
        let selector = match self.open.and_then(|parent| self.element(parent)) {
            Some(parent) => format!("{} > {}", parent.selector, fragment),
            None => fragment,
        };

        let self_closing = tag.self_closing;
        let id = self.attach(NodeKind::Element(ElementData {
            tag: name,
            attrs,
            start,
            end: self_closing.then_some(offset),
            inner_start: offset,
            inner_end: self_closing.then_some(offset),
            auto_closed: false,
            selector,
        }));
        trace!("start tag <{}> at {}..{}", tag.name, start, offset);

        if self_closing {
            return TokenSinkResult::Continue;
        }
        self.open = Some(id);
        if is_void_element(&tag.name) {
            self.pending_void = Some(id);
            return TokenSinkResult::Continue;
        }
        match &*tag.name {
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            }
            "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
            "plaintext" => TokenSinkResult::Plaintext,
            _ => TokenSinkResult::Continue,
        }
    }

    fn end_tag(&mut self, reader: &SourceReader, tag: Tag, offset: usize) -> Result<(), ParseError> {
        let start = self.take_markup_start(reader, offset);
        let name = source_name(reader, start + 2, &tag.name);

        if let Some(id) = self.pending_void {
            let closes_void = self
                .element(id)
                .is_some_and(|elem| elem.tag.eq_ignore_ascii_case(&name));
            if closes_void {
                self.pending_void = None;
            } else {
                self.settle_void();
            }
        }
        self.flush_text();

        let Some(open) = self.open else {
            return Err(ParseError::UnexpectedEndTag {
                name: name.to_string(),
            });
        };
        let parent = self.arena[open].parent();
        let Some(elem) = self.element_mut(open) else {
            return Err(ParseError::UnexpectedEndTag {
                name: name.to_string(),
            });
        };
        if !elem.tag.eq_ignore_ascii_case(&name) {
            return Err(ParseError::MismatchedEndTag {
                found: name.to_string(),
                open: elem.tag.to_string(),
            });
        }

        let literal = format!("</{}>", elem.tag);
        if reader.ends_with_ignore_ascii_case(offset, &literal) {
            elem.end = Some(offset);
            elem.inner_end = Some(offset - literal.len());
        } else {
            trace!("</{}> not found verbatim before {}", elem.tag, offset);
            elem.auto_closed = true;
        }
        self.open = parent;
        Ok(())
    }

    fn comment(&mut self, reader: &SourceReader, text: &str, offset: usize) -> Result<(), ParseError> {
        self.settle_void();
        self.flush_text();

        let start = self.take_markup_start(reader, offset);
        let raw = reader.slice(start..offset);
        let kind = if raw.starts_with("<!--") {
            NodeKind::Comment(text.into())
        } else if raw.starts_with("<![CDATA[") {
            let data = text.strip_prefix("[CDATA[").unwrap_or(text);
            self.push_text(data.strip_suffix("]]").unwrap_or(data));
            return Ok(());
        } else if raw.starts_with("<?") {
            processing_instruction(text)
        } else if raw.starts_with("<!") {
            NodeKind::Directive(text.into())
        } else {
            return Err(ParseError::UnsupportedToken {
                token: raw.to_string(),
                offset: start,
            });
        };
        self.attach(kind);
        Ok(())
    }

    fn doctype(&mut self, reader: &SourceReader, offset: usize) {
        self.settle_void();
        self.flush_text();

        let start = self.take_markup_start(reader, offset);
        let raw = reader.slice(start..offset);
        let body = raw.strip_prefix("<!").unwrap_or(raw);
        let body = body.strip_suffix('>').unwrap_or(body);
        self.attach(NodeKind::Directive(body.into()));
    }

    /// End of input: close the pending void element, attach trailing text, and
    /// mark anything still open as auto-closed.
    fn finish_input(&mut self) {
        self.settle_void();
        self.flush_text();
        while let Some(id) = self.open {
            if let Some(elem) = self.element_mut(id) {
                trace!("<{}> still open at end of input", elem.tag);
                elem.auto_closed = true;
            }
            self.open = self.arena[id].parent();
        }
    }
}

/// Tag name with the case it has in source; the tokenizer lowercases it.
fn source_name(reader: &SourceReader, at: usize, name: &str) -> CompactString {
    let raw = reader.slice(at..at + name.len());
    if raw.eq_ignore_ascii_case(name) {
        raw.into()
    } else {
        name.into()
    }
}

/// `?target inst?` as delivered in a bogus comment.
fn processing_instruction(text: &str) -> NodeKind {
    let body = text.strip_prefix('?').unwrap_or(text);
    let body = body.strip_suffix('?').unwrap_or(body);
    let (target, inst) = match body.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((target, inst)) => (target, inst.trim_start()),
        None => (body, ""),
    };
    NodeKind::ProcessingInstruction {
        target: target.into(),
        inst: inst.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Kind;
    use facet_testhelpers::test;

    #[test]
    fn test_element_spans() {
        let source = r#"<div id="a"><p>x</p></div>"#;
        let tree = parse_str(source).unwrap();
        let div = tree.root(0).unwrap();
        let elem = div.as_element().unwrap();
        assert_eq!(elem.source_span(), Some(0..source.len()));
        assert_eq!(elem.inner_span(), Some(12..20));
        assert!(!elem.is_auto_closed());

        let p = div.children().next().unwrap();
        let p_elem = p.as_element().unwrap();
        assert_eq!(p_elem.source_span(), Some(12..20));
        assert_eq!(&source[p_elem.inner_span().unwrap()], "x");
    }

    #[test]
    fn test_start_offset_ignores_angle_in_attribute() {
        let source = r#"<a title="1 < 2">x</a>"#;
        let tree = parse_str(source).unwrap();
        let a = tree.root(0).unwrap();
        assert_eq!(a.as_element().unwrap().source_span(), Some(0..source.len()));
        assert_eq!(a.as_element().unwrap().attr("title"), Some("1 < 2"));
        assert_eq!(a.html(), source);
    }

    #[test]
    fn test_text_is_coalesced_and_unescaped() {
        let tree = parse_str("<p>fish &amp; chips &lt;3</p>").unwrap();
        let p = tree.root(0).unwrap();
        let children: Vec<_> = p.children().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(
            children[0].data(),
            &NodeKind::Text("fish & chips <3".into())
        );
    }

    #[test]
    fn test_tag_case_is_preserved() {
        let tree = parse_str("<DIV Class=\"x\"></div>").unwrap();
        let elem = tree.root(0).unwrap().as_element().unwrap().clone();
        assert_eq!(elem.tag, "DIV");
        // attribute names come out of the tokenizer lowercased
        assert_eq!(elem.attr("class"), Some("x"));
        assert!(!elem.is_auto_closed());
    }

    #[test]
    fn test_void_element_followed_by_its_end_tag() {
        let tree = parse_str("<br></br>").unwrap();
        let br = tree.root(0).unwrap().as_element().unwrap().clone();
        assert!(!br.is_auto_closed());
        assert_eq!(br.source_span(), Some(0..9));
    }

    #[test]
    fn test_self_closing_tag_keeps_source() {
        let tree = parse_str("<div/><span>a</span>").unwrap();
        assert_eq!(tree.len(), 2);
        let div = tree.root(0).unwrap();
        assert_eq!(div.children().count(), 0);
        assert_eq!(div.html(), "<div/>");
        assert_eq!(
            tree.root(1).unwrap().as_element().unwrap().selector(),
            "span:nth-child(2)"
        );
    }

    #[test]
    fn test_script_content_is_raw_text() {
        let source = "<script>if (a < b && c) {}</script>";
        let tree = parse_str(source).unwrap();
        let script = tree.root(0).unwrap();
        let children: Vec<_> = script.children().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(
            children[0].data(),
            &NodeKind::Text("if (a < b && c) {}".into())
        );
        assert_eq!(tree.html(), source);
    }

    #[test]
    fn test_doctype_and_processing_instruction() {
        let tree = parse_str("<?xml version=\"1.0\"?><!DOCTYPE html><html></html>").unwrap();
        let kinds: Vec<_> = tree.roots().map(|n| n.kind()).collect();
        assert_eq!(
            kinds,
            [Kind::ProcessingInstruction, Kind::Directive, Kind::Element]
        );
        assert_eq!(
            tree.root(0).unwrap().data(),
            &NodeKind::ProcessingInstruction {
                target: "xml".into(),
                inst: "version=\"1.0\"".into(),
            }
        );
        assert_eq!(
            tree.root(1).unwrap().data(),
            &NodeKind::Directive("DOCTYPE html".into())
        );
    }

    #[test]
    fn test_directive_inside_element_is_accepted() {
        let tree = parse_str("<div><!ENTITY x><?php echo 1 ?></div>").unwrap();
        let div = tree.root(0).unwrap();
        let kinds: Vec<_> = div.children().map(|n| n.kind()).collect();
        assert_eq!(kinds, [Kind::Directive, Kind::ProcessingInstruction]);
    }

    #[test]
    fn test_cdata_becomes_text() {
        let tree = parse_str("<p><![CDATA[a<b]]></p>").unwrap();
        let p = tree.root(0).unwrap();
        let text = p.children().next().unwrap();
        assert_eq!(text.data(), &NodeKind::Text("a<b".into()));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = parse(b"<p>\xff</p>").unwrap_err();
        assert_eq!(err, ParseError::InvalidUtf8 { offset: 3 });
    }

    #[test]
    fn test_bogus_end_tag_is_unsupported() {
        let err = parse_str("<p></ 3></p>").unwrap_err();
        assert!(
            matches!(err, ParseError::UnsupportedToken { offset: 3, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_long_sibling_list_positions() {
        let items: String = (0..2000).map(|i| format!("<li>{i}</li>x")).collect();
        let tree = parse_str(&format!("<ol>{items}</ol><p><br><b>b</b></p>")).unwrap();
        let ol = tree.root(0).unwrap();
        let last = ol.children().filter_map(|n| n.as_element()).last().unwrap();
        assert_eq!(last.selector(), "ol:nth-child(1) > li:nth-child(2000)");

        let p = tree.root(1).unwrap();
        let b = p.children().nth(1).unwrap();
        assert_eq!(
            b.as_element().unwrap().selector(),
            "p:nth-child(2) > b:nth-child(2)"
        );
    }
}
