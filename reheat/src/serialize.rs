//! Markup writing shared by the parsed tree, patch payloads and the live document.

use std::fmt::Write;

/// Elements that never have content or a closing tag.
pub fn is_void_element(tag: &str) -> bool {
    const VOID: &[&str] = &[
        "area", "base", "basefont", "br", "col", "embed", "frame", "hr", "img", "input",
        "isindex", "keygen", "link", "meta", "param", "source", "track", "wbr",
    ];
    VOID.iter().any(|void| tag.eq_ignore_ascii_case(void))
}

/// Elements whose text content is written without escaping.
pub fn is_raw_text_element(tag: &str) -> bool {
    const RAW: &[&str] = &[
        "script",
        "style",
        "xmp",
        "iframe",
        "noembed",
        "noframes",
        "plaintext",
    ];
    RAW.iter().any(|raw| tag.eq_ignore_ascii_case(raw))
}

/// Escape text content.
pub fn write_escaped_text(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Escape an attribute value for use inside double quotes.
pub fn write_escaped_attr(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Write `<tag name="value" ...>`.
pub fn write_start_tag<'a>(
    out: &mut String,
    tag: &str,
    attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        write_escaped_attr(out, value);
        out.push('"');
    }
    out.push('>');
}

pub fn write_end_tag(out: &mut String, tag: &str) {
    let _ = write!(out, "</{tag}>");
}

pub fn write_comment(out: &mut String, text: &str) {
    let _ = write!(out, "<!--{text}-->");
}

pub fn write_processing_instruction(out: &mut String, target: &str, inst: &str) {
    if inst.is_empty() {
        let _ = write!(out, "<?{target}?>");
    } else {
        let _ = write!(out, "<?{target} {inst}?>");
    }
}

pub fn write_directive(out: &mut String, text: &str) {
    let _ = write!(out, "<!{text}>");
}

/// Write a text node, escaping it unless its parent is a raw text element.
pub fn write_text(out: &mut String, text: &str, parent_tag: Option<&str>) {
    if parent_tag.is_some_and(is_raw_text_element) {
        out.push_str(text);
    } else {
        write_escaped_text(out, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_void_elements_ignore_case() {
        assert!(is_void_element("br"));
        assert!(is_void_element("INPUT"));
        assert!(!is_void_element("div"));
    }

    #[test]
    fn test_start_tag_escapes_values() {
        let mut out = String::new();
        write_start_tag(&mut out, "a", [("title", "\"x\" & <y>")]);
        assert_eq!(out, r#"<a title="&quot;x&quot; &amp; &lt;y&gt;">"#);
    }

    #[test]
    fn test_raw_text_is_not_escaped() {
        let mut out = String::new();
        write_text(&mut out, "a < b", Some("script"));
        write_text(&mut out, "a < b", Some("p"));
        write_text(&mut out, "&", None);
        assert_eq!(out, "a < ba &lt; b&amp;");
    }

    #[test]
    fn test_processing_instruction_without_body() {
        let mut out = String::new();
        write_processing_instruction(&mut out, "php", "");
        write_processing_instruction(&mut out, "xml", "version=\"1.0\"");
        assert_eq!(out, "<?php?><?xml version=\"1.0\"?>");
    }
}
