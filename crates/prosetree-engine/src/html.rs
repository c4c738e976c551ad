//! HTML loading and serialization.
//!
//! The parser here is deliberately small: it handles the element/attribute/
//! text/comment subset the editor manipulates, which is all that fixtures
//! and clipboard fragments need. It builds nodes directly into a document's
//! arena (detached, for fragments) without touching the undo log. The
//! serializer is deterministic — attributes sorted by name, styles in
//! property order — so tests can compare documents as strings.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::dom::{Document, NodeData, NodeId, Tag};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unterminated tag at offset {0}")]
    UnterminatedTag(usize),
    #[error("unterminated comment at offset {0}")]
    UnterminatedComment(usize),
    #[error("malformed tag name at offset {0}")]
    BadTagName(usize),
}

/// Parse a complete document: the fragment becomes the body's content.
pub fn parse_document(html: &str) -> anyhow::Result<Document> {
    let mut doc = Document::new();
    let roots = parse_fragment(&mut doc, html).context("failed to parse document body")?;
    let body = doc.body();
    for root in roots {
        doc.attach(body, root, None);
    }
    Ok(doc)
}

/// Parse a fragment into detached nodes in `doc`'s arena. The returned
/// nodes have no parent; callers attach or paste them.
pub fn parse_fragment(doc: &mut Document, html: &str) -> Result<Vec<NodeId>, ParseError> {
    let chars: Vec<char> = html.chars().collect();
    let mut pos = 0;
    let mut roots: Vec<NodeId> = Vec::new();
    let mut stack: Vec<(Tag, NodeId)> = Vec::new();

    fn place(
        doc: &mut Document,
        stack: &[(Tag, NodeId)],
        roots: &mut Vec<NodeId>,
        node: NodeId,
    ) {
        match stack.last() {
            Some((_, parent)) => doc.attach(*parent, node, None),
            None => roots.push(node),
        }
    }

    while pos < chars.len() {
        if chars[pos] == '<' {
            if starts_with(&chars, pos, "<!--") {
                let end = find(&chars, pos + 4, "-->")
                    .ok_or(ParseError::UnterminatedComment(pos))?;
                let value: String = chars[pos + 4..end].iter().collect();
                let node = doc.create_comment(&value);
                place(doc, &stack, &mut roots, node);
                pos = end + 3;
            } else if starts_with(&chars, pos, "<!") {
                // Doctype or similar: skip.
                let end = find(&chars, pos, ">").ok_or(ParseError::UnterminatedTag(pos))?;
                pos = end + 1;
            } else if starts_with(&chars, pos, "</") {
                let end = find(&chars, pos, ">").ok_or(ParseError::UnterminatedTag(pos))?;
                let name: String = chars[pos + 2..end]
                    .iter()
                    .collect::<String>()
                    .trim()
                    .to_string();
                let tag = Tag::from_name(&name);
                // Pop to the matching open tag; a stray close tag is ignored.
                if let Some(index) = stack.iter().rposition(|(t, _)| *t == tag) {
                    stack.truncate(index);
                }
                pos = end + 1;
            } else {
                let (node, tag, self_closing, next) = parse_open_tag(doc, &chars, pos)?;
                place(doc, &stack, &mut roots, node);
                if !self_closing && !tag.is_void() {
                    stack.push((tag, node));
                }
                pos = next;
            }
        } else {
            let end = chars[pos..]
                .iter()
                .position(|c| *c == '<')
                .map(|i| pos + i)
                .unwrap_or(chars.len());
            let raw: String = chars[pos..end].iter().collect();
            let node = doc.create_text(&decode_entities(&raw));
            place(doc, &stack, &mut roots, node);
            pos = end;
        }
    }

    Ok(roots)
}

fn starts_with(chars: &[char], pos: usize, needle: &str) -> bool {
    needle
        .chars()
        .enumerate()
        .all(|(i, c)| chars.get(pos + i) == Some(&c))
}

fn find(chars: &[char], from: usize, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    (from..chars.len()).find(|&i| {
        needle
            .iter()
            .enumerate()
            .all(|(j, c)| chars.get(i + j) == Some(c))
    })
}

fn parse_open_tag(
    doc: &mut Document,
    chars: &[char],
    start: usize,
) -> Result<(NodeId, Tag, bool, usize), ParseError> {
    let mut pos = start + 1;
    let name_start = pos;
    while pos < chars.len() && (chars[pos].is_ascii_alphanumeric()) {
        pos += 1;
    }
    if pos == name_start {
        return Err(ParseError::BadTagName(start));
    }
    let name: String = chars[name_start..pos].iter().collect();
    let tag = Tag::from_name(&name);

    let mut attrs: BTreeMap<String, String> = BTreeMap::new();
    let mut self_closing = false;
    loop {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
        match chars.get(pos) {
            None => return Err(ParseError::UnterminatedTag(start)),
            Some('>') => {
                pos += 1;
                break;
            }
            Some('/') => {
                self_closing = true;
                pos += 1;
            }
            Some(_) => {
                let attr_start = pos;
                while pos < chars.len()
                    && !chars[pos].is_whitespace()
                    && !matches!(chars[pos], '=' | '>' | '/')
                {
                    pos += 1;
                }
                let attr_name: String = chars[attr_start..pos]
                    .iter()
                    .collect::<String>()
                    .to_ascii_lowercase();
                let mut value = String::new();
                while pos < chars.len() && chars[pos].is_whitespace() {
                    pos += 1;
                }
                if chars.get(pos) == Some(&'=') {
                    pos += 1;
                    while pos < chars.len() && chars[pos].is_whitespace() {
                        pos += 1;
                    }
                    match chars.get(pos) {
                        Some(q @ ('"' | '\'')) => {
                            let quote = *q;
                            pos += 1;
                            let value_start = pos;
                            while pos < chars.len() && chars[pos] != quote {
                                pos += 1;
                            }
                            if pos >= chars.len() {
                                return Err(ParseError::UnterminatedTag(start));
                            }
                            value = chars[value_start..pos].iter().collect();
                            pos += 1;
                        }
                        _ => {
                            let value_start = pos;
                            while pos < chars.len()
                                && !chars[pos].is_whitespace()
                                && !matches!(chars[pos], '>' | '/')
                            {
                                pos += 1;
                            }
                            value = chars[value_start..pos].iter().collect();
                        }
                    }
                }
                if !attr_name.is_empty() {
                    attrs.insert(attr_name, decode_entities(&value));
                }
            }
        }
    }

    let node = doc.create_element(tag.clone());
    let style_attr = attrs.remove("style");
    if let NodeData::Element {
        attrs: node_attrs,
        style,
        ..
    } = &mut doc.node_mut(node).data
    {
        *node_attrs = attrs;
        if let Some(style_attr) = style_attr {
            *style = parse_style_attribute(&style_attr);
        }
    }
    Ok((node, tag, self_closing, pos))
}

fn parse_style_attribute(value: &str) -> BTreeMap<String, String> {
    let mut style = BTreeMap::new();
    for declaration in value.split(';') {
        if let Some((name, val)) = declaration.split_once(':') {
            let name = name.trim();
            let val = val.trim();
            if !name.is_empty() && !val.is_empty() {
                style.insert(name.to_string(), val.to_string());
            }
        }
    }
    style
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut result = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '&' {
            if let Some(end) = chars[i..].iter().position(|c| *c == ';') {
                let entity: String = chars[i + 1..i + end].iter().collect();
                let decoded = match entity.as_str() {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "ldquo" => Some('\u{201c}'),
                    "rdquo" => Some('\u{201d}'),
                    _ => {
                        if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                        } else if let Some(dec) = entity.strip_prefix('#') {
                            dec.parse::<u32>().ok().and_then(char::from_u32)
                        } else {
                            None
                        }
                    }
                };
                if let Some(c) = decoded {
                    result.push(c);
                    i += end + 1;
                    continue;
                }
            }
        }
        result.push(chars[i]);
        i += 1;
    }
    result
}

/// Serialize the whole document, `<html>` element included.
pub fn serialize_document(doc: &Document) -> String {
    serialize_subtree(doc, doc.root())
}

/// Serialize one subtree to HTML. Attributes appear in name order and the
/// `style` attribute is reconstructed from the style map, so equal trees
/// produce equal strings.
pub fn serialize_subtree(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    serialize_node(doc, node, &mut out);
    out
}

fn serialize_node(doc: &Document, node: NodeId, out: &mut String) {
    match &doc.node(node).data {
        NodeData::Text { value } => {
            out.push_str(&html_escape::encode_text(value));
        }
        NodeData::Comment { value } => {
            out.push_str("<!--");
            out.push_str(value);
            out.push_str("-->");
        }
        NodeData::Element { tag, attrs, style } => {
            out.push('<');
            out.push_str(tag.name());

            let mut all: BTreeMap<&str, String> = attrs
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone()))
                .collect();
            if !style.is_empty() {
                let rendered = style
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                all.insert("style", rendered);
            }
            for (name, value) in &all {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            out.push('>');

            if tag.is_void() {
                return;
            }
            let mut child = doc.first_child(node);
            while let Some(c) = child {
                serialize_node(doc, c, out);
                child = doc.next_sibling(c);
            }
            out.push_str("</");
            out.push_str(tag.name());
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(html: &str) -> String {
        let doc = parse_document(html).unwrap();
        let body = serialize_subtree(&doc, doc.body());
        body.strip_prefix("<body>")
            .and_then(|s| s.strip_suffix("</body>"))
            .expect("body wrapper")
            .to_string()
    }

    #[test]
    fn test_round_trip_simple_paragraph() {
        assert_eq!(round_trip("<p>hello</p>"), "<p>hello</p>");
    }

    #[test]
    fn test_round_trip_nested_inline() {
        assert_eq!(
            round_trip("<p>a<b>b<i>c</i></b>d</p>"),
            "<p>a<b>b<i>c</i></b>d</p>"
        );
    }

    #[test]
    fn test_attributes_sorted_and_escaped() {
        assert_eq!(
            round_trip("<p id=\"x\" class=\"y\">a &amp; b</p>"),
            "<p class=\"y\" id=\"x\">a &amp; b</p>"
        );
    }

    #[test]
    fn test_style_attribute_parsed_into_properties() {
        let doc = parse_document("<p style=\"color: red; margin-left: 4px\">x</p>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        assert_eq!(doc.node(p).style_property("color"), Some("red"));
        assert_eq!(doc.node(p).style_property("margin-left"), Some("4px"));
        assert_eq!(
            serialize_subtree(&doc, p),
            "<p style=\"color: red; margin-left: 4px\">x</p>"
        );
    }

    #[test]
    fn test_void_elements() {
        assert_eq!(round_trip("<p>a<br>b</p>"), "<p>a<br>b</p>");
        assert_eq!(
            round_trip("<figure><img src=\"i.png\"></figure>"),
            "<figure><img src=\"i.png\"></figure>"
        );
    }

    #[test]
    fn test_entities_decoded() {
        let doc = parse_document("<p>a&nbsp;&lt;tag&gt; &#65;</p>").unwrap();
        let text = doc.find_text("a").unwrap();
        assert_eq!(doc.node_text(text), "a\u{a0}<tag> A");
    }

    #[test]
    fn test_comments_preserved() {
        assert_eq!(round_trip("<p>a<!-- note -->b</p>"), "<p>a<!-- note -->b</p>");
    }

    #[test]
    fn test_table_structure_parses() {
        let html = "<table><caption>t</caption><col width=\"50%\"><col width=\"50%\">\
                    <tbody><tr><td>a</td><td>b</td></tr></tbody></table>";
        let doc = parse_document(html).unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        assert_eq!(doc.children(table).len(), 4);
    }

    #[test]
    fn test_fragment_returns_detached_roots() {
        let mut doc = parse_document("<p>existing</p>").unwrap();
        let roots = parse_fragment(&mut doc, "<p>one</p>two").unwrap();
        assert_eq!(roots.len(), 2);
        for root in &roots {
            assert!(doc.parent(*root).is_none());
        }
    }

    #[test]
    fn test_unterminated_tag_is_error() {
        let mut doc = Document::new();
        assert!(parse_fragment(&mut doc, "<p class=\"x").is_err());
    }

    #[test]
    fn test_insta_snapshot_of_normalized_document() {
        let doc = parse_document(
            "<h1 id=\"t\">Title</h1><p>Body <b>text</b></p>\
             <ul><li><p>item</p></li></ul>",
        )
        .unwrap();
        insta::assert_snapshot!(
            serialize_subtree(&doc, doc.body()),
            @r#"<body><h1 id="t">Title</h1><p>Body <b>text</b></p><ul><li><p>item</p></li></ul></body>"#
        );
    }
}
