use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity of a node within its [`Document`](crate::dom::Document) arena.
///
/// Ids are assigned once from a per-document counter and never reused, so they
/// are safe to use as hash keys and to reference from the undo log.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of element names the editor manipulates.
///
/// Anything outside this set parses as `Other` and is treated as inline
/// content. The name is kept in canonical lowercase form.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Tag {
    Html,
    Body,
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Pre,
    Blockquote,
    Ul,
    Ol,
    Li,
    Table,
    Caption,
    Colgroup,
    Col,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Td,
    Th,
    Figure,
    Figcaption,
    Nav,
    Span,
    A,
    B,
    I,
    U,
    Em,
    Strong,
    Code,
    Sub,
    Sup,
    Small,
    S,
    Q,
    Cite,
    Dfn,
    Kbd,
    Samp,
    Var,
    Abbr,
    Img,
    Br,
    Other(String),
}

impl Tag {
    pub fn from_name(name: &str) -> Tag {
        match name.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "body" => Tag::Body,
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "pre" => Tag::Pre,
            "blockquote" => Tag::Blockquote,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "caption" => Tag::Caption,
            "colgroup" => Tag::Colgroup,
            "col" => Tag::Col,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "figure" => Tag::Figure,
            "figcaption" => Tag::Figcaption,
            "nav" => Tag::Nav,
            "span" => Tag::Span,
            "a" => Tag::A,
            "b" => Tag::B,
            "i" => Tag::I,
            "u" => Tag::U,
            "em" => Tag::Em,
            "strong" => Tag::Strong,
            "code" => Tag::Code,
            "sub" => Tag::Sub,
            "sup" => Tag::Sup,
            "small" => Tag::Small,
            "s" => Tag::S,
            "q" => Tag::Q,
            "cite" => Tag::Cite,
            "dfn" => Tag::Dfn,
            "kbd" => Tag::Kbd,
            "samp" => Tag::Samp,
            "var" => Tag::Var,
            "abbr" => Tag::Abbr,
            "img" => Tag::Img,
            "br" => Tag::Br,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Html => "html",
            Tag::Body => "body",
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Pre => "pre",
            Tag::Blockquote => "blockquote",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Caption => "caption",
            Tag::Colgroup => "colgroup",
            Tag::Col => "col",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tfoot => "tfoot",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Figure => "figure",
            Tag::Figcaption => "figcaption",
            Tag::Nav => "nav",
            Tag::Span => "span",
            Tag::A => "a",
            Tag::B => "b",
            Tag::I => "i",
            Tag::U => "u",
            Tag::Em => "em",
            Tag::Strong => "strong",
            Tag::Code => "code",
            Tag::Sub => "sub",
            Tag::Sup => "sup",
            Tag::Small => "small",
            Tag::S => "s",
            Tag::Q => "q",
            Tag::Cite => "cite",
            Tag::Dfn => "dfn",
            Tag::Kbd => "kbd",
            Tag::Samp => "samp",
            Tag::Var => "var",
            Tag::Abbr => "abbr",
            Tag::Img => "img",
            Tag::Br => "br",
            Tag::Other(name) => name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Tag::Html
            | Tag::Body
            | Tag::Ul
            | Tag::Ol
            | Tag::Li
            | Tag::Table
            | Tag::Caption
            | Tag::Colgroup
            | Tag::Col
            | Tag::Thead
            | Tag::Tbody
            | Tag::Tfoot
            | Tag::Tr
            | Tag::Td
            | Tag::Th
            | Tag::Figure
            | Tag::Figcaption
            | Tag::Nav => NodeKind::Container,
            Tag::P | Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6 | Tag::Pre
            | Tag::Blockquote => NodeKind::Paragraph,
            _ => NodeKind::Inline,
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Tag::Ul | Tag::Ol)
    }

    pub fn is_table_cell(&self) -> bool {
        matches!(self, Tag::Td | Tag::Th)
    }

    /// Containers whose empty interior is still a legitimate cursor stop.
    pub fn allows_direct_children(&self) -> bool {
        matches!(
            self,
            Tag::Body
                | Tag::Li
                | Tag::Caption
                | Tag::Th
                | Tag::Td
                | Tag::Figure
                | Tag::Figcaption
                | Tag::Nav
        )
    }

    /// Elements that never have a closing tag when serialized.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Br | Tag::Img | Tag::Col)
    }
}

/// Broad structural classification used by the hierarchy grammar
/// `container* paragraph? inline?`.
///
/// Text and comment nodes are always `Inline`. Opacity and special-block
/// status are predicates on [`Document`](crate::dom::Document) rather than
/// kinds, because they depend on attributes and ancestry.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeKind {
    Container,
    Paragraph,
    Inline,
}

/// The payload that distinguishes element, text and comment nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeData {
    Element {
        tag: Tag,
        /// Ordinary attributes, keyed by lowercase name. The `style`
        /// attribute is held separately in `style` so individual properties
        /// can be mutated and undone without re-parsing CSS text.
        attrs: BTreeMap<String, String>,
        style: BTreeMap<String, String>,
    },
    Text {
        value: String,
    },
    Comment {
        value: String,
    },
}

/// A single node in the document arena.
///
/// Tree links form an intrusive doubly-linked child list; all structural
/// mutation goes through the primitives on `Document`.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub(crate) fn new(id: NodeId, data: NodeData) -> Node {
        Node {
            id,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            data,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text { .. })
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.data, NodeData::Comment { .. })
    }

    pub fn tag(&self) -> Option<&Tag> {
        match &self.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match &self.data {
            NodeData::Element { tag, .. } => tag.kind(),
            NodeData::Text { .. } | NodeData::Comment { .. } => NodeKind::Inline,
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text { value } => Some(value),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.data {
            NodeData::Element { attrs, .. } => attrs.get(name).map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, String>> {
        match &self.data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn style(&self) -> Option<&BTreeMap<String, String>> {
        match &self.data {
            NodeData::Element { style, .. } => Some(style),
            _ => None,
        }
    }

    pub fn style_property(&self, name: &str) -> Option<&str> {
        self.style().and_then(|s| s.get(name)).map(|s| s.as_str())
    }
}

/// True for strings that render as collapsible whitespace. Follows the HTML
/// notion of whitespace, which includes the no-break space.
pub fn is_whitespace_string(s: &str) -> bool {
    s.chars().all(|c| c.is_whitespace())
}
