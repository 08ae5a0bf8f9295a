//! Hand-written parser for template markup.
//!
//! The dialect is XML-like: tags must balance, closing tags must match, and
//! no HTML5 recovery is attempted. Comments are parsed and discarded.

use crate::ast::{Attr, Element, Node, TextNode};
use crate::error::{TemplateError, TemplateResult};
use crate::span::Span;
use indexmap::IndexMap;
use smol_str::SmolStr;

/// Parse template markup into a list of top-level nodes.
pub fn parse_document(source: &str) -> TemplateResult<Vec<Node>> {
    let mut parser = MarkupParser::new(source);
    let nodes = parser.parse_children(None)?;
    if !parser.is_eof() {
        // Only an unmatched closing tag can stop parse_children early.
        return Err(TemplateError::parse(
            "Unexpected closing tag",
            Span::new(parser.pos as u32, source.len() as u32),
        ));
    }
    Ok(nodes)
}

/// Cursor-based markup parser.
struct MarkupParser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> MarkupParser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    /// Get remaining source.
    fn remaining(&self) -> &'a str {
        &self.source[self.pos..]
    }

    /// Check if at end.
    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Peek at next char.
    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Consume next char.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Check if remaining starts with string.
    fn starts_with(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    /// Consume string if it matches.
    fn consume(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Skip whitespace.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read until predicate is false.
    fn read_while<F: Fn(char) -> bool>(&mut self, pred: F) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if pred(c) {
                self.advance();
            } else {
                break;
            }
        }
        &self.source[start..self.pos]
    }

    /// Read until string is found.
    fn read_until(&mut self, s: &str) -> &'a str {
        let start = self.pos;
        while !self.is_eof() && !self.starts_with(s) {
            self.advance();
        }
        &self.source[start..self.pos]
    }

    /// Parse children until the matching end tag (or EOF at top level).
    fn parse_children(&mut self, end_tag: Option<&str>) -> TemplateResult<Vec<Node>> {
        let mut children = Vec::new();

        loop {
            if self.is_eof() {
                if let Some(tag) = end_tag {
                    return Err(TemplateError::parse(
                        format!("Unclosed element <{}>", tag),
                        Span::empty(self.pos as u32),
                    ));
                }
                break;
            }

            if self.starts_with("</") {
                // With no open element this bubbles up as a parse error.
                break;
            }

            if self.starts_with("<!--") {
                self.consume("<!--");
                self.read_until("-->");
                if !self.consume("-->") {
                    return Err(TemplateError::parse(
                        "Unterminated comment",
                        Span::empty(self.pos as u32),
                    ));
                }
                continue;
            }

            if self.starts_with("<") {
                children.push(Node::Element(self.parse_element()?));
            } else {
                children.push(Node::Text(self.parse_text()));
            }
        }

        Ok(children)
    }

    /// Parse a text node.
    fn parse_text(&mut self) -> TextNode {
        let start = self.pos;
        let content = self.read_until("<").to_string();
        TextNode {
            content,
            span: Span::new(start as u32, self.pos as u32),
        }
    }

    /// Parse an element.
    fn parse_element(&mut self) -> TemplateResult<Element> {
        let start = self.pos;
        self.consume("<");

        let tag_start = self.pos;
        let tag = self
            .read_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
            .to_string();
        let tag_span = Span::new(tag_start as u32, self.pos as u32);

        if tag.is_empty() {
            return Err(TemplateError::parse(
                "Expected tag name",
                Span::new(start as u32, self.pos as u32),
            ));
        }

        let attrs = self.parse_attributes()?;

        self.skip_whitespace();
        let self_closing = self.consume("/>");
        if !self_closing && !self.consume(">") {
            return Err(TemplateError::parse(
                format!("Malformed tag <{}>", tag),
                Span::new(start as u32, self.pos as u32),
            ));
        }

        let children = if self_closing || is_void_element(&tag) {
            Vec::new()
        } else {
            let children = self.parse_children(Some(&tag))?;
            self.expect_closing_tag(&tag)?;
            children
        };

        Ok(Element {
            tag: SmolStr::from(tag),
            attrs,
            children,
            span: Span::new(start as u32, self.pos as u32),
            tag_span,
        })
    }

    /// Consume `</tag>`, failing on a mismatch.
    fn expect_closing_tag(&mut self, tag: &str) -> TemplateResult<()> {
        let start = self.pos;
        if !self.consume("</") {
            return Err(TemplateError::parse(
                format!("Unclosed element <{}>", tag),
                Span::empty(self.pos as u32),
            ));
        }
        self.skip_whitespace();
        let found = self
            .read_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
            .to_string();
        self.skip_whitespace();
        if found != tag || !self.consume(">") {
            return Err(TemplateError::parse(
                format!("Expected </{}>, found </{}>", tag, found),
                Span::new(start as u32, self.pos as u32),
            ));
        }
        Ok(())
    }

    /// Parse the attribute list of an open tag.
    fn parse_attributes(&mut self) -> TemplateResult<IndexMap<SmolStr, Attr>> {
        let mut attrs = IndexMap::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }

            let attr_start = self.pos;
            let name = self
                .read_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
                .to_string();

            if name.is_empty() {
                return Err(TemplateError::parse(
                    "Expected attribute name",
                    Span::empty(self.pos as u32),
                ));
            }

            self.skip_whitespace();
            let value = if self.consume("=") {
                self.skip_whitespace();
                self.parse_attribute_value()?
            } else {
                String::new()
            };

            attrs.insert(
                SmolStr::from(name),
                Attr {
                    value,
                    span: Span::new(attr_start as u32, self.pos as u32),
                },
            );
        }

        Ok(attrs)
    }

    /// Parse a quoted or bare attribute value.
    fn parse_attribute_value(&mut self) -> TemplateResult<String> {
        if let Some(quote @ ('"' | '\'')) = self.peek() {
            let open = self.pos;
            self.advance();
            let mut value = String::new();
            loop {
                match self.advance() {
                    Some(c) if c == quote => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(TemplateError::parse(
                            "Unterminated attribute value",
                            Span::new(open as u32, self.pos as u32),
                        ));
                    }
                }
            }
            Ok(value)
        } else {
            Ok(self
                .read_while(|c| !c.is_whitespace() && c != '>' && c != '/')
                .to_string())
        }
    }
}

/// Check if an element is a void element (never has children).
fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_element() {
        let nodes = parse_document("<div>Hello</div>").unwrap();
        assert_eq!(nodes.len(), 1);
        let el = nodes[0].as_element().unwrap();
        assert_eq!(el.tag.as_str(), "div");
        assert_eq!(el.children.len(), 1);
    }

    #[test]
    fn test_parse_attributes() {
        let nodes =
            parse_document(r#"<span class="big" if="ready" else>x</span>"#).unwrap();
        let el = nodes[0].as_element().unwrap();
        assert_eq!(el.attr("class"), Some("big"));
        assert_eq!(el.attr("if"), Some("ready"));
        assert_eq!(el.attr("else"), Some(""));
    }

    #[test]
    fn test_parse_self_closing_and_void() {
        let nodes = parse_document("<div><input type='text'><br/></div>").unwrap();
        let el = nodes[0].as_element().unwrap();
        assert_eq!(el.children.len(), 2);
    }

    #[test]
    fn test_parse_comment_discarded() {
        let nodes = parse_document("<div><!-- note --><p>a</p></div>").unwrap();
        let el = nodes[0].as_element().unwrap();
        assert_eq!(el.children.len(), 1);
    }

    #[test]
    fn test_parse_mismatched_close_fails() {
        let err = parse_document("<div><p>a</div></p>").unwrap_err();
        assert_eq!(err.code, crate::TemplateErrorCode::Parse);
    }

    #[test]
    fn test_parse_unclosed_fails() {
        assert!(parse_document("<div><p>a").is_err());
    }

    #[test]
    fn test_parse_bare_text_document() {
        let nodes = parse_document("just text").unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0], Node::Text(_)));
    }

    #[test]
    fn test_parse_multiple_roots() {
        let nodes = parse_document("<a>1</a><b>2</b>").unwrap();
        assert_eq!(nodes.len(), 2);
    }
}
