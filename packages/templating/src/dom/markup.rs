//! Template Markup Parser
//!
//! Single-pass tokenizer that builds nodes straight into a `Document`.
//! Tag and attribute names are lower-cased, character references are
//! decoded, void elements never take children and unclosed elements are
//! closed implicitly at end of input.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::serialize::VOID_ELEMENTS;
use super::{Document, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseLocation {
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for ParseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{msg} at {location}")]
pub struct ParseError {
    pub msg: String,
    pub location: ParseLocation,
}

impl ParseError {
    pub fn new(msg: impl Into<String>, location: ParseLocation) -> Self {
        ParseError {
            msg: msg.into(),
            location,
        }
    }
}

struct Cursor {
    chars: Vec<char>,
    index: usize,
    line: usize,
    col: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Cursor {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
        }
    }

    fn location(&self) -> ParseLocation {
        ParseLocation {
            offset: self.index,
            line: self.line,
            col: self.col,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn starts_with_ignore_case(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| {
            self.peek_at(i)
                .map(|p| p.eq_ignore_ascii_case(&c))
                .unwrap_or(false)
        })
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.advance();
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    /// Read up to (not including) `terminator`; `None` when input ends first
    fn read_until(&mut self, terminator: &str) -> Option<String> {
        let mut out = String::new();
        while !self.eof() {
            if self.starts_with(terminator) {
                return Some(out);
            }
            if let Some(c) = self.advance() {
                out.push(c);
            }
        }
        None
    }
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '>' | '/' | '=' | '<' | '"' | '\'')
}

struct TreeBuilder<'a> {
    document: &'a Document,
    cursor: Cursor,
    root: NodeId,
    open: Vec<(String, NodeId)>,
}

impl<'a> TreeBuilder<'a> {
    fn current_parent(&self) -> NodeId {
        self.open.last().map(|(_, node)| *node).unwrap_or(self.root)
    }

    fn build(mut self) -> Result<NodeId, ParseError> {
        while !self.cursor.eof() {
            if self.cursor.starts_with("<!--") {
                self.consume_comment()?;
            } else if self.cursor.starts_with("</") {
                self.consume_end_tag()?;
            } else if self.cursor.starts_with("<!") || self.cursor.starts_with("<?") {
                // doctype and processing instructions carry nothing for templates
                let start = self.cursor.location();
                if self.cursor.read_until(">").is_none() {
                    return Err(ParseError::new("Unterminated declaration", start));
                }
                self.cursor.advance();
            } else if self.cursor.peek() == Some('<')
                && self
                    .cursor
                    .peek_at(1)
                    .map(|c| c.is_ascii_alphabetic())
                    .unwrap_or(false)
            {
                self.consume_start_tag()?;
            } else {
                self.consume_text();
            }
        }
        Ok(self.root)
    }

    fn consume_comment(&mut self) -> Result<(), ParseError> {
        let start = self.cursor.location();
        self.cursor.advance_by(4);
        let text = self
            .cursor
            .read_until("-->")
            .ok_or_else(|| ParseError::new("Unterminated comment", start))?;
        self.cursor.advance_by(3);
        let comment = self.document.create_comment(&text);
        self.document.append_child(self.current_parent(), comment);
        Ok(())
    }

    fn consume_end_tag(&mut self) -> Result<(), ParseError> {
        let start = self.cursor.location();
        self.cursor.advance_by(2);
        let name = self.cursor.read_while(is_name_char).to_ascii_lowercase();
        self.cursor.skip_whitespace();
        if self.cursor.peek() != Some('>') {
            return Err(ParseError::new(
                format!("Unterminated closing tag \"{}\"", name),
                start,
            ));
        }
        self.cursor.advance();

        match self.open.iter().rposition(|(tag, _)| *tag == name) {
            Some(index) => {
                self.open.truncate(index);
                Ok(())
            }
            None => Err(ParseError::new(
                format!("Unexpected closing tag \"{}\"", name),
                start,
            )),
        }
    }

    fn consume_start_tag(&mut self) -> Result<(), ParseError> {
        let start = self.cursor.location();
        self.cursor.advance();
        let name = self.cursor.read_while(is_name_char).to_ascii_lowercase();
        let element = self.document.create_element(&name);
        let mut self_closing = false;

        loop {
            self.cursor.skip_whitespace();
            match self.cursor.peek() {
                None => {
                    return Err(ParseError::new(
                        format!("Unterminated start tag \"{}\"", name),
                        start,
                    ))
                }
                Some('>') => {
                    self.cursor.advance();
                    break;
                }
                Some('/') if self.cursor.peek_at(1) == Some('>') => {
                    self.cursor.advance_by(2);
                    self_closing = true;
                    break;
                }
                Some('/') => {
                    self.cursor.advance();
                }
                Some(_) => self.consume_attribute(element)?,
            }
        }

        self.document.append_child(self.current_parent(), element);

        if VOID_ELEMENTS.contains(&name.as_str()) || self_closing {
            return Ok(());
        }
        if name == "script" || name == "style" {
            return self.consume_raw_text(&name, element, start);
        }
        self.open.push((name, element));
        Ok(())
    }

    fn consume_attribute(&mut self, element: NodeId) -> Result<(), ParseError> {
        let start = self.cursor.location();
        let name = self.cursor.read_while(is_name_char).to_ascii_lowercase();
        if name.is_empty() {
            // stray quote or equals sign; skip it
            self.cursor.advance();
            return Ok(());
        }

        self.cursor.skip_whitespace();
        let mut value = String::new();
        if self.cursor.peek() == Some('=') {
            self.cursor.advance();
            self.cursor.skip_whitespace();
            match self.cursor.peek() {
                Some(quote @ ('"' | '\'')) => {
                    self.cursor.advance();
                    let raw = self.cursor.read_until(&quote.to_string()).ok_or_else(|| {
                        ParseError::new(format!("Unterminated value for \"{}\"", name), start)
                    })?;
                    self.cursor.advance();
                    value = decode_entities(&raw);
                }
                _ => {
                    let raw = self
                        .cursor
                        .read_while(|c| !c.is_whitespace() && c != '>');
                    value = decode_entities(&raw);
                }
            }
        }

        if !self.document.has_attribute(element, &name) {
            self.document.set_attribute(element, &name, &value);
        }
        Ok(())
    }

    fn consume_raw_text(
        &mut self,
        name: &str,
        element: NodeId,
        start: ParseLocation,
    ) -> Result<(), ParseError> {
        let close = format!("</{}", name);
        let mut text = String::new();
        while !self.cursor.starts_with_ignore_case(&close) {
            match self.cursor.advance() {
                Some(c) => text.push(c),
                None => {
                    return Err(ParseError::new(
                        format!("Unterminated <{}> element", name),
                        start,
                    ))
                }
            }
        }
        if !text.is_empty() {
            let node = self.document.create_text(&text);
            self.document.append_child(element, node);
        }
        if self.cursor.read_until(">").is_none() {
            return Err(ParseError::new(
                format!("Unterminated closing tag \"{}\"", name),
                start,
            ));
        }
        self.cursor.advance();
        Ok(())
    }

    fn consume_text(&mut self) {
        let mut raw = String::new();
        // a lone '<' that opens nothing is text
        if let Some(c) = self.cursor.advance() {
            raw.push(c);
        }
        while let Some(c) = self.cursor.peek() {
            if c == '<' {
                break;
            }
            raw.push(c);
            self.cursor.advance();
        }

        let text = decode_entities(&raw);
        let parent = self.current_parent();
        match self.document.last_child(parent) {
            Some(last) if self.document.node_type(last) == super::NodeType::Text => {
                let merged = format!("{}{}", self.document.text(last).unwrap_or_default(), text);
                self.document.set_text(last, &merged);
            }
            _ => {
                let node = self.document.create_text(&text);
                self.document.append_child(parent, node);
            }
        }
    }
}

/// Decode HTML character references
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|end| *end <= 10) {
            Some(end) => {
                let entity = &tail[1..end];
                match decode_entity(entity) {
                    Some(c) => {
                        out.push(c);
                        rest = &tail[end + 1..];
                    }
                    None => {
                        out.push('&');
                        rest = &tail[1..];
                    }
                }
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

impl Document {
    /// Parse markup into a new detached fragment
    pub fn parse_fragment(&self, source: &str) -> Result<NodeId, ParseError> {
        let root = self.create_fragment();
        TreeBuilder {
            document: self,
            cursor: Cursor::new(source),
            root,
            open: Vec::new(),
        }
        .build()
    }
}
