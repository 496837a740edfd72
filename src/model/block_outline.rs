//! Brace-block model for build scripts.
//!
//! Recognizes comments, strings, numbers and a fixed keyword set for
//! styling, and nested `name { ... }` blocks for the outline. Unbalanced
//! braces and unterminated strings are parse failures.

use std::ops::Range;
use std::sync::Arc;

use crate::document::{EditEvent, TextSupplier};
use crate::error::ModelError;
use crate::pipeline::SyntaxModel;

const KEYWORDS: &[&str] = &[
    "apply",
    "def",
    "dependencies",
    "else",
    "ext",
    "false",
    "if",
    "import",
    "new",
    "null",
    "plugins",
    "repositories",
    "return",
    "task",
    "true",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    String,
    Number,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpan {
    pub range: Range<usize>,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub name: String,
    pub range: Range<usize>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    /// Innermost node containing `offset`, searching `nodes` recursively.
    pub fn find_at(nodes: &[OutlineNode], offset: usize) -> Option<&OutlineNode> {
        let node = nodes.iter().find(|node| node.range.contains(&offset))?;
        Self::find_at(&node.children, offset).or(Some(node))
    }
}

#[derive(Debug, Clone)]
pub struct BlockOutlineModel {
    text: Arc<str>,
    styling: Arc<[StyleSpan]>,
    outline: Arc<[OutlineNode]>,
    version: u64,
}

impl BlockOutlineModel {
    /// Build a model from scratch.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let (styling, outline) = scan(text)?;
        Ok(Self {
            text: Arc::from(text),
            styling: styling.into(),
            outline: outline.into(),
            version: 0,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of successful updates since the initial parse.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn spans(&self) -> &[StyleSpan] {
        &self.styling
    }

    pub fn blocks(&self) -> &[OutlineNode] {
        &self.outline
    }
}

impl SyntaxModel for BlockOutlineModel {
    type Styling = Arc<[StyleSpan]>;
    type Outline = Arc<[OutlineNode]>;

    fn update_model(
        &self,
        events: &[Arc<EditEvent>],
        text: &dyn TextSupplier,
    ) -> Result<Self, ModelError> {
        let mut replayed = self.text.to_string();
        for event in events {
            event.apply_to(&mut replayed).map_err(|err| {
                ModelError::rejected(format!("edit #{} does not apply: {}", event.seq(), err))
            })?;
        }
        if replayed != text.full_text() {
            return Err(ModelError::rejected(
                "edit stream diverged from the document text",
            ));
        }

        let (styling, outline) = scan(&replayed)?;
        Ok(Self {
            text: Arc::from(replayed),
            styling: styling.into(),
            outline: outline.into(),
            version: self.version + 1,
        })
    }

    fn document_len(&self) -> usize {
        self.text.len()
    }

    fn styling(&self) -> Self::Styling {
        Arc::clone(&self.styling)
    }

    fn outline(&self) -> Self::Outline {
        Arc::clone(&self.outline)
    }
}

struct OpenBlock {
    name: String,
    start: usize,
    children: Vec<OutlineNode>,
}

fn scan(text: &str) -> Result<(Vec<StyleSpan>, Vec<OutlineNode>), ModelError> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut roots = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut statement_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = find_from(bytes, i, b"\n").unwrap_or(bytes.len());
                spans.push(span(i, end, TokenKind::Comment));
                i = end;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find_from(bytes, i + 2, b"*/")
                    .map(|pos| pos + 2)
                    .ok_or_else(|| ModelError::parse(i, "unterminated block comment"))?;
                spans.push(span(i, end, TokenKind::Comment));
                i = end;
                continue;
            }
            b'\'' | b'"' => {
                let end = string_end(bytes, i)
                    .ok_or_else(|| ModelError::parse(i, "unterminated string"))?;
                spans.push(span(i, end, TokenKind::String));
                i = end;
                continue;
            }
            b'0'..=b'9' => {
                let end = advance_while(bytes, i, |c| c.is_ascii_digit() || c == b'.');
                spans.push(span(i, end, TokenKind::Number));
                i = end;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let end = advance_while(bytes, i, |c| c.is_ascii_alphanumeric() || c == b'_');
                if KEYWORDS.contains(&&text[i..end]) {
                    spans.push(span(i, end, TokenKind::Keyword));
                }
                i = end;
                continue;
            }
            b'{' => {
                let name = text[statement_start..i].trim();
                stack.push(OpenBlock {
                    name: if name.is_empty() {
                        "<block>".to_string()
                    } else {
                        name.to_string()
                    },
                    start: i,
                    children: Vec::new(),
                });
                statement_start = i + 1;
            }
            b'}' => {
                let block = stack
                    .pop()
                    .ok_or_else(|| ModelError::parse(i, "unmatched '}'"))?;
                let node = OutlineNode {
                    name: block.name,
                    range: block.start..i + 1,
                    children: block.children,
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
                statement_start = i + 1;
            }
            b'\n' | b';' => statement_start = i + 1,
            _ => {}
        }
        i += 1;
    }

    if let Some(open) = stack.last() {
        return Err(ModelError::parse(open.start, "unclosed '{'"));
    }
    Ok((spans, roots))
}

fn span(start: usize, end: usize, kind: TokenKind) -> StyleSpan {
    StyleSpan {
        range: start..end,
        kind,
    }
}

fn advance_while(bytes: &[u8], start: usize, pred: impl Fn(u8) -> bool) -> usize {
    let mut end = start;
    while end < bytes.len() && pred(bytes[end]) {
        end += 1;
    }
    end
}

fn find_from(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(start..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| start + pos)
}

/// End (exclusive) of the string literal opening at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}
