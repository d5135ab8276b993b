//! Assembled record tree.

use crate::parse::RawToken;
use std::collections::BTreeMap;

/// One source-text block: a tagged node with nested children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub tag: String,
    /// Cross-reference identifier with markers removed.
    pub xref: Option<String>,
    pub value: String,
    /// First non-empty value of each direct child tag.
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Record>,
    /// 1-based source line of the opening token.
    pub line: usize,
}

impl Record {
    pub fn from_token(token: RawToken) -> Self {
        Self {
            tag: token.tag,
            xref: token.xref,
            value: token.value,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            line: token.line,
        }
    }

    pub(crate) fn push_child(&mut self, child: Record) {
        if !child.value.is_empty() && !self.attributes.contains_key(&child.tag) {
            self.attributes
                .insert(child.tag.clone(), child.value.clone());
        }
        self.children.push(child);
    }

    /// Returns the first non-empty value for a direct child tag.
    pub fn attribute(&self, tag: &str) -> Option<&str> {
        self.attributes.get(tag).map(String::as_str)
    }

    /// Iterates direct children carrying `tag`.
    pub fn children_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Record> {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    /// Returns the first direct child carrying `tag`.
    pub fn child(&self, tag: &str) -> Option<&Record> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Returns the value as a cross-reference pointer, if it is one.
    pub fn pointer(&self) -> Option<&str> {
        parse_pointer(&self.value)
    }

    /// Human-readable identifier used in import reports.
    pub fn label(&self) -> String {
        match &self.xref {
            Some(xref) => format!("@{xref}@ {}", self.tag),
            None => self.tag.clone(),
        }
    }
}

/// Extracts `I1` from `@I1@`; returns `None` for non-pointer values.
pub fn parse_pointer(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix('@')?.strip_suffix('@')?;
    if inner.is_empty() || inner.contains('@') || inner.contains(char::is_whitespace) {
        return None;
    }
    Some(inner)
}
