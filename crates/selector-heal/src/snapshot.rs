//! Snapshot-backed document probe
//!
//! Evaluates locators against a captured, flattened list of elements in
//! document order. Only compound selectors are understood (`tag`, `*`, `#id`,
//! `.class` and attribute selectors, optionally comma-separated); combinators
//! and pseudo-classes are rejected as malformed, which the resolver treats as
//! a miss.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ProbeError,
    probe::{DocumentProbe, TEST_ID_ATTRIBUTES},
    types::{ElementRef, TestIdMatch},
};

/// One element of a captured document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Full text content, descendants included
    #[serde(default)]
    pub text: String,
}

impl SnapshotElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Probe over an in-memory snapshot; the snapshot may be swapped to model a
/// live, mutating page.
#[derive(Debug, Default)]
pub struct SnapshotProbe {
    elements: RwLock<Vec<SnapshotElement>>,
}

impl SnapshotProbe {
    pub fn new(elements: Vec<SnapshotElement>) -> Self {
        Self {
            elements: RwLock::new(elements),
        }
    }

    /// Parse a JSON array of elements
    pub fn from_json(raw: &str) -> Result<Self, ProbeError> {
        let elements: Vec<SnapshotElement> =
            serde_json::from_str(raw).map_err(|err| ProbeError::Script(err.to_string()))?;
        Ok(Self::new(elements))
    }

    /// Replace the whole document
    pub fn replace(&self, elements: Vec<SnapshotElement>) {
        *self.elements.write() = elements;
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    fn element_ref(index: usize, element: &SnapshotElement) -> ElementRef {
        ElementRef::new(format!("node-{}", index)).with_tag(element.tag.clone())
    }
}

#[async_trait]
impl DocumentProbe for SnapshotProbe {
    async fn query_one(&self, locator: &str) -> Result<Option<ElementRef>, ProbeError> {
        let selectors = parse_selector_list(locator)?;
        let elements = self.elements.read();
        Ok(elements
            .iter()
            .enumerate()
            .find(|(_, element)| selectors.iter().any(|s| s.matches(element)))
            .map(|(index, element)| Self::element_ref(index, element)))
    }

    async fn query_by_text(
        &self,
        tags: &[String],
        text: &str,
    ) -> Result<Option<ElementRef>, ProbeError> {
        let needle = normalize_text(text);
        let elements = self.elements.read();
        for tag in tags {
            let found = elements.iter().enumerate().find(|(_, element)| {
                element.tag.eq_ignore_ascii_case(tag)
                    && normalize_text(&element.text).contains(&needle)
            });
            if let Some((index, element)) = found {
                return Ok(Some(Self::element_ref(index, element)));
            }
        }
        Ok(None)
    }

    async fn discover_first_test_id(&self) -> Result<Option<TestIdMatch>, ProbeError> {
        let elements = self.elements.read();
        Ok(elements.iter().find_map(|element| {
            TEST_ID_ATTRIBUTES.iter().find_map(|attribute| {
                element
                    .attribute(attribute)
                    .map(|value| TestIdMatch::new(*attribute, value))
            })
        }))
    }
}

/// Lower-cased text with whitespace runs collapsed
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
    DashPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SimpleSelector {
    Tag(String),
    Id(String),
    Class(String),
    Attribute {
        name: String,
        op: AttrOp,
        value: String,
    },
}

impl SimpleSelector {
    fn matches(&self, element: &SnapshotElement) -> bool {
        match self {
            SimpleSelector::Tag(tag) => element.tag.eq_ignore_ascii_case(tag),
            SimpleSelector::Id(id) => element.attribute("id") == Some(id.as_str()),
            SimpleSelector::Class(class) => element
                .attribute("class")
                .map(|classes| classes.split_whitespace().any(|c| c == class))
                .unwrap_or(false),
            SimpleSelector::Attribute { name, op, value } => {
                let Some(actual) = element.attribute(name) else {
                    return false;
                };
                match op {
                    AttrOp::Exists => true,
                    AttrOp::Equals => actual == value,
                    AttrOp::Contains => !value.is_empty() && actual.contains(value.as_str()),
                    AttrOp::Prefix => !value.is_empty() && actual.starts_with(value.as_str()),
                    AttrOp::Suffix => !value.is_empty() && actual.ends_with(value.as_str()),
                    AttrOp::Word => actual.split_whitespace().any(|word| word == value),
                    AttrOp::DashPrefix => {
                        actual == value || actual.starts_with(&format!("{}-", value))
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CompoundSelector {
    parts: Vec<SimpleSelector>,
}

impl CompoundSelector {
    fn matches(&self, element: &SnapshotElement) -> bool {
        self.parts.iter().all(|part| part.matches(element))
    }
}

fn parse_selector_list(locator: &str) -> Result<Vec<CompoundSelector>, ProbeError> {
    let mut parser = SelectorParser::new(locator);
    let mut selectors = vec![parser.compound()?];
    loop {
        parser.skip_whitespace();
        match parser.peek() {
            None => break,
            Some(',') => {
                parser.bump();
                selectors.push(parser.compound()?);
            }
            Some(c) if c == '>' || c == '+' || c == '~' || parser.saw_whitespace => {
                return Err(parser.error("combinators are not supported by snapshot probes"));
            }
            Some(c) => return Err(parser.error(&format!("unexpected character '{}'", c))),
        }
    }
    Ok(selectors)
}

struct SelectorParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    saw_whitespace: bool,
}

impl<'a> SelectorParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
            saw_whitespace: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        self.saw_whitespace = false;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.saw_whitespace = true;
            self.pos += 1;
        }
    }

    fn error(&self, reason: &str) -> ProbeError {
        ProbeError::malformed(self.source, reason)
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn required_ident(&mut self, what: &str) -> Result<String, ProbeError> {
        let ident = self.ident();
        if ident.is_empty() {
            Err(self.error(&format!("expected {}", what)))
        } else {
            Ok(ident)
        }
    }

    fn compound(&mut self) -> Result<CompoundSelector, ProbeError> {
        self.skip_whitespace();
        let mut parts = Vec::new();
        match self.peek() {
            Some('*') => {
                self.bump();
            }
            Some(c) if c.is_alphabetic() => parts.push(SimpleSelector::Tag(self.ident())),
            _ => {}
        }
        let start = self.pos;
        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    parts.push(SimpleSelector::Id(self.required_ident("id after '#'")?));
                }
                Some('.') => {
                    self.bump();
                    parts.push(SimpleSelector::Class(
                        self.required_ident("class after '.'")?,
                    ));
                }
                Some('[') => {
                    self.bump();
                    parts.push(self.attribute()?);
                }
                Some(':') => {
                    return Err(self.error("pseudo-classes are not supported by snapshot probes"))
                }
                _ => break,
            }
        }
        if parts.is_empty() && self.pos == start && !self.source_has_star_at(start) {
            return Err(self.error("empty selector"));
        }
        Ok(CompoundSelector { parts })
    }

    fn source_has_star_at(&self, end: usize) -> bool {
        end > 0 && self.chars.get(end - 1) == Some(&'*')
    }

    fn attribute(&mut self) -> Result<SimpleSelector, ProbeError> {
        self.skip_whitespace();
        let name = self.required_ident("attribute name")?.to_ascii_lowercase();
        self.skip_whitespace();
        let op = match self.bump() {
            Some(']') => {
                return Ok(SimpleSelector::Attribute {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                })
            }
            Some('=') => AttrOp::Equals,
            Some(c @ ('*' | '^' | '$' | '~' | '|')) => {
                if self.bump() != Some('=') {
                    return Err(self.error("expected '=' in attribute selector"));
                }
                match c {
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '~' => AttrOp::Word,
                    _ => AttrOp::DashPrefix,
                }
            }
            Some(c) => {
                return Err(self.error(&format!("unexpected '{}' in attribute selector", c)))
            }
            None => return Err(self.error("unclosed attribute selector")),
        };
        self.skip_whitespace();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                self.quoted(q)?
            }
            _ => self.required_ident("attribute value")?,
        };
        self.skip_whitespace();
        match self.bump() {
            Some(']') => Ok(SimpleSelector::Attribute { name, op, value }),
            _ => Err(self.error("unclosed attribute selector")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, ProbeError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(self.error("unterminated escape")),
                    Some('a') | Some('A') => {
                        out.push('\n');
                        if self.peek() == Some(' ') {
                            self.bump();
                        }
                    }
                    Some(escaped) => out.push(escaped),
                },
                Some(c) => out.push(c),
            }
        }
    }
}
