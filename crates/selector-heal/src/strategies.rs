//! Healing strategy generation
//!
//! Candidates are produced from a fixed confidence table:
//! 1. Test identifiers - referenced by the locator, or discovered in the document
//! 2. ARIA - `aria-label` / `aria-labelledby` matching the text hint
//! 3. Semantic - text search over a prioritized tag list
//! 4. Structure - substring match on the locator's id/class fragments
//!
//! The output is sorted by descending confidence; ties keep generation order.

use crate::{
    errors::ProbeError,
    probe::DocumentProbe,
    types::{LocatorDescriptor, Strategy, StrategyKind, TestIdMatch},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use tracing::{debug, warn};

pub const TESTID_EXACT_CONFIDENCE: f64 = 0.95;
pub const TESTID_ALT_CONFIDENCE: f64 = 0.93;
pub const TESTID_DISCOVERY_CONFIDENCE: f64 = 0.91;
pub const ARIA_LABEL_CONFIDENCE: f64 = 0.90;
pub const ARIA_LABELLEDBY_CONFIDENCE: f64 = 0.85;
pub const SEMANTIC_CONFIDENCE: f64 = 0.85;
pub const STRUCTURE_ID_CONFIDENCE: f64 = 0.75;
pub const STRUCTURE_CLASS_CONFIDENCE: f64 = 0.70;

/// Tags scanned by semantic strategies, highest priority first
pub const SEMANTIC_TAGS: [&str; 7] = ["button", "a", "input", "label", "h1", "h2", "h3"];

static TEST_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-test(?:id)?\s*=\s*(?:"([^"]*)"|'([^']*)'|([A-Za-z0-9_\-]+))"#).unwrap()
});

/// Generate healing candidates for `locator`.
///
/// Touches the probe at most once, to discover an existing test identifier
/// when the locator does not reference one itself.
pub async fn generate(
    probe: &dyn DocumentProbe,
    locator: &str,
    text_hint: Option<&str>,
) -> Result<Vec<Strategy>, ProbeError> {
    let discovered = if referenced_test_id(locator).is_some() {
        None
    } else {
        match probe.discover_first_test_id().await {
            Ok(found) => found,
            Err(err) if err.is_malformed() => {
                warn!("Test-id discovery rejected by probe: {}", err);
                None
            }
            Err(err) => return Err(err),
        }
    };

    let strategies = build_strategies(locator, text_hint, discovered.as_ref());
    debug!(
        "Generated {} healing strategies for '{}'",
        strategies.len(),
        locator
    );
    Ok(strategies)
}

/// Pure half of [`generate`]: build and rank candidates given the discovery outcome
pub fn build_strategies(
    locator: &str,
    text_hint: Option<&str>,
    discovered: Option<&TestIdMatch>,
) -> Vec<Strategy> {
    let mut strategies = Vec::new();

    if let Some(test_id) = referenced_test_id(locator) {
        strategies.push(Strategy::new(
            "testid-exact",
            StrategyKind::TestId,
            LocatorDescriptor::Css(attribute_equals("data-testid", &test_id)),
            TESTID_EXACT_CONFIDENCE,
        ));
        strategies.push(Strategy::new(
            "testid-alt",
            StrategyKind::TestId,
            LocatorDescriptor::Css(attribute_equals("data-test", &test_id)),
            TESTID_ALT_CONFIDENCE,
        ));
    } else if let Some(found) = discovered.filter(|found| !found.value.is_empty()) {
        strategies.push(Strategy::new(
            "testid-discovery",
            StrategyKind::TestId,
            LocatorDescriptor::Css(attribute_equals(&found.attribute, &found.value)),
            TESTID_DISCOVERY_CONFIDENCE,
        ));
    }

    if let Some(hint) = text_hint.filter(|hint| !hint.is_empty()) {
        strategies.push(Strategy::new(
            "aria-label",
            StrategyKind::Aria,
            LocatorDescriptor::Css(attribute_equals("aria-label", hint)),
            ARIA_LABEL_CONFIDENCE,
        ));
        strategies.push(Strategy::new(
            "aria-labelledby",
            StrategyKind::Aria,
            LocatorDescriptor::Css(attribute_contains(
                "aria-labelledby",
                &hint.to_lowercase(),
            )),
            ARIA_LABELLEDBY_CONFIDENCE,
        ));
        for tag in SEMANTIC_TAGS {
            strategies.push(Strategy::new(
                format!("semantic-{}", tag),
                StrategyKind::Semantic,
                LocatorDescriptor::Text {
                    tags: vec![tag.to_string()],
                    text: hint.to_string(),
                },
                SEMANTIC_CONFIDENCE,
            ));
        }
    }

    let fragments = SelectorFragments::parse(locator);
    if let Some(class) = fragments.class {
        strategies.push(Strategy::new(
            "structure-class",
            StrategyKind::Structure,
            LocatorDescriptor::Css(attribute_contains("class", &class)),
            STRUCTURE_CLASS_CONFIDENCE,
        ));
    }
    if let Some(id) = fragments.id {
        strategies.push(Strategy::new(
            "structure-id",
            StrategyKind::Structure,
            LocatorDescriptor::Css(attribute_contains("id", &id)),
            STRUCTURE_ID_CONFIDENCE,
        ));
    }

    // Vec::sort_by is stable, so equal confidences keep generation order.
    strategies.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    strategies
}

/// Test identifier value referenced by `data-testid=` or `data-test=` in the locator
pub fn referenced_test_id(locator: &str) -> Option<String> {
    let captures = TEST_ID_RE.captures(locator)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))
        .map(|m| m.as_str().to_string())
        .filter(|value| !value.is_empty())
}

/// First id and class fragments of a selector, ignoring attribute values,
/// quoted strings and pseudo-class arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SelectorFragments {
    pub id: Option<String>,
    pub class: Option<String>,
}

impl SelectorFragments {
    pub fn parse(selector: &str) -> Self {
        let mut fragments = SelectorFragments::default();
        let chars: Vec<char> = selector.chars().collect();
        let mut bracket_depth = 0usize;
        let mut paren_depth = 0usize;
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '[' => bracket_depth += 1,
                ']' => bracket_depth = bracket_depth.saturating_sub(1),
                '(' => paren_depth += 1,
                ')' => paren_depth = paren_depth.saturating_sub(1),
                '.' | '#' if bracket_depth == 0 && paren_depth == 0 => {
                    let ident: String = chars[i + 1..]
                        .iter()
                        .take_while(|ch| is_ident_char(**ch))
                        .collect();
                    let consumed = ident.chars().count();
                    if !ident.is_empty() {
                        let slot = if c == '.' {
                            &mut fragments.class
                        } else {
                            &mut fragments.id
                        };
                        if slot.is_none() {
                            *slot = Some(ident);
                        }
                    }
                    i += consumed;
                }
                _ => {}
            }
            i += 1;
        }

        fragments
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// `[attr="value"]`
pub fn attribute_equals(attribute: &str, value: &str) -> String {
    format!("[{}={}]", attribute, css_string(value))
}

/// `[attr*="value"]`
pub fn attribute_contains(attribute: &str, value: &str) -> String {
    format!("[{}*={}]", attribute, css_string(value))
}

/// Double-quoted CSS string literal
pub fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
