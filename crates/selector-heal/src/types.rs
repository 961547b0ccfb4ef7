//! Core types for the selector healing engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy kind enumeration
///
/// Closed set of ways an element can be located. `Original` and `Cache` are
/// produced by the resolver itself; every other kind comes from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// The caller's locator, verbatim
    Original,

    /// A previously successful strategy replayed from the cache
    Cache,

    /// Test-identifier attributes (`data-testid`, `data-test`, ...)
    TestId,

    /// ARIA label attributes
    Aria,

    /// Text search over a prioritized tag list
    Semantic,

    /// Substring match on class/id fragments of the original locator
    Structure,
}

impl StrategyKind {
    /// Label used in resolution traces
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Original => "original",
            StrategyKind::Cache => "cache",
            StrategyKind::TestId => "testid",
            StrategyKind::Aria => "aria",
            StrategyKind::Semantic => "semantic",
            StrategyKind::Structure => "structure",
        }
    }

    /// Whether strategies of this kind may be stored in the resolution cache
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, StrategyKind::Original | StrategyKind::Cache)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Executable shape of a strategy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorDescriptor {
    /// Structural selector handed to `DocumentProbe::query_one`
    Css(String),

    /// Free-text scan handed to `DocumentProbe::query_by_text`
    Text { tags: Vec<String>, text: String },
}

impl fmt::Display for LocatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorDescriptor::Css(selector) => write!(f, "css:{}", selector),
            LocatorDescriptor::Text { tags, text } => {
                write!(f, "text:{}:'{}'", tags.join("|"), text)
            }
        }
    }
}

/// A scored, executable alternative way to find an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Stable strategy name (e.g. `testid-exact`, `semantic-button`)
    pub name: String,

    /// Strategy kind
    pub kind: StrategyKind,

    /// What to execute against the probe
    pub descriptor: LocatorDescriptor,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,
}

impl Strategy {
    /// Create a new strategy
    pub fn new(
        name: impl Into<String>,
        kind: StrategyKind,
        descriptor: LocatorDescriptor,
        confidence: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            descriptor,
            confidence,
        }
    }

    /// Strategy describing the caller's own locator
    pub fn original(locator: &str) -> Self {
        Self::new(
            "original",
            StrategyKind::Original,
            LocatorDescriptor::Css(locator.to_string()),
            1.0,
        )
    }

    /// Same strategy relabelled as replayed from the cache
    pub fn as_cached(&self) -> Self {
        Self {
            kind: StrategyKind::Cache,
            ..self.clone()
        }
    }

    /// Two strategies target the same thing when name and descriptor agree
    pub fn same_target(&self, other: &Strategy) -> bool {
        self.name == other.name && self.descriptor == other.descriptor
    }
}

/// Opaque reference to an element in the live document
///
/// The engine never retains or releases it; lifetime is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    /// Probe-specific handle (node id, token selector, ...)
    pub handle: String,

    /// Element tag name when the probe knows it
    pub tag: Option<String>,
}

impl ElementRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Test-identifier attribute found on the first element carrying one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestIdMatch {
    /// Attribute name, e.g. `data-testid`
    pub attribute: String,

    /// Attribute value
    pub value: String,
}

impl TestIdMatch {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Per-call resolution options
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOptions {
    /// Free-text clue for aria/semantic strategies
    pub text_hint: Option<String>,

    /// Whether any fallback beyond the original locator may run
    pub enable_healing: bool,

    /// Maximum generated strategies to execute
    pub max_strategies: usize,

    /// Minimum confidence a generated strategy needs to be executed
    pub min_confidence: f64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            text_hint: None,
            enable_healing: true,
            max_strategies: 7,
            min_confidence: 0.6,
        }
    }
}

impl ResolveOptions {
    /// Set the text hint
    pub fn with_text_hint(mut self, hint: impl Into<String>) -> Self {
        self.text_hint = Some(hint.into());
        self
    }

    /// Enable or disable healing
    pub fn with_healing(mut self, enabled: bool) -> Self {
        self.enable_healing = enabled;
        self
    }

    /// Set maximum strategies to execute
    pub fn with_max_strategies(mut self, max: usize) -> Self {
        self.max_strategies = max;
        self
    }

    /// Set minimum confidence threshold
    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min;
        self
    }

    /// Text hint, with an empty string treated as absent
    pub fn hint(&self) -> Option<&str> {
        self.text_hint.as_deref().filter(|hint| !hint.is_empty())
    }

    pub fn validate(&self) -> Result<(), crate::errors::LocatorError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(crate::errors::LocatorError::InvalidOptions(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.max_strategies == 0 {
            return Err(crate::errors::LocatorError::InvalidOptions(
                "max_strategies must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one `resolve` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Resolved element, `None` when every strategy missed
    pub element: Option<ElementRef>,

    /// Strategy that produced the element
    pub strategy: Option<Strategy>,

    /// Whether anything beyond the original locator was consulted
    pub healing_applied: bool,

    /// Kinds executed against the probe, in order
    pub attempted_strategies: Vec<StrategyKind>,
}

impl ResolutionResult {
    pub(crate) fn found(
        element: ElementRef,
        strategy: Strategy,
        healing_applied: bool,
        attempted_strategies: Vec<StrategyKind>,
    ) -> Self {
        Self {
            element: Some(element),
            strategy: Some(strategy),
            healing_applied,
            attempted_strategies,
        }
    }

    pub(crate) fn not_found(healing_applied: bool, attempted_strategies: Vec<StrategyKind>) -> Self {
        Self {
            element: None,
            strategy: None,
            healing_applied,
            attempted_strategies,
        }
    }

    /// Check if an element was resolved
    pub fn is_found(&self) -> bool {
        self.element.is_some()
    }

    /// Confidence of the winning strategy
    pub fn confidence(&self) -> Option<f64> {
        self.strategy.as_ref().map(|s| s.confidence)
    }

    /// Kind of the winning strategy
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy.as_ref().map(|s| s.kind)
    }

    /// Trace labels, e.g. `["original", "cache"]`
    pub fn attempted_labels(&self) -> Vec<&'static str> {
        self.attempted_strategies.iter().map(|k| k.label()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(StrategyKind::Original.label(), "original");
        assert_eq!(StrategyKind::TestId.to_string(), "testid");
        assert!(!StrategyKind::Cache.is_cacheable());
        assert!(!StrategyKind::Original.is_cacheable());
        assert!(StrategyKind::Semantic.is_cacheable());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&StrategyKind::TestId).unwrap();
        assert_eq!(json, "\"testid\"");
    }

    #[test]
    fn test_same_target_ignores_kind_and_confidence() {
        let healed = Strategy::new(
            "aria-label",
            StrategyKind::Aria,
            LocatorDescriptor::Css("[aria-label=\"Save\"]".into()),
            0.9,
        );
        let replayed = healed.as_cached();
        assert_eq!(replayed.kind, StrategyKind::Cache);
        assert!(healed.same_target(&replayed));

        let other = Strategy::new(
            "aria-label",
            StrategyKind::Aria,
            LocatorDescriptor::Css("[aria-label=\"Cancel\"]".into()),
            0.9,
        );
        assert!(!healed.same_target(&other));
    }

    #[test]
    fn test_options_validation() {
        assert!(ResolveOptions::default().validate().is_ok());
        assert!(ResolveOptions::default()
            .with_min_confidence(1.2)
            .validate()
            .is_err());
        assert!(ResolveOptions::default()
            .with_max_strategies(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_empty_hint_is_absent() {
        let options = ResolveOptions::default().with_text_hint("");
        assert_eq!(options.hint(), None);
        let options = ResolveOptions::default().with_text_hint("Submit");
        assert_eq!(options.hint(), Some("Submit"));
    }
}
