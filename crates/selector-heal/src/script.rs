//! Script-evaluating document probe
//!
//! Builds self-contained JavaScript for each probe capability and runs it
//! through a [`ScriptHost`] (CDP `Runtime.evaluate`, WebDriver `execute`, ...).
//! Matched elements are tagged with a one-off token attribute so the returned
//! handle is a selector that keeps pointing at the same node.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    errors::ProbeError,
    probe::{DocumentProbe, TEST_ID_ATTRIBUTES},
    types::{ElementRef, TestIdMatch},
};

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-selector-heal";

/// Evaluates a JavaScript expression in the target page and returns its JSON value
#[async_trait]
pub trait ScriptHost: Send + Sync {
    async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError>;
}

pub struct ScriptProbe<H> {
    host: H,
    marker_attribute: String,
}

impl<H: ScriptHost> ScriptProbe<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
        }
    }

    /// Use a custom attribute to tag matched elements
    pub fn with_marker_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.marker_attribute = attribute.into();
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn new_token(&self) -> String {
        format!("el-{}", Uuid::new_v4().simple())
    }

    async fn run_element_script(
        &self,
        expression: String,
        locator: &str,
    ) -> Result<Option<ElementRef>, ProbeError> {
        let value = self.host.evaluate(&expression).await?;
        let response = parse_response(value)?;
        match response.status.as_str() {
            "ok" => {
                let handle = response.selector.ok_or_else(|| {
                    ProbeError::Script("element response without selector".to_string())
                })?;
                let element = ElementRef::new(handle);
                Ok(Some(match response.tag {
                    Some(tag) => element.with_tag(tag),
                    None => element,
                }))
            }
            "not-found" => Ok(None),
            "invalid" => Err(ProbeError::malformed(
                locator,
                response.reason.unwrap_or_else(|| "rejected by page".to_string()),
            )),
            other => Err(ProbeError::Script(format!("unknown status '{}'", other))),
        }
    }
}

#[async_trait]
impl<H: ScriptHost> DocumentProbe for ScriptProbe<H> {
    async fn query_one(&self, locator: &str) -> Result<Option<ElementRef>, ProbeError> {
        let expression = format!(
            r#"(() => {{
            const selector = {selector};
            const attr = {attr};
            const token = {token};
            let match;
            try {{
                match = document.querySelector(selector);
            }} catch (err) {{
                return {{ status: 'invalid', reason: String((err && err.message) || err) }};
            }}
            if (!match) {{
                return {{ status: 'not-found' }};
            }}
            match.setAttribute(attr, token);
            return {{
                status: 'ok',
                selector: '[' + attr + '="' + token + '"]',
                tag: match.tagName.toLowerCase(),
            }};
        }})()"#,
            selector = js_literal(locator)?,
            attr = js_literal(&self.marker_attribute)?,
            token = js_literal(&self.new_token())?,
        );
        self.run_element_script(expression, locator).await
    }

    async fn query_by_text(
        &self,
        tags: &[String],
        text: &str,
    ) -> Result<Option<ElementRef>, ProbeError> {
        let expression = format!(
            r#"(() => {{
            const tags = {tags};
            const target = {text};
            const attr = {attr};
            const token = {token};
            const normalize = (input) => (input || '').replace(/\s+/g, ' ').trim().toLowerCase();
            const needle = normalize(target);
            for (const tag of tags) {{
                const match = Array.from(document.getElementsByTagName(tag))
                    .find(el => normalize(el.innerText || el.textContent).includes(needle));
                if (match) {{
                    match.setAttribute(attr, token);
                    return {{
                        status: 'ok',
                        selector: '[' + attr + '="' + token + '"]',
                        tag: match.tagName.toLowerCase(),
                    }};
                }}
            }}
            return {{ status: 'not-found' }};
        }})()"#,
            tags = js_literal(tags)?,
            text = js_literal(text)?,
            attr = js_literal(&self.marker_attribute)?,
            token = js_literal(&self.new_token())?,
        );
        self.run_element_script(expression, &format!("text:{}", text))
            .await
    }

    async fn discover_first_test_id(&self) -> Result<Option<TestIdMatch>, ProbeError> {
        let expression = format!(
            r#"(() => {{
            const attrs = {attrs};
            const match = document.querySelector(attrs.map(a => '[' + a + ']').join(','));
            if (!match) {{
                return {{ status: 'not-found' }};
            }}
            const attribute = attrs.find(a => match.hasAttribute(a));
            return {{ status: 'ok', attribute, value: match.getAttribute(attribute) }};
        }})()"#,
            attrs = js_literal(&TEST_ID_ATTRIBUTES)?,
        );
        let value = self.host.evaluate(&expression).await?;
        let response = parse_response(value)?;
        match response.status.as_str() {
            "ok" => match (response.attribute, response.value) {
                (Some(attribute), Some(value)) => Ok(Some(TestIdMatch::new(attribute, value))),
                _ => Err(ProbeError::Script(
                    "test-id response without attribute/value".to_string(),
                )),
            },
            "not-found" => Ok(None),
            other => Err(ProbeError::Script(format!("unknown status '{}'", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptResponse {
    status: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_response(value: Value) -> Result<ScriptResponse, ProbeError> {
    serde_json::from_value(value).map_err(|err| ProbeError::Script(err.to_string()))
}

fn js_literal<T: Serialize + ?Sized>(value: &T) -> Result<String, ProbeError> {
    serde_json::to_string(value).map_err(|err| ProbeError::Script(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct CannedHost {
        response: Value,
        expressions: Mutex<Vec<String>>,
    }

    impl CannedHost {
        fn new(response: Value) -> Self {
            Self {
                response,
                expressions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScriptHost for CannedHost {
        async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError> {
            self.expressions.lock().push(expression.to_string());
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn query_one_returns_token_selector() {
        let probe = ScriptProbe::new(CannedHost::new(json!({
            "status": "ok",
            "selector": "[data-selector-heal=\"el-1\"]",
            "tag": "button",
        })));
        let element = probe
            .query_one("[aria-label=\"Say \\\"hi\\\"\"]")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(element.handle, "[data-selector-heal=\"el-1\"]");
        assert_eq!(element.tag.as_deref(), Some("button"));

        let expressions = probe.host().expressions.lock();
        assert!(expressions[0]
            .contains(r#"const selector = "[aria-label=\"Say \\\"hi\\\"\"]";"#));
        assert!(expressions[0].contains(r#"const attr = "data-selector-heal";"#));
    }

    #[tokio::test]
    async fn invalid_status_is_malformed() {
        let probe = ScriptProbe::new(CannedHost::new(json!({
            "status": "invalid",
            "reason": "'div[' is not a valid selector",
        })));
        let err = probe.query_one("div[").await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn unexpected_payload_is_script_error() {
        let probe = ScriptProbe::new(CannedHost::new(json!({ "status": "exploded" })));
        let err = probe.query_one("#a").await.unwrap_err();
        assert!(matches!(err, ProbeError::Script(_)));

        let probe = ScriptProbe::new(CannedHost::new(json!("not an object")));
        assert!(probe.query_one("#a").await.is_err());
    }

    #[tokio::test]
    async fn text_query_embeds_tag_order() {
        let probe = ScriptProbe::new(CannedHost::new(json!({ "status": "not-found" })))
            .with_marker_attribute("data-probe");
        let tags = vec!["button".to_string(), "a".to_string()];
        assert!(probe.query_by_text(&tags, "Click Me").await.unwrap().is_none());
        let expressions = probe.host().expressions.lock();
        assert!(expressions[0].contains(r#"const tags = ["button","a"];"#));
        assert!(expressions[0].contains(r#"const attr = "data-probe";"#));
    }

    #[tokio::test]
    async fn discovery_parses_attribute_and_value() {
        let probe = ScriptProbe::new(CannedHost::new(json!({
            "status": "ok",
            "attribute": "data-testid",
            "value": "submit-button",
        })));
        let found = probe.discover_first_test_id().await.unwrap();
        assert_eq!(found, Some(TestIdMatch::new("data-testid", "submit-button")));
    }
}
