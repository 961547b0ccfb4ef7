//! Document probe seam
//!
//! The engine never touches a document directly. Every lookup goes through a
//! [`DocumentProbe`], which may front a live CDP page, a WebDriver session or a
//! captured snapshot.

use crate::{
    errors::ProbeError,
    types::{ElementRef, LocatorDescriptor, TestIdMatch},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Attributes recognized as test identifiers, in lookup priority order
pub const TEST_ID_ATTRIBUTES: [&str; 5] =
    ["data-testid", "data-test", "data-test-id", "data-qa", "data-cy"];

/// Primitive document lookups consumed by the resolver
#[async_trait]
pub trait DocumentProbe: Send + Sync {
    /// Exact structural locator match.
    ///
    /// Returns `Ok(None)` when nothing matches and
    /// `Err(ProbeError::MalformedLocator)` when the locator cannot be parsed.
    async fn query_one(&self, locator: &str) -> Result<Option<ElementRef>, ProbeError>;

    /// First element whose text contains `text`, scanning `tags` in order and
    /// document order within each tag.
    async fn query_by_text(
        &self,
        tags: &[String],
        text: &str,
    ) -> Result<Option<ElementRef>, ProbeError>;

    /// Test-identifier attribute of the first element in document order that
    /// carries one.
    async fn discover_first_test_id(&self) -> Result<Option<TestIdMatch>, ProbeError>;
}

#[async_trait]
impl<P: DocumentProbe + ?Sized> DocumentProbe for Arc<P> {
    async fn query_one(&self, locator: &str) -> Result<Option<ElementRef>, ProbeError> {
        (**self).query_one(locator).await
    }

    async fn query_by_text(
        &self,
        tags: &[String],
        text: &str,
    ) -> Result<Option<ElementRef>, ProbeError> {
        (**self).query_by_text(tags, text).await
    }

    async fn discover_first_test_id(&self) -> Result<Option<TestIdMatch>, ProbeError> {
        (**self).discover_first_test_id().await
    }
}

/// Run a descriptor against the probe capability matching its shape
pub async fn execute_descriptor(
    probe: &dyn DocumentProbe,
    descriptor: &LocatorDescriptor,
) -> Result<Option<ElementRef>, ProbeError> {
    trace!("Executing descriptor {}", descriptor);
    match descriptor {
        LocatorDescriptor::Css(selector) => probe.query_one(selector).await,
        LocatorDescriptor::Text { tags, text } => probe.query_by_text(tags, text).await,
    }
}
