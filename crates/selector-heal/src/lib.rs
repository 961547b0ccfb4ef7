//! Self-healing selector resolution
//!
//! Resolves a caller-supplied locator to an element even after the page has
//! drifted away from it:
//! - Original locator first, verbatim
//! - Cached strategy that healed the same locator recently
//! - Ranked fallback strategies (test ids, ARIA, semantic text, structure)
//!   tried in descending confidence until one matches
//!
//! All document access goes through a [`DocumentProbe`]. Two probes ship with
//! the crate: [`SnapshotProbe`] over a captured element list and
//! [`ScriptProbe`] over any JavaScript-evaluating host.

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod probe;
pub mod resolver;
pub mod script;
pub mod snapshot;
pub mod strategies;
pub mod types;

pub use cache::{CacheEntry, CacheWindows, Clock, ManualClock, ResolutionCache, SystemClock};
pub use config::{load_config, load_config_with_options, HealConfig, LoadOptions};
pub use errors::*;
pub use metrics::{MetricsSnapshot, ResolverMetrics};
pub use probe::{execute_descriptor, DocumentProbe, TEST_ID_ATTRIBUTES};
pub use resolver::{SelectorResolver, SelfHealingResolver};
pub use script::{ScriptHost, ScriptProbe};
pub use snapshot::{SnapshotElement, SnapshotProbe};
pub use types::*;
