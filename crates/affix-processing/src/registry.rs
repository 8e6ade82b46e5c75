//! Named derivation processor registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use affix_core::SourceTree;

use crate::{DerivationSource, ProcessError};

/// Options forwarded to a derivation processor invocation.
pub type DerivationOptions = Map<String, Value>;

/// A derivation processor: produces a tree of raw sources from one source
/// file. Results are not uploaded here; the caller decides where they go.
#[async_trait]
pub trait Derivation: Send + Sync {
    async fn derive(
        &self,
        source: DerivationSource,
        options: &DerivationOptions,
    ) -> Result<SourceTree, ProcessError>;
}

/// Adapter for plain (non-async) derivation functions, which covers most
/// CPU-bound processors.
struct FnDerivation<F>(F);

#[async_trait]
impl<F> Derivation for FnDerivation<F>
where
    F: Fn(DerivationSource, &DerivationOptions) -> Result<SourceTree, ProcessError> + Send + Sync,
{
    async fn derive(
        &self,
        source: DerivationSource,
        options: &DerivationOptions,
    ) -> Result<SourceTree, ProcessError> {
        (self.0)(source, options)
    }
}

#[derive(Clone)]
struct Entry {
    derivation: Arc<dyn Derivation>,
    /// When set, the processor receives the stored source unmaterialized.
    raw_source: bool,
}

#[derive(Default)]
struct Inner {
    named: HashMap<String, Entry>,
    default: Option<Entry>,
}

/// Registry of named derivation processors plus an optional default.
///
/// Cloning is cheap and clones share the same processor table.
#[derive(Clone, Default)]
pub struct DerivationRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl DerivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, raw_source: bool, derivation: Arc<dyn Derivation>) {
        self.inner.write().named.insert(
            name.into(),
            Entry {
                derivation,
                raw_source,
            },
        );
    }

    pub fn register_fn<F>(&self, name: impl Into<String>, raw_source: bool, f: F)
    where
        F: Fn(DerivationSource, &DerivationOptions) -> Result<SourceTree, ProcessError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, raw_source, Arc::new(FnDerivation(f)));
    }

    pub fn register_default(&self, raw_source: bool, derivation: Arc<dyn Derivation>) {
        self.inner.write().default = Some(Entry {
            derivation,
            raw_source,
        });
    }

    pub fn register_default_fn<F>(&self, raw_source: bool, f: F)
    where
        F: Fn(DerivationSource, &DerivationOptions) -> Result<SourceTree, ProcessError>
            + Send
            + Sync
            + 'static,
    {
        self.register_default(raw_source, Arc::new(FnDerivation(f)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().named.contains_key(name)
    }

    pub fn has_default(&self) -> bool {
        self.inner.read().default.is_some()
    }

    /// Runs the named processor, or the default when `name` is `None`.
    ///
    /// A missing named processor fails with
    /// [`ProcessError::ProcessorNotFound`]; a missing default is a no-op and
    /// yields an empty tree. The source is materialized unless the processor
    /// was registered `raw_source`. A processor returning a bare leaf
    /// instead of a mapping/sequence fails with
    /// [`ProcessError::InvalidResult`] before anything is uploaded.
    pub async fn process(
        &self,
        name: Option<&str>,
        source: DerivationSource,
        options: &DerivationOptions,
    ) -> Result<SourceTree, ProcessError> {
        let entry = {
            let inner = self.inner.read();
            match name {
                Some(name) => inner
                    .named
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ProcessError::ProcessorNotFound(name.to_string()))?,
                None => match inner.default.clone() {
                    Some(entry) => entry,
                    None => return Ok(SourceTree::empty()),
                },
            }
        };

        let source = if entry.raw_source {
            source
        } else {
            source.materialize().await?
        };

        let start = std::time::Instant::now();
        let result = entry.derivation.derive(source, options).await?;

        if let SourceTree::Leaf(_) = result {
            return Err(ProcessError::InvalidResult(
                "processor must return a mapping or sequence of sources".to_string(),
            ));
        }

        tracing::info!(
            processor = name.unwrap_or("default"),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Derivatives processing finished"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affix_core::RawFile;

    fn reversed(source_data: &[u8]) -> SourceTree {
        let mut data = source_data.to_vec();
        data.reverse();
        SourceTree::map([("reversed", SourceTree::Leaf(RawFile::from_bytes(data)))])
    }

    #[tokio::test]
    async fn test_named_processor() {
        let registry = DerivationRegistry::new();
        registry.register_fn("reversed", false, |source, _options| {
            let DerivationSource::Bytes { data, .. } = source else {
                return Err(ProcessError::Failed("expected materialized source".into()));
            };
            Ok(reversed(&data))
        });

        let tree = registry
            .process(
                Some("reversed"),
                DerivationSource::from_bytes("file"),
                &DerivationOptions::new(),
            )
            .await
            .unwrap();

        let SourceTree::Map(map) = tree else {
            panic!("expected mapping")
        };
        assert!(map.contains_key("reversed"));
    }

    #[tokio::test]
    async fn test_missing_named_processor_fails() {
        let registry = DerivationRegistry::new();

        let err = registry
            .process(
                Some("unknown"),
                DerivationSource::from_bytes(""),
                &DerivationOptions::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::ProcessorNotFound(name) if name == "unknown"));
    }

    #[tokio::test]
    async fn test_missing_default_is_noop() {
        let registry = DerivationRegistry::new();

        let tree = registry
            .process(
                None,
                DerivationSource::from_bytes(""),
                &DerivationOptions::new(),
            )
            .await
            .unwrap();

        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn test_default_processor() {
        let registry = DerivationRegistry::new();
        registry.register_default_fn(false, |_source, _options| {
            Ok(SourceTree::map([("one", SourceTree::from("1"))]))
        });

        let tree = registry
            .process(
                None,
                DerivationSource::from_bytes(""),
                &DerivationOptions::new(),
            )
            .await
            .unwrap();

        assert!(!tree.is_empty());
    }

    #[tokio::test]
    async fn test_leaf_result_is_invalid() {
        let registry = DerivationRegistry::new();
        registry.register_fn("bad", false, |_source, _options| {
            Ok(SourceTree::from("not a tree"))
        });

        let err = registry
            .process(
                Some("bad"),
                DerivationSource::from_bytes(""),
                &DerivationOptions::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::InvalidResult(_)));
    }

    #[tokio::test]
    async fn test_options_are_forwarded() {
        let registry = DerivationRegistry::new();
        registry.register_fn("options", false, |_source, options| {
            let value = options
                .get("foo")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(SourceTree::map([("options", SourceTree::from(value))]))
        });

        let mut options = DerivationOptions::new();
        options.insert("foo".into(), Value::String("bar".into()));

        let tree = registry
            .process(Some("options"), DerivationSource::from_bytes(""), &options)
            .await
            .unwrap();

        let SourceTree::Map(map) = tree else {
            panic!("expected mapping")
        };
        let SourceTree::Leaf(raw) = &map["options"] else {
            panic!("expected leaf")
        };
        let affix_core::RawContent::Bytes(data) = &raw.content else {
            panic!("expected bytes")
        };
        assert_eq!(data.as_ref(), b"bar");
    }
}
