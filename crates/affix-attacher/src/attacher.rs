//! The attacher: attachment state machine and derivative management.
//!
//! An attacher owns the state of one attachment slot: the current file, the
//! derivative tree, and the previously displaced state. Files enter on the
//! transient cache tier and are promoted to permanent storage; the record
//! binding and the optimistic persistence protocol live in the
//! `persistence` module.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use affix_core::{AttachmentData, Config, RawFile, SourceTree};
use affix_processing::{DerivationOptions, DerivationRegistry, DerivationSource};
use affix_storage::{StorageRegistry, UploadedFile, UrlOptions};

use crate::tree::format_path;
use crate::{
    AttacherError, AttacherResult, Context, DerivativeTree, PathSegment, RecordAdapter,
    UploadOptions, Uploader,
};

/// Storage resolution for derivative uploads.
#[derive(Clone, Default)]
pub enum DerivativeStorage {
    /// The permanent tier.
    #[default]
    Store,
    /// A fixed tier for all derivatives.
    Fixed(String),
    /// Per-derivative resolution from the derivative path.
    Resolver(Arc<dyn Fn(&[PathSegment]) -> String + Send + Sync>),
}

impl fmt::Debug for DerivativeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivativeStorage::Store => f.write_str("Store"),
            DerivativeStorage::Fixed(key) => f.debug_tuple("Fixed").field(key).finish(),
            DerivativeStorage::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Fallback URL resolution for missing files. Receives the requested
/// derivative path (empty for the original file) and the URL options.
pub type DefaultUrlFn = Arc<dyn Fn(&[PathSegment], &UrlOptions) -> Option<String> + Send + Sync>;

/// Behavior flags and strategies, fixed at construction time.
#[derive(Clone)]
pub struct AttacherConfig {
    /// Symbolic key of the transient tier.
    pub cache_key: String,
    /// Symbolic key of the permanent tier.
    pub store_key: String,
    /// Run the default derivation processor as part of promotion.
    pub create_on_promote: bool,
    pub derivative_storage: DerivativeStorage,
    pub default_url: Option<DefaultUrlFn>,
}

impl Default for AttacherConfig {
    fn default() -> Self {
        AttacherConfig {
            cache_key: "cache".to_string(),
            store_key: "store".to_string(),
            create_on_promote: false,
            derivative_storage: DerivativeStorage::default(),
            default_url: None,
        }
    }
}

impl AttacherConfig {
    pub fn from_config(config: &Config) -> Self {
        AttacherConfig {
            cache_key: config.cache_key.clone(),
            store_key: config.store_key.clone(),
            create_on_promote: config.create_on_promote,
            ..Default::default()
        }
    }
}

impl fmt::Debug for AttacherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttacherConfig")
            .field("cache_key", &self.cache_key)
            .field("store_key", &self.store_key)
            .field("create_on_promote", &self.create_on_promote)
            .field("derivative_storage", &self.derivative_storage)
            .field("default_url", &self.default_url.as_ref().map(|_| ".."))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    /// Target tier; defaults to the cache tier.
    pub storage: Option<String>,
    pub upload: UploadOptions,
}

#[derive(Debug, Clone, Default)]
pub struct PromoteOptions {
    /// Target tier; defaults to the store tier.
    pub storage: Option<String>,
    /// Explicit object id for the promoted file.
    pub location: Option<String>,
    /// Treat promoting an already-stored attachment as a no-op instead of
    /// an error.
    pub idempotent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DerivativesOptions {
    /// Target tier override; otherwise resolved via
    /// [`AttacherConfig::derivative_storage`].
    pub storage: Option<String>,
    pub upload: UploadOptions,
    /// Options forwarded to the derivation processor.
    pub processor_options: DerivationOptions,
}

/// Snapshot of displaced attacher state, retained until explicitly
/// destroyed so cleanup can run after the owning record's save commits.
#[derive(Debug)]
pub struct AttachedState {
    pub file: Option<UploadedFile>,
    pub derivatives: DerivativeTree,
}

impl AttachedState {
    fn is_empty(&self) -> bool {
        self.file.is_none() && self.derivatives.is_empty()
    }
}

/// Attachment state machine bound to one slot on one record, or standalone.
pub struct Attacher {
    pub(crate) uploader: Uploader,
    pub(crate) processors: DerivationRegistry,
    pub(crate) config: AttacherConfig,
    pub(crate) context: Context,
    pub(crate) file: Option<UploadedFile>,
    pub(crate) derivatives: DerivativeTree,
    pub(crate) previous: Option<AttachedState>,
    pub(crate) errors: Vec<String>,
    pub(crate) record: Option<Box<dyn RecordAdapter>>,
    pub(crate) column: Option<String>,
}

impl Attacher {
    pub fn new(registry: StorageRegistry, config: AttacherConfig) -> Self {
        Attacher {
            uploader: Uploader::new(registry),
            processors: DerivationRegistry::new(),
            config,
            context: Context::new(),
            file: None,
            derivatives: DerivativeTree::empty(),
            previous: None,
            errors: Vec::new(),
            record: None,
            column: None,
        }
    }

    /// Builds an attacher with uploader validators and tier keys taken from
    /// the environment-driven configuration.
    pub fn from_config(registry: StorageRegistry, config: &Config) -> Self {
        let uploader = Uploader::from_config(registry.clone(), config);
        Self::new(registry, AttacherConfig::from_config(config)).with_uploader(uploader)
    }

    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_processors(mut self, processors: DerivationRegistry) -> Self {
        self.processors = processors;
        self
    }

    // --- accessors -------------------------------------------------------

    pub fn file(&self) -> Option<&UploadedFile> {
        self.file.as_ref()
    }

    pub fn derivatives(&self) -> &DerivativeTree {
        &self.derivatives
    }

    pub fn previous(&self) -> Option<&AttachedState> {
        self.previous.as_ref()
    }

    /// Validation messages recorded by the last `attach` call.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn config(&self) -> &AttacherConfig {
        &self.config
    }

    pub fn processors(&self) -> &DerivationRegistry {
        &self.processors
    }

    pub fn registry(&self) -> &StorageRegistry {
        self.uploader.registry()
    }

    pub fn attached(&self) -> bool {
        self.file.is_some()
    }

    pub fn cached(&self) -> bool {
        self.file
            .as_ref()
            .is_some_and(|file| file.storage_key() == self.config.cache_key)
    }

    pub fn stored(&self) -> bool {
        self.file
            .as_ref()
            .is_some_and(|file| file.storage_key() == self.config.store_key)
    }

    // --- state machine ---------------------------------------------------

    /// Uploads `io` (to the cache tier unless overridden) and makes it the
    /// current file. The displaced file and derivatives move into
    /// `previous` for deferred cleanup.
    ///
    /// When a validator rejects the file the assignment is aborted: prior
    /// state is left untouched, the messages are recorded on the attacher
    /// (see [`Attacher::errors`]) and `Ok(None)` is returned. I/O failures
    /// raise.
    pub async fn attach(
        &mut self,
        io: RawFile,
        options: AttachOptions,
    ) -> AttacherResult<Option<&UploadedFile>> {
        let storage_key = options
            .storage
            .as_deref()
            .unwrap_or(&self.config.cache_key);

        match self
            .uploader
            .upload(io, storage_key, &self.context, &options.upload)
            .await
        {
            Ok(file) => {
                self.errors.clear();
                self.change(Some(file));
                Ok(self.file.as_ref())
            }
            Err(AttacherError::Validation(messages)) => {
                self.errors = messages;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Re-uploads the cached file (and cached derivative leaves) to the
    /// store tier. With `create_on_promote` enabled, the default derivation
    /// processor then runs against the promoted file and its results are
    /// merged in.
    ///
    /// Promoting an attachment that is not on the cache tier is a
    /// [`AttacherError::Promotion`] error unless `options.idempotent` is
    /// set and the file is already stored.
    pub async fn promote(&mut self, options: PromoteOptions) -> AttacherResult<UploadedFile> {
        let store_key = options
            .storage
            .clone()
            .unwrap_or_else(|| self.config.store_key.clone());
        let file = self.file.clone().ok_or(AttacherError::NoFileAttached)?;

        if file.storage_key() == store_key {
            if options.idempotent {
                return Ok(file);
            }
            return Err(AttacherError::Promotion(format!(
                "attachment is already stored on {store_key:?}"
            )));
        }
        if file.storage_key() != self.config.cache_key {
            return Err(AttacherError::Promotion(format!(
                "attachment on {:?} is not cached",
                file.storage_key()
            )));
        }

        let start = std::time::Instant::now();

        let promoted = self
            .upload_copy(&file, &store_key, options.location.clone())
            .await?;
        self.set(Some(promoted.clone()));

        self.promote_derivatives(&options).await?;

        if self.config.create_on_promote {
            let options = DerivativesOptions::default();
            self.create_derivatives(None, None, &options).await?;
        }

        tracing::info!(
            storage = %store_key,
            id = %promoted.id(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Promotion finished"
        );

        Ok(promoted)
    }

    /// Re-uploads every cache-tier derivative leaf to its resolved target
    /// tier, preserving tree shape and paths. Leaves on other tiers are
    /// left untouched.
    pub async fn promote_derivatives(&mut self, options: &PromoteOptions) -> AttacherResult<()> {
        let cached: Vec<(Vec<PathSegment>, UploadedFile)> = self
            .derivatives
            .leaves()
            .into_iter()
            .filter(|(_, leaf)| leaf.storage_key() == self.config.cache_key)
            .map(|(path, leaf)| (path, leaf.clone()))
            .collect();

        for (path, leaf) in cached {
            let target = match &options.storage {
                Some(storage) => storage.clone(),
                None => self.derivative_storage(&path),
            };
            let promoted = self
                .upload_copy(&leaf, &target, options.location.clone())
                .await?;

            tracing::info!(
                derivative_path = %format_path(&path),
                storage = %target,
                id = %promoted.id(),
                "Derivative promoted"
            );

            self.derivatives.set_leaf(&path, promoted)?;
        }

        Ok(())
    }

    /// Deletes the current file and every derivative leaf from their
    /// backends. Already-absent objects are skipped; in-memory state is
    /// left intact.
    pub async fn destroy(&self) -> AttacherResult<()> {
        let start = std::time::Instant::now();
        let mut deleted = 0usize;

        if let Some(file) = &self.file {
            file.delete().await?;
            deleted += 1;
        }
        for (_, leaf) in self.derivatives.leaves() {
            leaf.delete().await?;
            deleted += 1;
        }

        tracing::info!(
            deleted,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Attachment deleted"
        );

        Ok(())
    }

    /// Deletes the files snapshotted in `previous` and discards the
    /// snapshot. Used for deferred cleanup after a record save commits.
    pub async fn destroy_previous(&mut self) -> AttacherResult<()> {
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };

        if let Some(file) = &previous.file {
            file.delete().await?;
        }
        for (_, leaf) in previous.derivatives.leaves() {
            leaf.delete().await?;
        }

        Ok(())
    }

    /// Replaces the current file, recording the displaced file and
    /// derivatives into `previous`.
    pub fn change(&mut self, file: Option<UploadedFile>) {
        let displaced = AttachedState {
            file: self.file.take(),
            derivatives: std::mem::take(&mut self.derivatives),
        };
        if !displaced.is_empty() {
            self.previous = Some(displaced);
        }
        self.file = file;
    }

    /// Replaces the current file without touching derivatives or
    /// `previous`.
    pub fn set(&mut self, file: Option<UploadedFile>) {
        self.file = file;
    }

    // --- derivatives -----------------------------------------------------

    /// Runs a derivation processor without saving its results. `source`
    /// defaults to the current file.
    pub async fn process_derivatives(
        &self,
        processor: Option<&str>,
        source: Option<DerivationSource>,
        options: &DerivationOptions,
    ) -> AttacherResult<SourceTree> {
        let source = match source {
            Some(source) => source,
            None => DerivationSource::Uploaded(
                self.file.clone().ok_or(AttacherError::NoFileAttached)?,
            ),
        };
        Ok(self.processors.process(processor, source, options).await?)
    }

    /// Runs a derivation processor, uploads the resulting tree and merges
    /// it into the current derivatives.
    pub async fn create_derivatives(
        &mut self,
        processor: Option<&str>,
        source: Option<DerivationSource>,
        options: &DerivativesOptions,
    ) -> AttacherResult<&DerivativeTree> {
        let raw = self
            .process_derivatives(processor, source, &options.processor_options)
            .await?;
        self.add_derivatives(raw, options).await
    }

    /// Uploads one raw source as the derivative at `path`, without merging
    /// it into the tree.
    pub async fn upload_derivative(
        &self,
        path: &[PathSegment],
        io: RawFile,
        options: &DerivativesOptions,
    ) -> AttacherResult<UploadedFile> {
        let storage_key = match &options.storage {
            Some(storage) => storage.clone(),
            None => self.derivative_storage(path),
        };

        let mut upload_options = options.upload.clone();
        upload_options.validate = false;

        let file = self
            .uploader
            .upload(io, &storage_key, &self.context, &upload_options)
            .await?;

        tracing::info!(
            derivative_path = %format_path(path),
            storage = %storage_key,
            id = %file.id(),
            "Derivative uploaded"
        );

        Ok(file)
    }

    /// Uploads a tree of raw sources, preserving its shape.
    pub async fn upload_derivatives(
        &self,
        tree: SourceTree,
        options: &DerivativesOptions,
    ) -> AttacherResult<DerivativeTree> {
        self.upload_tree(Vec::new(), tree, options).await
    }

    fn upload_tree<'a>(
        &'a self,
        prefix: Vec<PathSegment>,
        tree: SourceTree,
        options: &'a DerivativesOptions,
    ) -> BoxFuture<'a, AttacherResult<DerivativeTree>> {
        Box::pin(async move {
            match tree {
                SourceTree::Leaf(io) => {
                    let file = self.upload_derivative(&prefix, io, options).await?;
                    Ok(DerivativeTree::Leaf(file))
                }
                SourceTree::Map(map) => {
                    let mut uploaded = indexmap::IndexMap::with_capacity(map.len());
                    for (key, child) in map {
                        let mut path = prefix.clone();
                        path.push(PathSegment::Key(key.clone()));
                        uploaded.insert(key, self.upload_tree(path, child, options).await?);
                    }
                    Ok(DerivativeTree::Map(uploaded))
                }
                SourceTree::List(list) => {
                    let mut uploaded = Vec::with_capacity(list.len());
                    for (index, child) in list.into_iter().enumerate() {
                        let mut path = prefix.clone();
                        path.push(PathSegment::Index(index));
                        uploaded.push(self.upload_tree(path, child, options).await?);
                    }
                    Ok(DerivativeTree::List(uploaded))
                }
            }
        })
    }

    /// Uploads a tree of raw sources and deep-merges it into the current
    /// derivatives.
    pub async fn add_derivatives(
        &mut self,
        tree: SourceTree,
        options: &DerivativesOptions,
    ) -> AttacherResult<&DerivativeTree> {
        let uploaded = self.upload_derivatives(tree, options).await?;
        self.merge_derivatives(uploaded)?;
        Ok(&self.derivatives)
    }

    /// Uploads one raw source and merges it in under the given top-level
    /// name. Returns the uploaded derivative.
    pub async fn add_derivative(
        &mut self,
        name: impl Into<String>,
        io: RawFile,
        options: &DerivativesOptions,
    ) -> AttacherResult<UploadedFile> {
        let name = name.into();
        let path: Vec<PathSegment> = vec![PathSegment::Key(name.clone())];
        let file = self.upload_derivative(&path, io, options).await?;

        let mut entry = indexmap::IndexMap::new();
        entry.insert(name, DerivativeTree::Leaf(file.clone()));
        self.merge_derivatives(DerivativeTree::Map(entry))?;

        Ok(file)
    }

    /// Deep-merges already-uploaded derivatives into the tree.
    pub fn merge_derivatives(&mut self, tree: DerivativeTree) -> AttacherResult<()> {
        self.derivatives.merge(tree)
    }

    /// Wholesale replaces the derivative tree.
    pub fn set_derivatives(&mut self, tree: DerivativeTree) -> &DerivativeTree {
        self.derivatives = tree;
        &self.derivatives
    }

    /// Detaches the subtree at `path`, optionally deleting its files from
    /// storage, and returns it.
    pub async fn remove_derivative(
        &mut self,
        path: &[PathSegment],
        delete: bool,
    ) -> AttacherResult<Option<DerivativeTree>> {
        let removed = self.derivatives.remove(path);

        if delete {
            if let Some(subtree) = &removed {
                for (_, leaf) in subtree.leaves() {
                    leaf.delete().await?;
                }
            }
        }

        Ok(removed)
    }

    /// The original file for an empty path, or the derivative leaf at
    /// `path`.
    pub fn get(&self, path: &[PathSegment]) -> Option<&UploadedFile> {
        if path.is_empty() {
            self.file.as_ref()
        } else {
            self.derivatives.get(path)?.as_leaf()
        }
    }

    /// The derivative subtree at `path`; the whole tree for an empty path.
    pub fn get_derivatives(&self, path: &[PathSegment]) -> Option<&DerivativeTree> {
        self.derivatives.get(path)
    }

    /// URL of the original file (empty path) or a derivative. Missing
    /// targets consult the configured default-URL resolver and otherwise
    /// yield `None`.
    pub async fn url(
        &self,
        path: &[PathSegment],
        options: &UrlOptions,
    ) -> AttacherResult<Option<String>> {
        let target = if path.is_empty() {
            self.file.as_ref()
        } else {
            self.derivatives.get(path).and_then(DerivativeTree::as_leaf)
        };

        match target {
            Some(file) => Ok(Some(file.url(options).await?)),
            None => Ok(self
                .config
                .default_url
                .as_ref()
                .and_then(|resolve| resolve(path, options))),
        }
    }

    // --- serialization ---------------------------------------------------

    pub fn attachment_data(&self) -> AttachmentData {
        AttachmentData {
            file: self.file.as_ref().map(|file| file.data().clone()),
            derivatives: (!self.derivatives.is_empty()).then(|| self.derivatives.to_data()),
        }
    }

    /// Serializable column value, or `None` when both the file and the
    /// derivatives are empty.
    pub fn data(&self) -> Option<Value> {
        self.attachment_data().to_value()
    }

    /// Inverse of [`Attacher::data`]. `None` clears the attachment. On a
    /// parse error the current state is left unchanged.
    pub fn load_data(&mut self, value: Option<&Value>) -> AttacherResult<()> {
        let parsed = match value {
            Some(value) => AttachmentData::parse(value)?,
            None => AttachmentData::default(),
        };
        self.apply_data(parsed);
        Ok(())
    }

    /// JSON-encoded column value.
    pub fn column_data(&self) -> AttacherResult<Option<String>> {
        Ok(self.attachment_data().to_json()?)
    }

    /// Loads state from the JSON-encoded column value.
    pub fn load_column(&mut self, data: Option<&str>) -> AttacherResult<()> {
        let parsed = match data {
            Some(data) if !data.trim().is_empty() => AttachmentData::parse_json(data)?,
            _ => AttachmentData::default(),
        };
        self.apply_data(parsed);
        Ok(())
    }

    pub(crate) fn apply_data(&mut self, data: AttachmentData) {
        let registry = self.uploader.registry().clone();
        self.file = data
            .file
            .map(|file| UploadedFile::new(file, registry.clone()));
        self.derivatives = data
            .derivatives
            .map(|tree| DerivativeTree::from_data(&tree, &registry))
            .unwrap_or_default();
    }

    // --- internals -------------------------------------------------------

    fn derivative_storage(&self, path: &[PathSegment]) -> String {
        match &self.config.derivative_storage {
            DerivativeStorage::Store => self.config.store_key.clone(),
            DerivativeStorage::Fixed(key) => key.clone(),
            DerivativeStorage::Resolver(resolve) => resolve(path),
        }
    }

    /// Re-uploads a stored file to another tier, carrying its metadata
    /// over.
    async fn upload_copy(
        &self,
        file: &UploadedFile,
        storage_key: &str,
        location: Option<String>,
    ) -> AttacherResult<UploadedFile> {
        let data = file.read().await?;

        let mut io = RawFile::from_bytes(data);
        io.filename = file.filename().map(String::from);
        io.mime_type = file.mime_type().map(String::from);

        let options = UploadOptions {
            location,
            metadata: Some(file.metadata().clone()),
            validate: false,
            ..Default::default()
        };

        self.uploader
            .upload(io, storage_key, &self.context, &options)
            .await
    }
}

impl fmt::Debug for Attacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attacher")
            .field("file", &self.file)
            .field("derivatives", &self.derivatives)
            .field("errors", &self.errors)
            .field("bound", &self.record.is_some())
            .finish()
    }
}
