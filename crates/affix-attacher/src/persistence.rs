//! Record binding and the optimistic persistence protocol.
//!
//! Between reading a record's attachment and writing a promoted result
//! back, another actor may have replaced or removed the attachment. There
//! are no locks here: safety comes from reload-compare-write. The bound
//! record's column is re-read, its serialized file identity is compared to
//! the pre-operation snapshot, and on mismatch the write is refused, the
//! freshly promoted files are deleted, and the attacher adopts whichever
//! attachment won the race.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use affix_core::{AttachmentData, FileData};
use affix_storage::UploadedFile;

use crate::attacher::{Attacher, PromoteOptions};
use crate::context::{Context, RecordIdent};
use crate::{AttacherError, AttacherResult, PersistError};

/// Capability interface to the host record.
///
/// Adapters are deliberately minimal: column access, a fresh column read,
/// and a save. Everything else (transactions, callbacks, dirty tracking)
/// stays on the ORM side of the boundary.
#[async_trait]
pub trait RecordAdapter: Send + Sync {
    /// Model name, used for pretty upload locations.
    fn model_name(&self) -> &str {
        "record"
    }

    fn record_id(&self) -> Option<String> {
        None
    }

    /// Current in-memory column value.
    fn read_column(&self, name: &str) -> Option<String>;

    /// Sets the in-memory column value; persisted by `save_changes`.
    fn write_column(&mut self, name: &str, value: Option<String>);

    /// Fresh read of the column from the backing store. Must not clobber
    /// unsaved attribute changes held by the record.
    async fn reload_column(&self, name: &str) -> Result<Option<String>, PersistError>;

    async fn save_changes(&mut self) -> Result<(), PersistError>;
}

pub type ReloadFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<String>, PersistError>> + Send + Sync>;
pub type PersistFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), PersistError>> + Send + Sync>;

/// How the race check obtains the record's current column value.
#[derive(Clone, Default)]
pub enum ReloadStrategy {
    /// Read through the record adapter.
    #[default]
    Fetch,
    /// Skip the race check entirely; the caller accepts the risk.
    Skip,
    /// Caller-supplied fetch.
    Custom(ReloadFn),
}

/// How the result is written back.
#[derive(Clone, Default)]
pub enum PersistStrategy {
    /// Save through the record adapter.
    #[default]
    Save,
    /// Skip the write-back; the caller persists on their own schedule.
    Skip,
    /// Caller-supplied save.
    Custom(PersistFn),
}

#[derive(Clone, Default)]
pub struct AtomicOptions {
    pub reload: ReloadStrategy,
    pub persist: PersistStrategy,
    pub promote: PromoteOptions,
}

impl Attacher {
    /// Binds a new attacher to a record's attachment slot. The backing
    /// column is `{name}_data`; its current value is loaded immediately.
    pub fn from_record(
        record: Box<dyn RecordAdapter>,
        name: &str,
        registry: affix_storage::StorageRegistry,
        config: crate::AttacherConfig,
    ) -> AttacherResult<Self> {
        let mut attacher = Self::new(registry, config);
        attacher.bind_record(record, name)?;
        Ok(attacher)
    }

    /// Binds an existing attacher (keeping its uploader, validators and
    /// processors) to a record.
    pub fn bind_record(
        &mut self,
        record: Box<dyn RecordAdapter>,
        name: &str,
    ) -> AttacherResult<()> {
        let column = format!("{name}_data");
        let data = record.read_column(&column);
        self.load_column(data.as_deref())?;

        self.context = Context::bind(
            Some(RecordIdent {
                model: record.model_name().to_string(),
                id: record.record_id(),
            }),
            name,
        );
        self.record = Some(record);
        self.column = Some(column);
        Ok(())
    }

    pub fn record(&self) -> Option<&dyn RecordAdapter> {
        self.record.as_deref()
    }

    pub fn record_mut(&mut self) -> Option<&mut (dyn RecordAdapter + 'static)> {
        self.record.as_deref_mut()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Writes the current column data into the bound record's in-memory
    /// state.
    pub fn sync_column(&mut self) -> AttacherResult<()> {
        let value = self.column_data()?;
        let column = self
            .column
            .clone()
            .ok_or(PersistError::NotSupported("column binding"))?;
        let record = self
            .record
            .as_deref_mut()
            .ok_or(PersistError::NotSupported("column binding"))?;
        record.write_column(&column, value);
        Ok(())
    }

    /// Plain write-through: sync the column and save, with no race check.
    pub async fn persist(&mut self) -> AttacherResult<()> {
        self.ensure_bound()?;
        self.sync_column()?;
        if let Some(record) = self.record.as_deref_mut() {
            record.save_changes().await?;
        }
        Ok(())
    }

    /// Promotes the cached file and persists the result, refusing to
    /// overwrite a concurrently changed attachment.
    ///
    /// The reload-compare-write sequence: snapshot the cached file, promote
    /// (the race window; uploads can be slow), re-read the column, compare
    /// the reloaded file identity to the snapshot. On mismatch the freshly
    /// promoted files are deleted, the attacher and record adopt the
    /// reloaded value, and [`AttacherError::AttachmentChanged`] is
    /// returned. On match the column is written and the record saved.
    pub async fn atomic_promote(&mut self, options: AtomicOptions) -> AttacherResult<UploadedFile> {
        self.atomic_promote_with(options, |_record| {}).await
    }

    /// [`Attacher::atomic_promote`] with a callback invoked on the record
    /// after the race check and before persisting, the place for
    /// caller-side record mutations that must ride along with the save.
    /// The callback is not invoked when the race check fails.
    pub async fn atomic_promote_with<F>(
        &mut self,
        options: AtomicOptions,
        before_persist: F,
    ) -> AttacherResult<UploadedFile>
    where
        F: FnOnce(&mut dyn RecordAdapter),
    {
        self.ensure_bound()?;
        let snapshot = self.file.clone().ok_or(AttacherError::NoFileAttached)?;
        let expected = snapshot.data().clone();

        let promoted = self.promote(options.promote.clone()).await?;

        if let Some(fresh) = self.reload_fresh(&options.reload).await? {
            let reloaded = parse_column(fresh.as_deref())?;
            if reloaded.file.as_ref() != Some(&expected) {
                self.destroy().await?;
                self.restore_fresh(fresh)?;
                return Err(AttacherError::AttachmentChanged("promotion"));
            }
        }

        self.finish_persist(&options.persist, before_persist).await?;
        Ok(promoted)
    }

    /// Persists the current attacher state under the same race check as
    /// [`Attacher::atomic_promote`], without promoting anything.
    ///
    /// `current_file` asserts the expected pre-state explicitly; when
    /// `None` the in-memory file is used.
    pub async fn atomic_persist(
        &mut self,
        current_file: Option<FileData>,
        options: AtomicOptions,
    ) -> AttacherResult<()> {
        self.atomic_persist_with(current_file, options, |_record| {})
            .await
    }

    pub async fn atomic_persist_with<F>(
        &mut self,
        current_file: Option<FileData>,
        options: AtomicOptions,
        before_persist: F,
    ) -> AttacherResult<()>
    where
        F: FnOnce(&mut dyn RecordAdapter),
    {
        self.ensure_bound()?;
        let expected =
            current_file.or_else(|| self.file.as_ref().map(|file| file.data().clone()));

        if let Some(fresh) = self.reload_fresh(&options.reload).await? {
            let reloaded = parse_column(fresh.as_deref())?;
            if reloaded.file != expected {
                self.restore_fresh(fresh)?;
                return Err(AttacherError::AttachmentChanged("persistence"));
            }
        }

        self.finish_persist(&options.persist, before_persist).await
    }

    fn ensure_bound(&self) -> Result<(), PersistError> {
        if self.record.is_none() || self.column.is_none() {
            return Err(PersistError::NotSupported("persistence"));
        }
        Ok(())
    }

    /// Obtains the record's current column value per the reload strategy.
    /// `None` means the race check was skipped.
    async fn reload_fresh(
        &self,
        strategy: &ReloadStrategy,
    ) -> AttacherResult<Option<Option<String>>> {
        match strategy {
            ReloadStrategy::Fetch => {
                let record = self
                    .record
                    .as_deref()
                    .ok_or(PersistError::NotSupported("reload"))?;
                let column = self
                    .column
                    .as_deref()
                    .ok_or(PersistError::NotSupported("reload"))?;
                Ok(Some(record.reload_column(column).await?))
            }
            ReloadStrategy::Skip => Ok(None),
            ReloadStrategy::Custom(reload) => Ok(Some(reload().await?)),
        }
    }

    /// Adopts the column value that won the race, in the attacher and in
    /// the record's in-memory state.
    fn restore_fresh(&mut self, fresh: Option<String>) -> AttacherResult<()> {
        self.load_column(fresh.as_deref())?;
        let column = self
            .column
            .clone()
            .ok_or(PersistError::NotSupported("column binding"))?;
        if let Some(record) = self.record.as_deref_mut() {
            record.write_column(&column, fresh);
        }
        Ok(())
    }

    async fn finish_persist<F>(
        &mut self,
        strategy: &PersistStrategy,
        before_persist: F,
    ) -> AttacherResult<()>
    where
        F: FnOnce(&mut dyn RecordAdapter),
    {
        self.sync_column()?;

        if let Some(record) = self.record.as_deref_mut() {
            before_persist(record);
        }

        match strategy {
            PersistStrategy::Save => {
                let record = self
                    .record
                    .as_deref_mut()
                    .ok_or(PersistError::NotSupported("persistence"))?;
                record.save_changes().await?;
            }
            PersistStrategy::Skip => {}
            PersistStrategy::Custom(persist) => persist().await?,
        }
        Ok(())
    }
}

fn parse_column(data: Option<&str>) -> AttacherResult<AttachmentData> {
    match data {
        Some(data) if !data.trim().is_empty() => Ok(AttachmentData::parse_json(data)?),
        _ => Ok(AttachmentData::default()),
    }
}
