//! Deferred attachment operations.
//!
//! Promotion and deletion are handed to background executors as plain
//! serializable payloads, not captured closures: the payload snapshots the
//! attachment data at scheduling time, and execution re-checks that
//! snapshot against fresh record state. The atomic protocol makes late
//! execution safe: a stale promote job observes the concurrent change and
//! is dropped instead of clobbering a newer attachment. Queueing itself
//! (retry, scheduling, transport) stays with the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use affix_core::AttachmentData;
use affix_storage::{StorageRegistry, UploadedFile};

use crate::attacher::{Attacher, AttacherConfig};
use crate::persistence::AtomicOptions;
use crate::{AttacherError, AttacherResult};

/// Payload for promoting a cached attachment later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteJob {
    /// Attachment slot name on the record.
    pub name: String,
    /// Attachment data snapshotted at scheduling time.
    pub data: Value,
}

/// Payload for deleting an attachment's files later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyJob {
    pub data: Value,
}

/// Umbrella type for queues that carry both kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AttachmentJob {
    Promote(PromoteJob),
    Destroy(DestroyJob),
}

impl Attacher {
    /// Snapshots the current attachment as a promote job payload.
    pub fn promote_job(&self) -> AttacherResult<PromoteJob> {
        if self.file().is_none() {
            return Err(AttacherError::NoFileAttached);
        }
        let data = self.data().ok_or(AttacherError::NoFileAttached)?;
        let name = self.context().name().unwrap_or("attachment").to_string();
        Ok(PromoteJob { name, data })
    }

    /// Snapshots the current attachment as a destroy job payload.
    pub fn destroy_job(&self) -> AttacherResult<DestroyJob> {
        let data = self.data().ok_or(AttacherError::NoFileAttached)?;
        Ok(DestroyJob { data })
    }

    /// Executes a promote job against this record-bound attacher.
    ///
    /// Returns `Ok(None)` when the job is stale: the record no longer
    /// holds the snapshotted file, or the atomic protocol detected a
    /// concurrent change mid-promotion. Other failures propagate.
    pub async fn run_promote_job(
        &mut self,
        job: &PromoteJob,
        options: AtomicOptions,
    ) -> AttacherResult<Option<UploadedFile>> {
        let snapshot = AttachmentData::parse(&job.data)?;
        if self.file().map(UploadedFile::data) != snapshot.file.as_ref() {
            return Ok(None);
        }

        match self.atomic_promote(options).await {
            Ok(file) => Ok(Some(file)),
            Err(AttacherError::AttachmentChanged(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Executes a destroy job: rebuilds an unbound attacher from the snapshot
/// and deletes its files. Idempotent, like `destroy` itself.
pub async fn run_destroy_job(job: &DestroyJob, registry: &StorageRegistry) -> AttacherResult<()> {
    let mut attacher = Attacher::new(registry.clone(), AttacherConfig::default());
    attacher.load_data(Some(&job.data))?;
    attacher.destroy().await
}
