//! Shared fixtures for attacher integration tests.

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;

use affix_attacher::{
    Attacher, AttacherConfig, MemoryStorage, PersistError, RawFile, RecordAdapter,
    StorageRegistry,
};

static TRACING: Once = Once::new();

/// Routes structured events through the test harness; set RUST_LOG to see
/// them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory byte source, like a freshly received upload.
pub fn fakeio(content: &str) -> RawFile {
    RawFile::from_bytes(content.as_bytes().to_vec())
}

/// Registry with memory backends plus handles for inspecting their
/// contents.
pub struct TestEnv {
    pub registry: StorageRegistry,
    pub cache: Arc<MemoryStorage>,
    pub store: Arc<MemoryStorage>,
    pub other_store: Arc<MemoryStorage>,
}

impl TestEnv {
    pub fn new() -> Self {
        init_tracing();
        let registry = StorageRegistry::new();
        let cache = Arc::new(MemoryStorage::new());
        let store = Arc::new(MemoryStorage::new());
        let other_store = Arc::new(MemoryStorage::new());
        registry.register("cache", cache.clone());
        registry.register("store", store.clone());
        registry.register("other_store", other_store.clone());
        TestEnv {
            registry,
            cache,
            store,
            other_store,
        }
    }

    pub fn attacher(&self) -> Attacher {
        Attacher::new(self.registry.clone(), AttacherConfig::default())
    }
}

/// The saved state of the fake record's row.
#[derive(Default)]
pub struct Row {
    pub avatar_data: Option<String>,
    pub note: Option<String>,
}

pub type Db = Arc<Mutex<Row>>;

pub fn db() -> Db {
    Arc::new(Mutex::new(Row::default()))
}

/// Record adapter over a shared row, so multiple record instances can race
/// on the same underlying state.
///
/// `note` stands in for an unrelated record attribute: mutations stay
/// in-memory (reachable through [`TestRecord::note_handle`]) until
/// `save_changes` copies them into the row.
pub struct TestRecord {
    db: Db,
    avatar_data: Option<String>,
    note: Arc<Mutex<Option<String>>>,
}

impl TestRecord {
    /// Loads a record instance from the shared row.
    pub fn load(db: &Db) -> Self {
        let row = db.lock().unwrap();
        TestRecord {
            db: db.clone(),
            avatar_data: row.avatar_data.clone(),
            note: Arc::new(Mutex::new(row.note.clone())),
        }
    }

    /// Handle for mutating the unsaved `note` attribute from outside.
    pub fn note_handle(&self) -> Arc<Mutex<Option<String>>> {
        self.note.clone()
    }
}

#[async_trait]
impl RecordAdapter for TestRecord {
    fn model_name(&self) -> &str {
        "user"
    }

    fn record_id(&self) -> Option<String> {
        Some("1".to_string())
    }

    fn read_column(&self, _name: &str) -> Option<String> {
        self.avatar_data.clone()
    }

    fn write_column(&mut self, _name: &str, value: Option<String>) {
        self.avatar_data = value;
    }

    async fn reload_column(&self, _name: &str) -> Result<Option<String>, PersistError> {
        Ok(self.db.lock().unwrap().avatar_data.clone())
    }

    async fn save_changes(&mut self) -> Result<(), PersistError> {
        let mut row = self.db.lock().unwrap();
        row.avatar_data = self.avatar_data.clone();
        row.note = self.note.lock().unwrap().clone();
        Ok(())
    }
}
