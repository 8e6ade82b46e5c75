//! Registry construction from configuration.

use std::sync::Arc;

#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::{MemoryStorage, Storage, StorageError, StorageRegistry, StorageResult};
use affix_core::Config;

/// Builds the storage registry for the configured cache and store tiers.
pub async fn create_registry(config: &Config) -> StorageResult<StorageRegistry> {
    let registry = StorageRegistry::new();

    let cache = create_backend(config, &config.cache_backend, &config.cache_key).await?;
    registry.register(config.cache_key.clone(), cache);

    let store = create_backend(config, &config.store_backend, &config.store_key).await?;
    registry.register(config.store_key.clone(), store);

    Ok(registry)
}

async fn create_backend(
    config: &Config,
    backend: &str,
    tier: &str,
) -> StorageResult<Arc<dyn Storage>> {
    match backend {
        "memory" => Ok(Arc::new(MemoryStorage::new())),

        #[cfg(feature = "storage-local")]
        "local" => {
            let base_path = config.local_storage_path.as_deref().ok_or_else(|| {
                StorageError::Config("AFFIX_LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.local_storage_base_url.as_deref().ok_or_else(|| {
                StorageError::Config("AFFIX_LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            // Each tier gets its own subdirectory so cache and store never collide.
            let path = std::path::Path::new(base_path).join(tier);
            let url = format!("{}/{}", base_url.trim_end_matches('/'), tier);

            let storage = LocalStorage::new(path, url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        "local" => Err(StorageError::Config(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        other => Err(StorageError::Config(format!(
            "Unknown storage backend kind: {other}"
        ))),
    }
}
