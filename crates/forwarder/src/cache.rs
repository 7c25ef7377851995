//! 인메모리 애플리케이션 메타데이터 캐시
//!
//! 플랫폼 메타데이터 API의 대체 구현입니다. 앱 ID에서 [`AppInfo`]로의 맵이며,
//! 선택적으로 다음 형식의 JSON 파일에서 초기화할 수 있습니다:
//! `{"<app id>": {"name": "...", "space_name": "...", "org_id": "...", ...}}`.

use std::collections::HashMap;
use std::path::Path;

use firehose_core::pipeline::{AppInfo, AppMetadataCache};
use parking_lot::RwLock;

use crate::error::ForwarderError;

#[derive(Debug, Default)]
pub struct InMemoryAppCache {
    apps: RwLock<HashMap<String, AppInfo>>,
}

impl InMemoryAppCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 앱 ID를 키로 하는 JSON 객체에서 항목을 로드합니다.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ForwarderError> {
        let path = path.as_ref();
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ForwarderError::Config {
                    field: "routing.app_cache_path".to_owned(),
                    reason: format!("{}: {e}", path.display()),
                })?;
        let apps: HashMap<String, AppInfo> =
            serde_json::from_str(&content).map_err(|e| ForwarderError::Config {
                field: "routing.app_cache_path".to_owned(),
                reason: format!("{}: invalid JSON: {e}", path.display()),
            })?;

        tracing::debug!(path = %path.display(), apps = apps.len(), "parsed app metadata");

        Ok(Self {
            apps: RwLock::new(apps),
        })
    }

    pub fn insert(&self, app_id: impl Into<String>, info: AppInfo) {
        self.apps.write().insert(app_id.into(), info);
    }

    pub fn remove(&self, app_id: &str) -> Option<AppInfo> {
        self.apps.write().remove(app_id)
    }

    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

impl AppMetadataCache for InMemoryAppCache {
    fn lookup(&self, app_id: &str) -> Option<AppInfo> {
        self.apps.read().get(app_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let cache = InMemoryAppCache::new();
        cache.insert(
            "app-1",
            AppInfo {
                name: "web".to_owned(),
                ..Default::default()
            },
        );
        assert_eq!(cache.lookup("app-1").map(|a| a.name), Some("web".to_owned()));
        assert!(cache.lookup("app-2").is_none());
    }

    #[test]
    fn remove_evicts_entry() {
        let cache = InMemoryAppCache::new();
        cache.insert("app-1", AppInfo::default());
        assert!(cache.remove("app-1").is_some());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        tokio::fs::write(
            &path,
            r#"{"app-1":{"name":"web","space_name":"prod","org_id":"org-1","org_name":"acme"}}"#,
        )
        .await
        .unwrap();
        let cache = InMemoryAppCache::from_json_file(&path).await.unwrap();
        let info = cache.lookup("app-1").unwrap();
        assert_eq!(info.org_name, "acme");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        tokio::fs::write(&path, "[1,2,3]").await.unwrap();
        let err = InMemoryAppCache::from_json_file(&path).await.unwrap_err();
        assert!(matches!(err, ForwarderError::Config { .. }));
    }
}
