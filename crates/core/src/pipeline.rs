//! 파이프라인 생명주기 및 협력자 trait
//!
//! [`Pipeline`]은 데몬이 구동하는 start/stop/health 계약입니다.
//! [`AppMetadataCache`]와 [`EventShipper`]는 라우터와 외부 세계 사이의
//! 경계입니다. 각각 플랫폼 메타데이터 조회와 syslog 출력에 해당합니다.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::FirehoseError;
use crate::fields::Fields;

/// 실행 중인 파이프라인이 보고하는 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// 동작 중이지만 확인이 필요한 상태
    Degraded(String),
    /// 이벤트를 전달할 수 없는 상태
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// start/stop/health 생명주기
///
/// 구현체는 `async fn`을 그대로 사용할 수 있습니다.
pub trait Pipeline: Send {
    /// 출력을 연결하고 백그라운드 태스크를 spawn합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), FirehoseError>> + Send;

    /// 백그라운드 태스크를 정지합니다. `start` 이후 한 번 호출합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), FirehoseError>> + Send;

    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 조회된 애플리케이션 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    pub space_id: String,
    pub space_name: String,
    pub org_id: String,
    pub org_name: String,
}

/// 애플리케이션 메타데이터 조회
///
/// 조회 실패는 에러가 아닙니다. 이벤트에 앱 식별 정보가 붙지 않을 뿐입니다.
pub trait AppMetadataCache: Send + Sync {
    fn lookup(&self, app_id: &str) -> Option<AppInfo>;
}

/// 완성된 이벤트의 출력 대상
///
/// 라우터가 카운터 락을 쥔 채 호출하므로 오래 블로킹하면 안 됩니다.
pub trait EventShipper: Send + Sync {
    fn ship_events(&self, fields: Fields, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("queue".to_owned()).is_healthy());
        assert!(!HealthStatus::Degraded("queue".to_owned()).is_unhealthy());
        assert!(HealthStatus::Unhealthy("stopped".to_owned()).is_unhealthy());
    }

    #[test]
    fn app_info_deserializes_partial() {
        let info: AppInfo = serde_json::from_str(r#"{"name":"web","org_name":"acme"}"#).unwrap();
        assert_eq!(info.name, "web");
        assert_eq!(info.org_name, "acme");
        assert!(info.space_name.is_empty());
    }
}
