//! 포워더 설정
//!
//! [`ForwarderConfig`]는 [`FirehoseConfig`](firehose_core::config::FirehoseConfig)의
//! `[routing]`, `[syslog]`, `[intercept]` 섹션을 모으고,
//! 종료 타임아웃 같은 포워더 전용 설정을 추가합니다.
//!
//! # 사용 예시
//!
//! ```ignore
//! use firehose_core::config::FirehoseConfig;
//! use firehose_forwarder::config::ForwarderConfig;
//!
//! let core_config = FirehoseConfig::default();
//! let config = ForwarderConfig::from_core(&core_config);
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use firehose_core::config::{
    FirehoseConfig, InterceptConfig, MAX_STATS_INTERVAL_SECS, ORG_PLACEHOLDER, SyslogConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::ForwarderError;
use crate::shipper::formatter_for;
use crate::shipper::transport::TransportSettings;

const MAX_ENVELOPE_QUEUE_CAPACITY: usize = 1_000_000;
const MAX_PACKET_QUEUE_CAPACITY: usize = 10_000_000;
const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// 쉼표로 구분된 이벤트 타입 이름. 비어 있으면 `LogMessage`를 선택합니다.
    pub selected_events: String,
    /// 테넌트 필터 규칙 파일. 비어 있으면 필터링하지 않습니다.
    pub filter_path: String,
    /// `key:value,key:value` 형식의 정적 필드
    pub extra_fields: String,
    /// 0이면 통계 이벤트 비활성화
    pub stats_interval_secs: u64,
    pub envelope_queue_capacity: usize,
    pub syslog: SyslogConfig,
    pub intercept: InterceptConfig,

    // --- 포워더 전용 설정 ---
    /// `stop`이 백그라운드 태스크를 abort하기 전 대기하는 시간
    pub shutdown_timeout_secs: u64,
    /// 이 비율을 넘으면 패킷 큐 상태를 degraded로 보고
    pub degraded_queue_ratio: f64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self::from_core(&FirehoseConfig::default())
    }
}

impl ForwarderConfig {
    /// 코어 설정에서 생성합니다. 포워더 전용 필드는 기본값을 사용합니다.
    pub fn from_core(core: &FirehoseConfig) -> Self {
        Self {
            selected_events: core.routing.selected_events.clone(),
            filter_path: core.routing.filter_path.clone(),
            extra_fields: core.routing.extra_fields.clone(),
            stats_interval_secs: core.routing.stats_interval_secs,
            envelope_queue_capacity: core.routing.envelope_queue_capacity,
            syslog: core.syslog.clone(),
            intercept: core.intercept.clone(),
            shutdown_timeout_secs: 5,
            degraded_queue_ratio: 0.9,
        }
    }

    /// 필터 규칙 경로. 필터링이 꺼져 있으면 `None`
    pub fn filter_path(&self) -> Option<&Path> {
        let trimmed = self.filter_path.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }

    /// 통계 주기. 비활성화되어 있으면 `None`
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// `..` 컴포넌트가 있는 경로를 거부합니다.
    fn validate_path(field: &str, path_str: &str) -> Result<(), ForwarderError> {
        let path = PathBuf::from(path_str);
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ForwarderError::Config {
                field: field.to_owned(),
                reason: format!("path '{path_str}' contains path traversal pattern '..'"),
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.stats_interval_secs > MAX_STATS_INTERVAL_SECS {
            return Err(ForwarderError::Config {
                field: "stats_interval_secs".to_owned(),
                reason: format!("must be at most {MAX_STATS_INTERVAL_SECS} (0 disables)"),
            });
        }

        if self.envelope_queue_capacity == 0
            || self.envelope_queue_capacity > MAX_ENVELOPE_QUEUE_CAPACITY
        {
            return Err(ForwarderError::Config {
                field: "envelope_queue_capacity".to_owned(),
                reason: format!("must be 1-{MAX_ENVELOPE_QUEUE_CAPACITY}"),
            });
        }

        if self.syslog.queue_capacity == 0 || self.syslog.queue_capacity > MAX_PACKET_QUEUE_CAPACITY
        {
            return Err(ForwarderError::Config {
                field: "syslog.queue_capacity".to_owned(),
                reason: format!("must be 1-{MAX_PACKET_QUEUE_CAPACITY}"),
            });
        }

        if self.shutdown_timeout_secs == 0 || self.shutdown_timeout_secs > MAX_SHUTDOWN_TIMEOUT_SECS
        {
            return Err(ForwarderError::Config {
                field: "shutdown_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_SHUTDOWN_TIMEOUT_SECS}"),
            });
        }

        if !(self.degraded_queue_ratio > 0.0 && self.degraded_queue_ratio <= 1.0) {
            return Err(ForwarderError::Config {
                field: "degraded_queue_ratio".to_owned(),
                reason: "must be in (0, 1]".to_owned(),
            });
        }

        TransportSettings::from_config(&self.syslog)?;
        formatter_for(&self.syslog.formatter)?;

        if let Some(path) = self.filter_path() {
            Self::validate_path("filter_path", &path.display().to_string())?;
        }

        if self.intercept.enabled {
            if !self.intercept.filename_template.contains(ORG_PLACEHOLDER) {
                return Err(ForwarderError::Config {
                    field: "intercept.filename_template".to_owned(),
                    reason: format!("must contain the {ORG_PLACEHOLDER} placeholder"),
                });
            }
            Self::validate_path("intercept.filename_template", &self.intercept.filename_template)?;
            if self.intercept.max_size_mb == 0 {
                return Err(ForwarderError::Config {
                    field: "intercept.max_size_mb".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// [`ForwarderConfig`] 빌더 (주로 테스트와 임베딩용)
#[derive(Default)]
pub struct ForwarderConfigBuilder {
    config: ForwarderConfig,
}

impl ForwarderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_events(mut self, names: impl Into<String>) -> Self {
        self.config.selected_events = names.into();
        self
    }

    pub fn filter_path(mut self, path: impl Into<String>) -> Self {
        self.config.filter_path = path.into();
        self
    }

    pub fn extra_fields(mut self, fields: impl Into<String>) -> Self {
        self.config.extra_fields = fields.into();
        self
    }

    pub fn stats_interval_secs(mut self, secs: u64) -> Self {
        self.config.stats_interval_secs = secs;
        self
    }

    pub fn envelope_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.envelope_queue_capacity = capacity;
        self
    }

    pub fn syslog(mut self, syslog: SyslogConfig) -> Self {
        self.config.syslog = syslog;
        self
    }

    /// 수집 서버 주소와 프로토콜
    pub fn server(mut self, server: impl Into<String>, protocol: impl Into<String>) -> Self {
        self.config.syslog.server = server.into();
        self.config.syslog.protocol = protocol.into();
        self
    }

    pub fn intercept(mut self, intercept: InterceptConfig) -> Self {
        self.config.intercept = intercept;
        self
    }

    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_timeout_secs = secs;
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<ForwarderConfig, ForwarderError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ForwarderConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = FirehoseConfig::default();
        core.routing.selected_events = "LogMessage,Error".to_owned();
        core.routing.stats_interval_secs = 0;
        core.syslog.server = "10.0.0.5:6514".to_owned();

        let config = ForwarderConfig::from_core(&core);
        assert_eq!(config.selected_events, "LogMessage,Error");
        assert_eq!(config.stats_interval(), None);
        assert_eq!(config.syslog.server, "10.0.0.5:6514");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn filter_path_empty_means_none() {
        let mut config = ForwarderConfig::default();
        assert!(config.filter_path().is_none());
        config.filter_path = "  ".to_owned();
        assert!(config.filter_path().is_none());
        config.filter_path = "/etc/firehose/rules.tsv".to_owned();
        assert_eq!(config.filter_path(), Some(Path::new("/etc/firehose/rules.tsv")));
    }

    #[test]
    fn validate_rejects_traversal_in_filter_path() {
        let config = ForwarderConfig {
            filter_path: "/etc/firehose/../shadow".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ForwarderError::Config { field, .. }) if field == "filter_path"
        ));
    }

    #[test]
    fn validate_rejects_template_without_org() {
        let config = ForwarderConfig {
            intercept: InterceptConfig {
                enabled: true,
                filename_template: "/var/log/firehose/all.log".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let result = ForwarderConfigBuilder::new().server("localhost:514", "tls").build();
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_queue() {
        assert!(ForwarderConfigBuilder::new().envelope_queue_capacity(0).build().is_err());
        assert!(ForwarderConfigBuilder::new().shutdown_timeout_secs(0).build().is_err());
    }

    #[test]
    fn validate_rejects_long_stats_interval() {
        let result = ForwarderConfigBuilder::new()
            .stats_interval_secs(MAX_STATS_INTERVAL_SECS + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = ForwarderConfigBuilder::new()
            .selected_events("HttpStartStop")
            .extra_fields("env:prod")
            .server("127.0.0.1:5514", "udp")
            .build()
            .unwrap();
        assert_eq!(config.selected_events, "HttpStartStop");
        assert_eq!(config.syslog.protocol, "udp");
    }
}
