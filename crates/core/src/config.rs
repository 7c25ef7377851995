//! 설정 -- `firehose.toml` 파싱 및 런타임 설정
//!
//! [`FirehoseConfig`]가 모든 섹션을 담습니다. 적용 우선순위:
//! 1. CLI 플래그 (데몬이 적용)
//! 2. 환경 변수 (`FIREHOSE_SYSLOG_SERVER=host:514`)
//! 3. 설정 파일
//! 4. `Default` 기본값
//!
//! ```no_run
//! # async fn example() -> Result<(), firehose_core::error::FirehoseError> {
//! use firehose_core::config::FirehoseConfig;
//!
//! let config = FirehoseConfig::load("firehose.toml").await?;
//! let config = FirehoseConfig::parse("[syslog]\nprotocol = \"udp\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FirehoseError};

/// 캡처 파일 이름에서 조직 ID로 치환되는 자리표시자
pub const ORG_PLACEHOLDER: &str = "{org}";

/// 통계 주기 상한
pub const MAX_STATS_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// 최상위 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirehoseConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub syslog: SyslogConfig,
    #[serde(default)]
    pub intercept: InterceptConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FirehoseConfig {
    /// TOML 파일 로드 후 환경 변수 오버라이드 적용, 검증까지 수행합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FirehoseError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일만 로드합니다 (환경 변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FirehoseError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FirehoseError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FirehoseError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FirehoseError> {
        toml::from_str(toml_str).map_err(|e| {
            FirehoseError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// `FIREHOSE_{SECTION}_{FIELD}` 환경 변수 오버라이드를 적용합니다.
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "FIREHOSE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FIREHOSE_GENERAL_LOG_FORMAT");

        override_string(
            &mut self.routing.selected_events,
            "FIREHOSE_ROUTING_SELECTED_EVENTS",
        );
        override_string(&mut self.routing.filter_path, "FIREHOSE_ROUTING_FILTER_PATH");
        override_string(
            &mut self.routing.extra_fields,
            "FIREHOSE_ROUTING_EXTRA_FIELDS",
        );
        override_u64(
            &mut self.routing.stats_interval_secs,
            "FIREHOSE_ROUTING_STATS_INTERVAL_SECS",
        );
        override_string(
            &mut self.routing.app_cache_path,
            "FIREHOSE_ROUTING_APP_CACHE_PATH",
        );
        override_usize(
            &mut self.routing.envelope_queue_capacity,
            "FIREHOSE_ROUTING_ENVELOPE_QUEUE_CAPACITY",
        );

        override_string(&mut self.syslog.server, "FIREHOSE_SYSLOG_SERVER");
        override_string(&mut self.syslog.protocol, "FIREHOSE_SYSLOG_PROTOCOL");
        override_string(&mut self.syslog.tcp_framing, "FIREHOSE_SYSLOG_TCP_FRAMING");
        override_u64(
            &mut self.syslog.connect_timeout_secs,
            "FIREHOSE_SYSLOG_CONNECT_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.syslog.write_timeout_secs,
            "FIREHOSE_SYSLOG_WRITE_TIMEOUT_SECS",
        );
        override_string(&mut self.syslog.formatter, "FIREHOSE_SYSLOG_FORMATTER");
        override_string(&mut self.syslog.hostname, "FIREHOSE_SYSLOG_HOSTNAME");
        override_string(&mut self.syslog.tag, "FIREHOSE_SYSLOG_TAG");
        override_usize(
            &mut self.syslog.queue_capacity,
            "FIREHOSE_SYSLOG_QUEUE_CAPACITY",
        );

        override_bool(&mut self.intercept.enabled, "FIREHOSE_INTERCEPT_ENABLED");
        override_string(
            &mut self.intercept.filename_template,
            "FIREHOSE_INTERCEPT_FILENAME_TEMPLATE",
        );
        override_u64(
            &mut self.intercept.max_size_mb,
            "FIREHOSE_INTERCEPT_MAX_SIZE_MB",
        );
        override_usize(
            &mut self.intercept.max_backups,
            "FIREHOSE_INTERCEPT_MAX_BACKUPS",
        );
        override_u32(
            &mut self.intercept.max_age_days,
            "FIREHOSE_INTERCEPT_MAX_AGE_DAYS",
        );

        override_bool(&mut self.metrics.enabled, "FIREHOSE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "FIREHOSE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "FIREHOSE_METRICS_PORT");
    }

    /// 값 범위와 열거형 값을 검증합니다.
    pub fn validate(&self) -> Result<(), FirehoseError> {
        check_one_of(
            "general.log_level",
            &self.general.log_level,
            &["trace", "debug", "info", "warn", "error"],
        )?;
        check_one_of(
            "general.log_format",
            &self.general.log_format,
            &["json", "pretty"],
        )?;

        if self.routing.stats_interval_secs > MAX_STATS_INTERVAL_SECS {
            return Err(invalid(
                "routing.stats_interval_secs",
                format!("must be at most {MAX_STATS_INTERVAL_SECS} (0 disables)"),
            ));
        }
        if self.routing.envelope_queue_capacity == 0 {
            return Err(invalid(
                "routing.envelope_queue_capacity",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.syslog.server.trim().is_empty() {
            return Err(invalid("syslog.server", "must not be empty".to_owned()));
        }
        check_one_of("syslog.protocol", &self.syslog.protocol, &["tcp", "udp"])?;
        check_one_of(
            "syslog.tcp_framing",
            &self.syslog.tcp_framing,
            &["newline", "octet-counting"],
        )?;
        check_one_of("syslog.formatter", &self.syslog.formatter, &["text", "json"])?;
        if self.syslog.connect_timeout_secs == 0 {
            return Err(invalid(
                "syslog.connect_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.syslog.write_timeout_secs == 0 {
            return Err(invalid(
                "syslog.write_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.syslog.queue_capacity == 0 {
            return Err(invalid(
                "syslog.queue_capacity",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.syslog.tag.is_empty() || self.syslog.tag.contains(' ') {
            return Err(invalid(
                "syslog.tag",
                "must be non-empty and contain no spaces".to_owned(),
            ));
        }

        if self.intercept.enabled {
            if !self.intercept.filename_template.contains(ORG_PLACEHOLDER) {
                return Err(invalid(
                    "intercept.filename_template",
                    format!("must contain the {ORG_PLACEHOLDER} placeholder"),
                ));
            }
            if self.intercept.max_size_mb == 0 {
                return Err(invalid(
                    "intercept.max_size_mb",
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must not be 0".to_owned()));
        }

        Ok(())
    }
}

fn check_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), FirehoseError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("must be one of: {}", allowed.join(", "))))
    }
}

fn invalid(field: &str, reason: String) -> FirehoseError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 이벤트 선택, 필터링, 보강 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 쉼표로 구분된 이벤트 타입 이름. 비어 있으면 `LogMessage`
    pub selected_events: String,
    /// 테넌트 필터 규칙 파일. 비어 있으면 필터링 안 함
    pub filter_path: String,
    /// `key:value,key:value` 형식의 정적 필드
    pub extra_fields: String,
    /// 통계 이벤트 주기. 0이면 비활성화
    pub stats_interval_secs: u64,
    /// 앱 ID별 메타데이터 JSON 파일
    pub app_cache_path: String,
    pub envelope_queue_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            selected_events: String::new(),
            filter_path: String::new(),
            extra_fields: String::new(),
            stats_interval_secs: 30,
            app_cache_path: String::new(),
            envelope_queue_capacity: 1024,
        }
    }
}

/// Syslog 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogConfig {
    /// 수집 서버 `host:port`
    pub server: String,
    /// tcp, udp
    pub protocol: String,
    /// newline, octet-counting (TCP 전용)
    pub tcp_framing: String,
    pub connect_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// text, json
    pub formatter: String,
    /// 비어 있으면 시스템 호스트명 사용
    pub hostname: String,
    /// RFC 5424 APP-NAME
    pub tag: String,
    /// 전송 전에 버퍼링되는 패킷 수
    pub queue_capacity: usize,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            server: "localhost:514".to_owned(),
            protocol: "tcp".to_owned(),
            tcp_framing: "newline".to_owned(),
            connect_timeout_secs: 10,
            write_timeout_secs: 5,
            formatter: "text".to_owned(),
            hostname: String::new(),
            tag: "doppler".to_owned(),
            queue_capacity: 10_000,
        }
    }
}

/// 조직별 캡처 파일 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    pub enabled: bool,
    /// `{org}`를 포함하는 경로 템플릿
    pub filename_template: String,
    pub max_size_mb: u64,
    /// 보관할 백업 파일 수. 0이면 전부 보관
    pub max_backups: usize,
    /// 백업 파일 최대 보관 기간. 0이면 기간 제한 없음
    pub max_age_days: u32,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename_template: "/var/log/firehose/{org}.log".to_owned(),
            max_size_mb: 100,
            max_backups: 5,
            max_age_days: 28,
        }
    }
}

/// Prometheus 익스포터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9102,
        }
    }
}

// --- 환경 변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = FirehoseConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.syslog.protocol, "tcp");
        assert_eq!(config.syslog.connect_timeout_secs, 10);
        assert_eq!(config.syslog.write_timeout_secs, 5);
        assert_eq!(config.syslog.tag, "doppler");
        assert!(config.routing.selected_events.is_empty());
        assert!(!config.intercept.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        FirehoseConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = FirehoseConfig::parse("").unwrap();
        assert_eq!(config.routing.stats_interval_secs, 30);
        assert_eq!(config.syslog.server, "localhost:514");
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let config = FirehoseConfig::parse(
            r#"
[routing]
selected_events = "LogMessage,HttpStartStop"

[syslog]
server = "logs.example.com:6514"
protocol = "udp"
"#,
        )
        .unwrap();
        assert_eq!(config.routing.selected_events, "LogMessage,HttpStartStop");
        assert_eq!(config.syslog.protocol, "udp");
        assert_eq!(config.syslog.tag, "doppler");
        assert_eq!(config.intercept.max_backups, 5);
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = FirehoseConfig::parse("[syslog\nserver=").unwrap_err();
        assert!(matches!(
            err,
            FirehoseError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let mut config = FirehoseConfig::default();
        config.syslog.protocol = "tls".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("syslog.protocol"));
    }

    #[test]
    fn validate_rejects_unknown_formatter() {
        let mut config = FirehoseConfig::default();
        config.syslog.formatter = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = FirehoseConfig::default();
        config.syslog.write_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_huge_stats_interval() {
        let mut config = FirehoseConfig::default();
        config.routing.stats_interval_secs = MAX_STATS_INTERVAL_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_org_placeholder_when_intercepting() {
        let mut config = FirehoseConfig::default();
        config.intercept.enabled = true;
        config.intercept.filename_template = "/tmp/capture.log".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("intercept.filename_template"));
    }

    #[test]
    fn validate_ignores_template_when_intercept_disabled() {
        let mut config = FirehoseConfig::default();
        config.intercept.filename_template = "/tmp/capture.log".to_owned();
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn env_override_string_and_number() {
        // SAFETY: 직렬화된 테스트이므로 다른 스레드가 이 변수를 읽지 않음
        unsafe {
            std::env::set_var("FIREHOSE_SYSLOG_SERVER", "collector:1514");
            std::env::set_var("FIREHOSE_ROUTING_STATS_INTERVAL_SECS", "5");
        }
        let mut config = FirehoseConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.syslog.server, "collector:1514");
        assert_eq!(config.routing.stats_interval_secs, 5);
        unsafe {
            std::env::remove_var("FIREHOSE_SYSLOG_SERVER");
            std::env::remove_var("FIREHOSE_ROUTING_STATS_INTERVAL_SECS");
        }
    }

    #[test]
    #[serial]
    fn env_override_invalid_bool_keeps_original() {
        // SAFETY: 직렬화된 테스트이므로 다른 스레드가 이 변수를 읽지 않음
        unsafe { std::env::set_var("FIREHOSE_INTERCEPT_ENABLED", "maybe") };
        let mut config = FirehoseConfig::default();
        config.apply_env_overrides();
        assert!(!config.intercept.enabled);
        unsafe { std::env::remove_var("FIREHOSE_INTERCEPT_ENABLED") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = FirehoseConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = FirehoseConfig::parse(&toml_str).unwrap();
        assert_eq!(config.syslog.server, parsed.syslog.server);
        assert_eq!(config.intercept.max_age_days, parsed.intercept.max_age_days);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = FirehoseConfig::from_file("/nonexistent/firehose.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FirehoseError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firehose.toml");
        tokio::fs::write(&path, "[syslog]\nformatter = \"json\"\n")
            .await
            .unwrap();
        let config = FirehoseConfig::from_file(&path).await.unwrap();
        assert_eq!(config.syslog.formatter, "json");
    }
}
