//! 필터 규칙 데이터 타입

use firehose_core::event::keys;
use firehose_core::fields::Fields;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 기본 구조화 데이터를 지정하는 패턴
pub const CATCH_ALL_PATTERN: &str = ".*";

/// 컴파일된 매처를 가진 테넌트 라우팅 규칙
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub pattern: String,
    /// RFC 5424 STRUCTURED-DATA (그대로 사용)
    pub structured_data: String,
    /// 캡처 전용: syslog로 전송하지 않음
    pub skip_syslog: bool,
    /// 캡처 미러링을 트리거하는 메시지 접두사
    pub intercept_prefix: String,
    matcher: Regex,
}

impl FilterRule {
    /// 규칙을 컴파일합니다. 패턴은 앵커 없이 매칭됩니다.
    pub fn new(
        pattern: impl Into<String>,
        structured_data: impl Into<String>,
        skip_syslog: bool,
        intercept_prefix: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let matcher = Regex::new(&pattern)?;
        Ok(Self {
            pattern,
            structured_data: structured_data.into(),
            skip_syslog,
            intercept_prefix: intercept_prefix.into(),
            matcher,
        })
    }

    pub fn is_match(&self, tenant_path: &str) -> bool {
        self.matcher.is_match(tenant_path)
    }

    pub fn is_catch_all(&self) -> bool {
        self.pattern == CATCH_ALL_PATTERN
    }

    /// 규칙의 제어 키를 이벤트 필드에 기록합니다.
    pub fn apply_to(&self, fields: &mut Fields) {
        fields.insert(keys::STRUCTURED_DATA, self.structured_data.as_str());
        if self.skip_syslog {
            fields.insert(keys::SKIP_SYSLOG, true);
        }
        fields.insert_non_empty(keys::INTERCEPT_PREFIX, &self.intercept_prefix);
    }
}

/// YAML 규칙 파일에 기록되는 규칙 항목
///
/// ```yaml
/// - pattern: "^acme/prod/"
///   structured_data: '[tenant@32473 org="acme"]'
/// - pattern: "^acme/dev/"
///   skip_syslog: true
///   intercept_prefix: "AUDIT:"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRuleEntry {
    pub pattern: String,
    #[serde(default)]
    pub structured_data: String,
    #[serde(default)]
    pub skip_syslog: bool,
    #[serde(default)]
    pub intercept_prefix: String,
}

/// 한 파일에서 로드된 규칙 (파일 순서 유지)
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub rules: Vec<FilterRule>,
    /// 비어 있지 않은 마지막 `.*` 규칙의 구조화 데이터
    pub default_structured_data: Option<String>,
}

impl FilterSet {
    pub fn from_rules(rules: Vec<FilterRule>) -> Self {
        let default_structured_data = rules
            .iter()
            .rev()
            .find(|r| r.is_catch_all() && !r.structured_data.is_empty())
            .map(|r| r.structured_data.clone());
        Self {
            rules,
            default_structured_data,
        }
    }
}
