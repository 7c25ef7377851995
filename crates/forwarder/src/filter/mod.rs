//! 테넌트 필터 엔진
//!
//! 테넌트 경로 `org/space/app`을 로드 순서대로 규칙과 비교하며,
//! 처음 매칭되는 규칙이 적용됩니다. 패턴은 앵커 없이 부분 매칭됩니다.
//! 매칭된 규칙은 다음을 결정합니다:
//!
//! - RFC 5424 STRUCTURED-DATA
//! - syslog 전송 생략 여부 (캡처 전용)
//! - 캡처 미러링을 트리거하는 메시지 접두사
//!
//! # 모듈 구성
//!
//! - [`FilterEngine`]: 모든 라우팅 스레드가 공유하는 불변 규칙 목록
//! - [`loader`]: 규칙 파일 파싱 및 컴파일
//! - [`types`]: 규칙 데이터 구조
//!
//! # 사용 예시
//!
//! ```ignore
//! let engine = FilterEngine::load("rules.tsv").await?;
//! let path = tenant_path("acme", "prod", "web");
//! if let Some(rule) = engine.match_path(&path) {
//!     println!("sd = {}", rule.structured_data);
//! }
//! ```

pub mod loader;
pub mod types;

pub use loader::FilterLoader;
pub use types::{FilterRule, FilterRuleEntry, FilterSet};

use std::path::Path;

use crate::error::ForwarderError;

/// 컴파일된 테넌트 규칙 목록
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: Vec<FilterRule>,
    default_structured_data: Option<String>,
}

impl FilterEngine {
    pub fn new(set: FilterSet) -> Self {
        Self {
            rules: set.rules,
            default_structured_data: set.default_structured_data,
        }
    }

    /// 파일에서 규칙을 로드합니다. 잘못된 규칙이 하나라도 있으면 전체 로드가 실패합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ForwarderError> {
        FilterLoader::load_file(path).await.map(Self::new)
    }

    /// 로드 순서상 `tenant_path`에 처음 매칭되는 규칙을 반환합니다.
    pub fn match_path(&self, tenant_path: &str) -> Option<&FilterRule> {
        self.rules.iter().find(|rule| rule.is_match(tenant_path))
    }

    /// 파일에 catch-all(`.*`) 규칙이 있었다면 그 구조화 데이터를 반환합니다.
    pub fn default_structured_data(&self) -> Option<&str> {
        self.default_structured_data.as_deref()
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 매칭에 사용하는 `org/space/app` 경로를 만듭니다.
pub fn tenant_path(org: &str, space: &str, app: &str) -> String {
    let mut path = String::with_capacity(org.len() + space.len() + app.len() + 2);
    path.push_str(org);
    path.push('/');
    path.push_str(space);
    path.push('/');
    path.push_str(app);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine(rules: &[(&str, &str)]) -> FilterEngine {
        let rules = rules
            .iter()
            .map(|(p, sd)| FilterRule::new(*p, *sd, false, "").unwrap())
            .collect();
        FilterEngine::new(FilterSet::from_rules(rules))
    }

    #[test]
    fn first_match_wins() {
        let engine = engine(&[("^acme/", "[first@1]"), ("^acme/prod/", "[second@1]")]);
        let rule = engine.match_path("acme/prod/web").unwrap();
        assert_eq!(rule.structured_data, "[first@1]");
    }

    #[test]
    fn patterns_are_unanchored() {
        // `a.*`가 "zeta" 안의 `a`를 찾으므로 catch-all까지 내려가지 않음
        let engine = engine(&[("a.*", "[sd1@1]"), (".*", "[sd2@1]")]);
        let rule = engine.match_path("zeta/prod/web").unwrap();
        assert_eq!(rule.structured_data, "[sd1@1]");

        let rule = engine.match_path("beta/prod/web").unwrap();
        assert_eq!(rule.structured_data, "[sd1@1]");

        let rule = engine.match_path("xyz/prod/web").unwrap();
        assert_eq!(rule.structured_data, "[sd2@1]");
    }

    #[test]
    fn no_match_returns_none() {
        let engine = engine(&[("^acme/", "[a@1]")]);
        assert!(engine.match_path("beta/prod/web").is_none());
    }

    #[test]
    fn catch_all_is_matched_in_order() {
        let engine = engine(&[(".*", "[default@1]"), ("^acme/", "[acme@1]")]);
        assert_eq!(engine.default_structured_data(), Some("[default@1]"));
        let rule = engine.match_path("acme/prod/web").unwrap();
        assert_eq!(rule.structured_data, "[default@1]");
    }

    #[test]
    fn empty_engine_matches_nothing() {
        let engine = FilterEngine::default();
        assert!(engine.is_empty());
        assert!(engine.match_path("a/b/c").is_none());
    }

    #[test]
    fn tenant_path_joins_with_slash() {
        assert_eq!(tenant_path("acme", "prod", "web"), "acme/prod/web");
        assert_eq!(tenant_path("", "", "web"), "//web");
    }

    #[tokio::test]
    async fn load_builds_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules");
        tokio::fs::write(&path, "^acme/\t[acme@1]\n.*\t[d@1]\n")
            .await
            .unwrap();
        let engine = FilterEngine::load(&path).await.unwrap();
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.default_structured_data(), Some("[d@1]"));
    }

    proptest! {
        #[test]
        fn match_is_deterministic_and_first(
            org in "[a-c]{1,3}",
            space in "[a-c]{0,3}",
            app in "[a-c]{1,3}",
        ) {
            let engine = engine(&[("^a", "[1@1]"), ("b/", "[2@1]"), ("c$", "[3@1]")]);
            let path = tenant_path(&org, &space, &app);
            let first = engine.match_path(&path).map(|r| r.pattern.clone());
            let again = engine.match_path(&path).map(|r| r.pattern.clone());
            prop_assert_eq!(&first, &again);
            let expected = engine
                .rules()
                .iter()
                .find(|r| r.is_match(&path))
                .map(|r| r.pattern.clone());
            prop_assert_eq!(first, expected);
        }
    }
}
