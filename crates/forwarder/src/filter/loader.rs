//! 필터 규칙 파일 로더
//!
//! 두 가지 형식을 지원합니다. 확장자가 `.yml`/`.yaml`인 파일은
//! [`FilterRuleEntry`] 목록으로 읽고, 그 외에는 한 줄씩 읽습니다:
//!
//! ```text
//! # pattern <TAB> structured-data [<TAB> skip-syslog [<TAB> intercept-prefix]]
//! ^acme/prod/	[tenant@32473 org="acme" env="prod"]
//! ^acme/dev/		yes	AUDIT:
//! .*	[tenant@32473 org="unknown"]
//! ```
//!
//! 잘못된 줄이 하나라도 있으면 전체 로드가 실패하며, 부분 결과는 반환하지 않습니다.
//!
//! # 제한
//!
//! - 파일 크기 최대 10MB
//! - 규칙 수 최대 10,000개

use std::path::Path;

use crate::error::ForwarderError;

use super::types::{FilterRule, FilterRuleEntry, FilterSet};

const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;
const MAX_COLUMNS: usize = 4;

pub struct FilterLoader;

impl FilterLoader {
    /// `path`의 모든 규칙을 로드하고 컴파일합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<FilterSet, ForwarderError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ForwarderError::FilterLoad {
                path: source.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(ForwarderError::FilterLoad {
                path: source,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ForwarderError::FilterLoad {
                    path: source.clone(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yml" || ext == "yaml");

        let set = if is_yaml {
            Self::parse_yaml(&content, &source)?
        } else {
            Self::parse_lines(&content, &source)?
        };

        tracing::info!(
            path = %source,
            count = set.rules.len(),
            has_default_sd = set.default_structured_data.is_some(),
            "loaded filter rules"
        );

        Ok(set)
    }

    /// 탭 구분 라인 형식을 파싱합니다.
    pub fn parse_lines(content: &str, source: &str) -> Result<FilterSet, ForwarderError> {
        let mut rules = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
            if columns.len() > MAX_COLUMNS {
                return Err(ForwarderError::FilterLoad {
                    path: source.to_owned(),
                    reason: format!(
                        "line {line_no}: expected at most {MAX_COLUMNS} tab-separated columns, found {}",
                        columns.len()
                    ),
                });
            }

            let pattern = columns[0];
            if pattern.is_empty() {
                return Err(ForwarderError::FilterLoad {
                    path: source.to_owned(),
                    reason: format!("line {line_no}: empty pattern"),
                });
            }
            let structured_data = columns.get(1).copied().unwrap_or_default();
            let skip_syslog = match columns.get(2) {
                Some(flag) => parse_flag(flag).ok_or_else(|| ForwarderError::FilterLoad {
                    path: source.to_owned(),
                    reason: format!("line {line_no}: invalid skip-syslog value '{flag}'"),
                })?,
                None => false,
            };
            let intercept_prefix = columns.get(3).copied().unwrap_or_default();

            let location = format!("{source}:{line_no}");
            rules.push(compile(
                location,
                pattern,
                structured_data,
                skip_syslog,
                intercept_prefix,
            )?);
            check_count(rules.len(), source)?;
        }

        Ok(FilterSet::from_rules(rules))
    }

    /// YAML 목록 형식을 파싱합니다.
    pub fn parse_yaml(content: &str, source: &str) -> Result<FilterSet, ForwarderError> {
        let entries: Vec<FilterRuleEntry> =
            serde_yaml::from_str(content).map_err(|e| ForwarderError::FilterLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        check_count(entries.len(), source)?;

        let rules = entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| {
                compile(
                    format!("{source}#{idx}"),
                    &entry.pattern,
                    &entry.structured_data,
                    entry.skip_syslog,
                    &entry.intercept_prefix,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterSet::from_rules(rules))
    }
}

fn compile(
    location: String,
    pattern: &str,
    structured_data: &str,
    skip_syslog: bool,
    intercept_prefix: &str,
) -> Result<FilterRule, ForwarderError> {
    FilterRule::new(pattern, structured_data, skip_syslog, intercept_prefix).map_err(|e| {
        ForwarderError::FilterPattern {
            location,
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        }
    })
}

fn check_count(count: usize, source: &str) -> Result<(), ForwarderError> {
    if count > MAX_RULES_COUNT {
        return Err(ForwarderError::FilterLoad {
            path: source.to_owned(),
            reason: format!("too many rules: max {MAX_RULES_COUNT}"),
        });
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "0" => Some(false),
        "true" | "yes" | "1" | "skip" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pattern_and_structured_data() {
        let content = "^acme/prod/\t[tenant@1 org=\"acme\"]\n^beta/\t[tenant@1 org=\"beta\"]\n";
        let set = FilterLoader::parse_lines(content, "rules.tsv").unwrap();
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].pattern, "^acme/prod/");
        assert_eq!(set.rules[1].structured_data, "[tenant@1 org=\"beta\"]");
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let content = "# header\n\n   \n^a/\t[a@1]\n  # indented comment\n";
        let set = FilterLoader::parse_lines(content, "rules.tsv").unwrap();
        assert_eq!(set.rules.len(), 1);
    }

    #[test]
    fn parses_optional_columns() {
        let content = "^acme/dev/\t\tyes\tAUDIT:\n";
        let set = FilterLoader::parse_lines(content, "rules.tsv").unwrap();
        let rule = &set.rules[0];
        assert!(rule.structured_data.is_empty());
        assert!(rule.skip_syslog);
        assert_eq!(rule.intercept_prefix, "AUDIT:");
    }

    #[test]
    fn pattern_only_line_is_accepted() {
        let set = FilterLoader::parse_lines("^infra/\n", "rules.tsv").unwrap();
        assert_eq!(set.rules.len(), 1);
        assert!(set.rules[0].structured_data.is_empty());
    }

    #[test]
    fn handles_crlf_line_endings() {
        let set = FilterLoader::parse_lines("^a/\t[a@1]\r\n", "rules.tsv").unwrap();
        assert_eq!(set.rules[0].structured_data, "[a@1]");
    }

    #[test]
    fn bad_pattern_aborts_whole_load() {
        let content = "^good/\t[g@1]\nacme/(\t[bad@1]\n^later/\t[l@1]\n";
        let err = FilterLoader::parse_lines(content, "rules.tsv").unwrap_err();
        match err {
            ForwarderError::FilterPattern { location, pattern, .. } => {
                assert_eq!(location, "rules.tsv:2");
                assert_eq!(pattern, "acme/(");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_skip_flag_is_rejected() {
        let err = FilterLoader::parse_lines("^a/\t\tmaybe\n", "rules.tsv").unwrap_err();
        assert!(err.to_string().contains("skip-syslog"));
    }

    #[test]
    fn too_many_columns_is_rejected() {
        assert!(FilterLoader::parse_lines("a\tb\tno\tp\textra\n", "rules.tsv").is_err());
    }

    #[test]
    fn catch_all_sets_default_structured_data() {
        let content = "^acme/\t[acme@1]\n.*\t[default@1]\n";
        let set = FilterLoader::parse_lines(content, "rules.tsv").unwrap();
        assert_eq!(set.default_structured_data.as_deref(), Some("[default@1]"));
        assert_eq!(set.rules.len(), 2);
    }

    #[test]
    fn parses_yaml_entries() {
        let yaml = r#"
- pattern: "^acme/prod/"
  structured_data: '[tenant@1 org="acme"]'
- pattern: "^acme/dev/"
  skip_syslog: true
  intercept_prefix: "AUDIT:"
"#;
        let set = FilterLoader::parse_yaml(yaml, "rules.yml").unwrap();
        assert_eq!(set.rules.len(), 2);
        assert!(set.rules[1].skip_syslog);
    }

    #[test]
    fn yaml_bad_pattern_is_rejected() {
        let yaml = "- pattern: \"(\"\n";
        let err = FilterLoader::parse_yaml(yaml, "rules.yml").unwrap_err();
        assert!(matches!(err, ForwarderError::FilterPattern { .. }));
    }

    #[test]
    fn invalid_yaml_returns_error() {
        let err = FilterLoader::parse_yaml("not: [valid: {{{", "rules.yml").unwrap_err();
        assert!(matches!(err, ForwarderError::FilterLoad { .. }));
    }

    #[tokio::test]
    async fn load_file_reads_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.tsv");
        tokio::fs::write(&path, "^acme/\t[acme@1]\n").await.unwrap();
        let set = FilterLoader::load_file(&path).await.unwrap();
        assert_eq!(set.rules.len(), 1);
    }

    #[tokio::test]
    async fn load_file_dispatches_on_yaml_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        tokio::fs::write(&path, "- pattern: \"^acme/\"\n").await.unwrap();
        let set = FilterLoader::load_file(&path).await.unwrap();
        assert_eq!(set.rules[0].pattern, "^acme/");
    }

    #[tokio::test]
    async fn load_missing_file_returns_error() {
        let err = FilterLoader::load_file("/nonexistent/rules.tsv")
            .await
            .unwrap_err();
        assert!(matches!(err, ForwarderError::FilterLoad { .. }));
    }
}
