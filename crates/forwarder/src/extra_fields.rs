//! 모든 이벤트에 추가되는 정적 필드
//!
//! 형식: `key:value,key2:value2`. 키와 값 주변 공백은 제거됩니다.
//! 첫 번째 `:`에서 키와 값을 나누므로 값에 `:`가 포함될 수 있습니다.

use std::collections::BTreeMap;

use crate::error::ForwarderError;

/// 정적 필드 문자열을 파싱합니다. 빈 입력은 빈 맵을 반환합니다.
pub fn parse_extra_fields(input: &str) -> Result<BTreeMap<String, String>, ForwarderError> {
    let mut fields = BTreeMap::new();

    for entry in input.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let Some((key, value)) = entry.split_once(':') else {
            return Err(ForwarderError::ExtraFields {
                entry: entry.to_owned(),
                reason: "expected key:value".to_owned(),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(ForwarderError::ExtraFields {
                entry: entry.to_owned(),
                reason: "key must not be empty".to_owned(),
            });
        }

        fields.insert(key.to_owned(), value.trim().to_owned());
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_map() {
        assert!(parse_extra_fields("").unwrap().is_empty());
        assert!(parse_extra_fields("  ").unwrap().is_empty());
    }

    #[test]
    fn parses_pairs_with_whitespace() {
        let fields = parse_extra_fields(" env : prod , region:eu-west-1 ").unwrap();
        assert_eq!(fields.get("env").map(String::as_str), Some("prod"));
        assert_eq!(fields.get("region").map(String::as_str), Some("eu-west-1"));
    }

    #[test]
    fn value_may_contain_colon() {
        let fields = parse_extra_fields("url:http://example.com").unwrap();
        assert_eq!(
            fields.get("url").map(String::as_str),
            Some("http://example.com")
        );
    }

    #[test]
    fn trailing_comma_is_ignored() {
        let fields = parse_extra_fields("a:1,").unwrap();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn missing_colon_is_rejected() {
        let err = parse_extra_fields("a:1,broken").unwrap_err();
        assert!(matches!(err, ForwarderError::ExtraFields { entry, .. } if entry == "broken"));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(parse_extra_fields(":value").is_err());
    }
}
