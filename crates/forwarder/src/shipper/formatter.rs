//! 이벤트 본문 포매터
//!
//! 패킷의 MSG 부분은 이벤트 필드와 메시지로 만든 한 줄입니다.
//! `text`는 logfmt 스타일(`level=info msg="..." key=value`)이고 `json`은
//! 단일 JSON 객체입니다. 두 형식 모두 키를 정렬된 순서로 출력합니다.

use firehose_core::fields::{FieldValue, Fields};
use serde_json::{Map, Value};

use crate::error::ForwarderError;

const LEVEL_KEY: &str = "level";
const MSG_KEY: &str = "msg";
const LEVEL: &str = "info";

pub trait FieldFormatter: Send + Sync {
    fn name(&self) -> &'static str;

    fn format(&self, fields: &Fields, message: &str) -> String;
}

/// 설정 이름(`text`, `json`)으로 포매터를 선택합니다.
pub fn formatter_for(name: &str) -> Result<Box<dyn FieldFormatter>, ForwarderError> {
    match name {
        "text" => Ok(Box::new(TextFormatter)),
        "json" => Ok(Box::new(JsonFormatter)),
        other => Err(ForwarderError::Config {
            field: "syslog.formatter".to_owned(),
            reason: format!("unknown formatter '{other}', expected text or json"),
        }),
    }
}

/// `level`/`msg`와 충돌하는 필드 키는 `fields.<key>`로 기록합니다.
fn output_key(key: &str) -> std::borrow::Cow<'_, str> {
    if key == LEVEL_KEY || key == MSG_KEY {
        std::borrow::Cow::Owned(format!("fields.{key}"))
    } else {
        std::borrow::Cow::Borrowed(key)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl FieldFormatter for TextFormatter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn format(&self, fields: &Fields, message: &str) -> String {
        let mut out = String::with_capacity(64 + fields.len() * 24 + message.len());
        out.push_str("level=");
        out.push_str(LEVEL);
        out.push_str(" msg=");
        push_text_value(&mut out, message);
        for (key, value) in fields {
            out.push(' ');
            out.push_str(&output_key(key));
            out.push('=');
            match value {
                FieldValue::Str(s) => push_text_value(&mut out, s),
                other => out.push_str(&other.to_string()),
            }
        }
        out
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+' | ':'))
}

fn push_text_value(out: &mut String, value: &str) {
    if !needs_quoting(value) {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl FieldFormatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn format(&self, fields: &Fields, message: &str) -> String {
        let mut map = Map::with_capacity(fields.len() + 2);
        for (key, value) in fields {
            map.insert(output_key(key).into_owned(), json_value(value));
        }
        map.insert(LEVEL_KEY.to_owned(), Value::from(LEVEL));
        map.insert(MSG_KEY.to_owned(), Value::from(message));
        Value::Object(map).to_string()
    }
}

fn json_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Str(s) => Value::from(s.as_str()),
        FieldValue::Int(v) => Value::from(*v),
        FieldValue::UInt(v) => Value::from(*v),
        FieldValue::Float(v) => Value::from(*v),
        FieldValue::Bool(v) => Value::from(*v),
    }
}
