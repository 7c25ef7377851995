//! 동적 타입 이벤트 필드
//!
//! [`Fields`]는 필드 이름에서 [`FieldValue`]로의 순서 있는 맵입니다. 키가
//! 없으면 "부재" 값이며 null 변형은 없습니다. 타입별 접근자는 강제 변환하지
//! 않고 [`FieldError::TypeMismatch`]를 반환합니다.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// 단일 필드 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl FieldValue {
    /// 에러 메시지에 쓰이는 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }

    /// 빈 문자열이면 true. 다른 변형은 비어 있지 않음
    pub fn is_empty_str(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// 모든 이벤트가 가지는 순서 있는 필드 맵
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드를 삽입하거나 덮어씁니다.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// 값이 비어 있지 않을 때만 문자열 필드를 삽입합니다.
    pub fn insert_non_empty(&mut self, key: impl Into<String>, value: &str) {
        if !value.is_empty() {
            self.0.insert(key.into(), FieldValue::Str(value.to_owned()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// 문자열 필드를 읽습니다.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, FieldError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(FieldValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }

    /// 문자열 필드를 읽되, 부재와 빈 값을 같게 취급합니다.
    pub fn get_non_empty_str(&self, key: &str) -> Result<Option<&str>, FieldError> {
        Ok(self.get_str(key)?.filter(|s| !s.is_empty()))
    }

    /// 불리언 필드를 읽습니다.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, FieldError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(FieldValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(key, "bool", other)),
        }
    }

    /// 부호 없는 정수 필드를 읽습니다. 음수가 아닌 `Int` 값도 허용합니다.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, FieldError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(FieldValue::UInt(v)) => Ok(Some(*v)),
            Some(FieldValue::Int(v)) if *v >= 0 => Ok(Some(v.unsigned_abs())),
            Some(other) => Err(mismatch(key, "uint", other)),
        }
    }

    /// 실수 필드를 읽습니다.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, FieldError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(FieldValue::Float(v)) => Ok(Some(*v)),
            Some(other) => Err(mismatch(key, "float", other)),
        }
    }
}

fn mismatch(key: &str, expected: &'static str, actual: &FieldValue) -> FieldError {
    FieldError::TypeMismatch {
        key: key.to_owned(),
        expected,
        actual: actual.type_name(),
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
