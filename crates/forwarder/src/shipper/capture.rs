//! 조직(org)별 캡처 파일
//!
//! 규칙의 인터셉트 접두사로 시작하는 메시지는 접두사를 제거한 뒤
//! org별 로테이션 파일에 미러링됩니다. writer는 처음 사용할 때 생성되며,
//! 여러 라우팅 스레드가 동시에 새 org를 만나도 `DashMap` entry API가
//! org당 writer 하나를 보장합니다.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use firehose_core::config::{InterceptConfig, ORG_PLACEHOLDER};
use firehose_core::metrics as m;

use crate::error::ForwarderError;

use super::rotating::{RotatingFileWriter, RotationPolicy};

/// 캡처 파일 이름 규칙과 로테이션 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// `{org}`를 포함하는 경로
    pub filename_template: String,
    pub policy: RotationPolicy,
}

impl CaptureSettings {
    /// 설정에서 생성합니다. 인터셉트가 꺼져 있으면 `None`
    pub fn from_config(config: &InterceptConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            filename_template: config.filename_template.clone(),
            policy: RotationPolicy::new(
                config.max_size_mb,
                config.max_backups,
                config.max_age_days,
            ),
        })
    }
}

pub struct CaptureRegistry {
    settings: CaptureSettings,
    writers: DashMap<String, Arc<RotatingFileWriter>>,
}

impl CaptureRegistry {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            writers: DashMap::new(),
        }
    }

    /// 조직의 캡처 파일 경로
    ///
    /// id의 `%`, `/`, `\`는 퍼센트 인코딩하고, id가 `.` 또는 `..`이면
    /// 점도 인코딩하여 서로 다른 id가 같은 파일을 쓰지 않도록 합니다.
    pub fn path_for(&self, org_id: &str) -> PathBuf {
        PathBuf::from(
            self.settings
                .filename_template
                .replace(ORG_PLACEHOLDER, &encode_org_id(org_id)),
        )
    }

    /// `org_id`의 writer. 처음 사용할 때 생성
    pub fn writer_for(&self, org_id: &str) -> Result<Arc<RotatingFileWriter>, ForwarderError> {
        if let Some(writer) = self.writers.get(org_id) {
            return Ok(Arc::clone(writer.value()));
        }

        let entry = self
            .writers
            .entry(org_id.to_owned())
            .or_try_insert_with(|| {
                let path = self.path_for(org_id);
                RotatingFileWriter::open(&path, self.settings.policy)
                    .map(Arc::new)
                    .map_err(|e| ForwarderError::Capture {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })
            })?;
        let writer = Arc::clone(entry.value());
        drop(entry);

        metrics::gauge!(m::CAPTURE_WRITERS_OPEN).set(self.writers.len() as f64);
        tracing::debug!(org_id, path = %writer.path().display(), "capture writer ready");
        Ok(writer)
    }

    /// org 캡처 파일에 `line`과 개행을 추가합니다.
    pub fn capture(&self, org_id: &str, line: &str) -> Result<(), ForwarderError> {
        let writer = self.writer_for(org_id)?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        writer.write(&buf).map_err(|e| ForwarderError::Capture {
            path: writer.path().display().to_string(),
            reason: e.to_string(),
        })?;
        metrics::counter!(m::CAPTURE_LINES_WRITTEN_TOTAL).increment(1);
        Ok(())
    }

    /// 열린 writer 수
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

fn encode_org_id(org_id: &str) -> String {
    if org_id == "." || org_id == ".." {
        return org_id.replace('.', "%2E");
    }
    let mut encoded = String::with_capacity(org_id.len());
    for c in org_id.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '/' => encoded.push_str("%2F"),
            '\\' => encoded.push_str("%5C"),
            c => encoded.push(c),
        }
    }
    encoded
}
