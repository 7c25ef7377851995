//! 포워더 도메인 에러 타입
//!
//! [`ForwarderError`]는 구성 실패(이벤트 선택, 필터 규칙, 정적 필드, 설정),
//! 전송 연결 실패, 캡처 파일 I/O를 다룹니다.
//! `From<ForwarderError> for FirehoseError`로 `?` 전파가 가능합니다.

use firehose_core::error::{ConfigError, FirehoseError, PipelineError, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    /// 선택 목록에 존재하지 않는 타입이 있음
    #[error("Rejected Event Name [{name}] - Valid events: {valid}")]
    UnknownEventType { name: String, valid: String },

    /// 필터 규칙 파일을 읽거나 파싱할 수 없음
    #[error("filter load error: {path}: {reason}")]
    FilterLoad { path: String, reason: String },

    /// 필터 패턴 컴파일 실패
    #[error("filter pattern error at {location}: '{pattern}': {reason}")]
    FilterPattern {
        location: String,
        pattern: String,
        reason: String,
    },

    /// 정적 필드 문자열 형식 오류
    #[error("invalid extra fields entry '{entry}': {reason}")]
    ExtraFields { entry: String, reason: String },

    /// syslog 수집 서버에 연결할 수 없음
    #[error("transport error: {target}: {reason}")]
    Transport { target: String, reason: String },

    /// 캡처 파일을 열거나 쓸 수 없음
    #[error("capture error: {path}: {reason}")]
    Capture { path: String, reason: String },

    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<ForwarderError> for FirehoseError {
    fn from(err: ForwarderError) -> Self {
        match err {
            ForwarderError::Config { field, reason } => {
                FirehoseError::Config(ConfigError::InvalidValue { field, reason })
            }
            ForwarderError::Transport { target, reason } => {
                FirehoseError::Transport(TransportError::Connect { target, reason })
            }
            ForwarderError::Channel(msg) => FirehoseError::Pipeline(PipelineError::ChannelSend(msg)),
            ForwarderError::Io(e) => FirehoseError::Io(e),
            other => FirehoseError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
