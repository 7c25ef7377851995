//! 워크스페이스 공용 에러 타입

/// 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FirehoseError {
    /// 설정 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 또는 채널 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// syslog 전송 에러
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// 필드 접근 에러
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일이 존재하지 않음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 값 검증 실패
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 구성 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 현재 상태에서 허용되지 않는 작업
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),
}

/// syslog 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 수집 서버 연결 실패
    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// 수집 서버 쓰기 실패
    #[error("failed to write to {target}: {reason}")]
    Write { target: String, reason: String },
}

/// 타입 있는 필드 접근 에러
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    /// 필드는 있지만 다른 타입의 값을 가짐
    #[error("field '{key}' expected {expected}, found {actual}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}
