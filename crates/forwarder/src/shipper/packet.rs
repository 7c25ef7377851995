//! RFC 5424 syslog 패킷
//!
//! `<PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD MSG` 형식으로 렌더링하며
//! `PRI = facility * 8 + severity`입니다. 빈 헤더 필드는 `-`로 표시합니다.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

const NILVALUE: &str = "-";
const MAX_HOSTNAME_LEN: usize = 255;
const MAX_APP_NAME_LEN: usize = 48;

/// Syslog facility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Facility {
    Kernel = 0,
    User = 1,
    Daemon = 3,
    Local0 = 16,
    Local7 = 23,
}

/// Syslog severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyslogPacket {
    pub facility: Facility,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub app_name: String,
    /// STRUCTURED-DATA (그대로 출력)
    pub structured_data: String,
    pub message: String,
}

impl SyslogPacket {
    /// 현재 시각이 찍힌 `user.info` 패킷을 만듭니다.
    pub fn user_info(
        hostname: impl Into<String>,
        app_name: impl Into<String>,
        structured_data: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            facility: Facility::User,
            severity: Severity::Informational,
            timestamp: Utc::now(),
            hostname: hostname.into(),
            app_name: app_name.into(),
            structured_data: structured_data.into(),
            message: message.into(),
        }
    }

    pub fn priority(&self) -> u8 {
        (self.facility as u8) * 8 + self.severity as u8
    }
}

impl fmt::Display for SyslogPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sd = if self.structured_data.is_empty() {
            NILVALUE
        } else {
            self.structured_data.as_str()
        };
        write!(
            f,
            "<{}>1 {} {} {} {} {} {}",
            self.priority(),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            header_field(&self.hostname, MAX_HOSTNAME_LEN),
            header_field(&self.app_name, MAX_APP_NAME_LEN),
            NILVALUE,
            NILVALUE,
            sd,
        )?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

/// 헤더 필드는 공백 없는 출력 가능 ASCII이며 길이가 제한됩니다.
fn header_field(value: &str, max_len: usize) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_graphic())
        .take(max_len)
        .collect();
    if cleaned.is_empty() {
        NILVALUE.to_owned()
    } else {
        cleaned
    }
}
