//! 크기 기반 로테이션 append 전용 파일 writer
//!
//! 쓰기로 인해 활성 파일이 크기 제한을 넘게 되면, 파일을 같은 디렉터리의
//! `<stem>-<UTC timestamp>.<ext>`로 이름을 바꾸고 새 파일을 시작합니다.
//! 오래된 백업은 개수와 보관 기간 기준으로 정리합니다.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;

const BYTES_PER_MB: u64 = 1024 * 1024;
const SECS_PER_DAY: u64 = 24 * 60 * 60;
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6f";
/// 포매팅된 백업 타임스탬프 길이 (예: `2024-01-01T00-00-00.000000`)
const BACKUP_TIME_LEN: usize = 26;

/// 로테이션 제한
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    /// 0이면 모든 백업 유지
    pub max_backups: usize,
    /// `None`이면 기간 기준 정리 비활성화
    pub max_age: Option<Duration>,
}

impl RotationPolicy {
    /// 사용자 단위(메가바이트, 일)로 정책을 생성합니다.
    pub fn new(max_size_mb: u64, max_backups: usize, max_age_days: u32) -> Self {
        Self {
            max_bytes: max_size_mb.saturating_mul(BYTES_PER_MB),
            max_backups,
            max_age: (max_age_days > 0)
                .then(|| Duration::from_secs(u64::from(max_age_days) * SECS_PER_DAY)),
        }
    }
}

/// 스레드 안전 로테이션 writer
pub struct RotatingFileWriter {
    path: PathBuf,
    policy: RotationPolicy,
    active: Mutex<ActiveFile>,
}

struct ActiveFile {
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl RotatingFileWriter {
    /// `path`를 append 모드로 엽니다. 상위 디렉터리가 없으면 생성합니다.
    pub fn open(path: impl AsRef<Path>, policy: RotationPolicy) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let active = open_active(&path)?;
        Ok(Self {
            path,
            policy,
            active: Mutex::new(active),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `bytes`를 추가합니다. 들어갈 공간이 없으면 먼저 로테이션합니다.
    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut active = self.active.lock();

        let len = bytes.len() as u64;
        if active.bytes_written > 0 && active.bytes_written + len > self.policy.max_bytes {
            self.rotate(&mut active)?;
        }

        active.writer.write_all(bytes)?;
        active.writer.flush()?;
        active.bytes_written += len;
        Ok(())
    }

    /// 로테이션된 파일 목록 (오래된 순)
    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        let (stem, ext) = self.name_parts();
        let prefix = format!("{stem}-");
        let suffix = ext.map(|e| format!(".{e}"));
        let dir = self.directory();

        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let matches_suffix = suffix.as_deref().is_none_or(|s| name.ends_with(s));
            if matches_suffix && is_backup_stamp(rest) {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }

    fn rotate(&self, active: &mut ActiveFile) -> io::Result<()> {
        active.writer.flush()?;
        let backup = self.backup_path(Utc::now());
        fs::rename(&self.path, &backup)?;
        *active = open_active(&self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            backup = %backup.display(),
            "rotated capture file"
        );

        if let Err(e) = self.prune() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to prune capture backups");
        }
        Ok(())
    }

    fn prune(&self) -> io::Result<()> {
        let mut backups = self.backups()?;

        if let Some(max_age) = self.policy.max_age {
            let now = SystemTime::now();
            let mut kept = Vec::with_capacity(backups.len());
            for backup in backups {
                let expired = fs::metadata(&backup)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|age| age > max_age);
                if expired {
                    fs::remove_file(&backup)?;
                } else {
                    kept.push(backup);
                }
            }
            backups = kept;
        }

        if self.policy.max_backups > 0 && backups.len() > self.policy.max_backups {
            let excess = backups.len() - self.policy.max_backups;
            for backup in &backups[..excess] {
                fs::remove_file(backup)?;
            }
        }
        Ok(())
    }

    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let stamp = now.format(BACKUP_TIME_FORMAT).to_string();
        let dir = self.directory();

        let mut attempt = 0u32;
        loop {
            let suffix = if attempt == 0 {
                String::new()
            } else {
                format!("~{attempt:03}")
            };
            let name = match ext.as_deref() {
                Some(ext) => format!("{stem}-{stamp}{suffix}.{ext}"),
                None => format!("{stem}-{stamp}{suffix}"),
            };
            let candidate = dir.join(name);
            if !candidate.exists() {
                return candidate;
            }
            attempt += 1;
        }
    }

    fn name_parts(&self) -> (String, Option<String>) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        (stem, ext)
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn is_backup_stamp(rest: &str) -> bool {
    rest.get(..BACKUP_TIME_LEN)
        .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).is_ok())
}

fn open_active(path: &Path) -> io::Result<ActiveFile> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let bytes_written = file.metadata()?.len();
    Ok(ActiveFile {
        writer: BufWriter::new(file),
        bytes_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_bytes: u64, max_backups: usize) -> RotationPolicy {
        RotationPolicy {
            max_bytes,
            max_backups,
            max_age: None,
        }
    }

    #[test]
    fn policy_converts_units() {
        let p = RotationPolicy::new(2, 3, 1);
        assert_eq!(p.max_bytes, 2 * 1024 * 1024);
        assert_eq!(p.max_age, Some(Duration::from_secs(86_400)));
        assert_eq!(RotationPolicy::new(1, 0, 0).max_age, None);
    }

    #[test]
    fn appends_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/org-1.log");
        let writer = RotatingFileWriter::open(&path, policy(1024, 0)).unwrap();
        writer.write(b"one\n").unwrap();
        writer.write(b"two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn reopen_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("org.log");
        RotatingFileWriter::open(&path, policy(1024, 0))
            .unwrap()
            .write(b"a\n")
            .unwrap();
        RotatingFileWriter::open(&path, policy(1024, 0))
            .unwrap()
            .write(b"b\n")
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn rotates_when_limit_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("org.log");
        let writer = RotatingFileWriter::open(&path, policy(10, 0)).unwrap();
        writer.write(b"12345678\n").unwrap();
        writer.write(b"abcdefgh\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "abcdefgh\n");
        let backups = writer.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "12345678\n");
        let name = backups[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("org-"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn oversized_first_write_does_not_rotate_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("org.log");
        let writer = RotatingFileWriter::open(&path, policy(4, 0)).unwrap();
        writer.write(b"longer than four\n").unwrap();
        assert!(writer.backups().unwrap().is_empty());
    }

    #[test]
    fn prunes_to_max_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("org.log");
        let writer = RotatingFileWriter::open(&path, policy(5, 2)).unwrap();
        for i in 0..6 {
            writer.write(format!("line{i}\n").as_bytes()).unwrap();
        }
        let backups = writer.backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "line5\n");
        assert_eq!(fs::read_to_string(&backups[1]).unwrap(), "line4\n");
    }

    #[test]
    fn backup_names_sort_after_collision() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFileWriter::open(dir.path().join("org.log"), policy(5, 0)).unwrap();
        let now = Utc::now();
        let first = writer.backup_path(now);
        fs::write(&first, "x").unwrap();
        let second = writer.backup_path(now);
        assert_ne!(first, second);
        assert!(second.to_string_lossy().contains("~001"));
        fs::write(&second, "y").unwrap();

        let third = writer.backup_path(now);
        assert!(third.to_string_lossy().contains("~002"));
        assert_eq!(writer.backups().unwrap(), vec![first, second]);
    }

    #[test]
    fn backups_ignore_org_sharing_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("org-b.log"), "x").unwrap();
        let writer = RotatingFileWriter::open(dir.path().join("org.log"), policy(5, 0)).unwrap();
        assert!(writer.backups().unwrap().is_empty());
    }

    #[test]
    fn backups_ignore_other_orgs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other-2024-01-01T00-00-00.000000.log"), "x").unwrap();
        let writer = RotatingFileWriter::open(dir.path().join("org.log"), policy(5, 0)).unwrap();
        assert!(writer.backups().unwrap().is_empty());
    }
}
