//! 파일 싱크 — 추가 모드로 기록하고 로그 로테이션 시 다시 엽니다.
//!
//! 파일 핸들 교체는 기록과 같은 뮤텍스 안에서 일어나므로
//! 기록 중인 스레드가 닫힌 핸들을 보는 일은 없습니다.

use std::fs::{File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use auditpost_core::config::FileOutputConfig;
use auditpost_core::error::SinkError;
use auditpost_core::pipeline::Sink;

use crate::error::OutputError;

/// 파일 출력 싱크
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    mode: u32,
    file: Mutex<File>,
}

impl FileSink {
    /// 설정에 따라 파일을 엽니다.
    pub fn open(config: &FileOutputConfig) -> Result<Self, OutputError> {
        if config.path.is_empty() {
            return Err(OutputError::Config {
                field: "output.file.path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if config.mode == 0 {
            return Err(OutputError::Config {
                field: "output.file.mode".to_owned(),
                reason: "must be greater than 0000".to_owned(),
            });
        }

        let path = PathBuf::from(&config.path);
        let file = open_append(&path, config.mode)?;
        tracing::info!(
            path = %path.display(),
            mode = %format_args!("{:o}", config.mode),
            "output file opened"
        );

        Ok(Self {
            path,
            mode: config.mode,
            file: Mutex::new(file),
        })
    }

    /// 출력 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| SinkError::Write(format!("file lock poisoned: {e}")))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn reopen(&self) -> Result<(), SinkError> {
        let fresh = open_append(&self.path, self.mode).map_err(|e| match e {
            OutputError::FileOpen { source, .. } => SinkError::Io(source),
            other => SinkError::Write(other.to_string()),
        })?;

        let old = {
            let mut file = self
                .file
                .lock()
                .map_err(|e| SinkError::Write(format!("file lock poisoned: {e}")))?;
            std::mem::replace(&mut *file, fresh)
        };
        if let Err(e) = old.sync_all() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to sync rotated file");
        }
        drop(old);

        tracing::info!(path = %self.path.display(), "output file reopened");
        Ok(())
    }
}

/// `O_APPEND | O_CREAT | O_WRONLY`로 열고 권한을 명시적으로 적용합니다 (umask 무시).
fn open_append(path: &Path, mode: u32) -> Result<File, OutputError> {
    let file_open_error = |source| OutputError::FileOpen {
        path: path.display().to_string(),
        source,
    };

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .mode(mode)
        .open(path)
        .map_err(file_open_error)?;
    file.set_permissions(Permissions::from_mode(mode))
        .map_err(file_open_error)?;
    Ok(file)
}
