//! 내구성 버퍼 에러 타입

use logpost_core::error::{LogpostError, StorageError};

/// 내구성 버퍼 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    /// SQLite 에러
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 봉투 직렬화/역직렬화 실패
    #[error("envelope encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// 존재하지 않거나 이미 처리된 시퀀스
    #[error("unknown sequence id: {0}")]
    UnknownSequence(i64),

    /// 연결 잠금이 오염됨 (다른 스레드가 패닉)
    #[error("buffer connection lock poisoned")]
    Poisoned,

    /// 블로킹 태스크 실행 실패
    #[error("blocking task failed: {0}")]
    Join(String),

    /// I/O 에러 (디렉토리 생성 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SpoolError> for LogpostError {
    fn from(err: SpoolError) -> Self {
        match err {
            SpoolError::Io(e) => LogpostError::Io(e),
            other => LogpostError::Storage(StorageError::Query(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sequence_display() {
        assert!(SpoolError::UnknownSequence(42).to_string().contains("42"));
    }

    #[test]
    fn converts_to_storage_error() {
        let err: LogpostError = SpoolError::Poisoned.into();
        assert!(matches!(err, LogpostError::Storage(StorageError::Query(_))));
    }
}
