//! 소스 읽기 위치 저장소
//!
//! 소스가 재시작 후 이어 읽을 수 있도록 읽기 위치(파일 오프셋, Docker `since` 등)를
//! `general.data_dir` 아래 소스별 JSON 파일에 보관합니다.
//!
//! 쓰기는 임시 파일에 기록한 뒤 rename하므로, 중간에 크래시가 나도
//! 이전 체크포인트나 새 체크포인트 중 하나만 남습니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CollectorError;

/// 소스별 체크포인트 파일
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// `<data_dir>/<kind>-<source_name>.<extension>` 경로의 저장소를 만듭니다.
    pub fn new(data_dir: &Path, kind: &str, source_name: &str, extension: &str) -> Self {
        let name = sanitize(source_name);
        Self {
            path: data_dir.join(format!("{kind}-{name}.{extension}")),
        }
    }

    /// 저장 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 체크포인트를 읽습니다. 파일이 없거나 손상되었으면 기본값을 반환합니다.
    pub async fn load<T: DeserializeOwned + Default>(&self) -> T {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "corrupt checkpoint, starting without saved positions"
                );
                T::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read checkpoint");
                T::default()
            }
        }
    }

    /// 체크포인트를 원자적으로 기록합니다.
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<(), CollectorError> {
        let bytes = serde_json::to_vec(value).map_err(std::io::Error::other)?;
        self.write_atomic(&bytes).await
    }

    /// 원문 텍스트를 그대로 기록합니다 (journald 커서 파일 등 외부 형식).
    pub async fn save_text(&self, text: &str) -> Result<(), CollectorError> {
        self.write_atomic(text.as_bytes()).await
    }

    /// 체크포인트 파일 존재 여부
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<(), CollectorError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// 파일 이름에 쓸 수 없는 문자를 `_`로 바꿉니다.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
