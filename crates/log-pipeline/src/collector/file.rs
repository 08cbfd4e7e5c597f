//! 파일 기반 로그 수집기
//!
//! 로그 파일을 주기적으로 폴링하며 새로 추가된 라인을 수집합니다.
//! 파일별 (inode, offset)을 체크포인트에 저장하여 재시작 후 이어 읽습니다.
//!
//! # 로테이션 감지
//! - inode 변경: 이전 핸들을 끝까지 읽은 뒤 새 파일을 처음부터 읽음
//! - 파일 크기 축소 (truncation): 처음부터 다시 읽음
//! - 처음 보는 파일: `start_at` 설정에 따라 처음 또는 끝에서 시작

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::{FileSourceConfig, StartAt};
use logpost_core::event::LogEvent;

use super::checkpoint::CheckpointStore;
use super::emit;
use crate::buffer::SourceQueue;
use crate::error::CollectorError;

/// 파일 경로 속성 키
pub const ATTR_FILE_PATH: &str = "log.file.path";

/// 파일별 저장 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FileCheckpoint {
    inode: u64,
    offset: u64,
}

/// 파일별 추적 상태
struct TailedFile {
    path: PathBuf,
    key: String,
    reader: Option<BufReader<File>>,
    inode: u64,
    /// 마지막으로 방출한 완결 라인 끝의 바이트 오프셋
    offset: u64,
    /// 아직 개행을 만나지 못한 라인 조각
    partial: Vec<u8>,
    /// 최대 길이를 넘은 라인의 나머지를 버리는 중
    discarding: bool,
    /// 기동 후 첫 관측 전
    initial: bool,
}

impl TailedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            key: path.display().to_string(),
            path,
            reader: None,
            inode: 0,
            offset: 0,
            partial: Vec::new(),
            discarding: false,
            initial: true,
        }
    }

    fn checkpoint(&self) -> FileCheckpoint {
        FileCheckpoint {
            inode: self.inode,
            offset: self.offset,
        }
    }
}

/// 파일 기반 로그 수집기
pub struct FileCollector {
    name: String,
    config: FileSourceConfig,
    queue: SourceQueue,
    cancel: CancellationToken,
    store: CheckpointStore,
    files: Vec<TailedFile>,
}

impl FileCollector {
    /// 새 파일 수집기를 생성합니다.
    ///
    /// `exclude_filename_pattern`에 이름이 매치되는 파일은 감시 대상에서 제외됩니다.
    pub fn new(
        name: &str,
        config: FileSourceConfig,
        data_dir: &Path,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        let exclude = config
            .exclude_filename_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        let files = config
            .include
            .iter()
            .map(PathBuf::from)
            .filter(|path| {
                let excluded = exclude.as_ref().is_some_and(|re| {
                    path.file_name()
                        .is_some_and(|n| re.is_match(&n.to_string_lossy()))
                });
                if excluded {
                    debug!(source = name, path = %path.display(), "file excluded by pattern");
                }
                !excluded
            })
            .map(TailedFile::new)
            .collect();

        Ok(Self {
            name: name.to_owned(),
            store: CheckpointStore::new(data_dir, "file", name, "json"),
            config,
            queue,
            cancel,
            files,
        })
    }

    /// 감시 대상 파일 수
    pub fn watched_count(&self) -> usize {
        self.files.len()
    }

    /// 폴링 루프를 실행합니다. 취소되면 체크포인트를 저장하고 `Ok`로 끝납니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        info!(source = %self.name, files = self.files.len(), "starting file collector");

        let mut checkpoints: BTreeMap<String, FileCheckpoint> = self.store.load().await;
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));

        loop {
            let mut dirty = false;
            for idx in 0..self.files.len() {
                if self.cancel.is_cancelled() {
                    break;
                }
                let before = self.files[idx].checkpoint();
                self.poll_file(idx, &checkpoints).await?;
                let file = &self.files[idx];
                if file.reader.is_some() && file.checkpoint() != before {
                    checkpoints.insert(file.key.clone(), file.checkpoint());
                    dirty = true;
                }
            }

            if dirty {
                if let Err(e) = self.store.save(&checkpoints).await {
                    warn!(source = %self.name, error = %e, "failed to persist file offsets");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.store.save(&checkpoints).await?;
                    info!(source = %self.name, "file collector stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    async fn poll_file(
        &mut self,
        idx: usize,
        checkpoints: &BTreeMap<String, FileCheckpoint>,
    ) -> Result<(), CollectorError> {
        let path = self.files[idx].path.clone();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // 회전되어 사라진 파일은 열린 핸들의 남은 라인만 읽음
                let file = &mut self.files[idx];
                file.initial = false;
                if file.reader.is_some() {
                    self.read_lines(idx).await?;
                }
                return Ok(());
            }
            Err(e) => return Err(CollectorError::unavailable(&self.name, format!("{}: {e}", path.display()))),
        };
        let inode = inode_of(&metadata);
        let len = metadata.len();

        let file = &mut self.files[idx];
        if file.reader.is_none() {
            let start = match checkpoints.get(&file.key) {
                Some(cp) if cp.inode == inode && cp.offset <= len => cp.offset,
                Some(_) => 0,
                None if file.initial && self.config.start_at == StartAt::End => len,
                None => 0,
            };
            file.initial = false;
            self.open_at(idx, inode, start).await?;
        } else if inode != file.inode {
            info!(source = %self.name, path = %path.display(), "file rotated, reopening");
            self.read_lines(idx).await?;
            self.open_at(idx, inode, 0).await?;
        } else if len < file.offset {
            info!(source = %self.name, path = %path.display(), "file truncated, rewinding");
            self.open_at(idx, inode, 0).await?;
        }

        self.read_lines(idx).await
    }

    async fn open_at(&mut self, idx: usize, inode: u64, offset: u64) -> Result<(), CollectorError> {
        let file = &mut self.files[idx];
        let mut handle = File::open(&file.path)
            .await
            .map_err(|e| CollectorError::unavailable(&self.name, format!("{}: {e}", file.path.display())))?;
        handle.seek(SeekFrom::Start(offset)).await?;

        debug!(source = %self.name, path = %file.path.display(), offset, "opened file");
        file.reader = Some(BufReader::new(handle));
        file.inode = inode;
        file.offset = offset;
        file.partial.clear();
        file.discarding = false;
        Ok(())
    }

    /// 현재 핸들에서 EOF까지 완결된 라인을 읽어 방출합니다.
    async fn read_lines(&mut self, idx: usize) -> Result<(), CollectorError> {
        let max_line = self.config.max_line_bytes.max(1);

        loop {
            let file = &mut self.files[idx];
            let Some(reader) = file.reader.as_mut() else {
                return Ok(());
            };

            // partial은 max_line + 1 바이트를 넘지 않음
            let budget = (max_line + 1).saturating_sub(file.partial.len()).max(1) as u64;
            let read = (&mut *reader)
                .take(budget)
                .read_until(b'\n', &mut file.partial)
                .await
                .map_err(|e| CollectorError::unavailable(&self.name, format!("{}: {e}", file.path.display())))?;
            if read == 0 {
                return Ok(());
            }

            let complete = file.partial.ends_with(b"\n");
            if !complete && file.partial.len() <= max_line {
                // 아직 쓰는 중인 라인
                return Ok(());
            }

            let consumed = file.partial.len() as u64;
            let line = std::mem::take(&mut file.partial);
            let discarding = file.discarding;
            file.discarding = !complete;
            file.offset += consumed;

            if discarding {
                continue;
            }

            let event = self.line_event(idx, &line, max_line);
            if !emit(&self.queue, event).await {
                return Ok(());
            }
        }
    }

    fn line_event(&self, idx: usize, line: &[u8], max_line: usize) -> LogEvent {
        let mut text = line;
        while let Some((last, rest)) = text.split_last() {
            if *last == b'\n' || *last == b'\r' {
                text = rest;
            } else {
                break;
            }
        }
        let text = &text[..text.len().min(max_line)];
        LogEvent::new(&self.name, String::from_utf8_lossy(text).into_owned())
            .with_attribute(ATTR_FILE_PATH, self.files[idx].key.clone())
    }
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> u64 {
    0
}
