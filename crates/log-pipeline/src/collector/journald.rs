//! systemd journal 수집기
//!
//! `journalctl --follow --output=json --cursor-file=<data_dir>/journald-<name>.cursor`를
//! 자식 프로세스로 실행하고 표준 출력의 JSON 라인을 읽습니다.
//!
//! 커서 파일은 `journalctl`이 시작 위치로 읽는 파일입니다. 수집기도 읽은 엔트리의
//! `__CURSOR`를 주기적으로 같은 파일에 기록하므로, 강제 종료 후에도 이어 읽습니다.

use std::process::Stdio;
use std::time::Duration;

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::JournaldSourceConfig;

use super::checkpoint::CheckpointStore;
use super::emit;
use crate::buffer::SourceQueue;
use crate::error::CollectorError;
use crate::parser::journal::parse_entry;

/// 커서 저장 주기
const CURSOR_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// systemd journal 수집기
pub struct JournaldCollector {
    name: String,
    config: JournaldSourceConfig,
    queue: SourceQueue,
    cancel: CancellationToken,
    cursor_store: CheckpointStore,
}

impl JournaldCollector {
    /// 새 journald 수집기를 생성합니다.
    pub fn new(
        name: &str,
        config: JournaldSourceConfig,
        data_dir: &Path,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_owned(),
            config,
            queue,
            cancel,
            cursor_store: CheckpointStore::new(data_dir, "journald", name, "cursor"),
        }
    }

    /// 커서 파일 경로
    pub fn cursor_path(&self) -> &Path {
        self.cursor_store.path()
    }

    fn command(&self, resume: bool) -> Command {
        let program = self.config.journalctl_path.as_deref().unwrap_or("journalctl");
        let mut cmd = Command::new(program);
        cmd.arg("--follow")
            .arg("--output=json")
            .arg(format!("--cursor-file={}", self.cursor_store.path().display()));
        if !resume {
            // 저장된 위치가 없으면 과거 엔트리를 재전송하지 않음
            cmd.arg("--lines=0");
        }
        if let Some(dir) = &self.config.directory {
            cmd.arg(format!("--directory={dir}"));
        }
        for unit in &self.config.units {
            cmd.arg(format!("--unit={unit}"));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// `journalctl`을 실행하고 취소될 때까지 엔트리를 읽습니다.
    ///
    /// 프로세스가 스스로 종료되면 `SourceUnavailable`로 끝나 재시도됩니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        let resume = self.cursor_store.exists().await;
        if let Some(parent) = self.cursor_store.path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut child = self
            .command(resume)
            .spawn()
            .map_err(|e| CollectorError::unavailable(&self.name, format!("failed to spawn journalctl: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CollectorError::unavailable(&self.name, "journalctl stdout unavailable"))?;
        info!(source = %self.name, resume, units = ?self.config.units, "journald collector started");

        let mut lines = BufReader::new(stdout).lines();
        let mut last_cursor: Option<String> = None;
        let mut saved_cursor: Option<String> = None;
        let mut flush = tokio::time::interval(CURSOR_FLUSH_INTERVAL);

        let outcome = loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match parse_entry(&self.name, &line) {
                        Ok(entry) => {
                            if !emit(&self.queue, entry.event).await {
                                break Ok(());
                            }
                            if entry.cursor.is_some() {
                                last_cursor = entry.cursor;
                            }
                        }
                        Err(e) => debug!(source = %self.name, error = %e, "skipping journal line"),
                    },
                    Ok(None) => {
                        let status = child.wait().await;
                        break Err(CollectorError::unavailable(
                            &self.name,
                            format!("journalctl exited: {status:?}"),
                        ));
                    }
                    Err(e) => {
                        break Err(CollectorError::unavailable(&self.name, format!("read error: {e}")));
                    }
                },
                _ = flush.tick() => {
                    self.save_cursor(&last_cursor, &mut saved_cursor).await;
                }
                _ = self.cancel.cancelled() => break Ok(()),
            }
        };

        self.save_cursor(&last_cursor, &mut saved_cursor).await;
        if let Err(e) = child.start_kill() {
            debug!(source = %self.name, error = %e, "journalctl already exited");
        }
        let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
        outcome
    }

    async fn save_cursor(&self, last: &Option<String>, saved: &mut Option<String>) {
        let Some(cursor) = last else { return };
        if saved.as_ref() == Some(cursor) {
            return;
        }
        match self.cursor_store.save_text(cursor).await {
            Ok(()) => *saved = Some(cursor.clone()),
            Err(e) => warn!(source = %self.name, error = %e, "failed to persist journal cursor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use logpost_core::config::BackpressureConfig;

    use super::*;

    #[test]
    fn command_line_includes_cursor_and_units() {
        let dir = tempfile::tempdir().unwrap();
        let collector = JournaldCollector::new(
            "journal",
            JournaldSourceConfig {
                units: vec!["sshd.service".to_owned()],
                directory: Some("/var/log/journal".to_owned()),
                journalctl_path: None,
            },
            dir.path(),
            SourceQueue::new("journal", &BackpressureConfig::default()),
            CancellationToken::new(),
        );

        let fresh: Vec<String> = collector
            .command(false)
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(fresh.contains(&"--follow".to_owned()));
        assert!(fresh.contains(&"--output=json".to_owned()));
        assert!(fresh.contains(&"--lines=0".to_owned()));
        assert!(fresh.contains(&"--unit=sshd.service".to_owned()));
        assert!(fresh.contains(&"--directory=/var/log/journal".to_owned()));
        assert!(fresh.iter().any(|a| a.starts_with("--cursor-file=") && a.ends_with("journald-journal.cursor")));

        let resumed: Vec<String> = collector
            .command(true)
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!resumed.contains(&"--lines=0".to_owned()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn follows_fake_journalctl_and_persists_cursor() {
        use std::os::unix::fs::PermissionsExt;

        // Given: 엔트리 두 개를 출력하고 대기하는 가짜 journalctl
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("journalctl");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '{\"__CURSOR\":\"c1\",\"MESSAGE\":\"first\",\"PRIORITY\":\"6\"}'\n\
             echo '{\"__CURSOR\":\"c2\",\"MESSAGE\":\"second\",\"PRIORITY\":\"4\"}'\n\
             exec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let queue = SourceQueue::new("journal", &BackpressureConfig::default());
        let cancel = CancellationToken::new();
        let mut collector = JournaldCollector::new(
            "journal",
            JournaldSourceConfig {
                journalctl_path: Some(script.display().to_string()),
                ..Default::default()
            },
            dir.path(),
            queue.clone(),
            cancel.clone(),
        );
        let cursor_path = collector.cursor_path().to_path_buf();
        let task = tokio::spawn(async move { collector.run().await });

        // When
        let first = queue.pop().await.unwrap();
        let second = queue.pop().await.unwrap();
        cancel.cancel();
        task.await.unwrap().unwrap();

        // Then
        assert_eq!(first.body, "first");
        assert_eq!(second.level.as_deref(), Some("warning"));
        assert_eq!(std::fs::read_to_string(cursor_path).unwrap(), "c2");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = JournaldCollector::new(
            "journal",
            JournaldSourceConfig {
                journalctl_path: Some(dir.path().join("nope").display().to_string()),
                ..Default::default()
            },
            dir.path(),
            SourceQueue::new("journal", &BackpressureConfig::default()),
            CancellationToken::new(),
        );
        assert!(matches!(
            collector.run().await,
            Err(CollectorError::SourceUnavailable { .. })
        ));
    }
}
