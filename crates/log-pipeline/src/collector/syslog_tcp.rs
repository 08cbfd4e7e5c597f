//! TCP Syslog 수집기
//!
//! newline framing으로 syslog 메시지를 수신합니다.
//! 각 TCP 연결은 별도의 tokio 태스크에서 처리되며, 동시 연결 수는 세마포어로 제한됩니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::SyslogTcpSourceConfig;

use super::emit;
use crate::buffer::SourceQueue;
use crate::error::CollectorError;
use crate::parser::SyslogParser;

/// TCP Syslog 수집기
pub struct SyslogTcpCollector {
    name: String,
    config: SyslogTcpSourceConfig,
    queue: SourceQueue,
    cancel: CancellationToken,
}

impl SyslogTcpCollector {
    /// 새 TCP syslog 수집기를 생성합니다.
    pub fn new(
        name: &str,
        config: SyslogTcpSourceConfig,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_owned(),
            config,
            queue,
            cancel,
        }
    }

    /// 바인드 주소를 반환합니다.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// TCP 소켓에 바인드하고 연결 수락 루프를 실행합니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| {
                CollectorError::unavailable(
                    &self.name,
                    format!("failed to bind to {}: {e}", self.config.bind_addr),
                )
            })?;
        info!(source = %self.name, bind_addr = %self.config.bind_addr, "TCP syslog collector listening");
        self.serve(listener).await
    }

    async fn serve(&self, listener: TcpListener) -> Result<(), CollectorError> {
        // 연결 수 제한을 위한 세마포어
        let connection_semaphore = Arc::new(Semaphore::new(self.config.max_connections.max(1)));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, addr) = result.map_err(|e| {
                        CollectorError::unavailable(&self.name, format!("accept error: {e}"))
                    })?;

                    let Ok(permit) = Arc::clone(&connection_semaphore).try_acquire_owned() else {
                        warn!(source = %self.name, peer = %addr, "max connections reached, rejecting connection");
                        continue;
                    };
                    debug!(source = %self.name, peer = %addr, "accepted connection");

                    let connection = Connection {
                        name: self.name.clone(),
                        peer: addr.to_string(),
                        queue: self.queue.clone(),
                        cancel: self.cancel.clone(),
                        idle_timeout: Duration::from_secs(self.config.idle_timeout_secs.max(1)),
                        max_message_size: self.config.max_message_size,
                    };
                    tokio::spawn(async move {
                        connection.handle(stream).await;
                        drop(permit);
                    });
                }
                _ = self.cancel.cancelled() => {
                    debug!(source = %self.name, "TCP syslog collector received shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}

/// 단일 TCP 연결 처리기
struct Connection {
    name: String,
    peer: String,
    queue: SourceQueue,
    cancel: CancellationToken,
    idle_timeout: Duration,
    max_message_size: usize,
}

impl Connection {
    async fn handle(self, stream: TcpStream) {
        let parser = SyslogParser::new().with_max_input_size(self.max_message_size);
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();

        loop {
            line.clear();

            tokio::select! {
                result = timeout(self.idle_timeout, reader.read_until(b'\n', &mut line)) => {
                    match result {
                        Ok(Ok(0)) => {
                            debug!(source = %self.name, peer = %self.peer, "connection closed by peer");
                            return;
                        }
                        Ok(Ok(_)) => {
                            if line.len() > self.max_message_size {
                                warn!(
                                    source = %self.name,
                                    peer = %self.peer,
                                    len = line.len(),
                                    max = self.max_message_size,
                                    "message exceeds max size, closing connection"
                                );
                                return;
                            }
                            if line.iter().all(u8::is_ascii_whitespace) {
                                continue;
                            }
                            let event = parser
                                .to_event(&self.name, &line)
                                .with_attribute("net.peer.addr", self.peer.clone());
                            if !emit(&self.queue, event).await {
                                return;
                            }
                        }
                        Ok(Err(e)) => {
                            warn!(source = %self.name, peer = %self.peer, error = %e, "read error");
                            return;
                        }
                        Err(_) => {
                            debug!(source = %self.name, peer = %self.peer, "idle timeout, closing connection");
                            return;
                        }
                    }
                }
                _ = self.cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use logpost_core::config::BackpressureConfig;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn collector(max_connections: usize) -> (SyslogTcpCollector, SourceQueue, CancellationToken) {
        let queue = SourceQueue::new("tcp", &BackpressureConfig::default());
        let cancel = CancellationToken::new();
        let config = SyslogTcpSourceConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            max_connections,
            idle_timeout_secs: 5,
            max_message_size: 64,
        };
        (
            SyslogTcpCollector::new("tcp", config, queue.clone(), cancel.clone()),
            queue,
            cancel,
        )
    }

    #[tokio::test]
    async fn newline_framed_messages_are_collected_in_order() {
        // Given
        let (collector, queue, cancel) = collector(4);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move { collector.serve(listener).await });

        // When
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"<13>Jan 15 12:00:00 h app: first\n\n<13>Jan 15 12:00:01 h app: second\n")
            .await
            .unwrap();

        // Then
        assert_eq!(queue.pop().await.unwrap().body, "first");
        let second = queue.pop().await.unwrap();
        assert_eq!(second.body, "second");
        assert_eq!(second.level.as_deref(), Some("notice"));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_line_closes_connection() {
        let (collector, queue, cancel) = collector(4);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move { collector.serve(listener).await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let long = format!("{}\n", "x".repeat(100));
        client.write_all(long.as_bytes()).await.unwrap();

        // 서버가 연결을 닫으면 읽기는 EOF 또는 에러로 끝남
        let mut buf = [0u8; 1];
        let read = tokio::io::AsyncReadExt::read(&mut client, &mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(queue.is_empty());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
