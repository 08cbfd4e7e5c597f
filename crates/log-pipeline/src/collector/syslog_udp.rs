//! UDP Syslog 수집기
//!
//! 각 UDP 데이터그램을 하나의 syslog 메시지로 취급합니다.
//! UDP는 재전송이 없으므로 읽기 위치를 저장하지 않습니다.

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::SyslogUdpSourceConfig;

use super::emit;
use crate::buffer::SourceQueue;
use crate::error::CollectorError;
use crate::parser::SyslogParser;

/// UDP Syslog 수집기
pub struct SyslogUdpCollector {
    name: String,
    config: SyslogUdpSourceConfig,
    queue: SourceQueue,
    cancel: CancellationToken,
    parser: SyslogParser,
}

impl SyslogUdpCollector {
    /// 새 UDP syslog 수집기를 생성합니다.
    pub fn new(
        name: &str,
        config: SyslogUdpSourceConfig,
        queue: SourceQueue,
        cancel: CancellationToken,
    ) -> Self {
        let parser = SyslogParser::new().with_max_input_size(config.max_message_size);
        Self {
            name: name.to_owned(),
            config,
            queue,
            cancel,
            parser,
        }
    }

    /// 바인드 주소를 반환합니다.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// 소켓에 바인드하고 취소될 때까지 수신합니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        let socket = UdpSocket::bind(&self.config.bind_addr).await.map_err(|e| {
            CollectorError::unavailable(
                &self.name,
                format!("failed to bind to {}: {e}", self.config.bind_addr),
            )
        })?;
        info!(source = %self.name, bind_addr = %self.config.bind_addr, "UDP syslog collector listening");
        self.serve(socket).await
    }

    async fn serve(&self, socket: UdpSocket) -> Result<(), CollectorError> {
        // 최대 크기보다 1바이트 크게 받아 잘린 데이터그램을 구분
        let mut buf = vec![0u8; self.config.max_message_size.saturating_add(1)];

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    let (len, peer) = result.map_err(|e| {
                        CollectorError::unavailable(&self.name, format!("recv error: {e}"))
                    })?;
                    if len > self.config.max_message_size {
                        warn!(source = %self.name, %peer, len, "datagram exceeds max size, dropped");
                        continue;
                    }
                    let datagram = trim_trailing_newlines(&buf[..len]);
                    if datagram.is_empty() {
                        continue;
                    }
                    let event = self
                        .parser
                        .to_event(&self.name, datagram)
                        .with_attribute("net.peer.addr", peer.to_string());
                    if !emit(&self.queue, event).await {
                        return Ok(());
                    }
                }
                _ = self.cancel.cancelled() => {
                    debug!(source = %self.name, "UDP syslog collector received shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}

fn trim_trailing_newlines(mut data: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r' | 0] = data {
        data = rest;
    }
    data
}
