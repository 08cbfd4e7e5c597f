//! Logpost 내구성 버퍼
//!
//! 봉인된 봉투를 전송 완료까지 보관하는 SQLite 로컬 큐입니다.
//! 프로세스 재시작과 오프라인 기간을 견디며, 시퀀스 순서(FIFO)로만 꺼내집니다.

pub mod buffer;
pub mod error;

pub use buffer::{BufferStats, BufferStatus, BufferedEnvelope, DurableBuffer, RetentionPolicy};
pub use error::SpoolError;
