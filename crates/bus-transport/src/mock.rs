use crate::{HalfDuplexBus, Result, TransportError};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One scripted answer for a `read_exact` call on the mock line.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Bytes that arrive within the read window.
    Frame(Vec<u8>),
    /// No device answers; the read times out.
    Silence,
    /// The transport itself fails mid-read.
    Fault(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExchangeOp {
    Write(usize),
    Read(usize),
}

/// Enter/exit instants of one bus exchange, for serialization checks.
#[derive(Clone, Copy, Debug)]
pub struct ExchangeRecord {
    pub op: ExchangeOp,
    pub entered: Instant,
    pub exited: Instant,
}

/// In-process scripted bus. Writes are recorded, reads pop the next
/// scripted [`Reply`], and every call lands in the exchange journal.
#[derive(Default)]
pub struct MockPort {
    replies: VecDeque<Reply>,
    writes: Vec<Vec<u8>>,
    journal: Vec<ExchangeRecord>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&mut self, reply: Reply) -> &mut Self {
        self.replies.push_back(reply);
        self
    }

    /// Every byte burst written to the line, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn journal(&self) -> &[ExchangeRecord] {
        &self.journal
    }

    fn record(&mut self, op: ExchangeOp, entered: Instant) {
        self.journal.push(ExchangeRecord {
            op,
            entered,
            exited: Instant::now(),
        });
    }
}

impl HalfDuplexBus for MockPort {
    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let entered = Instant::now();
        self.writes.push(bytes.to_vec());
        self.record(ExchangeOp::Write(bytes.len()), entered);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<()> {
        let entered = Instant::now();
        let reply = self.replies.pop_front().unwrap_or(Reply::Silence);
        match reply {
            Reply::Frame(bytes) if bytes.len() >= buf.len() => {
                buf.copy_from_slice(&bytes[..buf.len()]);
                self.record(ExchangeOp::Read(buf.len()), entered);
                Ok(())
            }
            // A short burst never completes the read
            Reply::Frame(_) | Reply::Silence => {
                self.record(ExchangeOp::Read(0), entered);
                Err(TransportError::Timeout)
            }
            Reply::Fault(message) => {
                self.record(ExchangeOp::Read(0), entered);
                Err(TransportError::Io(message))
            }
        }
    }
}
