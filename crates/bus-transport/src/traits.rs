use crate::Result;
use std::time::Duration;

/// A minimal blocking interface to a shared half-duplex line.
///
/// Implementations own the direction-control signal. A write asserts
/// transmit mode, pushes every byte out, and drops back to receive mode
/// before returning, so exchanges serialize naturally: the caller holds a
/// mutable borrow for the duration of each call and can never observe the
/// line mid-turnaround.
pub trait HalfDuplexBus {
    /// Transmit `bytes` in one burst with guaranteed turnaround.
    fn write_frame(&mut self, bytes: &[u8]) -> Result<()>;

    /// Block until `buf` is completely filled or `timeout` elapses.
    ///
    /// On timeout this fails with [`TransportError::Timeout`]; a partially
    /// filled buffer is never reported as success.
    ///
    /// [`TransportError::Timeout`]: crate::TransportError::Timeout
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()>;
}

impl<T: HalfDuplexBus + ?Sized> HalfDuplexBus for Box<T> {
    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_frame(bytes)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        (**self).read_exact(buf, timeout)
    }
}
