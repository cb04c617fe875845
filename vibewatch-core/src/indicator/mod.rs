//! Signal-light driver.
//!
//! Every command opens a fresh link, greets the controller, sends one frame
//! and polls for the reply a bounded number of times. Nothing is retried
//! here: callers try again on their next cycle.
//!
//! Two layers are exposed:
//! - `try_*` methods return a [`DeviceError`] describing what went wrong;
//! - [`IndicatorDriver::write_output`] and [`IndicatorDriver::read_outputs`]
//!   never fail, they log and report `false` / all outputs off instead.

pub mod frame;
pub mod serial;

pub use frame::{Channel, CHANNEL_COUNT};
pub use serial::SerialConnector;

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid channel {0}, expected 0..8")]
    InvalidChannel(u8),
    #[error("no reply after {attempts} poll(s)")]
    Timeout { attempts: u32 },
    #[error("device answered NAK")]
    Nack,
    #[error("unexpected reply byte 0x{0:02X}")]
    UnexpectedReply(u8),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Opens a new link to the controller for each command.
pub trait Connector: Clone + Send + Sync + 'static {
    type Link: Read + Write;

    fn open(&self) -> io::Result<Self::Link>;

    /// Human-readable endpoint for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Reply polls per command.
    pub attempts: u32,
    /// Length of one poll. A read blocking on the link counts towards it.
    pub poll_interval: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self { attempts: 10, poll_interval: Duration::from_millis(200) }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorDriver<C> {
    connector: C,
    settings: DriverSettings,
}

fn is_quiet(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

impl<C: Connector> IndicatorDriver<C> {
    pub fn new(connector: C, settings: DriverSettings) -> Self {
        Self { connector, settings }
    }

    /// Sends the greeting and discards one reply line, whatever it contains.
    fn handshake(&self, link: &mut C::Link) -> Result<(), DeviceError> {
        link.write_all(frame::HANDSHAKE)?;
        link.flush()?;

        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while line.len() < 64 {
            match link.read(&mut byte) {
                Ok(1) if byte[0] == b'\n' => break,
                Ok(1) => line.push(byte[0]),
                Ok(_) => break,
                Err(e) if is_quiet(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        let text = String::from_utf8_lossy(&line);
        debug!("handshake reply from {}: {:?}", self.connector.describe(), text.trim());
        Ok(())
    }

    /// Each poll lasts one interval, time spent blocked in `read` included.
    fn wait_rest_of_poll(&self, started: Instant) {
        let rest = self.settings.poll_interval.saturating_sub(started.elapsed());
        if !rest.is_zero() {
            std::thread::sleep(rest);
        }
    }

    fn connect(&self) -> Result<C::Link, DeviceError> {
        let mut link = self.connector.open()?;
        self.handshake(&mut link)?;
        Ok(link)
    }

    /// Switches one output and waits for the ACK.
    pub fn try_write_output(&self, channel: Channel, on: bool) -> Result<(), DeviceError> {
        let mut link = self.connect()?;
        let cmd = frame::encode_write(channel, on);
        debug!("sending {:02X?} to {}", cmd, self.connector.describe());
        link.write_all(&cmd)?;
        link.flush()?;

        let mut last = None;
        for _ in 0..self.settings.attempts {
            let started = Instant::now();
            let mut reply = [0u8; 1];
            match link.read(&mut reply) {
                Ok(1) if reply[0] == frame::ACK => return Ok(()),
                Ok(1) if reply[0] == frame::NAK => return Err(DeviceError::Nack),
                Ok(1) => last = Some(reply[0]),
                Ok(_) => {}
                Err(e) if is_quiet(&e) => {}
                Err(e) => return Err(e.into()),
            }
            self.wait_rest_of_poll(started);
        }
        Err(match last {
            Some(byte) => DeviceError::UnexpectedReply(byte),
            None => DeviceError::Timeout { attempts: self.settings.attempts },
        })
    }

    /// Queries all eight outputs. A NAK as first reply byte aborts the read.
    pub fn try_read_outputs(&self) -> Result<[bool; CHANNEL_COUNT], DeviceError> {
        let mut link = self.connect()?;
        link.write_all(&frame::QUERY_FRAME)?;
        link.flush()?;

        let mut buf = [0u8; CHANNEL_COUNT];
        let mut filled = 0usize;
        for _ in 0..self.settings.attempts {
            let started = Instant::now();
            match link.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(e) if is_quiet(&e) => {}
                Err(e) => return Err(e.into()),
            }
            if filled >= 1 && buf[0] == frame::NAK {
                return Err(DeviceError::Nack);
            }
            if filled >= CHANNEL_COUNT {
                return Ok(frame::decode_state(&buf));
            }
            self.wait_rest_of_poll(started);
        }
        Err(DeviceError::Timeout { attempts: self.settings.attempts })
    }

    /// Non-failing write: `true` only when the controller acknowledged.
    pub fn write_output(&self, index: u8, on: bool) -> bool {
        let channel = match Channel::new(index) {
            Ok(c) => c,
            Err(e) => {
                warn!("indicator write rejected: {}", e);
                return false;
            }
        };
        match self.try_write_output(channel, on) {
            Ok(()) => {
                info!("indicator channel {} {}", index, if on { "ON" } else { "OFF" });
                true
            }
            Err(e) => {
                warn!("indicator channel {} {} failed on {}: {}", index, if on { "ON" } else { "OFF" }, self.connector.describe(), e);
                false
            }
        }
    }

    /// Non-failing read: every output reads as off when the state is unknown.
    pub fn read_outputs(&self) -> [bool; CHANNEL_COUNT] {
        match self.try_read_outputs() {
            Ok(state) => {
                debug!("indicator state {:?}", state);
                state
            }
            Err(e) => {
                warn!("indicator state read failed on {}: {}", self.connector.describe(), e);
                [false; CHANNEL_COUNT]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Link replaying canned reply chunks, one chunk per read call.
    #[derive(Clone, Default)]
    struct Scripted {
        replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
        written: Arc<Mutex<Vec<u8>>>,
        opens: Arc<Mutex<usize>>,
        refuse: bool,
    }

    impl Scripted {
        fn with(chunks: &[&[u8]]) -> Self {
            let s = Scripted::default();
            s.replies.lock().unwrap().extend(chunks.iter().map(|c| c.to_vec()));
            s
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut replies = self.replies.lock().unwrap();
            let Some(mut chunk) = replies.pop_front() else {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"));
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                replies.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connector for Scripted {
        type Link = Scripted;
        fn open(&self) -> io::Result<Scripted> {
            if self.refuse {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such port"));
            }
            *self.opens.lock().unwrap() += 1;
            Ok(self.clone())
        }
        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn driver(link: Scripted) -> IndicatorDriver<Scripted> {
        IndicatorDriver::new(link, DriverSettings { attempts: 10, poll_interval: Duration::ZERO })
    }

    #[test]
    fn test_write_sends_handshake_then_frame() {
        let link = Scripted::with(&[b"OK\r\n", &[frame::ACK]]);
        let d = driver(link.clone());
        d.try_write_output(Channel::new(5).unwrap(), true).unwrap();
        let written = link.written.lock().unwrap().clone();
        assert_eq!(&written[..6], b"Hello\n");
        assert_eq!(&written[6..], &[0x40, 0x3F, 0x3F, 0x31, 0x32, 0x30, 0x21]);
    }

    #[test]
    fn test_write_ack_after_noise() {
        // no handshake line, then a stray byte, then ACK
        let link = Scripted::with(&[b"\n", b"?", &[frame::ACK]]);
        assert!(driver(link).write_output(3, false));
    }

    #[test]
    fn test_write_timeout_and_nak() {
        let d = driver(Scripted::with(&[b"hi\n"]));
        assert!(matches!(d.try_write_output(Channel::new(1).unwrap(), true), Err(DeviceError::Timeout { attempts: 10 })));

        let d = driver(Scripted::with(&[b"hi\n", &[frame::NAK]]));
        assert!(matches!(d.try_write_output(Channel::new(1).unwrap(), true), Err(DeviceError::Nack)));
        assert!(!d.write_output(1, true));
    }

    #[test]
    fn test_invalid_channel_does_no_io() {
        let link = Scripted::default();
        let d = driver(link.clone());
        assert!(!d.write_output(8, true));
        assert_eq!(*link.opens.lock().unwrap(), 0);
        assert!(link.written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_read_state_in_chunks() {
        let link = Scripted::with(&[b"hi\n", &[0x31, 0x30, 0x30], &[0x31, 0x30], &[0x30, 0x30, 0x31]]);
        let d = driver(link.clone());
        assert_eq!(d.read_outputs(), [true, false, false, true, false, false, false, true]);
        assert!(link.written.lock().unwrap().ends_with(&frame::QUERY_FRAME));
    }

    #[test]
    fn test_read_state_nak_is_all_off() {
        let d = driver(Scripted::with(&[b"hi\n", &[frame::NAK, 0x31, 0x31]]));
        assert!(matches!(d.try_read_outputs(), Err(DeviceError::Nack)));
        let d = driver(Scripted::with(&[b"hi\n", &[frame::NAK, 0x31, 0x31]]));
        assert_eq!(d.read_outputs(), [false; CHANNEL_COUNT]);
    }

    #[test]
    fn test_read_state_partial_is_timeout() {
        let d = driver(Scripted::with(&[b"hi\n", &[0x31, 0x31, 0x31]]));
        assert!(matches!(d.try_read_outputs(), Err(DeviceError::Timeout { .. })));
    }

    /// Link whose every read blocks like a quiet serial port.
    #[derive(Clone)]
    struct Sluggish(Duration);

    impl Read for Sluggish {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(self.0);
            Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"))
        }
    }

    impl Write for Sluggish {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connector for Sluggish {
        type Link = Sluggish;
        fn open(&self) -> io::Result<Sluggish> {
            Ok(self.clone())
        }
        fn describe(&self) -> String {
            "sluggish".into()
        }
    }

    #[test]
    fn test_blocking_reads_count_towards_poll_interval() {
        let poll = Duration::from_millis(40);
        let d = IndicatorDriver::new(Sluggish(poll), DriverSettings { attempts: 5, poll_interval: poll });

        let started = Instant::now();
        assert!(matches!(d.try_write_output(Channel::new(1).unwrap(), true), Err(DeviceError::Timeout { attempts: 5 })));
        // handshake read plus five polls, no extra sleep on top of each blocking read
        assert!(started.elapsed() < Duration::from_millis(360), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_port_unavailable() {
        let link = Scripted { refuse: true, ..Scripted::default() };
        let d = driver(link);
        assert!(!d.write_output(1, true));
        assert_eq!(d.read_outputs(), [false; CHANNEL_COUNT]);
        assert!(matches!(d.try_read_outputs(), Err(DeviceError::Io(_))));
    }
}
