/*!
Simulated signal-light controller for development without hardware

Implements [`Connector`] so the real driver can talk to it. Every frame the
driver sends is recorded, write frames switch the simulated outputs and the
replies follow the controller's protocol (ACK/NAK, 8-byte state dump).
*/

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vibewatch_core::indicator::frame;
use vibewatch_core::{Connector, DriverSettings, IndicatorDriver, CHANNEL_COUNT};

/// One frame received by the simulated controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Handshake,
    /// Write frame, bit `i` of `mask` is channel `i`.
    Write { mask: u8, on: bool },
    Query,
    Garbage(Vec<u8>),
}

/// How the simulated controller answers commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyMode {
    #[default]
    Ack,
    /// Answers NAK and changes nothing.
    Nak,
    /// Applies writes but never answers.
    Silent,
}

#[derive(Debug, Default)]
struct DeviceState {
    outputs: [bool; CHANNEL_COUNT],
    pending: VecDeque<u8>,
    events: Vec<DeviceEvent>,
    mode: ReplyMode,
    unplugged: bool,
    opens: usize,
}

/// Mock controller shared between the test and every link the driver opens.
#[derive(Clone, Default)]
pub struct MockIndicator {
    state: Arc<Mutex<DeviceState>>,
}

impl MockIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver bound to this simulator, polling without delay.
    pub fn driver(&self) -> IndicatorDriver<MockIndicator> {
        IndicatorDriver::new(
            self.clone(),
            DriverSettings { attempts: 3, poll_interval: Duration::ZERO },
        )
    }

    pub fn set_mode(&self, mode: ReplyMode) {
        self.state.lock().unwrap().mode = mode;
    }

    /// Makes every subsequent `open` fail, like a missing serial port.
    pub fn unplug(&self) {
        self.state.lock().unwrap().unplugged = true;
        log::info!("🔌 [MOCK] controller unplugged");
    }

    pub fn plug(&self) {
        self.state.lock().unwrap().unplugged = false;
    }

    /// Forces output states without going through the protocol.
    pub fn set_outputs(&self, outputs: [bool; CHANNEL_COUNT]) {
        self.state.lock().unwrap().outputs = outputs;
    }

    pub fn outputs(&self) -> [bool; CHANNEL_COUNT] {
        self.state.lock().unwrap().outputs
    }

    pub fn output(&self, channel: u8) -> bool {
        self.outputs().get(channel as usize).copied().unwrap_or(false)
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Write frames only, as `(channel, on)`. Multi-bit masks expand to one entry per bit.
    pub fn writes(&self) -> Vec<(u8, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Write { mask, on } => Some((mask, on)),
                _ => None,
            })
            .flat_map(|(mask, on)| {
                (0..CHANNEL_COUNT as u8).filter(move |i| mask & (1 << i) != 0).map(move |i| (i, on))
            })
            .collect()
    }

    pub fn writes_to(&self, channel: u8) -> Vec<bool> {
        self.writes().into_iter().filter(|(c, _)| *c == channel).map(|(_, on)| on).collect()
    }

    pub fn query_count(&self) -> usize {
        self.events().iter().filter(|e| **e == DeviceEvent::Query).count()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    /// Forgets recorded traffic, keeps outputs and mode.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.events.clear();
        state.pending.clear();
        state.opens = 0;
    }
}

impl DeviceState {
    fn receive(&mut self, bytes: &[u8]) {
        if bytes == frame::HANDSHAKE {
            self.events.push(DeviceEvent::Handshake);
            self.pending.extend(b"PHC-D08 ready\r\n");
            return;
        }
        if bytes == frame::QUERY_FRAME {
            self.events.push(DeviceEvent::Query);
            match self.mode {
                ReplyMode::Ack => self.pending.extend(frame::encode_state(&self.outputs)),
                ReplyMode::Nak => self.pending.push_back(frame::NAK),
                ReplyMode::Silent => {}
            }
            return;
        }
        let Some((mask, on)) = frame::decode_write(bytes) else {
            log::warn!("⚠️ [MOCK] garbage frame {:02X?}", bytes);
            self.events.push(DeviceEvent::Garbage(bytes.to_vec()));
            self.pending.push_back(frame::NAK);
            return;
        };
        self.events.push(DeviceEvent::Write { mask, on });
        if self.mode == ReplyMode::Nak {
            self.pending.push_back(frame::NAK);
            return;
        }
        for (i, out) in self.outputs.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *out = on;
            }
        }
        if self.mode == ReplyMode::Ack {
            self.pending.push_back(frame::ACK);
        }
    }
}

/// Open link to the simulator. Each `write` call is treated as one frame.
pub struct MockLink {
    state: Arc<Mutex<DeviceState>>,
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply pending"));
        }
        let n = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().unwrap().receive(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for MockIndicator {
    type Link = MockLink;

    fn open(&self) -> io::Result<MockLink> {
        let mut state = self.state.lock().unwrap();
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::NotFound, "simulated port missing"));
        }
        state.opens += 1;
        // a fresh link starts with an empty input buffer
        state.pending.clear();
        Ok(MockLink { state: self.state.clone() })
    }

    fn describe(&self) -> String {
        "mock-indicator".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibewatch_core::{Channel, DeviceError};

    #[test]
    fn test_driver_switches_simulated_outputs() {
        let device = MockIndicator::new();
        let driver = device.driver();

        assert!(driver.write_output(1, true));
        assert!(driver.write_output(5, true));
        assert!(driver.write_output(1, false));

        assert!(!device.output(1));
        assert!(device.output(5));
        assert_eq!(device.writes(), vec![(1, true), (5, true), (1, false)]);
        assert_eq!(device.open_count(), 3);
        assert_eq!(device.events().iter().filter(|e| **e == DeviceEvent::Handshake).count(), 3);
    }

    #[test]
    fn test_state_read_reflects_outputs() {
        let device = MockIndicator::new();
        device.set_outputs([false, true, false, true, false, false, false, false]);
        assert_eq!(device.driver().read_outputs(), [false, true, false, true, false, false, false, false]);
        assert_eq!(device.query_count(), 1);
    }

    #[test]
    fn test_nak_mode() {
        let device = MockIndicator::new();
        device.set_mode(ReplyMode::Nak);
        let driver = device.driver();
        assert!(matches!(driver.try_write_output(Channel::new(3).unwrap(), true), Err(DeviceError::Nack)));
        assert!(!device.output(3));
        assert_eq!(driver.read_outputs(), [false; CHANNEL_COUNT]);
    }

    #[test]
    fn test_silent_mode_times_out() {
        let device = MockIndicator::new();
        device.set_mode(ReplyMode::Silent);
        let result = device.driver().try_write_output(Channel::new(4).unwrap(), true);
        assert!(matches!(result, Err(DeviceError::Timeout { attempts: 3 })));
        // the frame still reached the controller
        assert!(device.output(4));
    }

    #[test]
    fn test_unplugged_device() {
        let device = MockIndicator::new();
        device.unplug();
        assert!(!device.driver().write_output(1, true));
        assert!(device.events().is_empty());
        device.plug();
        assert!(device.driver().write_output(1, true));
    }
}
