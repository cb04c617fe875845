use super::Connector;
use serialport::SerialPort;
use std::io;
use std::time::Duration;

/// Serial port endpoint of the signal-light controller.
///
/// `timeout` bounds one blocking read. Keep it at or below the driver's poll
/// interval so a command never outlasts its attempts.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(port: &str, baud_rate: u32, timeout: Duration) -> Self {
        Self { port: port.to_string(), baud_rate, timeout }
    }
}

impl Connector for SerialConnector {
    type Link = Box<dyn SerialPort>;

    fn open(&self) -> io::Result<Self::Link> {
        serialport::new(&self.port, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(io::Error::from)
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}
