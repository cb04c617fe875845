//! Byte-level command grammar of the 8-output signal-light controller.
//!
//! ```text
//! write output : 40 3F 3F <state> <bank_hi> <bank_lo> 21     state 31=set 30=clear
//! read state   : 40 3F 3F 47 21                               reply: 8 bytes, 31=on
//! reply        : 06 ACK / 15 NAK
//! ```

use super::DeviceError;

pub const HEADER: [u8; 3] = [0x40, 0x3F, 0x3F];
pub const TERMINATOR: u8 = 0x21;
pub const STATE_SET: u8 = 0x31;
pub const STATE_CLEAR: u8 = 0x30;
pub const BANK_BASE: u8 = 0x30;
pub const QUERY: u8 = 0x47;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const OUTPUT_ON: u8 = 0x31;
pub const OUTPUT_OFF: u8 = 0x30;

pub const CHANNEL_COUNT: usize = 8;

/// Greeting sent right after the port is opened.
pub const HANDSHAKE: &[u8] = b"Hello\n";

pub const QUERY_FRAME: [u8; 5] = [HEADER[0], HEADER[1], HEADER[2], QUERY, TERMINATOR];

/// Output index, guaranteed to be in `0..8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    pub fn new(index: u8) -> Result<Self, DeviceError> {
        if (index as usize) < CHANNEL_COUNT {
            Ok(Channel(index))
        } else {
            Err(DeviceError::InvalidChannel(index))
        }
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Channel> {
        (0..CHANNEL_COUNT as u8).map(Channel)
    }
}

impl TryFrom<u8> for Channel {
    type Error = DeviceError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Channel::new(index)
    }
}

/// 7-byte frame switching one output on or off.
pub fn encode_write(channel: Channel, on: bool) -> [u8; 7] {
    let mut bank_hi = BANK_BASE;
    let mut bank_lo = BANK_BASE;
    let bit = 1u8 << (channel.0 % 4);
    if channel.0 < 4 {
        bank_lo |= bit;
    } else {
        bank_hi |= bit;
    }
    let state = if on { STATE_SET } else { STATE_CLEAR };
    [HEADER[0], HEADER[1], HEADER[2], state, bank_hi, bank_lo, TERMINATOR]
}

/// Decodes a write frame into `(channel mask, on)`. Bit `i` of the mask is channel `i`.
pub fn decode_write(frame: &[u8]) -> Option<(u8, bool)> {
    let [h0, h1, h2, state, hi, lo, end] = <[u8; 7]>::try_from(frame).ok()?;
    if [h0, h1, h2] != HEADER || end != TERMINATOR {
        return None;
    }
    let on = match state {
        STATE_SET => true,
        STATE_CLEAR => false,
        _ => return None,
    };
    if hi & 0xF0 != BANK_BASE || lo & 0xF0 != BANK_BASE {
        return None;
    }
    Some(((hi & 0x0F) << 4 | (lo & 0x0F), on))
}

/// Output states from a state-read reply. Missing positions read as off.
pub fn decode_state(reply: &[u8]) -> [bool; CHANNEL_COUNT] {
    let mut out = [false; CHANNEL_COUNT];
    for (slot, byte) in out.iter_mut().zip(reply) {
        *slot = *byte == OUTPUT_ON;
    }
    out
}

/// 8-byte state reply for the given outputs.
pub fn encode_state(outputs: &[bool; CHANNEL_COUNT]) -> [u8; CHANNEL_COUNT] {
    outputs.map(|on| if on { OUTPUT_ON } else { OUTPUT_OFF })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(i: u8) -> Channel {
        Channel::new(i).unwrap()
    }

    #[test]
    fn test_channel_range() {
        assert!(Channel::new(7).is_ok());
        assert!(matches!(Channel::new(8), Err(DeviceError::InvalidChannel(8))));
        assert!(Channel::try_from(255u8).is_err());
        assert_eq!(Channel::all().count(), 8);
    }

    #[test]
    fn test_write_frames() {
        // channel 5 lives in bank_hi, bit 1
        assert_eq!(encode_write(ch(5), true), [0x40, 0x3F, 0x3F, 0x31, 0x32, 0x30, 0x21]);
        // channel 2 lives in bank_lo, bit 2
        assert_eq!(encode_write(ch(2), false), [0x40, 0x3F, 0x3F, 0x30, 0x30, 0x34, 0x21]);
        assert_eq!(encode_write(ch(0), true)[5], 0x31);
        assert_eq!(encode_write(ch(7), true)[4], 0x38);
    }

    #[test]
    fn test_query_frame() {
        assert_eq!(QUERY_FRAME, [0x40, 0x3F, 0x3F, 0x47, 0x21]);
    }

    #[test]
    fn test_decode_write_mask() {
        assert_eq!(decode_write(&encode_write(ch(5), true)), Some((0b0010_0000, true)));
        assert_eq!(decode_write(&encode_write(ch(1), false)), Some((0b0000_0010, false)));
        assert_eq!(decode_write(&QUERY_FRAME), None);
        assert_eq!(decode_write(&[0x40, 0x3F, 0x3F, 0x32, 0x30, 0x31, 0x21]), None);
    }

    #[test]
    fn test_decode_state() {
        let reply = [0x31, 0x30, 0x30, 0x31, 0x30, 0x30, 0x30, 0x31];
        assert_eq!(decode_state(&reply), [true, false, false, true, false, false, false, true]);
        assert_eq!(decode_state(&[0x31]), [true, false, false, false, false, false, false, false]);
        let outputs = [false, true, false, false, true, false, false, false];
        assert_eq!(decode_state(&encode_state(&outputs)), outputs);
    }
}
