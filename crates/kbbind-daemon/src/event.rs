//! Kernel input event records
//!
//! Encodes and decodes `struct input_event` explicitly, field by field, in
//! native byte order:
//!
//! ```text
//! offset          size  field
//! 0               L     tv_sec   (C long)
//! L               L     tv_usec  (C long)
//! 2L              2     type
//! 2L+2            2     code
//! 2L+4            4     value
//! ```
//!
//! where `L` is the size of a C `long` on the target (8 on 64-bit Linux,
//! giving a 24 byte record).

use std::mem::size_of;

use kbbind_config::KeyId;
use nix::libc::c_long;
use thiserror::Error;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_REP: u16 = 0x14;

pub const SYN_REPORT: u16 = 0x00;

pub use kbbind_config::KEY_MAX;

const LONG_SIZE: usize = size_of::<c_long>();

/// Size in bytes of one encoded event record.
pub const EVENT_SIZE: usize = 2 * LONG_SIZE + 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("short input event record: expected {expected} bytes, got {actual}")]
    ShortRecord { expected: usize, actual: usize },
}

/// Key state carried in the value of an `EV_KEY` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Release,
    Press,
    Repeat,
}

impl KeyState {
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Release),
            1 => Some(KeyState::Press),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }

    pub fn value(self) -> i32 {
        match self {
            KeyState::Release => 0,
            KeyState::Press => 1,
            KeyState::Repeat => 2,
        }
    }
}

/// Event timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

/// One input event record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputEvent {
    pub time: TimeVal,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    /// A key event with a zero timestamp.
    pub fn key(code: KeyId, state: KeyState) -> Self {
        Self {
            time: TimeVal::default(),
            kind: EV_KEY,
            code,
            value: state.value(),
        }
    }

    /// The `SYN_REPORT` marker that ends an event frame.
    pub fn sync() -> Self {
        Self {
            time: TimeVal::default(),
            kind: EV_SYN,
            code: SYN_REPORT,
            value: 0,
        }
    }

    /// Copy of this event for a different key and state, keeping the timestamp.
    pub fn with_key(&self, code: KeyId, state: KeyState) -> Self {
        Self {
            code,
            value: state.value(),
            ..*self
        }
    }

    pub fn is_key(&self) -> bool {
        self.kind == EV_KEY
    }

    /// The key state, if this is a key event with a known value.
    pub fn key_state(&self) -> Option<KeyState> {
        if !self.is_key() {
            return None;
        }
        KeyState::from_value(self.value)
    }

    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];

        buf[..LONG_SIZE].copy_from_slice(&(self.time.sec as c_long).to_ne_bytes());
        buf[LONG_SIZE..2 * LONG_SIZE].copy_from_slice(&(self.time.usec as c_long).to_ne_bytes());

        let rest = 2 * LONG_SIZE;
        buf[rest..rest + 2].copy_from_slice(&self.kind.to_ne_bytes());
        buf[rest + 2..rest + 4].copy_from_slice(&self.code.to_ne_bytes());
        buf[rest + 4..rest + 8].copy_from_slice(&self.value.to_ne_bytes());

        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != EVENT_SIZE {
            return Err(CodecError::ShortRecord {
                expected: EVENT_SIZE,
                actual: buf.len(),
            });
        }

        let mut long = [0u8; LONG_SIZE];
        long.copy_from_slice(&buf[..LONG_SIZE]);
        let sec = c_long::from_ne_bytes(long);
        long.copy_from_slice(&buf[LONG_SIZE..2 * LONG_SIZE]);
        let usec = c_long::from_ne_bytes(long);

        let rest = 2 * LONG_SIZE;
        let kind = u16::from_ne_bytes([buf[rest], buf[rest + 1]]);
        let code = u16::from_ne_bytes([buf[rest + 2], buf[rest + 3]]);
        let value = i32::from_ne_bytes([buf[rest + 4], buf[rest + 5], buf[rest + 6], buf[rest + 7]]);

        Ok(Self {
            time: TimeVal {
                sec: sec as i64,
                usec: usec as i64,
            },
            kind,
            code,
            value,
        })
    }
}
