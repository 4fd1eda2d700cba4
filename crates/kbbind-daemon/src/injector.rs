//! Virtual device injection via uinput
//!
//! [`EventSink`] serializes events onto any byte channel and applies the
//! sync marker policy. [`VirtualKeyboard`] is the uinput device that channel
//! normally is: it registers every key code, writes the legacy
//! `uinput_user_dev` setup record and destroys the device again on drop.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use nix::libc;

use crate::event::{InputEvent, EV_KEY, EV_REL, EV_REP, KEY_MAX};

const UINPUT_IOCTL_BASE: u8 = b'U';

nix::ioctl_none!(ui_dev_create, UINPUT_IOCTL_BASE, 1);
nix::ioctl_none!(ui_dev_destroy, UINPUT_IOCTL_BASE, 2);
nix::ioctl_write_int!(ui_set_evbit, UINPUT_IOCTL_BASE, 100);
nix::ioctl_write_int!(ui_set_keybit, UINPUT_IOCTL_BASE, 101);

/// Default uinput control node.
pub const DEFAULT_UINPUT_PATH: &str = "/dev/input/uinput";

/// Default name of the virtual device.
pub const DEFAULT_DEVICE_NAME: &str = "kbbind virtual keyboard";

pub const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 0x40;
const BUS_VIRTUAL: u16 = 0x06;

/// Size of an encoded `struct uinput_user_dev`.
pub const USER_DEV_SIZE: usize = UINPUT_MAX_NAME_SIZE + 4 * 2 + 4 + 4 * ABS_CNT * 4;

/// Contents of the legacy `uinput_user_dev` setup record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSetup {
    pub name: String,
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl DeviceSetup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bustype: BUS_VIRTUAL,
            vendor: 0,
            product: 0,
            version: 0,
        }
    }

    /// Encode the record. The name is truncated to leave room for its NUL
    /// terminator; all absolute axis arrays are zero.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(USER_DEV_SIZE);

        let mut name = [0u8; UINPUT_MAX_NAME_SIZE];
        let bytes = truncate_name(&self.name);
        name[..bytes.len()].copy_from_slice(bytes);
        buf.extend_from_slice(&name);

        for field in [self.bustype, self.vendor, self.product, self.version] {
            buf.extend_from_slice(&field.to_ne_bytes());
        }
        // ff_effects_max
        buf.extend_from_slice(&0u32.to_ne_bytes());
        // absmax, absmin, absfuzz, absflat
        buf.resize(USER_DEV_SIZE, 0);

        buf
    }
}

/// The longest prefix of `name` that fits the record, not splitting a character.
fn truncate_name(name: &str) -> &[u8] {
    let max = UINPUT_MAX_NAME_SIZE - 1;
    if name.len() <= max {
        return name.as_bytes();
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name.as_bytes()[..end]
}

/// Writes output events to a channel, optionally followed by a sync marker.
#[derive(Debug)]
pub struct EventSink<W> {
    out: W,
    sync_every_event: bool,
}

impl<W: Write> EventSink<W> {
    pub fn new(out: W, sync_every_event: bool) -> Self {
        Self {
            out,
            sync_every_event,
        }
    }

    /// Write one event, then the sync marker if enabled.
    ///
    /// Partial writes are retried until the whole record is out.
    pub fn emit(&mut self, event: &InputEvent) -> io::Result<()> {
        self.out.write_all(&event.encode())?;
        if self.sync_every_event {
            self.out.write_all(&InputEvent::sync().encode())?;
        }
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// A uinput virtual keyboard
#[derive(Debug)]
pub struct VirtualKeyboard {
    file: File,
}

impl VirtualKeyboard {
    /// Create a virtual keyboard through the uinput node at `uinput_path`.
    pub fn create(uinput_path: &Path, name: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(uinput_path)
            .with_context(|| format!("Unable to open {}", uinput_path.display()))?;
        let fd = file.as_raw_fd();

        for ev_type in [EV_KEY, EV_REP, EV_REL] {
            // SAFETY: fd is an open uinput node for the lifetime of this call
            unsafe { ui_set_evbit(fd, ev_type as _) }
                .with_context(|| format!("Unable to enable event type {} on uinput device", ev_type))?;
        }

        for code in 1..=KEY_MAX {
            // SAFETY: as above
            unsafe { ui_set_keybit(fd, code as _) }
                .with_context(|| format!("Unable to enable key {} on uinput device", code))?;
        }

        let setup = DeviceSetup::new(name);
        (&file)
            .write_all(&setup.encode())
            .context("Unable to write uinput device setup")?;

        // SAFETY: as above
        unsafe { ui_dev_create(fd) }.context("Unable to create uinput device")?;

        tracing::info!(
            "Created virtual keyboard '{}' via {}",
            String::from_utf8_lossy(truncate_name(name)),
            uinput_path.display()
        );

        Ok(Self { file })
    }
}

impl Write for VirtualKeyboard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for VirtualKeyboard {
    fn drop(&mut self) {
        // SAFETY: the file is still open until after this returns
        match unsafe { ui_dev_destroy(self.file.as_raw_fd()) } {
            Ok(_) => tracing::debug!("Destroyed virtual keyboard"),
            Err(e) => tracing::warn!("Failed to destroy virtual keyboard: {}", e),
        }
    }
}
