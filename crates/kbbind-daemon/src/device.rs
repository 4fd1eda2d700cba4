//! Input device access

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use evdev::raw_stream::RawDevice;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tokio::io::unix::AsyncFd;

use crate::event::{InputEvent, EVENT_SIZE};

/// An opened input device node.
///
/// The device is ungrabbed on drop if it was grabbed.
pub struct InputDevice {
    raw: RawDevice,
    path: PathBuf,
    grabbed: bool,
}

impl InputDevice {
    /// Open the device and switch it to non-blocking reads.
    pub fn open(path: &Path) -> Result<Self> {
        let raw = RawDevice::open(path)
            .with_context(|| format!("Unable to open {}", path.display()))?;

        let fd = raw.as_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL)
            .with_context(|| format!("Unable to read flags of {}", path.display()))?;
        fcntl(
            fd,
            FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK),
        )
        .with_context(|| format!("Unable to make {} non-blocking", path.display()))?;

        Ok(Self {
            raw,
            path: path.to_path_buf(),
            grabbed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device name reported by the kernel, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.raw.name()
    }

    /// Take exclusive access to the device's events.
    pub fn grab(&mut self) -> Result<()> {
        self.raw
            .grab()
            .with_context(|| format!("Unable to grab {}", self.path.display()))?;
        self.grabbed = true;
        tracing::debug!("Grabbed {}", self.path.display());
        Ok(())
    }

    pub fn ungrab(&mut self) -> Result<()> {
        self.raw
            .ungrab()
            .with_context(|| format!("Unable to release {}", self.path.display()))?;
        self.grabbed = false;
        tracing::debug!("Released {}", self.path.display());
        Ok(())
    }
}

impl AsRawFd for InputDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.raw.as_raw_fd()
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        if self.grabbed {
            if let Err(e) = self.ungrab() {
                tracing::warn!("{:#}", e);
            }
        }
    }
}

/// Reads event records from a non-blocking descriptor through the runtime's reactor.
pub struct EventReader<T: AsRawFd> {
    fd: AsyncFd<T>,
    label: String,
}

impl EventReader<InputDevice> {
    /// Must be called from within a tokio runtime.
    pub fn from_device(device: InputDevice) -> Result<Self> {
        let label = device.path().display().to_string();
        Self::new(device, label)
    }
}

impl<T: AsRawFd> EventReader<T> {
    /// `source` must already be in non-blocking mode.
    pub fn new(source: T, label: String) -> Result<Self> {
        let fd = AsyncFd::new(source)
            .with_context(|| format!("Unable to register {} with the event loop", label))?;
        Ok(Self { fd, label })
    }

    pub fn get_ref(&self) -> &T {
        self.fd.get_ref()
    }

    pub fn into_inner(self) -> T {
        self.fd.into_inner()
    }

    /// Wait for and read the next event record.
    ///
    /// Interrupted reads are retried. End of file and short records are errors.
    pub async fn next_event(&mut self) -> Result<InputEvent> {
        let mut buf = [0u8; EVENT_SIZE];

        loop {
            let mut guard = self
                .fd
                .readable()
                .await
                .with_context(|| format!("Error polling {}", self.label))?;

            let read = guard.try_io(|inner| {
                nix::unistd::read(inner.as_raw_fd(), &mut buf).map_err(io::Error::from)
            });

            match read {
                Ok(Ok(0)) => bail!("Unexpected end of input from {}", self.label),
                Ok(Ok(n)) => {
                    return InputEvent::decode(&buf[..n])
                        .with_context(|| format!("Error reading from {}", self.label));
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => {
                    return Err(e).with_context(|| format!("Error reading from {}", self.label))
                }
                Err(_would_block) => continue,
            }
        }
    }
}
