//! Log output to syslog for `--daemon`

use std::ffi::{CStr, CString};
use std::io::{self, Write};

use nix::libc;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

const IDENT: &CStr = c"kbbind";

/// Hands each formatted log line to `syslog(3)` under the daemon facility.
#[derive(Debug)]
pub struct Syslog {
    _private: (),
}

impl Syslog {
    /// Open the log connection. Messages are tagged `kbbind[<pid>]`.
    pub fn open() -> Self {
        // SAFETY: IDENT is 'static, as openlog requires
        unsafe { libc::openlog(IDENT.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
        Self { _private: () }
    }
}

fn priority(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        _ => libc::LOG_DEBUG,
    }
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogLine::new(priority(meta.level()))
    }
}

/// Buffers one formatted event and sends it when dropped.
#[derive(Debug)]
pub struct SyslogLine {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl SyslogLine {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buf: Vec::new(),
        }
    }

    /// The buffered text without its trailing newline. Interior NULs are dropped.
    fn message(&self) -> CString {
        let mut text: Vec<u8> = self.buf.iter().copied().filter(|&b| b != 0).collect();
        while text.last() == Some(&b'\n') {
            text.pop();
        }
        CString::new(text).unwrap_or_default()
    }
}

impl Write for SyslogLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let message = self.message();
        // SAFETY: both strings are NUL terminated and outlive the call
        unsafe { libc::syslog(self.priority, c"%s".as_ptr(), message.as_ptr()) };
    }
}
