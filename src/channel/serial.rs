//! Serial device backend.
//!
//! The device is opened non-blocking with plain `open(2)` and switched to a
//! byte-transparent line discipline through termios, then registered with
//! tokio so reads wait on readiness. Unix only.

use super::{ChannelError, LinePolicy};
use libc::{c_int, c_void};
use log::{debug, warn};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, ReadBuf};

/// Line speed of the meter's optical/serial interface.
pub const BAUD_RATE: libc::speed_t = libc::B9600;

/// A serial device configured for raw 9600 8N1 reception.
#[derive(Debug)]
pub struct SerialPort {
    inner: AsyncFd<OwnedFd>,
}

impl SerialPort {
    /// Open and configure `path`.
    ///
    /// Failing to raise RTS is only logged. Failing to apply the raw line
    /// settings is logged or fatal depending on `policy`.
    pub fn open(path: &str, policy: LinePolicy) -> Result<Self, ChannelError> {
        let fd = open_device(path).map_err(|source| ChannelError::Open {
            path: path.to_string(),
            source,
        })?;

        if let Err(e) = assert_rts(&fd) {
            warn!("{path}: cannot set RTS: {e}");
        }

        if let Err(source) = set_raw_mode(&fd) {
            match policy {
                LinePolicy::Strict => {
                    return Err(ChannelError::Configure {
                        path: path.to_string(),
                        source,
                    });
                }
                LinePolicy::Degraded => {
                    warn!("{path}: cannot switch to raw 9600 8N1, reading anyway: {source}")
                }
            }
        }

        let inner = AsyncFd::new(fd).map_err(|source| ChannelError::Register {
            path: path.to_string(),
            source,
        })?;

        debug!("opened {path}");
        Ok(Self { inner })
    }
}

fn cvt(ret: c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn open_device(path: &str) -> io::Result<OwnedFd> {
    let c_path = CString::new(path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;

    let fd = unsafe {
        libc::open(
            c_path.as_ptr(),
            libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Raise RTS, keeping the other modem control bits.
fn assert_rts(fd: &OwnedFd) -> io::Result<()> {
    let mut bits: c_int = 0;
    cvt(unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCMGET, &mut bits as *mut c_int) })?;
    bits |= libc::TIOCM_RTS;
    cvt(unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCMSET, &bits as *const c_int) })
}

fn set_raw_mode(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let mut config: libc::termios = unsafe { mem::zeroed() };

    cvt(unsafe { libc::tcgetattr(raw, &mut config) })?;
    make_raw(&mut config);
    cvt(unsafe { libc::cfsetispeed(&mut config, BAUD_RATE) })?;
    cvt(unsafe { libc::cfsetospeed(&mut config, BAUD_RATE) })?;
    cvt(unsafe { libc::tcsetattr(raw, libc::TCSANOW, &config) })
}

/// Clear every translation, flow control and line editing flag and select
/// 8 data bits, no parity, one stop bit.
fn make_raw(config: &mut libc::termios) {
    config.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    config.c_oflag &= !libc::OPOST;
    config.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    config.c_cflag &=
        !(libc::CSIZE | libc::PARENB | libc::PARODD | libc::CSTOPB | libc::CRTSCTS);
    config.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
}

fn read_fd(fd: &OwnedFd, dst: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd.as_raw_fd(), dst.as_mut_ptr() as *mut c_void, dst.len()) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();

            match guard.try_io(|inner| read_fd(inner.get_ref(), unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                // readiness was stale, wait again
                Err(_would_block) => continue,
            }
        }
    }
}
