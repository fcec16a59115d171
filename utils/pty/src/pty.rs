use std::io;
use std::fs::OpenOptions;
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::FromRawFd;
use std::os::fd::IntoRawFd;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use nix::fcntl::OFlag;
use nix::pty::grantpt;
use nix::pty::posix_openpt;
use nix::pty::unlockpt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::ReadBuf;
use tokio::io::unix::AsyncFd;
use tokio::process::Child;

use crate::process::SpawnRequest;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl From<WindowSize> for libc::winsize {
    fn from(size: WindowSize) -> Self {
        libc::winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }
}

/// Master side of a pseudo-terminal, registered with the tokio reactor.
///
/// The descriptor is non-blocking and close-on-exec. It is closed when the
/// last handle is dropped.
#[derive(Debug)]
pub struct PtyMaster {
    fd: AsyncFd<OwnedFd>,
}

impl PtyMaster {
    fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            fd: AsyncFd::new(fd)?,
        })
    }

    /// Apply `size` to the terminal (`TIOCSWINSZ`).
    pub fn resize(&self, size: WindowSize) -> io::Result<()> {
        let winsize = libc::winsize::from(size);
        let result = unsafe {
            libc::ioctl(
                self.fd.as_raw_fd(),
                libc::TIOCSWINSZ as _,
                &winsize as *const libc::winsize,
            )
        };
        if result == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Current terminal size (`TIOCGWINSZ`).
    pub fn window_size(&self) -> io::Result<WindowSize> {
        let mut winsize = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let result = unsafe {
            libc::ioctl(
                self.fd.as_raw_fd(),
                libc::TIOCGWINSZ as _,
                &mut winsize as *mut libc::winsize,
            )
        };
        if result == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(WindowSize {
            cols: winsize.ws_col,
            rows: winsize.ws_row,
        })
    }

    fn poll_read_priv(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::read(
                        inner.as_raw_fd(),
                        unfilled.as_mut_ptr().cast(),
                        unfilled.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                // Linux reports EIO on the master once every slave descriptor
                // is closed. Treat it as end of stream.
                Ok(Err(err)) if err.raw_os_error() == Some(libc::EIO) => {
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_write_priv(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            let result = guard.try_io(|inner| {
                let n = unsafe { libc::write(inner.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsFd for PtyMaster {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.get_ref().as_fd()
    }
}

/// Shared `AsyncRead + AsyncWrite` view of a [`PtyMaster`].
///
/// Cloning is cheap; the output pump, the input pump and the resize task
/// each hold one clone of the same master.
#[derive(Debug, Clone)]
pub struct PtyStream {
    master: Arc<PtyMaster>,
}

impl PtyStream {
    pub fn new(master: Arc<PtyMaster>) -> Self {
        Self { master }
    }

    pub fn master(&self) -> &Arc<PtyMaster> {
        &self.master
    }
}

impl AsyncRead for PtyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.master.poll_read_priv(cx, buf)
    }
}

impl AsyncWrite for PtyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.master.poll_write_priv(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Allocate a PTY pair sized to `size`.
///
/// Returns the async master and the raw slave descriptor. Both are
/// close-on-exec from the moment they exist, so a child forked by another
/// session cannot inherit them; the spawn helper dups the slave onto the
/// child's stdio.
pub fn open_pty(size: WindowSize) -> io::Result<(PtyMaster, OwnedFd)> {
    let master = posix_openpt(master_flags())?;
    grantpt(&master)?;
    unlockpt(&master)?;
    let slave_path = slave_name(&master)?;

    let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };
    #[cfg(not(target_os = "linux"))]
    set_cloexec(&master)?;

    // std opens with O_CLOEXEC.
    let slave = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(&slave_path)?;

    let master = PtyMaster::new(master)?;
    master.resize(size)?;
    Ok((master, OwnedFd::from(slave)))
}

#[cfg(target_os = "linux")]
fn master_flags() -> OFlag {
    OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC
}

// Darwin rejects O_CLOEXEC here.
#[cfg(not(target_os = "linux"))]
fn master_flags() -> OFlag {
    OFlag::O_RDWR | OFlag::O_NOCTTY
}

#[cfg(target_os = "linux")]
fn slave_name(master: &nix::pty::PtyMaster) -> io::Result<String> {
    Ok(nix::pty::ptsname_r(master)?)
}

#[cfg(not(target_os = "linux"))]
fn slave_name(master: &nix::pty::PtyMaster) -> io::Result<String> {
    static PTSNAME: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = PTSNAME
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Ok(unsafe { nix::pty::ptsname(master) }?)
}

/// A child attached to a PTY plus the master that drives it.
#[derive(Debug)]
pub struct PtyProcess {
    pub child: Child,
    pub master: Arc<PtyMaster>,
}

/// Spawn `request` with a fresh PTY of `size` as its controlling terminal.
///
/// The child becomes a session leader and acquires the slave as its
/// controlling terminal. The parent's copy of the slave is closed before
/// returning, so reads on the master hit end of stream once the child and
/// its descendants release the terminal.
pub fn spawn_process(request: &SpawnRequest, size: WindowSize) -> io::Result<PtyProcess> {
    let (master, slave) = open_pty(size)?;

    let mut command = request.command()?;
    command.stdin(Stdio::from(slave.try_clone()?));
    command.stdout(Stdio::from(slave.try_clone()?));
    command.stderr(Stdio::from(slave));

    let parent_pid = unsafe { libc::getpid() };
    unsafe {
        command.pre_exec(move || {
            crate::process_group::detach_from_tty()?;
            crate::process_group::acquire_controlling_terminal()?;
            crate::process_group::set_parent_death_signal(parent_pid)?;
            Ok(())
        });
    }

    let child = command.spawn()?;
    // `command` still owns the slave duplicates through its Stdio handles.
    drop(command);

    Ok(PtyProcess {
        child,
        master: Arc::new(master),
    })
}

#[cfg(not(target_os = "linux"))]
fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
