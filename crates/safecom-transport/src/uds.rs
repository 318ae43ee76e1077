use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::SpduSink;

/// Unix datagram transport.
///
/// One socket carries every channel; the SPDU header names the channel, so the
/// channel id passed to [`SpduSink::send_spdu`] is only used for tracing.
/// Datagram sockets keep message boundaries and may drop under pressure, which
/// is exactly the unreliable lower layer the safety protocol is designed for.
pub struct DatagramSocket {
    socket: UnixDatagram,
    path: PathBuf,
    peer: Option<PathBuf>,
    created_inode: Option<(u64, u64)>,
}

impl DatagramSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Largest datagram accepted by [`DatagramSocket::recv`].
    pub const MAX_DATAGRAM: usize = 64 * 1024;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind a datagram socket at `path`.
    ///
    /// A stale socket file left at `path` is removed first; any other kind of
    /// file makes the bind fail.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind a datagram socket at `path` with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let socket = UnixDatagram::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "bound unix datagram socket");

        Ok(Self {
            socket,
            path: path.clone(),
            peer: None,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Fix the peer address every subsequent send goes to.
    pub fn connect(&mut self, peer: impl AsRef<Path>) -> Result<()> {
        let peer = peer.as_ref();
        check_path_len(peer)?;
        self.socket
            .connect(peer)
            .map_err(|source| TransportError::Connect {
                path: peer.to_path_buf(),
                source,
            })?;
        debug!(path = ?self.path, ?peer, "datagram socket connected");
        self.peer = Some(peer.to_path_buf());
        Ok(())
    }

    /// Second handle on the same socket, for sending from another owner.
    ///
    /// Only the original handle removes the socket file on drop.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            path: self.path.clone(),
            peer: self.peer.clone(),
            created_inode: None,
        })
    }

    /// Send one datagram to the connected peer.
    pub fn send(&self, datagram: &[u8]) -> Result<()> {
        let written = self.socket.send(datagram)?;
        if written != datagram.len() {
            return Err(TransportError::ShortWrite {
                written,
                len: datagram.len(),
            });
        }
        Ok(())
    }

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` when the read timeout elapses without data.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        loop {
            match self.socket.recv(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Bound how long [`DatagramSocket::recv`] blocks.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The connected peer, if any.
    pub fn peer(&self) -> Option<&Path> {
        self.peer.as_deref()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-datagram"
    }
}

impl SpduSink for DatagramSocket {
    fn send_spdu(&mut self, channel: u32, spdu: &[u8]) -> Result<()> {
        trace!(channel, len = spdu.len(), "sending datagram");
        self.send(spdu)
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

impl std::fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("path", &self.path)
            .field("peer", &self.peer)
            .finish()
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= DatagramSocket::MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: DatagramSocket::MAX_PATH_LEN,
        });
    }
    Ok(())
}
