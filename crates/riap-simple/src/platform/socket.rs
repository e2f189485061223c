//! Connected-socket liveness probe.

#[cfg(unix)]
use std::os::fd::AsRawFd;

/// Check that a connected stream socket can carry another request.
///
/// Peeks at the receive queue without blocking and without consuming
/// anything. A half-duplex peer never speaks unprompted, so the socket is
/// idle only when there is nothing to read yet.
///
/// # Platform Behavior
/// - **Linux/macOS**: `recv(MSG_PEEK | MSG_DONTWAIT)`. End of stream, unread
///   bytes and socket errors all mean the socket is not reusable
/// - **Other platforms**: Always `true`; a dead peer then surfaces as a
///   protocol error on the next exchange, which invalidates the connection
#[cfg(unix)]
pub fn is_socket_idle<S: AsRawFd>(socket: &S) -> bool {
    use nix::errno::Errno;
    use nix::sys::socket::{recv, MsgFlags};

    let mut probe = [0u8; 1];
    match recv(
        socket.as_raw_fd(),
        &mut probe,
        MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT,
    ) {
        Err(Errno::EAGAIN) | Err(Errno::EINTR) => true,
        Ok(_) | Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_socket_idle<S>(_socket: &S) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_open_socket_is_idle() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(is_socket_idle(&a));
    }

    #[test]
    fn test_closed_peer_is_not_idle() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        assert!(!is_socket_idle(&a));
    }

    #[test]
    fn test_unsolicited_data_is_not_idle() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();
        assert!(!is_socket_idle(&a));
        // Peeking leaves the byte in place
        assert!(!is_socket_idle(&a));
    }
}
