//! # Descriptor Passing
//!
//! Moves one open file descriptor across the socket as `SCM_RIGHTS` ancillary data riding
//! on a single placeholder byte. The receiver gets a new descriptor number for the same
//! kernel object.
//!
//! Both functions must be called by the current owner of the corresponding half, at the
//! point in the frame where the peer expects the descriptor.

use std::io::IoSlice;
use std::io::IoSliceMut;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

use nix::sys::socket::ControlMessage;
use nix::sys::socket::ControlMessageOwned;
use nix::sys::socket::MsgFlags;
use nix::sys::socket::recvmsg;
use nix::sys::socket::sendmsg;

use crate::error::Error;
use crate::error::Result;

const PLACEHOLDER: u8 = b'x';

pub(crate) fn send_fd(socket: BorrowedFd<'_>, fd: BorrowedFd<'_>) -> Result<()> {
    let payload = [PLACEHOLDER];
    let iov = [IoSlice::new(&payload)];
    let fds = [fd.as_raw_fd()];
    let cmsgs = [ControlMessage::ScmRights(&fds)];
    let sent = sendmsg::<()>(socket.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)?;
    if sent != 1 {
        return Err(Error::Descriptor(format!("sendmsg moved {} bytes", sent)));
    }
    tracing::trace!(fd = fds[0], "sent descriptor");
    Ok(())
}

pub(crate) fn recv_fd(socket: BorrowedFd<'_>) -> Result<OwnedFd> {
    let mut payload = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut payload)];
    let mut space = nix::cmsg_space!(RawFd);
    let msg = recvmsg::<()>(socket.as_raw_fd(), &mut iov, Some(&mut space), MsgFlags::empty())?;

    if msg.bytes != 1 {
        return Err(Error::Descriptor(format!("recvmsg moved {} bytes", msg.bytes)));
    }
    if msg.flags.contains(MsgFlags::MSG_CTRUNC) {
        return Err(Error::Descriptor("control data truncated".into()));
    }

    let mut received = Vec::new();
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            // SAFETY: the kernel just installed these descriptors in our table and nothing
            // else refers to them yet.
            received.extend(fds.into_iter().map(|fd| unsafe { OwnedFd::from_raw_fd(fd) }));
        }
    }
    if received.len() != 1 {
        return Err(Error::Descriptor(format!("expected one descriptor, got {}", received.len())));
    }
    let fd = received.remove(0);
    tracing::trace!(fd = fd.as_raw_fd(), "received descriptor");
    Ok(fd)
}
