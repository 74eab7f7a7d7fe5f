use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction, RegistrationToken};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrmSourceEvent {
    /// Kernel events are waiting to be read.
    Ready,
    /// The fd hung up or reported an error; the source has been removed.
    Lost,
}

/// Hangup and error are reported as plain readability by the loop, so they
/// are read back with a zero-timeout poll.
fn hung_up(fd: BorrowedFd<'_>) -> bool {
    let mut fds = [PollFd::new(fd, PollFlags::empty())];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(_) => fds[0].revents().is_some_and(|revents| {
            revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL)
        }),
        Err(e) => {
            log::warn!("[drm] Cannot poll device fd: {}", e);
            false
        }
    }
}

/// Watches a DRM fd on the loop. Level triggered, so unread events keep
/// waking the loop.
pub fn insert_drm_source<'l, Data, F>(
    handle: &LoopHandle<'l, Data>,
    fd: OwnedFd,
    mut callback: F,
) -> Result<RegistrationToken, calloop::Error>
where
    Data: 'l,
    F: FnMut(DrmSourceEvent, &mut Data) + 'l,
{
    handle
        .insert_source(
            Generic::new(fd, Interest::READ, Mode::Level),
            move |readiness, fd, data| {
                if readiness.error || (readiness.readable && hung_up(fd.as_fd())) {
                    log::error!("[drm] Device fd hung up, display lost");
                    callback(DrmSourceEvent::Lost, data);
                    return Ok(PostAction::Remove);
                }
                if readiness.readable {
                    callback(DrmSourceEvent::Ready, data);
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|e| e.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    #[test]
    fn test_readable_fd_dispatches_ready() {
        let mut event_loop = calloop::EventLoop::<Vec<DrmSourceEvent>>::try_new().unwrap();
        let (mut writer, reader) = UnixStream::pair().unwrap();
        writer.write_all(&[1]).unwrap();

        insert_drm_source(&event_loop.handle(), OwnedFd::from(reader), |event, seen| {
            seen.push(event)
        })
        .unwrap();

        let mut seen = Vec::new();
        event_loop
            .dispatch(Some(Duration::from_millis(100)), &mut seen)
            .unwrap();

        assert_eq!(seen, vec![DrmSourceEvent::Ready]);
    }

    #[test]
    fn test_idle_fd_dispatches_nothing() {
        let mut event_loop = calloop::EventLoop::<Vec<DrmSourceEvent>>::try_new().unwrap();
        let (_writer, reader) = UnixStream::pair().unwrap();

        insert_drm_source(&event_loop.handle(), OwnedFd::from(reader), |event, seen| {
            seen.push(event)
        })
        .unwrap();

        let mut seen = Vec::new();
        event_loop
            .dispatch(Some(Duration::ZERO), &mut seen)
            .unwrap();

        assert!(seen.is_empty());
    }

    #[test]
    fn test_hung_up_fd_is_lost_once() {
        let mut event_loop = calloop::EventLoop::<Vec<DrmSourceEvent>>::try_new().unwrap();
        let (writer, reader) = UnixStream::pair().unwrap();
        drop(writer);

        insert_drm_source(&event_loop.handle(), OwnedFd::from(reader), |event, seen| {
            seen.push(event)
        })
        .unwrap();

        let mut seen = Vec::new();
        event_loop
            .dispatch(Some(Duration::from_millis(100)), &mut seen)
            .unwrap();
        assert_eq!(seen, vec![DrmSourceEvent::Lost]);

        event_loop
            .dispatch(Some(Duration::ZERO), &mut seen)
            .unwrap();
        assert_eq!(seen, vec![DrmSourceEvent::Lost]);
    }

    #[test]
    fn test_open_fd_is_not_hung_up() {
        let (_writer, reader) = UnixStream::pair().unwrap();
        assert!(!hung_up(reader.as_fd()));
    }

    #[test]
    fn test_source_can_be_removed() {
        let mut event_loop = calloop::EventLoop::<Vec<DrmSourceEvent>>::try_new().unwrap();
        let (mut writer, reader) = UnixStream::pair().unwrap();
        writer.write_all(&[1]).unwrap();

        let token = insert_drm_source(&event_loop.handle(), OwnedFd::from(reader), |event, seen| {
            seen.push(event)
        })
        .unwrap();
        event_loop.handle().remove(token);

        let mut seen = Vec::new();
        event_loop
            .dispatch(Some(Duration::ZERO), &mut seen)
            .unwrap();

        assert!(seen.is_empty());
    }
}
