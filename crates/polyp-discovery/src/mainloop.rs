//! [`MainLoop`] on top of a tokio `LocalSet`.
//!
//! Each watch registers a duplicate of the descriptor as an [`AsyncFd`] and
//! a local task polls it for readiness. The callbacks are `!Send`, so watches
//! must be created from inside a `LocalSet` (see `tokio::task::spawn_local`).
//! Freeing a watch deregisters it before `io_free` returns.

use crate::traits::{IoCallback, IoEventFlags, IoEventId, MainLoop};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{BorrowedFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::task::{Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::{Interest, Ready};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Registration shared between a watch task and [`MainLoop::io_free`].
type Slot = Rc<RefCell<Option<AsyncFd<OwnedFd>>>>;

struct Watch {
    task: JoinHandle<()>,
    alive: Rc<Cell<bool>>,
    slot: Slot,
}

impl Watch {
    /// Deregister now; the aborted task is reaped later by the `LocalSet`.
    fn release(self) {
        self.alive.set(false);
        drop(self.slot.borrow_mut().take());
        self.task.abort();
    }
}

/// Descriptor watches driven by the current tokio `LocalSet`.
#[derive(Default)]
pub struct TokioMainLoop {
    watches: RefCell<HashMap<u64, Watch>>,
    next_id: Cell<u64>,
}

impl TokioMainLoop {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of installed watches.
    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len()
    }
}

fn interest_for(events: IoEventFlags) -> Interest {
    match (
        events.contains(IoEventFlags::INPUT),
        events.contains(IoEventFlags::OUTPUT),
    ) {
        (true, true) => Interest::READABLE | Interest::WRITABLE,
        (false, true) => Interest::WRITABLE,
        _ => Interest::READABLE,
    }
}

fn flags_for(ready: Ready) -> IoEventFlags {
    let mut flags = IoEventFlags::NULL;
    if ready.is_readable() {
        flags = flags | IoEventFlags::INPUT;
    }
    if ready.is_writable() {
        flags = flags | IoEventFlags::OUTPUT;
    }
    if ready.is_read_closed() || ready.is_write_closed() {
        flags = flags | IoEventFlags::HANGUP;
    }
    if ready.is_error() {
        flags = flags | IoEventFlags::ERROR;
    }
    flags
}

/// Register a private duplicate of `fd` with the reactor.
///
/// The duplicate keeps its own descriptor number, so deregistering it can
/// never touch a socket that later reuses `fd`.
fn register(fd: RawFd, interest: Interest) -> io::Result<AsyncFd<OwnedFd>> {
    // SAFETY: io_new callers pass a descriptor that is open for the duration of the call.
    let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
    // SAFETY: the AsyncFd owns the duplicate, which stays open until it is dropped.
    let watched = unsafe { AsyncFd::register_with_interest(owned, interest) }?;
    Ok(watched)
}

/// Poll the registration in `slot` once. `None` once the watch was freed.
fn poll_slot(
    slot: &Slot,
    interest: Interest,
    cx: &mut Context<'_>,
) -> Poll<Option<io::Result<IoEventFlags>>> {
    let slot = slot.borrow();
    let Some(watched) = slot.as_ref() else {
        return Poll::Ready(None);
    };

    let mut flags = IoEventFlags::NULL;

    if interest.is_readable() {
        match watched.poll_read_ready(cx) {
            Poll::Ready(Ok(mut guard)) => {
                flags = flags | flags_for(guard.ready());
                guard.clear_ready();
            }
            Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
            Poll::Pending => {}
        }
    }

    if interest.is_writable() {
        match watched.poll_write_ready(cx) {
            Poll::Ready(Ok(mut guard)) => {
                flags = flags | flags_for(guard.ready());
                guard.clear_ready();
            }
            Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
            Poll::Pending => {}
        }
    }

    if flags == IoEventFlags::NULL {
        Poll::Pending
    } else {
        Poll::Ready(Some(Ok(flags)))
    }
}

impl MainLoop for TokioMainLoop {
    fn io_new(&self, fd: RawFd, events: IoEventFlags, mut callback: IoCallback) -> IoEventId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        let interest = interest_for(events);
        let registered = match register(fd, interest) {
            Ok(watched) => Some(watched),
            Err(e) => {
                warn!(fd, error = %e, "Cannot watch descriptor");
                None
            }
        };
        let failed = registered.is_none();

        let slot: Slot = Rc::new(RefCell::new(registered));
        let alive = Rc::new(Cell::new(true));
        let task_slot = Rc::clone(&slot);
        let task_alive = Rc::clone(&alive);

        let task = tokio::task::spawn_local(async move {
            if failed {
                if task_alive.get() {
                    callback(IoEventFlags::ERROR);
                }
                return;
            }

            loop {
                let polled = std::future::poll_fn(|cx| poll_slot(&task_slot, interest, cx)).await;
                let flags = match polled {
                    None => return,
                    Some(Ok(flags)) => flags,
                    Some(Err(e)) => {
                        warn!(fd, error = %e, "Descriptor watch failed");
                        drop(task_slot.borrow_mut().take());
                        IoEventFlags::ERROR
                    }
                };

                if !task_alive.get() {
                    return;
                }
                trace!(fd, flags = flags.bits(), "Descriptor ready");
                callback(flags);
            }
        });

        self.watches
            .borrow_mut()
            .insert(id, Watch { task, alive, slot });
        IoEventId(id)
    }

    fn io_free(&self, id: IoEventId) {
        let watch = self.watches.borrow_mut().remove(&id.0);
        if let Some(watch) = watch {
            watch.release();
        }
    }
}

impl Drop for TokioMainLoop {
    fn drop(&mut self) {
        for (_, watch) in self.watches.get_mut().drain() {
            watch.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::LocalSet;

    #[test]
    fn interest_follows_flags() {
        assert_eq!(interest_for(IoEventFlags::INPUT), Interest::READABLE);
        assert_eq!(interest_for(IoEventFlags::OUTPUT), Interest::WRITABLE);
        assert_eq!(
            interest_for(IoEventFlags::INPUT | IoEventFlags::OUTPUT),
            Interest::READABLE | Interest::WRITABLE
        );
    }

    #[tokio::test]
    async fn reports_readable_descriptor() {
        LocalSet::new()
            .run_until(async {
                let (reader, mut writer) = UnixStream::pair().unwrap();
                reader.set_nonblocking(true).unwrap();

                let mainloop = TokioMainLoop::new();
                let (tx, mut rx) = mpsc::unbounded_channel();
                let id = mainloop.io_new(
                    reader.as_raw_fd(),
                    IoEventFlags::INPUT,
                    Box::new(move |flags| {
                        let _ = tx.send(flags);
                    }),
                );
                assert_eq!(mainloop.watch_count(), 1);

                writer.write_all(b"x").unwrap();
                let flags = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                assert!(flags.contains(IoEventFlags::INPUT));

                mainloop.io_free(id);
                assert_eq!(mainloop.watch_count(), 0);

                // The channel closes once the aborted task drops its callback.
                let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                    .await
                    .unwrap();
                assert!(closed.is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn free_from_inside_callback_stops_delivery() {
        LocalSet::new()
            .run_until(async {
                let (reader, mut writer) = UnixStream::pair().unwrap();
                reader.set_nonblocking(true).unwrap();

                let mainloop = TokioMainLoop::new();
                let calls = Rc::new(Cell::new(0));
                let own_id: Rc<Cell<Option<IoEventId>>> = Rc::new(Cell::new(None));

                let weak = Rc::downgrade(&mainloop);
                let id = {
                    let calls = Rc::clone(&calls);
                    let own_id = Rc::clone(&own_id);
                    mainloop.io_new(
                        reader.as_raw_fd(),
                        IoEventFlags::INPUT,
                        Box::new(move |_| {
                            calls.set(calls.get() + 1);
                            if let (Some(mainloop), Some(id)) = (weak.upgrade(), own_id.get()) {
                                mainloop.io_free(id);
                            }
                        }),
                    )
                };
                own_id.set(Some(id));

                writer.write_all(b"x").unwrap();
                for _ in 0..50 {
                    if calls.get() > 0 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                assert_eq!(calls.get(), 1);
                assert_eq!(mainloop.watch_count(), 0);

                writer.write_all(b"y").unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn freed_watch_does_not_disturb_reused_descriptor() {
        LocalSet::new()
            .run_until(async {
                let mainloop = TokioMainLoop::new();
                let (reader, writer) = UnixStream::pair().unwrap();
                reader.set_nonblocking(true).unwrap();

                let id = mainloop.io_new(reader.as_raw_fd(), IoEventFlags::INPUT, Box::new(|_| {}));
                tokio::task::yield_now().await;

                mainloop.io_free(id);
                drop(reader);
                drop(writer);

                let (next, mut peer) = UnixStream::pair().unwrap();
                next.set_nonblocking(true).unwrap();
                let next = tokio::net::UnixStream::from_std(next).unwrap();

                // The aborted watch task is reaped here.
                tokio::task::yield_now().await;
                peer.write_all(b"x").unwrap();

                tokio::time::timeout(Duration::from_secs(2), next.readable())
                    .await
                    .expect("new socket never became readable")
                    .unwrap();
            })
            .await;
    }
}
