//! Seams between the browser and its collaborators (enables fakes in tests).
//!
//! The browser consumes two external collaborators: a [`DiscoverySession`]
//! that speaks DNS-SD, and a [`MainLoop`] that reports socket readability.
//! Sessions never call back into the browser directly; they push typed
//! [`SessionEvent`]s into a channel which the browser drains and feeds to its
//! [`DiscoveryBackend`] implementation.

use crate::error::SessionError;
use std::net::IpAddr;
use std::ops::BitOr;
use std::os::unix::io::RawFd;
use tokio::sync::mpsc;

/// Identifier of an outstanding browse or resolve operation in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

/// Identifier of a descriptor watch registered with a [`MainLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoEventId(pub u64);

/// Readiness flags reported by a [`MainLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IoEventFlags(u8);

impl IoEventFlags {
    pub const NULL: Self = Self(0);
    pub const INPUT: Self = Self(1);
    pub const OUTPUT: Self = Self(1 << 1);
    pub const HANGUP: Self = Self(1 << 2);
    pub const ERROR: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for IoEventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What a browse notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseStatus {
    /// The subscription is active.
    Started,
    /// A service instance appeared.
    AddService,
    /// A service instance went away.
    RemoveService,
    /// The subscription ended.
    Stopped,
}

/// Notification from a persistent browse subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEvent {
    pub operation: OperationId,
    pub status: BrowseStatus,
    /// Instance name, without type and domain.
    pub name: String,
    pub service_type: String,
    pub domain: String,
}

/// Result of a resolve operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveEvent {
    pub operation: OperationId,
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub address: IpAddr,
    pub port: u16,
    /// Raw TXT record bytes, if the service published any.
    pub txt: Option<Vec<u8>>,
}

/// Event produced by a session while reading its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Browse(BrowseEvent),
    Resolve(ResolveEvent),
}

impl SessionEvent {
    /// Hand the event to the matching backend method.
    pub fn dispatch(self, backend: &dyn DiscoveryBackend) {
        match self {
            SessionEvent::Browse(event) => backend.on_browse_event(event),
            SessionEvent::Resolve(event) => backend.on_resolve_event(event),
        }
    }
}

/// Sending half of the channel a session reports events through.
pub type SessionEvents = mpsc::UnboundedSender<SessionEvent>;

/// Receiving half, owned by the browser.
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the channel connecting a session to its browser.
pub fn session_channel() -> (SessionEvents, SessionEventReceiver) {
    mpsc::unbounded_channel()
}

/// A DNS-SD discovery session.
///
/// All methods are fire-and-forget: results surface later as
/// [`SessionEvent`]s sent during [`read_socket`](Self::read_socket).
#[cfg_attr(test, mockall::automock)]
pub trait DiscoverySession {
    /// Start a persistent browse for `service_type`.
    fn browse(&mut self, service_type: &str) -> Result<OperationId, SessionError>;

    /// Resolve one named instance previously reported by a browse.
    fn resolve(
        &mut self,
        name: &str,
        service_type: &str,
        domain: &str,
    ) -> Result<OperationId, SessionError>;

    /// Cancel an outstanding operation. No events for it follow.
    fn cancel(&mut self, operation: OperationId);

    /// Descriptor that becomes readable when events are pending.
    fn socket(&self) -> RawFd;

    /// Read pending socket data and send the resulting events.
    fn read_socket(&mut self) -> Result<(), SessionError>;

    /// Release the session. Called exactly once, after the socket watch is gone.
    fn finalize(&mut self);
}

/// Receiver of typed session events.
pub trait DiscoveryBackend {
    fn on_browse_event(&self, event: BrowseEvent);

    fn on_resolve_event(&self, event: ResolveEvent);
}

/// Callback invoked by a [`MainLoop`] when a watched descriptor is ready.
pub type IoCallback = Box<dyn FnMut(IoEventFlags)>;

/// Host event loop interface.
pub trait MainLoop {
    /// Watch `fd` for `events`, calling `callback` with the ready flags.
    fn io_new(&self, fd: RawFd, events: IoEventFlags, callback: IoCallback) -> IoEventId;

    /// Stop watching. The callback is never invoked again.
    fn io_free(&self, id: IoEventId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    mod io_event_flags {
        use super::*;

        #[test]
        fn combines_and_tests_flags() {
            let flags = IoEventFlags::INPUT | IoEventFlags::HANGUP;
            assert!(flags.contains(IoEventFlags::INPUT));
            assert!(flags.contains(IoEventFlags::HANGUP));
            assert!(!flags.contains(IoEventFlags::ERROR));
            assert_ne!(flags, IoEventFlags::INPUT);
        }

        #[test]
        fn default_is_null() {
            assert_eq!(IoEventFlags::default(), IoEventFlags::NULL);
            assert_eq!(IoEventFlags::NULL.bits(), 0);
        }
    }

    mod session_event {
        use super::*;
        use std::net::Ipv4Addr;

        #[derive(Default)]
        struct Recorder {
            seen: RefCell<Vec<&'static str>>,
        }

        impl DiscoveryBackend for Recorder {
            fn on_browse_event(&self, _event: BrowseEvent) {
                self.seen.borrow_mut().push("browse");
            }

            fn on_resolve_event(&self, _event: ResolveEvent) {
                self.seen.borrow_mut().push("resolve");
            }
        }

        #[test]
        fn dispatch_routes_by_variant() {
            let recorder = Recorder::default();

            SessionEvent::Browse(BrowseEvent {
                operation: OperationId(1),
                status: BrowseStatus::AddService,
                name: "a".into(),
                service_type: "_x._tcp.".into(),
                domain: "local.".into(),
            })
            .dispatch(&recorder);

            SessionEvent::Resolve(ResolveEvent {
                operation: OperationId(2),
                name: "a".into(),
                service_type: "_x._tcp.".into(),
                domain: "local.".into(),
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 1,
                txt: None,
            })
            .dispatch(&recorder);

            assert_eq!(*recorder.seen.borrow(), vec!["browse", "resolve"]);
        }
    }

    mod mock_session {
        use super::*;

        #[test]
        fn mock_browse_returns_configured_id() {
            let mut mock = MockDiscoverySession::new();
            mock.expect_browse()
                .withf(|ty| ty == "_polypaudio-sink._tcp.")
                .times(1)
                .returning(|_| Ok(OperationId(7)));

            let id = mock.browse("_polypaudio-sink._tcp.").unwrap();
            assert_eq!(id, OperationId(7));
        }
    }
}
