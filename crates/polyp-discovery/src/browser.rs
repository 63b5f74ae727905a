//! Service browser for sound server sinks, sources and servers.
//!
//! A [`Browser`] owns one discovery session with three persistent browse
//! subscriptions, and one readability watch on the session's socket. All
//! work happens inside the main loop's readability callback: the session
//! reads its socket, queues typed events, and the browser drains the queue
//! through its [`DiscoveryBackend`] implementation.
//!
//! The browser is single-threaded (`Rc`/`RefCell`); no interior borrow is
//! held while the user callback runs, so the callback may clone or drop
//! browser handles and replace itself.

use crate::assembler::{server_address, RecordAssembler};
use crate::error::{AssembleError, BrowserError, Result, SessionError};
use crate::mdns::{MdnsSdConfig, MdnsSdSession};
use crate::service_type::{kind_for_service_type, service_type_for, BROWSE_ORDER};
use crate::traits::{
    session_channel, BrowseEvent, BrowseStatus, DiscoveryBackend, DiscoverySession, IoEventFlags,
    IoEventId, MainLoop, OperationId, ResolveEvent, SessionEventReceiver, SessionEvents,
};
use crate::txt::TxtRecord;
use polyp_core::{BrowseOpcode, ServiceInfo, ServiceKind};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, trace, warn};

/// User callback for browse events.
///
/// The record is only valid for the duration of the call. User context is
/// whatever the closure captures.
pub type BrowseCallback = Rc<dyn Fn(&Browser, BrowseOpcode, &ServiceInfo)>;

/// Handle to a service browser.
///
/// Cloning a handle takes a reference; dropping the last handle releases
/// the socket watch and then finalizes the discovery session.
#[derive(Clone)]
pub struct Browser {
    inner: Rc<Inner>,
}

/// One in-flight resolve operation.
#[derive(Debug, Clone)]
struct PendingResolution {
    name: String,
    kind: ServiceKind,
}

struct Inner {
    this: Weak<Inner>,
    mainloop: Rc<dyn MainLoop>,
    session: RefCell<Box<dyn DiscoverySession>>,
    events: RefCell<SessionEventReceiver>,
    io_event: Cell<Option<IoEventId>>,
    callback: RefCell<Option<BrowseCallback>>,
    pending: RefCell<HashMap<OperationId, PendingResolution>>,
}

impl Browser {
    /// Create a browser backed by an mDNS daemon on the default domain.
    pub fn new(mainloop: Rc<dyn MainLoop>) -> Result<Self> {
        Self::with_config(mainloop, MdnsSdConfig::default())
    }

    /// Create a browser backed by an mDNS daemon.
    pub fn with_config(mainloop: Rc<dyn MainLoop>, config: MdnsSdConfig) -> Result<Self> {
        Self::with_session(mainloop, move |events| MdnsSdSession::new(config, events))
    }

    /// Create a browser over a session built by `init`.
    ///
    /// `init` receives the sender the session must report events through.
    /// If any of the three browse requests fails, the session is finalized
    /// and no browser is returned.
    pub fn with_session<S, F>(mainloop: Rc<dyn MainLoop>, init: F) -> Result<Self>
    where
        S: DiscoverySession + 'static,
        F: FnOnce(SessionEvents) -> std::result::Result<S, SessionError>,
    {
        let (events_tx, events_rx) = session_channel();

        let mut session = init(events_tx).map_err(|e| {
            error!(error = %e, "Discovery session initialization failed");
            BrowserError::SessionInit(e)
        })?;

        for kind in BROWSE_ORDER {
            let service_type = service_type_for(kind);
            if let Err(source) = session.browse(service_type) {
                error!(service_type, error = %source, "Browse request failed");
                session.finalize();
                return Err(BrowserError::Browse {
                    service_type,
                    source,
                });
            }
        }

        let fd = session.socket();
        let inner = Rc::new_cyclic(|this| Inner {
            this: this.clone(),
            mainloop: Rc::clone(&mainloop),
            session: RefCell::new(Box::new(session)),
            events: RefCell::new(events_rx),
            io_event: Cell::new(None),
            callback: RefCell::new(None),
            pending: RefCell::new(HashMap::new()),
        });

        let weak = Rc::downgrade(&inner);
        let io_event = mainloop.io_new(
            fd,
            IoEventFlags::INPUT,
            Box::new(move |flags| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_io(flags);
                }
            }),
        );
        inner.io_event.set(Some(io_event));

        debug!(fd, "Browser started");
        Ok(Self { inner })
    }

    /// Replace the callback. `None` silences the browser; resolutions that
    /// complete afterwards are dropped.
    pub fn set_callback(&self, callback: Option<BrowseCallback>) {
        *self.inner.callback.borrow_mut() = callback;
    }

    /// Number of live handles.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Whether the socket watch is still installed.
    ///
    /// Becomes `false` after a transport failure; the browser then never
    /// reports anything again.
    pub fn is_active(&self) -> bool {
        self.inner.io_event.get().is_some()
    }

    /// Whether two handles refer to the same browser.
    pub fn ptr_eq(&self, other: &Browser) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("refs", &self.ref_count())
            .field("active", &self.is_active())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}

impl Inner {
    fn handle_io(&self, flags: IoEventFlags) {
        if flags != IoEventFlags::INPUT {
            self.fail_transport(format_args!("unexpected I/O event {:#04x}", flags.bits()));
            return;
        }

        let read = self.session.borrow_mut().read_socket();
        if let Err(e) = read {
            self.fail_transport(format_args!("{}", e));
            return;
        }

        loop {
            let next = self.events.borrow_mut().try_recv();
            match next {
                Ok(event) => event.dispatch(self),
                Err(_) => break,
            }
        }
    }

    fn fail_transport(&self, reason: fmt::Arguments<'_>) {
        error!(%reason, "Connection to discovery daemon failed");
        if let Some(id) = self.io_event.take() {
            self.mainloop.io_free(id);
        }
    }

    fn callback(&self) -> Option<BrowseCallback> {
        self.callback.borrow().clone()
    }

    fn dispatch(&self, callback: &BrowseCallback, opcode: BrowseOpcode, info: &ServiceInfo) {
        if let Some(inner) = self.this.upgrade() {
            let browser = Browser { inner };
            callback(&browser, opcode, info);
        }
    }

    /// Forget in-flight resolutions of `name` and cancel them at the session.
    fn abandon_resolutions(&self, name: &str, kind: ServiceKind) {
        let stale: Vec<OperationId> = {
            let mut pending = self.pending.borrow_mut();
            let stale: Vec<_> = pending
                .iter()
                .filter(|(_, p)| p.kind == kind && p.name == name)
                .map(|(operation, _)| *operation)
                .collect();
            for operation in &stale {
                pending.remove(operation);
            }
            stale
        };

        for operation in stale {
            trace!(name, kind = %kind, ?operation, "Abandoning resolution");
            self.session.borrow_mut().cancel(operation);
        }
    }

    fn start_resolution(&self, kind: ServiceKind, event: BrowseEvent) {
        self.abandon_resolutions(&event.name, kind);

        let request =
            self.session
                .borrow_mut()
                .resolve(&event.name, &event.service_type, &event.domain);

        match request {
            Ok(operation) => {
                trace!(name = %event.name, kind = %kind, ?operation, "Resolving");
                self.pending.borrow_mut().insert(
                    operation,
                    PendingResolution {
                        name: event.name,
                        kind,
                    },
                );
            }
            Err(e) => warn!(name = %event.name, error = %e, "Resolve request failed"),
        }
    }
}

impl DiscoveryBackend for Inner {
    fn on_browse_event(&self, event: BrowseEvent) {
        let Some(kind) = kind_for_service_type(&event.service_type) else {
            debug!(service_type = %event.service_type, "Ignoring unknown service type");
            return;
        };

        match event.status {
            BrowseStatus::AddService => self.start_resolution(kind, event),
            BrowseStatus::RemoveService => {
                self.abandon_resolutions(&event.name, kind);
                if let Some(callback) = self.callback() {
                    let info = ServiceInfo::removed(event.name);
                    self.dispatch(&callback, BrowseOpcode::new(kind, false), &info);
                }
            }
            BrowseStatus::Started | BrowseStatus::Stopped => {
                trace!(status = ?event.status, kind = %kind, "Browse status");
            }
        }
    }

    fn on_resolve_event(&self, event: ResolveEvent) {
        let pending = self.pending.borrow_mut().remove(&event.operation);
        let Some(pending) = pending else {
            trace!(operation = ?event.operation, "Rejecting result for finished resolution");
            return;
        };

        self.session.borrow_mut().cancel(event.operation);

        let Some(callback) = self.callback() else {
            return;
        };

        let kind = kind_for_service_type(&event.service_type).unwrap_or(pending.kind);

        match assemble(&event, kind) {
            Ok(info) => self.dispatch(&callback, BrowseOpcode::new(kind, true), &info),
            Err(e) => debug!(name = %pending.name, kind = %kind, error = %e, "Discarding service"),
        }
    }
}

fn assemble(event: &ResolveEvent, kind: ServiceKind) -> std::result::Result<ServiceInfo, AssembleError> {
    let mut assembler =
        RecordAssembler::new(event.name.as_str(), server_address(event.address, event.port));

    if let Some(data) = event.txt.as_deref().filter(|data| !data.is_empty()) {
        let txt = TxtRecord::parse(data)?;
        assembler.apply_all(&txt)?;
    }

    assembler.finish(kind)
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(id) = self.io_event.take() {
            self.mainloop.io_free(id);
        }
        self.session.get_mut().finalize();
        debug!("Browser finalized");
    }
}
