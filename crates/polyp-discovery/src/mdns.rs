//! Discovery session backed by the mdns-sd daemon.
//!
//! mdns-sd runs its own daemon thread and reports through channels. Each
//! browse subscription gets a relay thread that moves events into a shared
//! queue and writes a wake byte into a Unix socket pair. The read end of the
//! pair is the descriptor the main loop watches; [`MdnsSdSession::read_socket`]
//! drains it and translates the queued events on the caller's thread.

use crate::error::SessionError;
use crate::traits::{
    BrowseEvent, BrowseStatus, DiscoverySession, OperationId, ResolveEvent, SessionEvent,
    SessionEvents,
};
use crate::txt::TxtRecordBuilder;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::IpAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, trace, warn};

/// Browse domain used when none is configured.
pub const DEFAULT_DOMAIN: &str = "local.";

/// Configuration for [`MdnsSdSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsSdConfig {
    domain: String,
}

impl MdnsSdConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Browse `domain` instead of `local.`.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }
}

impl Default for MdnsSdConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

/// `_foo._tcp.` + `local.` -> `_foo._tcp.local.`
fn qualify(service_type: &str, domain: &str) -> String {
    format!(
        "{}.{}.",
        service_type.trim_end_matches('.'),
        domain.trim_matches('.')
    )
}

/// Instance name from a full service name, given its qualified type.
/// The type is matched ignoring ASCII case.
fn instance_name<'a>(fullname: &'a str, qualified_type: &str) -> Option<&'a str> {
    let split = fullname.len().checked_sub(qualified_type.len())?;
    let suffix = fullname.get(split..)?;
    if !suffix.eq_ignore_ascii_case(qualified_type) {
        return None;
    }
    let name = fullname[..split].strip_suffix('.')?;
    (!name.is_empty()).then_some(name)
}

/// Map key for a full service name; DNS names compare case-insensitively.
fn name_key(fullname: &str) -> String {
    fullname.to_ascii_lowercase()
}

/// Events handed from relay threads to the session.
struct Relay {
    queue: Mutex<VecDeque<(OperationId, ServiceEvent)>>,
    waker: UnixStream,
}

impl Relay {
    fn push(&self, operation: OperationId, event: ServiceEvent) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back((operation, event)),
            Err(_) => return,
        }
        // A full socket already guarantees a wakeup.
        if let Err(e) = (&self.waker).write(&[1]) {
            if e.kind() != ErrorKind::WouldBlock {
                trace!(error = %e, "Failed to wake session");
            }
        }
    }

    fn take(&self) -> Result<Vec<(OperationId, ServiceEvent)>, SessionError> {
        let mut queue = self.queue.lock().map_err(|_| SessionError::Closed)?;
        Ok(queue.drain(..).collect())
    }
}

#[derive(Debug, Clone)]
struct Subscription {
    service_type: String,
    domain: String,
    qualified: String,
}

#[derive(Debug, Clone)]
struct Resolved {
    address: IpAddr,
    port: u16,
    txt: Vec<u8>,
}

/// Bookkeeping that turns mdns-sd events into session events.
struct Tracker {
    events: SessionEvents,
    next_op: u64,
    browses: HashMap<OperationId, Subscription>,
    /// Full name -> every resolve operation waiting on it.
    resolving: HashMap<String, Vec<(OperationId, Subscription)>>,
    /// Latest resolution per full name.
    resolved: HashMap<String, Resolved>,
}

impl Tracker {
    fn new(events: SessionEvents) -> Self {
        Self {
            events,
            next_op: 0,
            browses: HashMap::new(),
            resolving: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    fn next_operation(&mut self) -> OperationId {
        self.next_op += 1;
        OperationId(self.next_op)
    }

    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events.send(event).map_err(|_| SessionError::Closed)
    }

    fn add_browse(&mut self, service_type: &str, domain: &str) -> (OperationId, String) {
        let operation = self.next_operation();
        let qualified = qualify(service_type, domain);
        self.browses.insert(
            operation,
            Subscription {
                service_type: service_type.to_string(),
                domain: domain.to_string(),
                qualified: qualified.clone(),
            },
        );
        (operation, qualified)
    }

    fn resolve(
        &mut self,
        name: &str,
        service_type: &str,
        domain: &str,
    ) -> Result<OperationId, SessionError> {
        let operation = self.next_operation();
        let subscription = Subscription {
            service_type: service_type.to_string(),
            domain: domain.to_string(),
            qualified: qualify(service_type, domain),
        };
        let key = name_key(&format!("{}.{}", name, subscription.qualified));

        match self.resolved.get(&key).cloned() {
            Some(resolved) => self.send_resolved(operation, name, &subscription, resolved)?,
            None => self
                .resolving
                .entry(key)
                .or_default()
                .push((operation, subscription)),
        }

        Ok(operation)
    }

    fn cancel(&mut self, operation: OperationId) -> Option<String> {
        self.resolving.retain(|_, waiting| {
            waiting.retain(|(op, _)| *op != operation);
            !waiting.is_empty()
        });
        self.browses.remove(&operation).map(|sub| sub.qualified)
    }

    fn send_resolved(
        &self,
        operation: OperationId,
        name: &str,
        subscription: &Subscription,
        resolved: Resolved,
    ) -> Result<(), SessionError> {
        self.send(SessionEvent::Resolve(ResolveEvent {
            operation,
            name: name.to_string(),
            service_type: subscription.service_type.clone(),
            domain: subscription.domain.clone(),
            address: resolved.address,
            port: resolved.port,
            txt: Some(resolved.txt),
        }))
    }

    fn browse_event(
        &self,
        operation: OperationId,
        status: BrowseStatus,
        name: &str,
    ) -> Result<(), SessionError> {
        let Some(subscription) = self.browses.get(&operation) else {
            return Ok(());
        };
        self.send(SessionEvent::Browse(BrowseEvent {
            operation,
            status,
            name: name.to_string(),
            service_type: subscription.service_type.clone(),
            domain: subscription.domain.clone(),
        }))
    }

    fn handle(&mut self, operation: OperationId, event: ServiceEvent) -> Result<(), SessionError> {
        let Some(qualified) = self.browses.get(&operation).map(|s| s.qualified.clone()) else {
            trace!(?operation, "Dropping event for cancelled browse");
            return Ok(());
        };

        match event {
            ServiceEvent::SearchStarted(_) => {
                self.browse_event(operation, BrowseStatus::Started, "")?;
            }
            ServiceEvent::SearchStopped(_) => {
                self.browse_event(operation, BrowseStatus::Stopped, "")?;
            }
            ServiceEvent::ServiceFound(_, fullname) => {
                if let Some(name) = instance_name(&fullname, &qualified) {
                    self.browse_event(operation, BrowseStatus::AddService, name)?;
                }
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                self.resolved.remove(&name_key(&fullname));
                if let Some(name) = instance_name(&fullname, &qualified) {
                    self.browse_event(operation, BrowseStatus::RemoveService, name)?;
                }
            }
            ServiceEvent::ServiceResolved(info) => {
                let fullname = info.get_fullname().to_string();
                let Some(resolved) = resolved_from_info(&info) else {
                    debug!(fullname, "Resolved service has no address");
                    return Ok(());
                };

                let key = name_key(&fullname);
                self.resolved.insert(key.clone(), resolved.clone());

                for (op, subscription) in self.resolving.remove(&key).unwrap_or_default() {
                    let name = instance_name(&fullname, &subscription.qualified).unwrap_or(&fullname);
                    self.send_resolved(op, name, &subscription, resolved.clone())?;
                }
            }
        }

        Ok(())
    }
}

fn resolved_from_info(info: &mdns_sd::ServiceInfo) -> Option<Resolved> {
    // Lowest IPv4 address, else the lowest address of any family.
    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .filter(|addr| addr.is_ipv4())
        .min()
        .or_else(|| addresses.iter().min())
        .copied()?;

    let mut txt = TxtRecordBuilder::new();
    for property in info.get_properties().iter() {
        if let Err(e) = txt.push(property.key(), property.val()) {
            debug!(key = property.key(), error = %e, "Skipping TXT property");
        }
    }

    Some(Resolved {
        address,
        port: info.get_port(),
        txt: txt.build(),
    })
}

/// [`DiscoverySession`] over an mdns-sd [`ServiceDaemon`].
pub struct MdnsSdSession {
    daemon: ServiceDaemon,
    domain: String,
    relay: Arc<Relay>,
    wake: UnixStream,
    tracker: Tracker,
    finalized: bool,
}

impl MdnsSdSession {
    /// Start the mDNS daemon.
    pub fn new(config: MdnsSdConfig, events: SessionEvents) -> Result<Self, SessionError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| SessionError::Daemon(format!("Failed to create mDNS daemon: {}", e)))?;

        let (wake, waker) = UnixStream::pair()?;
        wake.set_nonblocking(true)?;
        waker.set_nonblocking(true)?;

        Ok(Self {
            daemon,
            domain: config.domain,
            relay: Arc::new(Relay {
                queue: Mutex::new(VecDeque::new()),
                waker,
            }),
            wake,
            tracker: Tracker::new(events),
            finalized: false,
        })
    }
}

impl DiscoverySession for MdnsSdSession {
    fn browse(&mut self, service_type: &str) -> Result<OperationId, SessionError> {
        let (operation, qualified) = self.tracker.add_browse(service_type, &self.domain);

        let receiver = match self.daemon.browse(&qualified) {
            Ok(receiver) => receiver,
            Err(e) => {
                self.tracker.cancel(operation);
                return Err(SessionError::Daemon(format!(
                    "Failed to browse {}: {}",
                    qualified, e
                )));
            }
        };

        let relay = Arc::clone(&self.relay);
        thread::Builder::new()
            .name(format!("polyp-mdns-{}", operation.0))
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    relay.push(operation, event);
                }
            })?;

        debug!(service_type = %qualified, ?operation, "Browsing");
        Ok(operation)
    }

    fn resolve(
        &mut self,
        name: &str,
        service_type: &str,
        domain: &str,
    ) -> Result<OperationId, SessionError> {
        self.tracker.resolve(name, service_type, domain)
    }

    fn cancel(&mut self, operation: OperationId) {
        if let Some(qualified) = self.tracker.cancel(operation) {
            if let Err(e) = self.daemon.stop_browse(&qualified) {
                warn!(service_type = %qualified, error = %e, "Failed to stop browse");
            }
        }
    }

    fn socket(&self) -> RawFd {
        self.wake.as_raw_fd()
    }

    fn read_socket(&mut self) -> Result<(), SessionError> {
        let mut buf = [0u8; 64];
        loop {
            match (&self.wake).read(&mut buf) {
                Ok(0) => return Err(SessionError::Closed),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        for (operation, event) in self.relay.take()? {
            self.tracker.handle(operation, event)?;
        }
        Ok(())
    }

    fn finalize(&mut self) {
        if std::mem::replace(&mut self.finalized, true) {
            return;
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!(error = %e, "Failed to shut down mDNS daemon");
        }
    }
}

impl Drop for MdnsSdSession {
    fn drop(&mut self) {
        self.finalize();
    }
}
