//! Service type strings and matching.

use polyp_core::ServiceKind;

/// Sink service type.
pub const SINK_SERVICE_TYPE: &str = "_polypaudio-sink._tcp.";

/// Source service type.
pub const SOURCE_SERVICE_TYPE: &str = "_polypaudio-source._tcp.";

/// Sound server service type.
pub const SERVER_SERVICE_TYPE: &str = "_polypaudio-server._tcp.";

/// Browse order used when a browser starts its subscriptions.
pub(crate) const BROWSE_ORDER: [ServiceKind; 3] =
    [ServiceKind::Server, ServiceKind::Sink, ServiceKind::Source];

/// Compare two service type strings.
///
/// ASCII case-insensitive, and a single trailing `.` present on only one
/// side is ignored.
pub fn service_type_eq(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }

    let (a, b) = (a.as_bytes(), b.as_bytes());

    if a.len() == b.len() + 1 && a.ends_with(b".") {
        return a[..b.len()].eq_ignore_ascii_case(b);
    }

    if b.len() == a.len() + 1 && b.ends_with(b".") {
        return b[..a.len()].eq_ignore_ascii_case(a);
    }

    false
}

/// Wire service type for `kind`.
pub fn service_type_for(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Sink => SINK_SERVICE_TYPE,
        ServiceKind::Source => SOURCE_SERVICE_TYPE,
        ServiceKind::Server => SERVER_SERVICE_TYPE,
    }
}

/// Classify a wire service type, if it is one of ours.
pub fn kind_for_service_type(service_type: &str) -> Option<ServiceKind> {
    [ServiceKind::Sink, ServiceKind::Source, ServiceKind::Server]
        .into_iter()
        .find(|kind| service_type_eq(service_type, service_type_for(*kind)))
}
