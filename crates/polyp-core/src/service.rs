//! Discovered service representation and event classification.

use crate::sample::SampleSpec;
use std::fmt;

/// The three kinds of endpoints a sound server advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Sink,
    Source,
    Server,
}

impl ServiceKind {
    /// Short lowercase label, e.g. for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sink => "sink",
            Self::Source => "source",
            Self::Server => "server",
        }
    }

    /// Whether additions of this kind must carry a `device` TXT entry.
    pub fn requires_device(&self) -> bool {
        !matches!(self, Self::Server)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an event handed to the browse callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowseOpcode {
    NewSink,
    NewSource,
    NewServer,
    RemoveSink,
    RemoveSource,
    RemoveServer,
}

impl BrowseOpcode {
    /// Opcode for an addition (`added == true`) or removal of `kind`.
    pub fn new(kind: ServiceKind, added: bool) -> Self {
        match (kind, added) {
            (ServiceKind::Sink, true) => Self::NewSink,
            (ServiceKind::Source, true) => Self::NewSource,
            (ServiceKind::Server, true) => Self::NewServer,
            (ServiceKind::Sink, false) => Self::RemoveSink,
            (ServiceKind::Source, false) => Self::RemoveSource,
            (ServiceKind::Server, false) => Self::RemoveServer,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        match self {
            Self::NewSink | Self::RemoveSink => ServiceKind::Sink,
            Self::NewSource | Self::RemoveSource => ServiceKind::Source,
            Self::NewServer | Self::RemoveServer => ServiceKind::Server,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::NewSink | Self::NewSource | Self::NewServer)
    }

    pub fn is_remove(&self) -> bool {
        !self.is_new()
    }
}

/// A discovered (or removed) endpoint.
///
/// Removal records only carry `name`. Additions always carry `server`, and
/// sink/source additions always carry `device`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    /// Connection address, `scheme:host:port` optionally followed by ` fqdn`.
    pub server: Option<String>,
    /// Device name on the remote server (sink/source only).
    pub device: Option<String>,
    pub server_version: Option<String>,
    pub user_name: Option<String>,
    pub description: Option<String>,
    pub fqdn: Option<String>,
    /// Authentication cookie advertised by the server.
    pub cookie: Option<u32>,
    pub sample_spec: Option<SampleSpec>,
}

impl ServiceInfo {
    /// Record for a removal notification: the name and nothing else.
    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod browse_opcode {
        use super::*;

        #[test]
        fn maps_kind_and_direction() {
            assert_eq!(BrowseOpcode::new(ServiceKind::Sink, true), BrowseOpcode::NewSink);
            assert_eq!(
                BrowseOpcode::new(ServiceKind::Source, false),
                BrowseOpcode::RemoveSource
            );
            assert_eq!(
                BrowseOpcode::new(ServiceKind::Server, true),
                BrowseOpcode::NewServer
            );
        }

        #[test]
        fn kind_round_trips() {
            for kind in [ServiceKind::Sink, ServiceKind::Source, ServiceKind::Server] {
                for added in [true, false] {
                    let opcode = BrowseOpcode::new(kind, added);
                    assert_eq!(opcode.kind(), kind);
                    assert_eq!(opcode.is_new(), added);
                    assert_eq!(opcode.is_remove(), !added);
                }
            }
        }
    }

    mod service_kind {
        use super::*;

        #[test]
        fn only_server_skips_device_requirement() {
            assert!(ServiceKind::Sink.requires_device());
            assert!(ServiceKind::Source.requires_device());
            assert!(!ServiceKind::Server.requires_device());
        }
    }

    mod service_info {
        use super::*;

        #[test]
        fn removed_carries_only_name() {
            let info = ServiceInfo::removed("Kitchen");
            assert_eq!(info.name, "Kitchen");
            assert!(info.server.is_none());
            assert!(info.device.is_none());
            assert!(info.sample_spec.is_none());
            assert!(info.cookie.is_none());
        }
    }
}
