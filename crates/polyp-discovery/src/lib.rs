//! # polyp-discovery
//!
//! DNS-SD browsing for polypaudio sound servers on the local network.
//!
//! This crate provides:
//! - A [`Browser`] that watches for sinks, sources and servers and reports
//!   fully assembled [`ServiceInfo`](polyp_core::ServiceInfo) records
//! - TXT record decoding and encoding
//! - Trait seams ([`DiscoverySession`], [`MainLoop`]) for testing with fakes
//!
//! ## Example
//!
//! ```ignore
//! use polyp_discovery::{Browser, TokioMainLoop};
//! use std::rc::Rc;
//!
//! // Inside a tokio LocalSet:
//! let browser = Browser::new(TokioMainLoop::new())?;
//! browser.set_callback(Some(Rc::new(|_browser: &Browser, opcode, info: &_| {
//!     println!("{:?}: {}", opcode, info.name);
//! })));
//! ```

mod assembler;
mod browser;
mod error;
mod mainloop;
mod mdns;
mod service_type;
mod traits;
mod txt;

pub use assembler::{server_address, RecordAssembler};
pub use browser::{BrowseCallback, Browser};
pub use error::{AssembleError, BrowserError, Result, SessionError, TxtError};
pub use mainloop::TokioMainLoop;
pub use mdns::{MdnsSdConfig, MdnsSdSession, DEFAULT_DOMAIN};
pub use service_type::{
    kind_for_service_type, service_type_eq, service_type_for, SERVER_SERVICE_TYPE,
    SINK_SERVICE_TYPE, SOURCE_SERVICE_TYPE,
};
pub use traits::{
    session_channel, BrowseEvent, BrowseStatus, DiscoveryBackend, DiscoverySession, IoCallback,
    IoEventFlags, IoEventId, MainLoop, OperationId, ResolveEvent, SessionEvent,
    SessionEventReceiver, SessionEvents,
};
pub use txt::{TxtIter, TxtRecord, TxtRecordBuilder};

/// Service type constants.
pub mod service_types {
    pub use super::SERVER_SERVICE_TYPE as SERVER;
    pub use super::SINK_SERVICE_TYPE as SINK;
    pub use super::SOURCE_SERVICE_TYPE as SOURCE;
}
