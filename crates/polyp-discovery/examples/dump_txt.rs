//! Debug: show raw TXT records for polypaudio services.
//!
//! Usage: cargo run -p polyp-discovery --example dump_txt [SECONDS]

use mdns_sd::{ServiceDaemon, ServiceEvent};
use polyp_discovery::{service_types, TxtRecord, TxtRecordBuilder};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seconds = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let daemon = ServiceDaemon::new()?;
    let types = [service_types::SINK, service_types::SOURCE, service_types::SERVER]
        .map(|ty| format!("{}local.", ty));
    let receivers = types
        .iter()
        .map(|ty| daemon.browse(ty))
        .collect::<Result<Vec<_>, _>>()?;

    println!("--- Scanning for {} seconds ---\n", seconds);
    let deadline = Instant::now() + Duration::from_secs(seconds);

    while Instant::now() < deadline {
        for receiver in &receivers {
            let Ok(ServiceEvent::ServiceResolved(info)) =
                receiver.recv_timeout(Duration::from_millis(50))
            else {
                continue;
            };

            let mut builder = TxtRecordBuilder::new();
            for prop in info.get_properties().iter() {
                builder.push(prop.key(), prop.val())?;
            }
            let data = builder.build();

            println!("== {} ({}:{})", info.get_fullname(), info.get_hostname(), info.get_port());
            println!("   addresses: {:?}", info.get_addresses());
            for (key, value) in &TxtRecord::parse(&data)? {
                println!("   {} = {}", key, String::from_utf8_lossy(value));
            }
            println!();
        }
    }

    for ty in &types {
        let _ = daemon.stop_browse(ty);
    }
    let _ = daemon.shutdown();
    Ok(())
}
