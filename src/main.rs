//! polyp-browse - list polypaudio sinks, sources and servers on the network.

use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use polyp_core::{BrowseOpcode, ServiceInfo};
use polyp_discovery::{Browser, MdnsSdConfig, TokioMainLoop, DEFAULT_DOMAIN};
use tokio::task::LocalSet;
use tracing::info;

/// Command-line arguments
#[derive(Debug, Clone, PartialEq)]
struct Args {
    /// Enable debug logging
    debug: bool,
    /// Stop after this long (default: until Ctrl-C)
    timeout: Option<Duration>,
    /// Browse domain
    domain: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            debug: false,
            timeout: None,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
}

fn parse_args_from(argv: impl IntoIterator<Item = String>) -> std::result::Result<Command, String> {
    let mut args = Args::default();
    let mut iter = argv.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--debug" | "-d" => {
                args.debug = true;
            }
            "--timeout" | "-t" => {
                let value = iter.next().ok_or("--timeout needs a value")?;
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("Invalid timeout: {}", value))?;
                args.timeout = Some(Duration::from_secs(secs));
            }
            "--domain" | "-D" => {
                args.domain = iter.next().ok_or("--domain needs a value")?;
            }
            "--help" | "-h" => return Ok(Command::Help),
            _ => return Err(format!("Unknown argument: {}", arg)),
        }
    }

    Ok(Command::Run(args))
}

fn parse_args() -> Args {
    match parse_args_from(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            std::process::exit(0);
        }
        Err(message) => {
            eprintln!("{}", message);
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("polyp-browse - List polypaudio sinks, sources and servers on the network");
    println!();
    println!("Usage: polyp-browse [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --debug            Enable debug logging");
    println!("  -t, --timeout SECS     Stop after SECS seconds (default: run until Ctrl-C)");
    println!("  -D, --domain DOMAIN    Browse DOMAIN instead of local.");
    println!("  -h, --help             Show this help message");
}

fn setup_logging(args: &Args) {
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_max_level(level)
        .init();
}

/// One output line per browse event.
fn format_event(opcode: BrowseOpcode, info: &ServiceInfo) -> String {
    let kind = opcode.kind().as_str();

    if opcode.is_remove() {
        return format!("- {:<6} {}", kind, info.name);
    }

    let mut line = format!("+ {:<6} {}", kind, info.name);
    if let Some(server) = &info.server {
        line.push_str(&format!(" ({})", server));
    }
    if let Some(device) = &info.device {
        line.push_str(&format!(" device={}", device));
    }
    if let Some(spec) = &info.sample_spec {
        line.push_str(&format!(" {}", spec));
    }
    line
}

fn main() -> Result<()> {
    let args = parse_args();
    setup_logging(&args);

    // The browser is !Send; keep it on one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    LocalSet::new().block_on(&runtime, run(args))
}

async fn run(args: Args) -> Result<()> {
    let config = MdnsSdConfig::new().domain(args.domain.as_str());
    let browser = Browser::with_config(TokioMainLoop::new(), config)
        .context("Failed to start service browser")?;

    browser.set_callback(Some(Rc::new(
        |_browser: &Browser, opcode: BrowseOpcode, info: &ServiceInfo| {
            println!("{}", format_event(opcode, info));
        },
    )));

    info!(domain = %args.domain, "Browsing for polypaudio services");

    let deadline = async {
        match args.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut health = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to wait for Ctrl-C")?;
                break;
            }
            _ = health.tick() => {
                if !browser.is_active() {
                    bail!("Lost connection to the discovery daemon");
                }
            }
        }
    }

    info!("Stopping");
    drop(browser);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyp_core::{SampleFormat, SampleSpec, ServiceKind};

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    mod parse_args {
        use super::*;

        #[test]
        fn defaults_without_arguments() {
            assert_eq!(parse_args_from(argv(&[])), Ok(Command::Run(Args::default())));
        }

        #[test]
        fn reads_all_options() {
            let parsed = parse_args_from(argv(&["-d", "--timeout", "10", "-D", "lan."]));
            assert_eq!(
                parsed,
                Ok(Command::Run(Args {
                    debug: true,
                    timeout: Some(Duration::from_secs(10)),
                    domain: "lan.".to_string(),
                }))
            );
        }

        #[test]
        fn help_wins() {
            assert_eq!(parse_args_from(argv(&["-d", "--help"])), Ok(Command::Help));
        }

        #[test]
        fn rejects_bad_input() {
            assert!(parse_args_from(argv(&["--bogus"])).is_err());
            assert!(parse_args_from(argv(&["--timeout"])).is_err());
            assert!(parse_args_from(argv(&["-t", "soon"])).is_err());
            assert!(parse_args_from(argv(&["--domain"])).is_err());
        }
    }

    mod format_event {
        use super::*;

        #[test]
        fn addition_lists_details() {
            let info = ServiceInfo {
                name: "Living Room".to_string(),
                server: Some("tcp:192.168.1.5:4713".to_string()),
                device: Some("alsa_output".to_string()),
                sample_spec: Some(SampleSpec::new(SampleFormat::S16Le, 44100, 2)),
                ..Default::default()
            };
            assert_eq!(
                format_event(BrowseOpcode::new(ServiceKind::Sink, true), &info),
                "+ sink   Living Room (tcp:192.168.1.5:4713) device=alsa_output s16le 2ch 44100Hz"
            );
        }

        #[test]
        fn removal_lists_name_only() {
            let info = ServiceInfo::removed("Desk Mic");
            assert_eq!(
                format_event(BrowseOpcode::new(ServiceKind::Source, false), &info),
                "- source Desk Mic"
            );
        }

        #[test]
        fn server_without_device() {
            let info = ServiceInfo {
                name: "box".to_string(),
                server: Some("tcp6:[::1]:4713".to_string()),
                ..Default::default()
            };
            assert_eq!(
                format_event(BrowseOpcode::new(ServiceKind::Server, true), &info),
                "+ server box (tcp6:[::1]:4713)"
            );
        }
    }
}
