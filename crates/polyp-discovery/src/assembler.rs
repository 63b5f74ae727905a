//! Assembles a [`ServiceInfo`] from a resolved address and its TXT entries.

use crate::error::AssembleError;
use crate::txt::TxtRecord;
use polyp_core::{SampleFormat, SampleSpec, ServiceInfo, ServiceKind};
use std::net::IpAddr;

/// Connection address for a resolved service, `tcp:host:port`.
pub fn server_address(address: IpAddr, port: u16) -> String {
    match address {
        IpAddr::V4(v4) => format!("tcp:{}:{}", v4, port),
        IpAddr::V6(v6) => format!("tcp6:[{}]:{}", v6, port),
    }
}

/// Sample spec fields seen so far. Only a complete set is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PartialSampleSpec {
    channels: Option<u8>,
    rate: Option<u32>,
    format: Option<SampleFormat>,
}

impl PartialSampleSpec {
    fn complete(&self) -> Option<SampleSpec> {
        match (self.format, self.rate, self.channels) {
            (Some(format), Some(rate), Some(channels)) => {
                Some(SampleSpec::new(format, rate, channels))
            }
            _ => None,
        }
    }
}

/// Builds one service record from TXT entries.
///
/// Keys are applied in order, so a repeated key overrides earlier ones.
/// Unrecognized keys are ignored.
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    info: ServiceInfo,
    server: String,
    spec: PartialSampleSpec,
}

impl RecordAssembler {
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            info: ServiceInfo::removed(name),
            server: server.into(),
            spec: PartialSampleSpec::default(),
        }
    }

    /// Apply every entry of `txt`, stopping at the first invalid value.
    pub fn apply_all(&mut self, txt: &TxtRecord<'_>) -> Result<(), AssembleError> {
        for (key, value) in txt {
            self.apply(key, value)?;
        }
        Ok(())
    }

    /// Apply one TXT entry.
    pub fn apply(&mut self, key: &str, value: &[u8]) -> Result<(), AssembleError> {
        let value = value_to_string(value);

        match key {
            "device" => self.info.device = Some(value),
            "server-version" => self.info.server_version = Some(value),
            "user-name" => self.info.user_name = Some(value),
            "fqdn" => self.info.fqdn = Some(value),
            "description" => self.info.description = Some(value),
            "cookie" => {
                let cookie = parse_u32(&value)
                    .ok_or_else(|| AssembleError::InvalidCookie(value.clone()))?;
                self.info.cookie = Some(cookie);
            }
            "channels" => {
                let channels = parse_u32(&value)
                    .filter(|ch| (1..=255).contains(ch))
                    .ok_or_else(|| AssembleError::InvalidChannels(value.clone()))?;
                self.spec.channels = Some(channels as u8);
            }
            "rate" => {
                let rate = parse_u32(&value)
                    .ok_or_else(|| AssembleError::InvalidRate(value.clone()))?;
                self.spec.rate = Some(rate);
            }
            "format" => {
                let format = SampleFormat::parse(&value)
                    .map_err(|_| AssembleError::UnknownFormat(value.clone()))?;
                self.spec.format = Some(format);
            }
            _ => {}
        }

        Ok(())
    }

    /// Finish the record for an addition of `kind`.
    pub fn finish(self, kind: ServiceKind) -> Result<ServiceInfo, AssembleError> {
        let mut info = self.info;

        if kind.requires_device() && info.device.is_none() {
            return Err(AssembleError::MissingDevice);
        }

        info.server = Some(match &info.fqdn {
            Some(fqdn) => format!("{} {}", self.server, fqdn),
            None => self.server,
        });
        info.sample_spec = self.spec.complete();

        Ok(info)
    }
}

/// Unsigned number with C base-0 prefixes: `0x` hex, leading `0` octal,
/// otherwise decimal. Leading whitespace is skipped; anything after the
/// digits makes the value invalid.
fn parse_u32(s: &str) -> Option<u32> {
    let s = s.trim_start();
    let s = s.strip_prefix('+').unwrap_or(s);

    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// TXT values are text up to the first NUL.
fn value_to_string(value: &[u8]) -> String {
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    String::from_utf8_lossy(&value[..end]).into_owned()
}
