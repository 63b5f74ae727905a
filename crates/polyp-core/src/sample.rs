//! Sample format and sample spec definitions advertised by sound servers.

use crate::error::ParseError;
use std::fmt;

/// Sample encodings a sink or source may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8 bit PCM.
    U8,
    /// 8 bit a-Law.
    Alaw,
    /// 8 bit mu-Law.
    Ulaw,
    /// Signed 16 bit PCM, little endian.
    S16Le,
    /// Signed 16 bit PCM, big endian.
    S16Be,
    /// 32 bit IEEE float, little endian, range -1..1.
    Float32Le,
    /// 32 bit IEEE float, big endian, range -1..1.
    Float32Be,
}

impl SampleFormat {
    /// Signed 16 bit PCM in host byte order.
    #[cfg(target_endian = "little")]
    pub const S16_NE: Self = Self::S16Le;
    #[cfg(target_endian = "big")]
    pub const S16_NE: Self = Self::S16Be;

    /// 32 bit float in host byte order.
    #[cfg(target_endian = "little")]
    pub const FLOAT32_NE: Self = Self::Float32Le;
    #[cfg(target_endian = "big")]
    pub const FLOAT32_NE: Self = Self::Float32Be;

    /// Look up a format by one of its accepted names (case-insensitive).
    ///
    /// Besides the canonical names this accepts the native-endian aliases
    /// `s16ne`, `s16`, `16`, `float32`, `float32ne` and the short `8`.
    pub fn parse(name: &str) -> Result<Self, ParseError> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "s16le" => Ok(Self::S16Le),
            "s16be" => Ok(Self::S16Be),
            "s16ne" | "s16" | "16" => Ok(Self::S16_NE),
            "u8" | "8" => Ok(Self::U8),
            "float32" | "float32ne" => Ok(Self::FLOAT32_NE),
            "float32le" => Ok(Self::Float32Le),
            "float32be" => Ok(Self::Float32Be),
            "ulaw" => Ok(Self::Ulaw),
            "alaw" => Ok(Self::Alaw),
            _ => Err(ParseError::UnknownSampleFormat(name.to_string())),
        }
    }

    /// Canonical name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::Alaw => "aLaw",
            Self::Ulaw => "uLaw",
            Self::S16Le => "s16le",
            Self::S16Be => "s16be",
            Self::Float32Le => "float32le",
            Self::Float32Be => "float32be",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete description of a sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u8,
}

impl SampleSpec {
    pub fn new(format: SampleFormat, rate: u32, channels: u8) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ch {}Hz", self.format, self.channels, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod sample_format {
        use super::*;

        #[test]
        fn parses_canonical_names() {
            assert_eq!(SampleFormat::parse("u8").unwrap(), SampleFormat::U8);
            assert_eq!(SampleFormat::parse("s16le").unwrap(), SampleFormat::S16Le);
            assert_eq!(SampleFormat::parse("s16be").unwrap(), SampleFormat::S16Be);
            assert_eq!(
                SampleFormat::parse("float32le").unwrap(),
                SampleFormat::Float32Le
            );
            assert_eq!(
                SampleFormat::parse("float32be").unwrap(),
                SampleFormat::Float32Be
            );
            assert_eq!(SampleFormat::parse("ulaw").unwrap(), SampleFormat::Ulaw);
            assert_eq!(SampleFormat::parse("alaw").unwrap(), SampleFormat::Alaw);
        }

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(SampleFormat::parse("aLaw").unwrap(), SampleFormat::Alaw);
            assert_eq!(SampleFormat::parse("S16LE").unwrap(), SampleFormat::S16Le);
        }

        #[test]
        fn parses_native_endian_aliases() {
            for name in ["s16ne", "s16", "16"] {
                assert_eq!(SampleFormat::parse(name).unwrap(), SampleFormat::S16_NE);
            }
            for name in ["float32", "float32ne"] {
                assert_eq!(
                    SampleFormat::parse(name).unwrap(),
                    SampleFormat::FLOAT32_NE
                );
            }
            assert_eq!(SampleFormat::parse("8").unwrap(), SampleFormat::U8);
        }

        #[test]
        fn rejects_unknown_names() {
            assert!(matches!(
                SampleFormat::parse("s24le"),
                Err(ParseError::UnknownSampleFormat(_))
            ));
            assert!(SampleFormat::parse("").is_err());
        }

        #[test]
        fn canonical_names_parse_back() {
            for format in [
                SampleFormat::U8,
                SampleFormat::Alaw,
                SampleFormat::Ulaw,
                SampleFormat::S16Le,
                SampleFormat::S16Be,
                SampleFormat::Float32Le,
                SampleFormat::Float32Be,
            ] {
                assert_eq!(SampleFormat::parse(format.as_str()).unwrap(), format);
            }
        }
    }

    mod sample_spec {
        use super::*;

        #[test]
        fn display_is_compact() {
            let spec = SampleSpec::new(SampleFormat::Float32Be, 48000, 6);
            assert_eq!(spec.to_string(), "float32be 6ch 48000Hz");
        }
    }
}
