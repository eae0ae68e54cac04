//! Self-describing media strings.
//!
//! Images and audio travel through Scholar as `data:<mediatype>;base64,<data>`
//! strings, never as bare bytes. [`DataUri`] parses and renders that form.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::GatewayError;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// A decoded base64 data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    media_type: String,
    data: Vec<u8>,
}

impl DataUri {
    /// Wraps raw bytes with a media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        let media_type = media_type.into();
        let media_type = if media_type.trim().is_empty() {
            DEFAULT_MEDIA_TYPE.to_string()
        } else {
            media_type.trim().to_string()
        };
        Self { media_type, data }
    }

    /// Full media type, including any parameters.
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Media type without parameters, lowercased (`audio/l16`).
    #[must_use]
    pub fn essence(&self) -> String {
        essence(&self.media_type)
    }

    /// Looks up a media type parameter by name, case-insensitively.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        media_type_param(&self.media_type, name)
    }

    /// Decoded payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the URI and returns the payload.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Strips parameters from a media type and lowercases it.
#[must_use]
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Looks up a parameter (`rate` in `audio/L16;rate=24000`).
#[must_use]
pub fn media_type_param<'a>(media_type: &'a str, name: &str) -> Option<&'a str> {
    media_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().trim_matches('"'))
    })
}

impl FromStr for DataUri {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let rest = s
            .get(..SCHEME.len())
            .filter(|scheme| scheme.eq_ignore_ascii_case(SCHEME))
            .map(|_| &s[SCHEME.len()..])
            .ok_or_else(|| GatewayError::InvalidDataUri("missing 'data:' scheme".to_string()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| GatewayError::InvalidDataUri("missing ',' separator".to_string()))?;

        let media_type = header
            .strip_suffix(BASE64_MARKER)
            .ok_or_else(|| {
                GatewayError::InvalidDataUri("only base64-encoded data URIs are supported".to_string())
            })?;

        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| GatewayError::InvalidDataUri(format!("bad base64 payload: {e}")))?;

        Ok(Self::new(media_type, data))
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}{BASE64_MARKER},{}",
            self.media_type,
            STANDARD.encode(&self.data)
        )
    }
}

impl Serialize for DataUri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_renders_base64() {
        let uri = DataUri::new("image/png", b"abc".to_vec());
        assert_eq!(uri.to_string(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_parse_simple_uri() {
        let uri: DataUri = "data:image/jpeg;base64,YWJj".parse().unwrap();
        assert_eq!(uri.media_type(), "image/jpeg");
        assert_eq!(uri.data(), b"abc");
    }

    #[test]
    fn test_parse_keeps_media_type_parameters() {
        let uri: DataUri = "data:audio/L16;codec=pcm;rate=24000;base64,AAAA"
            .parse()
            .unwrap();
        assert_eq!(uri.media_type(), "audio/L16;codec=pcm;rate=24000");
        assert_eq!(uri.essence(), "audio/l16");
        assert_eq!(uri.param("rate"), Some("24000"));
        assert_eq!(uri.param("RATE"), Some("24000"));
        assert_eq!(uri.param("channels"), None);
    }

    #[test]
    fn test_parse_scheme_is_case_insensitive() {
        let uri: DataUri = "DATA:image/png;base64,YWJj".parse().unwrap();
        assert_eq!(uri.data(), b"abc");
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        let err = "image/png;base64,YWJj".parse::<DataUri>().unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn test_parse_rejects_non_base64_uri() {
        let err = "data:text/plain,hello".parse::<DataUri>().unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_parse_rejects_bad_payload() {
        let err = "data:image/png;base64,@@@".parse::<DataUri>().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidDataUri(_)));
    }

    #[test]
    fn test_empty_media_type_gets_default() {
        let uri = DataUri::new("  ", vec![1]);
        assert_eq!(uri.media_type(), "application/octet-stream");
    }

    #[test]
    fn test_serde_uses_string_form() {
        let uri = DataUri::new("audio/wav", b"abc".to_vec());
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, r#""data:audio/wav;base64,YWJj""#);

        let back: DataUri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
    }
}
