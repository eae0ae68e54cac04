//! Speech audio normalization.
//!
//! Speech models may answer with a containerized format (WAV, MP3, Ogg) or
//! with headerless PCM samples. Browsers cannot play the latter, so raw PCM
//! is wrapped into a WAV container using the sample rate and channel count
//! declared in the media type parameters.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use scholar_gateway::DataUri;
use tracing::{debug, warn};

/// Sample rate assumed when raw PCM does not declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Channel count assumed when raw PCM does not declare one.
pub const DEFAULT_CHANNELS: u16 = 1;

/// Bit depth of raw PCM from speech models.
pub const PCM_BITS_PER_SAMPLE: u16 = 16;

/// Most channels a WAV speaker mask can describe.
pub const MAX_CHANNELS: u16 = 18;

/// Media type used for wrapped PCM.
pub const WAV_MEDIA_TYPE: &str = "audio/wav";

const RAW_PCM_TYPES: &[&str] = &["audio/l16", "audio/pcm", "audio/x-pcm", "audio/raw"];
const WAV_TYPES: &[&str] = &["audio/wav", "audio/x-wav", "audio/wave", "audio/vnd.wave"];

/// Errors produced while normalizing audio.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// A media type parameter could not be parsed.
    #[error("invalid '{name}' parameter '{value}' in media type")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The payload held no complete sample.
    #[error("raw PCM payload holds no complete sample")]
    NoSamples,

    /// The sample count does not fill whole frames.
    #[error("{samples} PCM samples do not divide into {channels}-channel frames")]
    IncompleteFrame {
        /// Complete 16-bit samples in the payload.
        samples: usize,
        /// Declared channel count.
        channels: u16,
    },

    /// The WAV writer failed.
    #[error("failed to write WAV container: {0}")]
    Wav(#[from] hound::Error),
}

/// Returns `true` if the media type describes headerless PCM.
#[must_use]
pub fn is_raw_pcm(media_type: &str) -> bool {
    let essence = scholar_gateway::data_uri::essence(media_type);
    if WAV_TYPES.contains(&essence.as_str()) {
        return false;
    }
    RAW_PCM_TYPES.contains(&essence.as_str())
        || scholar_gateway::data_uri::media_type_param(media_type, "codec")
            .is_some_and(|codec| codec.eq_ignore_ascii_case("pcm"))
}

/// Converts speech audio into a playable, self-describing form.
///
/// Raw PCM is wrapped into WAV. Generic or missing media types are refined
/// by sniffing the container magic bytes. Everything else passes through.
///
/// # Errors
///
/// Returns an [`AudioError`] if raw PCM cannot be wrapped.
pub fn normalize_audio(audio: DataUri) -> Result<DataUri, AudioError> {
    if is_raw_pcm(audio.media_type()) {
        return wrap_pcm(&audio);
    }

    let essence = audio.essence();
    if essence.starts_with("audio/") {
        return Ok(audio);
    }

    match sniff_container(audio.data()) {
        Some(detected) => {
            debug!(declared = %audio.media_type(), detected, "Refined audio media type");
            Ok(DataUri::new(detected, audio.into_data()))
        }
        None => Ok(audio),
    }
}

fn wrap_pcm(audio: &DataUri) -> Result<DataUri, AudioError> {
    let sample_rate = parse_param(audio, "rate", DEFAULT_SAMPLE_RATE)?;
    let channels = parse_param(audio, "channels", DEFAULT_CHANNELS)?;
    check_format(sample_rate, channels)?;
    let big_endian = audio.essence() == "audio/l16"
        && audio
            .param("endian")
            .is_some_and(|e| e.eq_ignore_ascii_case("big"));

    let bytes = audio.data();
    if bytes.len() % 2 != 0 {
        warn!(bytes = bytes.len(), "Odd PCM byte count; dropping trailing byte");
    }
    if bytes.len() < 2 {
        return Err(AudioError::NoSamples);
    }
    let samples = bytes.len() / 2;
    if samples % usize::from(channels) != 0 {
        return Err(AudioError::IncompleteFrame { samples, channels });
    }

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: PCM_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(bytes.len() + 44));
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for pair in bytes.chunks_exact(2) {
        let sample = if big_endian {
            i16::from_be_bytes([pair[0], pair[1]])
        } else {
            i16::from_le_bytes([pair[0], pair[1]])
        };
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!(
        sample_rate,
        channels,
        samples,
        "Wrapped raw PCM into WAV"
    );
    Ok(DataUri::new(WAV_MEDIA_TYPE, cursor.into_inner()))
}

/// Rejects formats the WAV header cannot describe.
fn check_format(sample_rate: u32, channels: u16) -> Result<(), AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidParameter {
            name: "rate",
            value: sample_rate.to_string(),
        });
    }
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(AudioError::InvalidParameter {
            name: "channels",
            value: channels.to_string(),
        });
    }
    // The header stores bytes per second as a u32.
    let byte_rate = sample_rate
        .checked_mul(u32::from(channels))
        .and_then(|rate| rate.checked_mul(u32::from(PCM_BITS_PER_SAMPLE / 8)));
    if byte_rate.is_none() {
        return Err(AudioError::InvalidParameter {
            name: "rate",
            value: sample_rate.to_string(),
        });
    }
    Ok(())
}

fn parse_param<T: std::str::FromStr>(
    audio: &DataUri,
    name: &'static str,
    default: T,
) -> Result<T, AudioError> {
    match audio.param(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| AudioError::InvalidParameter {
            name,
            value: value.to_string(),
        }),
    }
}

fn sniff_container(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        Some(WAV_MEDIA_TYPE)
    } else if bytes.starts_with(b"OggS") {
        Some("audio/ogg")
    } else if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) {
        Some("audio/mpeg")
    } else {
        None
    }
}
