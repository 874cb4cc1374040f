//! WAV container inspection
//!
//! Inbound audio frames carry a complete WAV file. The gateway never decodes
//! samples; it only reads the header to log what the client sent and to catch
//! obviously non-audio payloads early.

/// Parsed WAV format header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavInfo {
    /// Parse the RIFF/WAVE header of `bytes`
    ///
    /// Returns `None` when the payload is not a WAV container or the `fmt `
    /// chunk is missing.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return None;
        }

        // Walk chunks until `fmt `; clients sometimes emit extra chunks
        // (LIST, fact) before it.
        let mut offset = 12;
        while offset + 8 <= bytes.len() {
            let id = &bytes[offset..offset + 4];
            let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?) as usize;
            let body = offset + 8;

            if id == b"fmt " {
                if body + 16 > bytes.len() {
                    return None;
                }
                let channels = u16::from_le_bytes(bytes[body + 2..body + 4].try_into().ok()?);
                let sample_rate_hz =
                    u32::from_le_bytes(bytes[body + 4..body + 8].try_into().ok()?);
                let bits_per_sample =
                    u16::from_le_bytes(bytes[body + 14..body + 16].try_into().ok()?);
                return Some(Self {
                    sample_rate_hz,
                    channels,
                    bits_per_sample,
                });
            }

            // Chunks are word-aligned
            offset = body + size + (size % 2);
        }

        None
    }
}

/// Build a minimal mono 16-bit PCM WAV container around `data`
///
/// Used by tests and adapter-less development tooling.
pub fn build_wav(sample_rate_hz: u32, data: &[u8]) -> Vec<u8> {
    let byte_rate = sample_rate_hz * 2;
    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate_hz.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wav.extend_from_slice(data);
    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let wav = build_wav(16000, &[0u8; 320]);
        let info = WavInfo::parse(&wav).unwrap();
        assert_eq!(info.sample_rate_hz, 16000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
    }

    #[test]
    fn test_rejects_non_wav() {
        assert!(WavInfo::parse(b"not audio at all").is_none());
        assert!(WavInfo::parse(&[]).is_none());
    }
}
