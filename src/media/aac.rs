//! AAC helpers
//!
//! The native audio mixer emits raw AAC frames (no ADTS). Its header unit is
//! the AudioSpecificConfig, which Matroska takes verbatim as codec private.
//! MPEG-TS needs every frame wrapped in an ADTS header instead:
//! ```text
//! syncword (12) | ID (1) | layer (2) | protection_absent (1)
//! | profile (2) | sampling_frequency_index (4) | private (1) | channels (3)
//! | original (1) | home (1) | copyright_id (2) | frame_length (13)
//! | buffer_fullness (11) | number_of_raw_data_blocks (2)
//! ```

use bytes::Bytes;

use crate::error::MuxError;

/// Length of an ADTS header without CRC
pub const ADTS_HEADER_LEN: usize = 7;

/// AudioSpecificConfig, the audio header unit payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    pub const SAMPLING_FREQUENCIES: [u32; 16] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0,
        0, 0,
    ];

    /// The only layout the audio mixer produces: AAC-LC, 44.1 kHz, stereo
    pub const LC_44100_STEREO: AudioSpecificConfig = AudioSpecificConfig {
        audio_object_type: 2,
        sampling_frequency_index: 4,
        sampling_frequency: 44100,
        channel_configuration: 2,
    };

    /// Parse from the audio header unit
    pub fn parse(data: &Bytes) -> Result<Self, MuxError> {
        if data.len() < 2 {
            return Err(MuxError::InvalidAacConfig);
        }

        // audioObjectType: 5 bits
        // samplingFrequencyIndex: 4 bits
        // if (samplingFrequencyIndex == 0xf) samplingFrequency: 24 bits
        // channelConfiguration: 4 bits
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        let (sampling_frequency, channel_configuration) = if sampling_frequency_index == 0x0F {
            if data.len() < 5 {
                return Err(MuxError::InvalidAacConfig);
            }
            let f0 = (data[1] & 0x7F) as u32;
            let f1 = data[2] as u32;
            let f2 = data[3] as u32;
            let f3 = (data[4] >> 7) as u32;
            ((f0 << 17) | (f1 << 9) | (f2 << 1) | f3, (data[4] >> 3) & 0x0F)
        } else {
            let freq = Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize];
            if freq == 0 {
                return Err(MuxError::InvalidAacConfig);
            }
            (freq, (b1 >> 3) & 0x0F)
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
        })
    }

    /// Get channel count
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            1..=6 => self.channel_configuration,
            7 => 8, // 7.1
            _ => 0,
        }
    }
}

/// Layout the muxers declare for the mixer's audio
///
/// The audio mixer always encodes AAC-LC at 44.1 kHz stereo, and both
/// containers describe the track that way. A header unit saying otherwise
/// is logged and ignored.
pub fn mixer_layout(header: &Bytes) -> AudioSpecificConfig {
    let fixed = AudioSpecificConfig::LC_44100_STEREO;
    match AudioSpecificConfig::parse(header) {
        Ok(config) if config == fixed => {}
        Ok(config) => tracing::warn!(
            object_type = config.audio_object_type,
            rate = config.sampling_frequency,
            channels = config.channel_configuration,
            "Audio header differs from AAC-LC 44.1 kHz stereo, ignoring it"
        ),
        Err(err) => tracing::warn!(error = %err, "Unreadable audio header, assuming AAC-LC 44.1 kHz stereo"),
    }
    fixed
}

/// ADTS header for one raw AAC frame of `payload_len` bytes
pub fn adts_header(config: &AudioSpecificConfig, payload_len: usize) -> [u8; ADTS_HEADER_LEN] {
    let profile = config.audio_object_type.saturating_sub(1); // ADTS uses profile - 1
    let freq_idx = config.sampling_frequency_index;
    let channels = config.channel_configuration;

    let frame_len = payload_len + ADTS_HEADER_LEN;

    let mut header = [0u8; ADTS_HEADER_LEN];

    // Syncword (12 bits) + ID (1 bit) + Layer (2 bits) + Protection (1 bit)
    header[0] = 0xFF;
    header[1] = 0xF1; // MPEG-4, Layer 0, no CRC

    // Profile (2 bits) + Freq (4 bits) + Private (1 bit) + Channels (1 bit)
    header[2] = ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01);

    // Channels (2 bits) + Original + Home + Copyright (2 bits) + Length (2 bits)
    header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;

    // Length (8 bits)
    header[4] = ((frame_len >> 3) & 0xFF) as u8;

    // Length (3 bits) + Buffer fullness (5 bits)
    header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8;

    // Buffer fullness (6 bits) + Number of frames (2 bits)
    header[6] = 0xFC;

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_specific_config_parse() {
        // AAC-LC, 44100 Hz, Stereo
        let data = Bytes::from_static(&[0x12, 0x10]);

        let config = AudioSpecificConfig::parse(&data).unwrap();
        assert_eq!(config, AudioSpecificConfig::LC_44100_STEREO);
        assert_eq!(config.channels(), 2);
    }

    #[test]
    fn test_mixer_layout_is_fixed() {
        let fixed = AudioSpecificConfig::LC_44100_STEREO;

        assert_eq!(mixer_layout(&Bytes::from_static(&[0x12, 0x10])), fixed);
        // HE-AAC 48 kHz mono
        assert_eq!(mixer_layout(&Bytes::from_static(&[0x29, 0x88])), fixed);
        assert_eq!(mixer_layout(&Bytes::new()), fixed);
    }

    #[test]
    fn test_audio_specific_config_too_short() {
        let data = Bytes::from_static(&[0x12]);
        assert_eq!(
            AudioSpecificConfig::parse(&data),
            Err(MuxError::InvalidAacConfig)
        );
    }

    #[test]
    fn test_audio_specific_config_reserved_frequency() {
        // sampling index 13 is reserved
        let data = Bytes::from_static(&[0x16, 0x90]);
        assert!(AudioSpecificConfig::parse(&data).is_err());
    }

    #[test]
    fn test_adts_header_fixed_layout() {
        let header = adts_header(&AudioSpecificConfig::LC_44100_STEREO, 100);
        let len = 107usize;

        assert_eq!(header[0], 0xFF);
        assert_eq!(header[1], 0xF1);
        assert_eq!(header[2], 0x50);
        assert_eq!(header[3], 0x80 | ((len & 0x1800) >> 11) as u8);
        assert_eq!(header[4], ((len & 0x7F8) >> 3) as u8);
        assert_eq!(header[5], (((len & 0x07) << 5) | 0x1F) as u8);
        assert_eq!(header[6], 0xFC);
    }

    #[test]
    fn test_adts_header_large_frame() {
        let header = adts_header(&AudioSpecificConfig::LC_44100_STEREO, 0x1800);
        let len = 0x1800 + 7;

        assert_eq!(header[3] & 0x03, ((len >> 11) & 0x03) as u8);
        assert_eq!(header[4], ((len >> 3) & 0xFF) as u8);
    }
}
