// PCM conditioning and G.711 μ-law coding
//
// Outgoing: frames from any capture backend are converted to mono, resampled
// to the track clock rate and cut into fixed-size PCMU payloads.
// Incoming: PCMU payloads from the remote track are expanded back to PCM
// frames for playback.

use bytes::Bytes;

use super::backend::AudioFrame;

/// Clock rate of a PCMU track
pub const PCMU_SAMPLE_RATE: u32 = 8000;

/// Static RTP payload type of PCMU
pub const PCMU_PAYLOAD_TYPE: u8 = 0;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Process audio frame: convert to mono and resample to target rate
pub fn process_frame(frame: AudioFrame, target_sample_rate: u32) -> AudioFrame {
    let mut processed = frame;

    if processed.channels > 1 {
        processed = downmix_to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = resample_frame(processed, target_sample_rate);
    }

    processed
}

/// Average interleaved channels into a single channel
pub fn downmix_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Resample a mono frame by nearest-sample picking
pub fn resample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || frame.sample_rate == 0 || target_rate == 0 {
        return frame;
    }

    let source_len = frame.samples.len() as u64;
    let out_len = source_len * target_rate as u64 / frame.sample_rate as u64;

    let resampled = (0..out_len)
        .map(|i| {
            let index = (i * frame.sample_rate as u64 / target_rate as u64) as usize;
            frame.samples[index.min(frame.samples.len() - 1)]
        })
        .collect();

    AudioFrame {
        samples: resampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Encode one linear PCM sample as G.711 μ-law
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80u8
    } else {
        0
    };

    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7u8;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((pcm >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode one G.711 μ-law byte to linear PCM
pub fn ulaw_to_linear(code: u8) -> i16 {
    let code = !code;
    let exponent = (code >> 4) & 0x07;
    let mantissa = (code & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if code & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Expand a PCMU payload into a mono 8 kHz frame
pub fn decode_pcmu(payload: &[u8], timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: payload.iter().map(|&code| ulaw_to_linear(code)).collect(),
        sample_rate: PCMU_SAMPLE_RATE,
        channels: 1,
        timestamp_ms,
    }
}

/// Accumulates conditioned PCM and emits fixed-duration PCMU payloads
pub struct PcmuPacketizer {
    pending: Vec<u8>,
    payload_len: usize,
}

impl PcmuPacketizer {
    pub fn new(packet_ms: u64) -> Self {
        let payload_len = (PCMU_SAMPLE_RATE as u64 * packet_ms.max(1) / 1000) as usize;
        Self {
            pending: Vec::with_capacity(payload_len * 2),
            payload_len,
        }
    }

    /// Size of each emitted payload in bytes (one byte per sample)
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Feed a captured frame; returns every complete payload now available
    pub fn push(&mut self, frame: AudioFrame) -> Vec<Bytes> {
        let frame = process_frame(frame, PCMU_SAMPLE_RATE);
        self.pending
            .extend(frame.samples.iter().map(|&s| linear_to_ulaw(s)));

        let mut packets = Vec::new();
        while self.pending.len() >= self.payload_len {
            let rest = self.pending.split_off(self.payload_len);
            let packet = std::mem::replace(&mut self.pending, rest);
            packets.push(Bytes::from(packet));
        }
        packets
    }
}
