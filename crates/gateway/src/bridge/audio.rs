//! Telephony audio conversion.
//!
//! G.711 μ-law encode/decode and a linear-interpolation resampler that
//! keeps fractional position and the last sample across frames, so
//! frame-by-frame conversion matches converting the concatenated
//! stream (no boundary glitches).

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// Encode one 16-bit linear sample as a μ-law byte.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut value = sample as i32;
    let sign: u8 = if value < 0 {
        value = -value;
        0x80
    } else {
        0
    };
    if value > CLIP {
        value = CLIP;
    }
    value += BIAS;

    // Segment number: position of the highest set bit among bits 7..14.
    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (value & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((value >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode one μ-law byte to a 16-bit linear sample.
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let mut value = (((mantissa as i32) << 3) + BIAS) << exponent;
    value -= BIAS;

    if sign != 0 {
        -value as i16
    } else {
        value as i16
    }
}

/// Decode a μ-law buffer to PCM16 samples.
pub fn ulaw_decode(data: &[u8]) -> Vec<i16> {
    data.iter().map(|&b| ulaw_to_linear(b)).collect()
}

/// Encode PCM16 samples as μ-law bytes.
pub fn ulaw_encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_ulaw(s)).collect()
}

/// Reinterpret little-endian PCM16 bytes as samples. A trailing odd
/// byte is dropped.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Serialize PCM16 samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Linear-interpolation sample-rate converter with continuous state.
///
/// One instance per direction per live session; state is reset on
/// session swap by constructing a fresh converter.
pub struct Resampler {
    step: f64,
    /// Fractional read position past the previous frame's last sample.
    pos: f64,
    prev: i16,
    primed: bool,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate as f64,
            pos: 0.0,
            prev: 0,
            primed: false,
        }
    }

    /// Convert one frame, carrying interpolation state to the next.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if input.is_empty() {
            return Vec::new();
        }

        // Virtual sample sequence: [prev] ++ input once primed.
        let mut samples: Vec<i16> = Vec::with_capacity(input.len() + 1);
        if self.primed {
            samples.push(self.prev);
        }
        samples.extend_from_slice(input);

        let mut out = Vec::with_capacity((samples.len() as f64 / self.step) as usize + 1);
        let mut t = self.pos;
        let last = (samples.len() - 1) as f64;
        while t < last {
            let i = t as usize;
            let frac = t - i as f64;
            let interpolated =
                samples[i] as f64 * (1.0 - frac) + samples[i + 1] as f64 * frac;
            out.push(interpolated.round() as i16);
            t += self.step;
        }

        self.pos = t - last;
        self.prev = *samples.last().expect("non-empty frame");
        self.primed = true;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulaw_codes_round_trip_exactly() {
        // Every μ-law code decodes to a representable level; re-encoding
        // that level must give the code back.
        for code in 0u8..=255 {
            let linear = ulaw_to_linear(code);
            let back = linear_to_ulaw(linear);
            // 0x7F and 0xFF both decode to zero-ish levels; accept the
            // canonical positive/negative zero pair.
            if code == 0xFF || code == 0x7F {
                assert_eq!(ulaw_to_linear(back), linear);
            } else {
                assert_eq!(back, code, "code {code:#04x} did not round trip");
            }
        }
    }

    #[test]
    fn ulaw_error_within_quantisation_bound() {
        // Quantisation error is bounded by half the segment step. Check a
        // sweep across the full range against the analytic bound.
        for &x in &[0i16, 1, -1, 100, -100, 1000, -1000, 8000, -8000, 30000, -30000, 32767, -32768]
        {
            let decoded = ulaw_to_linear(linear_to_ulaw(x)) as i32;
            let clipped = (x as i32).clamp(-CLIP, CLIP);
            let biased = clipped.abs() + BIAS;
            // Same segment search as the encoder; step = 8 << exponent
            // in the 16-bit domain.
            let mut exponent = 7;
            let mut mask = 0x4000;
            while exponent > 0 && (biased & mask) == 0 {
                exponent -= 1;
                mask >>= 1;
            }
            let step = 8 << exponent;
            let err = (decoded - clipped).abs();
            assert!(
                err <= step,
                "sample {x}: decoded {decoded}, err {err} > step {step}"
            );
        }
    }

    #[test]
    fn ulaw_preserves_sign_and_order() {
        assert!(ulaw_to_linear(linear_to_ulaw(10_000)) > 0);
        assert!(ulaw_to_linear(linear_to_ulaw(-10_000)) < 0);

        // Monotonic over increasing magnitudes.
        let mut last = -1i32;
        for x in (0..32_000).step_by(500) {
            let decoded = ulaw_to_linear(linear_to_ulaw(x as i16)) as i32;
            assert!(decoded >= last, "non-monotonic at {x}");
            last = decoded;
        }
    }

    #[test]
    fn resample_downsamples_by_ratio() {
        let input: Vec<i16> = (0..480).map(|i| (i % 100) as i16).collect();
        let mut rs = Resampler::new(24_000, 8_000);
        let out = rs.process(&input);
        // 480 samples at 24 kHz ≈ 160 at 8 kHz.
        assert!((out.len() as i64 - 160).unsigned_abs() <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_upsamples_by_ratio() {
        let input: Vec<i16> = (0..160).map(|i| (i * 3) as i16).collect();
        let mut rs = Resampler::new(8_000, 16_000);
        let out = rs.process(&input);
        assert!((out.len() as i64 - 320).unsigned_abs() <= 2, "got {}", out.len());
    }

    #[test]
    fn chunked_resampling_equals_whole() {
        let input: Vec<i16> = (0..1000)
            .map(|i| ((i as f64 * 0.05).sin() * 10_000.0) as i16)
            .collect();

        let mut whole = Resampler::new(24_000, 8_000);
        let expected = whole.process(&input);

        let mut chunked = Resampler::new(24_000, 8_000);
        let mut got = Vec::new();
        for chunk in input.chunks(160) {
            got.extend(chunked.process(chunk));
        }

        assert_eq!(got, expected);
    }

    #[test]
    fn pcm_byte_round_trip() {
        let samples: Vec<i16> = vec![0, 1, -1, 32_767, -32_768, 12_345];
        assert_eq!(bytes_to_pcm16(&pcm16_to_bytes(&samples)), samples);
        // Odd trailing byte dropped.
        assert_eq!(bytes_to_pcm16(&[0x01, 0x02, 0x03]).len(), 1);
    }

    #[test]
    fn empty_frame_is_a_noop() {
        let mut rs = Resampler::new(8_000, 16_000);
        assert!(rs.process(&[]).is_empty());
    }
}
