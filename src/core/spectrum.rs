//! Magnitude spectrum and band power for audio chunks.
//!
//! Radix-2 decimation-in-time FFT; inputs are zero-padded to the next power
//! of two.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Magnitude spectrum of a real signal, with the bin frequency resolution.
#[derive(Debug, Clone)]
pub struct Spectrum {
    magnitudes: Vec<f64>,
    bin_hz: f64,
}

impl Spectrum {
    /// Compute the spectrum of `samples` recorded at `sample_rate` Hz.
    pub fn of_samples(samples: &[i16], sample_rate: u32) -> Self {
        let n = samples.len().max(1).next_power_of_two();
        let mut buffer: Vec<Complex64> = samples
            .iter()
            .map(|&s| Complex64::new(s as f64, 0.0))
            .collect();
        buffer.resize(n, Complex64::new(0.0, 0.0));

        fft_in_place(&mut buffer);

        Self {
            magnitudes: buffer.iter().map(|c| c.norm()).collect(),
            bin_hz: sample_rate as f64 / n as f64,
        }
    }

    /// Sum of magnitudes over bins whose (non-negative) frequency lies in `[low, high]` Hz.
    pub fn band_power(&self, low: f64, high: f64) -> f64 {
        let n = self.magnitudes.len();
        // Bins 0..ceil(n/2) carry non-negative frequencies; the rest mirror them.
        let positive = (n + 1) / 2;
        self.magnitudes[..positive]
            .iter()
            .enumerate()
            .filter(|(k, _)| {
                let freq = *k as f64 * self.bin_hz;
                freq >= low && freq <= high
            })
            .map(|(_, m)| m)
            .sum()
    }

    pub fn bin_hz(&self) -> f64 {
        self.bin_hz
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
}

fn fft_in_place(buffer: &mut [Complex64]) {
    let n = buffer.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two());

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            buffer.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let step = Complex64::new(angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let mut w = Complex64::new(1.0, 0.0);
            for k in 0..len / 2 {
                let even = buffer[start + k];
                let odd = buffer[start + k + len / 2] * w;
                buffer[start + k] = even + odd;
                buffer[start + k + len / 2] = even - odd;
                w *= step;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: u32, n: usize, amplitude: f64) -> Vec<i16> {
        (0..n)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / rate as f64).sin()) as i16)
            .collect()
    }

    #[test]
    fn test_dc_signal() {
        let spectrum = Spectrum::of_samples(&[100; 8], 8);
        assert!((spectrum.magnitudes[0] - 800.0).abs() < 1e-6);
        assert!(spectrum.magnitudes[1..].iter().all(|m| m.abs() < 1e-6));
    }

    #[test]
    fn test_zero_padding_to_power_of_two() {
        let spectrum = Spectrum::of_samples(&[1; 5], 8_000);
        assert_eq!(spectrum.len(), 8);
        assert!((spectrum.bin_hz() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_sine_lands_in_its_band() {
        let rate = 44_100;
        // 64 * 44100 / 4096 Hz sits exactly on a bin.
        let freq = 64.0 * rate as f64 / 4096.0;
        let spectrum = Spectrum::of_samples(&sine(freq, rate, 4096, 10_000.0), rate);

        let in_band = spectrum.band_power(600.0, 800.0);
        let snore_band = spectrum.band_power(100.0, 500.0);
        assert!(in_band > 1.0e7, "in-band power {in_band}");
        assert!(snore_band < in_band / 100.0, "leakage {snore_band}");
    }

    #[test]
    fn test_band_ignores_mirrored_bins() {
        let rate = 8;
        let spectrum = Spectrum::of_samples(&sine(1.0, rate, 8, 1_000.0), rate);
        // Mirror bin 7 would be -1 Hz and must not be counted.
        let power = spectrum.band_power(0.5, 1.5);
        assert!((power - spectrum.magnitudes[1]).abs() < 1e-9);
    }
}
