use crate::foundation::error::{SpectrumError, SpectrumResult};
use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;

/// Byte magnitudes for one frame tick, one per frequency bin (`fft_size / 2`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencyData {
    pub bins: Vec<u8>,
}

impl FrequencyData {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bins
    }
}

/// Frequency analyser producing byte spectra.
///
/// Each call windows the last `fft_size` mono samples with a Blackman window, takes the magnitude
/// spectrum, blends it with the previous result by `smoothing`, converts to decibels and maps
/// `[min_db, max_db]` onto `0..=255`.
pub struct SpectrumAnalyser {
    fft_size: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize, smoothing: f64) -> SpectrumResult<Self> {
        if !(32..=32_768).contains(&fft_size) || !fft_size.is_power_of_two() {
            return Err(SpectrumError::validation(format!(
                "fft_size must be a power of two in 32..=32768, got {fft_size}"
            )));
        }
        if !(0.0..1.0).contains(&smoothing) {
            return Err(SpectrumError::validation(format!(
                "smoothing must be in [0, 1), got {smoothing}"
            )));
        }

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        Ok(Self {
            fft_size,
            smoothing: smoothing as f32,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
            plan,
            input,
            spectrum,
            scratch,
            window: blackman_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    /// Override the decibel range mapped onto byte magnitudes.
    pub fn with_db_range(mut self, min_db: f32, max_db: f32) -> SpectrumResult<Self> {
        if !(min_db.is_finite() && max_db.is_finite() && min_db < max_db) {
            return Err(SpectrumError::validation(format!(
                "invalid decibel range {min_db}..{max_db}"
            )));
        }
        self.min_db = min_db;
        self.max_db = max_db;
        Ok(self)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Forget smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }

    /// Analyse exactly `fft_size` mono samples and update the smoothed spectrum.
    pub fn analyse(&mut self, mono: &[f32]) -> SpectrumResult<()> {
        if mono.len() != self.fft_size {
            return Err(SpectrumError::validation(format!(
                "analyser expects {} samples, got {}",
                self.fft_size,
                mono.len()
            )));
        }
        for ((dst, &s), &w) in self.input.iter_mut().zip(mono).zip(&self.window) {
            *dst = s * w;
        }
        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|e| SpectrumError::validation(format!("fft failed: {e}")))?;

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        for (prev, bin) in self.smoothed.iter_mut().zip(&self.spectrum) {
            let mag = bin.norm() * scale;
            let next = tau * *prev + (1.0 - tau) * mag;
            *prev = if next.is_finite() { next } else { 0.0 };
        }
        Ok(())
    }

    /// Current smoothed spectrum as bytes.
    pub fn byte_frequency_data(&self) -> FrequencyData {
        let range = self.max_db - self.min_db;
        let bins = self
            .smoothed
            .iter()
            .map(|&m| {
                let db = if m > 0.0 { 20.0 * m.log10() } else { f32::NEG_INFINITY };
                let scaled = 255.0 * (db - self.min_db) / range;
                scaled.floor().clamp(0.0, 255.0) as u8
            })
            .collect();
        FrequencyData { bins }
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_db", &self.min_db)
            .field("max_db", &self.max_db)
            .finish()
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let n = len as f32;
    (0..len)
        .map(|i| {
            let x = i as f32 / n;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
