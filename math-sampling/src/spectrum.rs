//! Real DFT bins used by the frequency-domain operator.
//!
//! A length-`n` real trace has `n/2 + 1` independent bins. The DC bin and, for
//! even `n`, the Nyquist bin are real ("self-conjugate"); every other bin is a
//! complex value paired with its mirror image. With the scaling below, the
//! map from a trace to its realified retained bins is orthogonal on the full
//! band:
//!
//! ```text
//! self-conjugate:  X_k / √n
//! paired:          √2 · (Re X_k, Im X_k) / √n
//! ```

use crate::config::FrequencyBand;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One retained DFT bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyBin {
    /// DFT index `k`
    pub index: usize,
    /// `k / (n Δt)`
    pub frequency: f64,
    /// DC or Nyquist: real-valued for real input
    pub self_conjugate: bool,
}

impl FrequencyBin {
    /// Real components contributed per channel: 1 or 2.
    pub fn parts(&self) -> usize {
        if self.self_conjugate { 1 } else { 2 }
    }
}

/// Forward FFT plus the list of retained bins for one window length.
#[derive(Clone)]
pub struct SpectrumPlan {
    len: usize,
    fft: Arc<dyn Fft<f64>>,
    bins: Vec<FrequencyBin>,
}

impl fmt::Debug for SpectrumPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumPlan")
            .field("len", &self.len)
            .field("bins", &self.bins.len())
            .finish()
    }
}

impl SpectrumPlan {
    /// Plan a transform of `len` samples spaced `step` apart, keeping the
    /// bins inside `band` (all bins when `None`).
    pub fn new(len: usize, step: f64, band: Option<FrequencyBand>) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        let resolution = 1.0 / (len as f64 * step);
        let bins = (0..=len / 2)
            .map(|k| FrequencyBin {
                index: k,
                frequency: k as f64 * resolution,
                self_conjugate: k == 0 || (len % 2 == 0 && 2 * k == len),
            })
            .filter(|bin| band.is_none_or(|b| b.contains(bin.frequency)))
            .collect();
        Self { len, fft, bins }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bins(&self) -> &[FrequencyBin] {
        &self.bins
    }

    /// Realified components per channel over every retained bin.
    pub fn components(&self) -> usize {
        self.bins.iter().map(FrequencyBin::parts).sum()
    }

    /// Unnormalized DFT of a real trace of length `len`.
    pub fn transform<I>(&self, trace: I) -> Vec<Complex64>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut buffer: Vec<Complex64> = trace
            .into_iter()
            .map(|x| Complex64::new(x, 0.0))
            .collect();
        debug_assert_eq!(buffer.len(), self.len);
        self.fft.process(&mut buffer);
        buffer
    }

    /// Orthogonally scaled real components of a trace, bin by bin.
    pub fn realify<I>(&self, trace: I) -> Vec<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let spectrum = self.transform(trace);
        let scale = 1.0 / (self.len as f64).sqrt();
        let paired_scale = std::f64::consts::SQRT_2 * scale;
        let mut out = Vec::with_capacity(self.components());
        for bin in &self.bins {
            let x = spectrum[bin.index];
            if bin.self_conjugate {
                out.push(x.re * scale);
            } else {
                out.push(x.re * paired_scale);
                out.push(x.im * paired_scale);
            }
        }
        out
    }
}
