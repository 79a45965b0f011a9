//! Reduction of one interval of audio to a plot point

use rustfft::{num_complex::Complex, FftPlanner};

/// Scale applied to f32 samples so values read like 16-bit PCM
const I16_SCALE: f32 = 32767.0;

/// Sound intensity of an interval: L2 norm of the samples at 16-bit scale
pub fn intensity(samples: &[f32]) -> f64 {
    samples
        .iter()
        .map(|&s| {
            let v = (s * I16_SCALE) as f64;
            v * v
        })
        .sum::<f64>()
        .sqrt()
}

/// Magnitude spectrum of an interval, cut or zero-padded to a fixed bin count
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
    bins: usize,
}

impl SpectrumAnalyzer {
    pub fn new(bins: usize) -> Self {
        Self {
            planner: FftPlanner::new(),
            bins,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// `|rfft(samples)|`, first `bins` values
    pub fn magnitudes(&mut self, samples: &[f32]) -> Vec<f64> {
        let mut magnitudes = vec![0.0; self.bins];
        if samples.is_empty() {
            return magnitudes;
        }

        let n = samples.len();
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .map(|&s| Complex::new(s * I16_SCALE, 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        // A real input of n points has n/2 + 1 distinct bins
        for (out, c) in magnitudes.iter_mut().zip(buffer.iter().take(n / 2 + 1)) {
            *out = c.norm() as f64;
        }
        magnitudes
    }
}

/// Turns an interval of mono samples into the values of one plot point
pub enum PointReducer {
    Intensity,
    Spectrum(SpectrumAnalyzer),
}

impl PointReducer {
    pub fn width(&self) -> usize {
        match self {
            PointReducer::Intensity => 1,
            PointReducer::Spectrum(analyzer) => analyzer.bins(),
        }
    }

    pub fn reduce(&mut self, samples: &[f32]) -> Vec<f64> {
        match self {
            PointReducer::Intensity => vec![intensity(samples)],
            PointReducer::Spectrum(analyzer) => analyzer.magnitudes(samples),
        }
    }
}
