//! Binning of the final state along a stream
//!
//! Every body is projected from galactocentric Cartesian into the stream
//! frame and counted into fixed-width bins of stream longitude `lambda`.
//! Binning is a pure function of the final state and the settings.

use std::fmt;

use serde::Serialize;

use crate::configuration::config::HistogramConfig;
use crate::error::{SimError, SimResult};
use crate::simulation::coordinates::StreamFrame;
use crate::simulation::states::System;

/// Upper bound on the number of bins a scheme may ask for
pub const MAX_BINS: usize = 10_000_000;

/// Validated binning scheme
#[derive(Debug, Clone)]
pub struct HistogramSettings {
    pub lambda_start: f64, // degrees
    pub lambda_end: f64, // degrees
    pub bin_size: f64, // degrees
    pub weighted: bool,
    pub frame: StreamFrame,
    bins: usize, // validated in `from_config`
}

impl HistogramSettings {
    pub fn from_config(cfg: &HistogramConfig) -> SimResult<Self> {
        let finite = [cfg.lambda_start, cfg.lambda_end, cfg.bin_size, cfg.phi, cfg.theta, cfg.psi]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(SimError::config("histogram parameters must be finite"));
        }
        if cfg.lambda_end <= cfg.lambda_start {
            return Err(SimError::config(format!(
                "histogram lambda-end ({}) must be greater than lambda-start ({})",
                cfg.lambda_end, cfg.lambda_start
            )));
        }
        if cfg.bin_size <= 0.0 {
            return Err(SimError::config(format!("histogram bin-size must be positive, got {}", cfg.bin_size)));
        }

        // the last bin is clipped at `lambda_end`
        let span = (cfg.lambda_end - cfg.lambda_start) / cfg.bin_size;
        let bins = (span * (1.0 - 1e-12)).ceil().max(1.0);
        if !bins.is_finite() || bins > MAX_BINS as f64 {
            return Err(SimError::config(format!(
                "histogram bin-size {} gives too many bins over [{}, {}] (at most {MAX_BINS})",
                cfg.bin_size, cfg.lambda_start, cfg.lambda_end
            )));
        }

        Ok(Self {
            lambda_start: cfg.lambda_start,
            lambda_end: cfg.lambda_end,
            bin_size: cfg.bin_size,
            weighted: cfg.weighted,
            frame: StreamFrame::new(cfg.phi, cfg.theta, cfg.psi),
            bins: bins as usize,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.bins
    }

    /// Bin holding `lambda`, or `None` outside `[lambda_start, lambda_end]`
    pub fn bin_index(&self, lambda: f64) -> Option<usize> {
        if !(lambda >= self.lambda_start && lambda <= self.lambda_end) {
            return None;
        }
        let idx = ((lambda - self.lambda_start) / self.bin_size).floor() as usize;
        Some(idx.min(self.bin_count() - 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lambda_lo: f64,
    pub lambda_hi: f64,
    pub count: u64,
    pub mass: f64,
}

impl HistogramBin {
    pub fn center(&self) -> f64 {
        0.5 * (self.lambda_lo + self.lambda_hi)
    }
}

/// Ordered bins of the final state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
    pub out_of_range: u64, // bodies whose lambda fell outside the bins
    pub weighted: bool, // report mass rather than counts as the bin value
}

impl Histogram {
    /// Project every body into the stream frame and accumulate
    pub fn from_system(sys: &System, settings: &HistogramSettings, sun_gc_distance: f64) -> Self {
        let n = settings.bin_count();
        let mut bins: Vec<HistogramBin> = (0..n)
            .map(|i| HistogramBin {
                lambda_lo: settings.lambda_start + i as f64 * settings.bin_size,
                lambda_hi: (settings.lambda_start + (i + 1) as f64 * settings.bin_size).min(settings.lambda_end),
                count: 0,
                mass: 0.0,
            })
            .collect();
        let mut out_of_range = 0;

        for b in &sys.bodies {
            let (lambda, _beta) = settings.frame.project(&b.x, sun_gc_distance);
            match settings.bin_index(lambda) {
                Some(idx) => {
                    bins[idx].count += 1;
                    bins[idx].mass += b.m;
                }
                None => out_of_range += 1,
            }
        }

        Self { bins, out_of_range, weighted: settings.weighted }
    }

    /// Bodies counted into some bin
    pub fn total_count(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum()
    }

    pub fn total_mass(&self) -> f64 {
        self.bins.iter().map(|b| b.mass).sum()
    }

    /// Primary value of a bin: its count, or its mass when weighted
    pub fn value(&self, bin: &HistogramBin) -> f64 {
        if self.weighted {
            bin.mass
        } else {
            bin.count as f64
        }
    }

    /// `(lambda center, fraction, error)` per bin, normalised over the binned
    /// bodies; the error is the Poisson estimate `fraction / sqrt(count)`
    pub fn normalized(&self) -> Vec<(f64, f64, f64)> {
        let total = if self.weighted { self.total_mass() } else { self.total_count() as f64 };

        self.bins
            .iter()
            .map(|bin| {
                if total <= 0.0 || bin.count == 0 {
                    return (bin.center(), 0.0, 0.0);
                }
                let fraction = self.value(bin) / total;
                (bin.center(), fraction, fraction / (bin.count as f64).sqrt())
            })
            .collect()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# lambda  fraction  error")?;
        for (lambda, fraction, error) in self.normalized() {
            writeln!(f, "{lambda:.6} {fraction:.12} {error:.12}")?;
        }
        write!(f, "# binned = {}, out of range = {}", self.total_count(), self.out_of_range)
    }
}
