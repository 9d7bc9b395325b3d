//! Histogram feeds for external renderers.
//!
//! Two histogram kinds are built from a sample:
//!
//! - [`CountHistogram`]: equal-width bins (Scott's rule), height is the
//!   number of values in the bin.
//! - [`DensityHistogram`]: one bin per quartile interval, height is the
//!   density `0.25 / width`, so every bin has the same area.
//!
//! Renderers consume bins through the [`Bin`] and [`BinSource`] traits and
//! never need to know which kind they were given.

use crate::metrics::{Quartiles, Sample};
use serde::{Deserialize, Serialize};

/// A single histogram bin
pub trait Bin {
    fn lower(&self) -> f64;
    fn upper(&self) -> f64;
    fn height(&self) -> f64;

    fn gap(&self) -> f64 {
        self.upper() - self.lower()
    }

    fn to_triple(&self) -> BinTriple {
        BinTriple {
            lower: self.lower(),
            upper: self.upper(),
            height: self.height(),
        }
    }
}

/// Anything that exposes an ordered list of bins
pub trait BinSource {
    type Bin: Bin;

    fn bins(&self) -> &[Self::Bin];

    fn triples(&self) -> Vec<BinTriple> {
        self.bins().iter().map(Bin::to_triple).collect()
    }
}

/// Renderer-neutral bin representation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinTriple {
    pub lower: f64,
    pub upper: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

impl Bin for CountBin {
    fn lower(&self) -> f64 {
        self.lower
    }

    fn upper(&self) -> f64 {
        self.upper
    }

    fn height(&self) -> f64 {
        self.count as f64
    }
}

/// Equal-width histogram with Scott's normal reference rule for bin width
#[derive(Debug, Clone, PartialEq)]
pub struct CountHistogram {
    bins: Vec<CountBin>,
}

impl CountHistogram {
    pub fn build(sample: &Sample) -> Self {
        let values = sample.values();
        let n = values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let width = 3.49 * std_dev * n.powf(-1.0 / 3.0);

        if !(width.is_finite() && width > 0.0) || max <= min {
            return Self {
                bins: vec![CountBin {
                    lower: min,
                    upper: max,
                    count: values.len(),
                }],
            };
        }

        let start = (min / width).floor() * width;
        let bin_count = ((max - start) / width).floor() as usize + 1;
        let mut bins: Vec<CountBin> = (0..bin_count)
            .map(|i| CountBin {
                lower: start + i as f64 * width,
                upper: start + (i + 1) as f64 * width,
                count: 0,
            })
            .collect();

        for &value in values {
            let index = (((value - start) / width).floor() as usize).min(bin_count - 1);
            bins[index].count += 1;
        }

        Self { bins }
    }
}

impl BinSource for CountHistogram {
    type Bin = CountBin;

    fn bins(&self) -> &[CountBin] {
        &self.bins
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityBin {
    pub lower: f64,
    pub upper: f64,
    pub density: f64,
}

impl Bin for DensityBin {
    fn lower(&self) -> f64 {
        self.lower
    }

    fn upper(&self) -> f64 {
        self.upper
    }

    fn height(&self) -> f64 {
        self.density
    }
}

/// Quartile-respecting density histogram.
///
/// Zero-width quartile intervals are skipped since their density is
/// undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityHistogram {
    bins: Vec<DensityBin>,
}

impl DensityHistogram {
    pub fn build(sample: &Sample) -> Self {
        let mut sorted = sample.values().to_vec();
        sorted.sort_by(f64::total_cmp);
        Self::from_quartiles(&Quartiles::from_sorted(&sorted))
    }

    pub fn from_quartiles(quartiles: &Quartiles) -> Self {
        let q = quartiles.as_array();
        let bins = q
            .windows(2)
            .filter(|edge| edge[1] > edge[0])
            .map(|edge| DensityBin {
                lower: edge[0],
                upper: edge[1],
                density: 0.25 / (edge[1] - edge[0]),
            })
            .collect();
        Self { bins }
    }
}

impl BinSource for DensityHistogram {
    type Bin = DensityBin;

    fn bins(&self) -> &[DensityBin] {
        &self.bins
    }
}

/// Histogram data of one endpoint, ready to be written for a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramFeed {
    pub endpoint_index: usize,
    pub uri: String,
    pub values: Vec<f64>,
    pub histogram: Vec<BinTriple>,
    pub quartiles: Vec<BinTriple>,
}

impl HistogramFeed {
    pub fn new(endpoint_index: usize, uri: &str, sample: &Sample) -> Self {
        Self {
            endpoint_index,
            uri: uri.to_string(),
            values: sample.values().to_vec(),
            histogram: CountHistogram::build(sample).triples(),
            quartiles: DensityHistogram::build(sample).triples(),
        }
    }
}
