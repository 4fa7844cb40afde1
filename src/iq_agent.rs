//! Incremental quantile estimation ("iq-agent").
//!
//! Keeps a piecewise-linear approximation of a stream's cdf on a fixed grid of
//! 251 knots, in the spirit of the IQAgent of Chambers et al. (Statistical
//! Science, 2006). Incoming values are buffered; a full buffer (or any read)
//! folds the sorted batch into the knots in one merge pass, so memory never
//! exceeds `buffer capacity + 251` values whatever the stream length.
//!
//! The grid is dense and linear on [0.10, 0.90] and geometric in both tails,
//! which keeps extreme quantiles usable without storing extremes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

/// Number of knots of the cdf grid.
pub const KNOTS: usize = 251;

/// Default capacity of the incoming-values buffer.
pub const DEFAULT_BUFFER: usize = 1000;

const TAIL_RATIO: f64 = 0.871_919_09;

#[derive(Debug, Error)]
pub enum IqAgentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: cannot parse {content:?}")]
    Parse { line: usize, content: String },
    #[error("state file holds {got} rows, expected {expected}")]
    RowCount { expected: usize, got: usize },
    #[error("state file is not monotone at row {row}")]
    NotMonotone { row: usize },
    #[error("history weight {0} is outside [0, 1)")]
    InvalidHistoryWeight(f64),
}

/// Which input the merge consumes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frontier {
    /// Next knot of the current cdf (slope breakpoint).
    Old,
    /// Next buffered observation (unit jump).
    New,
    Done,
}

/// Streaming quantile estimator over a 251-knot cdf grid.
#[derive(Debug, Clone)]
pub struct IncrementalQuantileEstimator {
    pval: Vec<f64>,
    qile: Vec<f64>,
    buffer: Vec<f64>,
    capacity: usize,
    nt: usize,
    q0: f64,
    qm: f64,
}

impl Default for IncrementalQuantileEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalQuantileEstimator {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Estimator folding its buffer every `capacity` values (at least 1).
    pub fn with_buffer(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pval: initial_grid(),
            qile: vec![0.0; KNOTS],
            buffer: Vec::with_capacity(capacity),
            capacity,
            nt: 0,
            q0: f64::INFINITY,
            qm: f64::NEG_INFINITY,
        }
    }

    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    /// Observation weight carried by the estimator, pending values included.
    pub fn observations(&self) -> usize {
        self.nt + self.buffer.len()
    }

    /// Whether at least one value was ever assimilated.
    pub fn is_fed(&self) -> bool {
        self.q0 <= self.qm
    }

    /// Smallest and largest values seen, if any.
    pub fn extremes(&self) -> Option<(f64, f64)> {
        self.is_fed().then_some((self.q0, self.qm))
    }

    pub fn add(&mut self, x: f64) {
        if x.is_nan() {
            return;
        }
        self.buffer.push(x);
        if x < self.q0 {
            self.q0 = x;
        }
        if x > self.qm {
            self.qm = x;
        }
        if self.buffer.len() >= self.capacity {
            self.update();
        }
    }

    /// Add a batch of values.
    ///
    /// With `history_weight = Some(w)`, the state absorbed so far counts as a
    /// share `w` of the combined weight of history and batch. `w = 0` discards
    /// history (extremes included); `w` close to 1 makes the batch negligible.
    pub fn add_list(&mut self, xs: &[f64], history_weight: Option<f64>) -> Result<(), IqAgentError> {
        if let Some(w) = history_weight {
            if !(0.0..1.0).contains(&w) {
                return Err(IqAgentError::InvalidHistoryWeight(w));
            }
            if !xs.is_empty() {
                self.update();
                self.nt = (w / (1.0 - w) * xs.len() as f64).round() as usize;
                if self.nt == 0 {
                    self.q0 = f64::INFINITY;
                    self.qm = f64::NEG_INFINITY;
                }
            }
        }
        for &x in xs {
            self.add(x);
        }
        Ok(())
    }

    /// Value `q` with estimated cdf `F(q) ≈ p`, clamped to the observed range.
    ///
    /// `None` until a value has been assimilated.
    pub fn report(&mut self, p: f64) -> Option<f64> {
        if !self.is_fed() {
            return None;
        }
        self.update();
        let nq = KNOTS;
        let (mut jl, mut jh) = (0usize, nq - 1);
        while jh - jl > 1 {
            let j = (jh + jl) >> 1;
            if p > self.pval[j] {
                jl = j;
            } else {
                jh = j;
            }
        }
        let (lo, hi) = (self.qile[jl], self.qile[jl + 1]);
        let q = lo + (hi - lo) * (p - self.pval[jl]) / (self.pval[jl + 1] - self.pval[jl]);
        // within the segment, so the result is monotone in p
        Some(q.clamp(lo, hi).clamp(self.qile[0], self.qile[nq - 1]))
    }

    /// Estimated cdf at `x`.
    ///
    /// On a plateau of equal knots the result is the mean of the left and
    /// right limits, so ties are split symmetrically.
    pub fn cdf(&mut self, x: f64) -> Option<f64> {
        if !self.is_fed() {
            return None;
        }
        self.update();
        let nq = KNOTS;
        let lo = self.qile.partition_point(|q| *q < x);
        let hi = self.qile.partition_point(|q| *q <= x);
        if lo == nq {
            return Some(1.0);
        }
        if hi == 0 {
            return Some(0.0);
        }
        let left = if lo == 0 {
            self.pval[0]
        } else {
            self.interpolate_p(lo - 1, x)
        };
        let right = if hi == nq {
            self.pval[nq - 1]
        } else {
            self.interpolate_p(hi - 1, x)
        };
        Some(0.5 * (left + right))
    }

    /// Knot pairs `(p, q)` after folding pending values.
    pub fn knots(&mut self) -> Vec<(f64, f64)> {
        self.update();
        self.pval
            .iter()
            .copied()
            .zip(self.qile.iter().copied())
            .collect()
    }

    /// Persist the `(p, q)` knot pairs, one per line, after a
    /// `# observations N` comment line. [`load`](Self::load) also accepts the
    /// bare 251-row table without it.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), IqAgentError> {
        self.update();
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# observations {}", self.nt)?;
        for (p, q) in self.pval.iter().zip(self.qile.iter()) {
            writeln!(writer, "{p} {q}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Restore an estimator from a file written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IqAgentError> {
        let reader = BufReader::new(File::open(path)?);
        let mut nt: Option<usize> = None;
        let mut pval = Vec::with_capacity(KNOTS);
        let mut qile = Vec::with_capacity(KNOTS);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(comment) = trimmed.strip_prefix('#') {
                if let Some(count) = comment.trim().strip_prefix("observations") {
                    nt = Some(count.trim().parse().map_err(|_| IqAgentError::Parse {
                        line: idx + 1,
                        content: line.clone(),
                    })?);
                }
                continue;
            }
            let mut fields = trimmed.split_whitespace().map(str::parse::<f64>);
            match (fields.next(), fields.next(), fields.next()) {
                (Some(Ok(p)), Some(Ok(q)), None) => {
                    pval.push(p);
                    qile.push(q);
                }
                _ => {
                    return Err(IqAgentError::Parse {
                        line: idx + 1,
                        content: line.clone(),
                    })
                }
            }
        }
        if pval.len() != KNOTS {
            return Err(IqAgentError::RowCount {
                expected: KNOTS,
                got: pval.len(),
            });
        }
        for row in 1..KNOTS {
            if pval[row] <= pval[row - 1] || qile[row] < qile[row - 1] {
                return Err(IqAgentError::NotMonotone { row });
            }
        }
        // A bare knot table carries no count; its knots still define a cdf.
        let (q0, qm) = match nt {
            Some(0) => (f64::INFINITY, f64::NEG_INFINITY),
            _ => (qile[0], qile[KNOTS - 1]),
        };
        Ok(Self {
            q0,
            qm,
            pval,
            qile,
            buffer: Vec::with_capacity(DEFAULT_BUFFER),
            capacity: DEFAULT_BUFFER,
            nt: nt.unwrap_or(0),
        })
    }

    fn interpolate_p(&self, j: usize, x: f64) -> f64 {
        let dq = self.qile[j + 1] - self.qile[j];
        if dq <= 0.0 {
            return self.pval[j];
        }
        self.pval[j] + (self.pval[j + 1] - self.pval[j]) * (x - self.qile[j]) / dq
    }

    fn frontier(&self, jq: usize, jd: usize, dbuf: &[f64]) -> Frontier {
        let old_left = jq < KNOTS;
        let new_left = jd < dbuf.len();
        match (old_left, new_left) {
            (true, false) => Frontier::Old,
            (true, true) if self.qile[jq] <= dbuf[jd] => Frontier::Old,
            (_, true) => Frontier::New,
            (false, false) => Frontier::Done,
        }
    }

    /// Fold the buffered values into the knots.
    fn update(&mut self) {
        let nd = self.buffer.len();
        if nd == 0 {
            return;
        }
        let mut dbuf = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        dbuf.sort_by(f64::total_cmp);

        let nq = KNOTS;
        let nt = self.nt as f64;
        let total = nt + nd as f64;
        let mut newqile = vec![0.0; nq];

        self.qile[0] = self.q0;
        newqile[0] = self.q0;
        self.qile[nq - 1] = self.qm;
        newqile[nq - 1] = self.qm;
        self.pval[0] = (0.5 / total).min(0.5 * self.pval[1]);
        self.pval[nq - 1] = (1.0 - 0.5 / total).max(0.5 * (1.0 + self.pval[nq - 2]));

        let (mut jd, mut jq) = (0usize, 1usize);
        let (mut told, mut tnew) = (0.0f64, 0.0f64);
        let (mut qold, mut qnew) = (self.q0, self.q0);

        for iq in 1..nq - 1 {
            let target = total * self.pval[iq];
            if tnew < target {
                loop {
                    match self.frontier(jq, jd, &dbuf) {
                        Frontier::Old => {
                            qnew = self.qile[jq];
                            tnew = jd as f64 + nt * self.pval[jq];
                            jq += 1;
                            if tnew >= target {
                                break;
                            }
                        }
                        Frontier::New => {
                            qnew = dbuf[jd];
                            tnew = told;
                            if jq < nq && self.qile[jq] > self.qile[jq - 1] {
                                tnew += nt * (self.pval[jq] - self.pval[jq - 1]) * (qnew - qold)
                                    / (self.qile[jq] - self.qile[jq - 1]);
                            }
                            jd += 1;
                            if tnew >= target {
                                break;
                            }
                            told = tnew;
                            tnew += 1.0;
                            qold = qnew;
                            if tnew >= target {
                                break;
                            }
                        }
                        Frontier::Done => break,
                    }
                    told = tnew;
                    qold = qnew;
                }
            }
            newqile[iq] = if tnew == told {
                0.5 * (qold + qnew)
            } else {
                qold + (qnew - qold) * (target - told) / (tnew - told)
            };
            told = tnew;
            qold = qnew;
        }

        // Interpolation cannot leave the observed range, but rounding can
        // nudge a knot past its neighbour.
        for iq in 1..nq {
            if newqile[iq] < newqile[iq - 1] {
                newqile[iq] = newqile[iq - 1];
            }
        }
        self.qile = newqile;
        self.nt += nd;
    }
}

fn initial_grid() -> Vec<f64> {
    let mut pval = vec![0.0; KNOTS];
    for (j, p) in pval.iter_mut().enumerate().take(166).skip(85) {
        *p = (j as f64 - 75.0) / 100.0;
    }
    for j in (0..=84).rev() {
        pval[j] = TAIL_RATIO * pval[j + 1];
        pval[KNOTS - 1 - j] = 1.0 - pval[j];
    }
    pval
}
