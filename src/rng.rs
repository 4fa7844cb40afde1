//! Seeded random numbers for tableau generation.
//!
//! Every draw in the crate flows through a [`NumericRng`]. Generators never
//! share one RNG across unrelated stages: each stage asks for its own named
//! [`RngStream`], derived from a single master seed, so that changing how many
//! draws one stage makes (more criteria, another law) leaves the other stages'
//! sequences untouched.
//!
//! The underlying engine is PCG (`Pcg64Mcg`), whose output sequence is fixed
//! for a given seed across releases of `rand_pcg`.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution, Normal};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Draws attempted before a truncated normal gives up and falls back to the
/// nearest bound.
pub const TRUNCATION_RETRY_BUDGET: usize = 1000;

const STREAM_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Error, PartialEq)]
pub enum RngError {
    #[error("probability mass function is empty")]
    EmptyPmf,
    #[error("negative or non-finite mass {mass} in probability mass function")]
    InvalidMass { mass: f64 },
    #[error("probability masses sum to {sum}, expected 1")]
    MassNotNormalized { sum: f64 },
    #[error("invalid normal parameters: mu={mu}, sigma={sigma}")]
    InvalidNormal { mu: f64, sigma: f64 },
    #[error("invalid beta parameters: alpha={alpha}, beta={beta}")]
    InvalidBeta { alpha: f64, beta: f64 },
    #[error("repartition {r} is outside [0, 1]")]
    InvalidRepartition { r: f64 },
    #[error("cannot open {clues} clue doors among {doors} doors")]
    InvalidGame { doors: usize, clues: usize },
}

/// Independent sub-streams a generator may draw from.
///
/// The discriminants are part of the seed contract and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RngStream {
    ActionNames = 0,
    ActionTypes = 1,
    Criteria = 2,
    Coalitions = 3,
    Weights = 4,
    Evaluations = 5,
    Thresholds = 6,
    Incremental = 7,
}

/// Seed-controlled random source with the laws used by the generators.
#[derive(Debug, Clone)]
pub struct NumericRng {
    inner: Pcg64Mcg,
    truncation_fallbacks: usize,
}

impl NumericRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
            truncation_fallbacks: 0,
        }
    }

    /// Seed from the platform entropy source.
    pub fn from_entropy() -> Self {
        Self::seeded(rand::random::<u64>())
    }

    /// Derive the RNG for `stream` from a master seed.
    pub fn stream(master_seed: u64, stream: RngStream) -> Self {
        Self::seeded(derive_seed(master_seed, stream))
    }

    /// Number of truncated-normal draws that exhausted the retry budget.
    pub fn truncation_fallbacks(&self) -> usize {
        self.truncation_fallbacks
    }

    /// Continuous uniform on `[a, b]`.
    pub fn uniform(&mut self, a: f64, b: f64) -> f64 {
        let u: f64 = self.inner.gen();
        a + (b - a) * u
    }

    /// Uniform integer in the inclusive range `[lo, hi]`.
    pub fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.inner.gen_range(lo..=hi)
    }

    /// Uniform index in `0..n`; `n` must be positive.
    pub fn index(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        self.inner.gen_range(0..n)
    }

    /// Bernoulli trial with success probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        let u: f64 = self.inner.gen();
        u < p
    }

    pub fn normal(&mut self, mu: f64, sigma: f64) -> Result<f64, RngError> {
        let law = Normal::new(mu, sigma).map_err(|_| RngError::InvalidNormal { mu, sigma })?;
        Ok(law.sample(&mut self.inner))
    }

    /// Normal draw rejected and resampled until it falls in `[lo, hi]`.
    ///
    /// After [`TRUNCATION_RETRY_BUDGET`] rejections the bound nearest to `mu`
    /// is returned and the event is counted.
    pub fn truncated_normal(
        &mut self,
        mu: f64,
        sigma: f64,
        lo: f64,
        hi: f64,
    ) -> Result<f64, RngError> {
        let law = Normal::new(mu, sigma).map_err(|_| RngError::InvalidNormal { mu, sigma })?;
        for _ in 0..TRUNCATION_RETRY_BUDGET {
            let x = law.sample(&mut self.inner);
            if (lo..=hi).contains(&x) {
                return Ok(x);
            }
        }
        self.truncation_fallbacks += 1;
        let fallback = if mu <= lo {
            lo
        } else if mu >= hi {
            hi
        } else if mu - lo <= hi - mu {
            lo
        } else {
            hi
        };
        warn!(mu, sigma, lo, hi, fallback, "truncated normal exhausted its retry budget");
        Ok(fallback)
    }

    /// Standard beta variate on (0, 1).
    pub fn beta(&mut self, alpha: f64, beta: f64) -> Result<f64, RngError> {
        let law = Beta::new(alpha, beta).map_err(|_| RngError::InvalidBeta { alpha, beta })?;
        Ok(law.sample(&mut self.inner))
    }

    /// Truncated generalized triangular variate on `[m, big_m]`.
    ///
    /// `r` is the cdf value at `mode`; the density peaks at `mode`.
    pub fn triangular(&mut self, m: f64, big_m: f64, mode: f64, r: f64) -> Result<f64, RngError> {
        if !(0.0..=1.0).contains(&r) {
            return Err(RngError::InvalidRepartition { r });
        }
        let u: f64 = self.inner.gen();
        let x = if u < r {
            m + (u / r).sqrt() * (mode - m)
        } else {
            big_m - ((1.0 - u) / (1.0 - r)).sqrt() * (big_m - mode)
        };
        Ok(x)
    }

    /// Inverse-cdf lookup in a finite probability mass function.
    pub fn categorical<'a, T>(&mut self, pmf: &'a Pmf<T>) -> &'a T {
        let u: f64 = self.inner.gen();
        let mut cumulated = 0.0;
        for (value, mass) in &pmf.entries {
            cumulated += mass;
            if u < cumulated {
                return value;
            }
        }
        // Rounding can leave the last cumulated mass a hair below 1.
        &pmf.entries[pmf.entries.len() - 1].0
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }
}

/// Seed of `stream` under `master_seed`.
pub fn derive_seed(master_seed: u64, stream: RngStream) -> u64 {
    master_seed ^ (stream as u64).wrapping_mul(STREAM_MIX)
}

/// Master seed for an optional user seed: `None` draws one from entropy.
pub fn master_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random::<u64>)
}

/// Validated finite probability mass function.
#[derive(Debug, Clone, PartialEq)]
pub struct Pmf<T> {
    entries: Vec<(T, f64)>,
}

impl<T> Pmf<T> {
    pub fn new(entries: Vec<(T, f64)>) -> Result<Self, RngError> {
        if entries.is_empty() {
            return Err(RngError::EmptyPmf);
        }
        let mut sum = 0.0;
        for (_, mass) in &entries {
            if !mass.is_finite() || *mass < 0.0 {
                return Err(RngError::InvalidMass { mass: *mass });
            }
            sum += mass;
        }
        if (sum - 1.0).abs() > 1e-9 {
            return Err(RngError::MassNotNormalized { sum });
        }
        Ok(Self { entries })
    }

    /// Equal mass on every value.
    pub fn uniform(values: Vec<T>) -> Result<Self, RngError> {
        let n = values.len();
        if n == 0 {
            return Err(RngError::EmptyPmf);
        }
        let mass = 1.0 / n as f64;
        Self::new(values.into_iter().map(|v| (v, mass)).collect())
    }

    /// Mass proportional to each value's multiplicity in `bag`.
    pub fn from_bag(bag: Vec<(T, usize)>) -> Result<Self, RngError> {
        let total: usize = bag.iter().map(|(_, count)| count).sum();
        if total == 0 {
            return Err(RngError::EmptyPmf);
        }
        Self::new(
            bag.into_iter()
                .map(|(v, count)| (v, count as f64 / total as f64))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[(T, f64)] {
        &self.entries
    }
}

/// Win rates of the generalized Monty-Hall game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MontyHallOutcome {
    pub trials: usize,
    pub switched_win_rate: f64,
    pub kept_win_rate: f64,
}

/// Simulate the Monty-Hall game with `doors` doors of which the host opens
/// `clues` empty ones before the candidate decides.
///
/// Switching picks uniformly among the doors that are still closed.
pub fn monty_hall(
    doors: usize,
    clues: usize,
    trials: usize,
    seed: Option<u64>,
) -> Result<MontyHallOutcome, RngError> {
    if doors < 3 || clues + 2 > doors {
        return Err(RngError::InvalidGame { doors, clues });
    }
    let mut rng = NumericRng::stream(master_seed(seed), RngStream::Incremental);
    let all_doors = Pmf::uniform((0..doors).collect::<Vec<_>>())?;

    let mut switched_wins = 0usize;
    let mut kept_wins = 0usize;
    for _ in 0..trials {
        let prize = *rng.categorical(&all_doors);
        let pick = *rng.categorical(&all_doors);

        let mut openable: Vec<usize> = (0..doors).filter(|d| *d != prize && *d != pick).collect();
        rng.shuffle(&mut openable);
        let opened = &openable[..clues];

        let closed: Vec<usize> = (0..doors)
            .filter(|d| *d != pick && !opened.contains(d))
            .collect();
        let switched = *rng.categorical(&Pmf::uniform(closed)?);

        if pick == prize {
            kept_wins += 1;
        }
        if switched == prize {
            switched_wins += 1;
        }
    }

    let n = trials.max(1) as f64;
    Ok(MontyHallOutcome {
        trials,
        switched_win_rate: switched_wins as f64 / n,
        kept_win_rate: kept_wins as f64 / n,
    })
}
