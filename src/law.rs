//! Sampling laws for criterion evaluations.
//!
//! [`LawSpec`] is what a caller asks for ("triangular around 12"), with any
//! parameter left open. [`LawSpec::resolve`] binds it to a concrete scale and
//! fills the defaults, giving a [`Law`] that can be sampled and that is
//! recorded on each generated action.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rng::{NumericRng, RngError};

#[derive(Debug, Error, PartialEq)]
pub enum LawError {
    #[error("unknown law {0:?} (expected uniform, normal, triangular or beta)")]
    UnknownLaw(String),
    #[error("mode {mode} lies outside the scale [{min}, {max}]")]
    ModeOutsideScale { mode: f64, min: f64, max: f64 },
    #[error("repartition {0} is outside [0, 1]")]
    InvalidRepartition(f64),
    #[error("invalid {law} parameter {name}={value}")]
    InvalidParameter {
        law: &'static str,
        name: &'static str,
        value: f64,
    },
    #[error("degenerate scale [{min}, {max}]")]
    DegenerateScale { min: f64, max: f64 },
}

/// A requested law; open parameters are filled from the scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum LawSpec {
    Uniform,
    Normal {
        #[serde(default)]
        mu: Option<f64>,
        #[serde(default)]
        sigma: Option<f64>,
    },
    Triangular {
        #[serde(default)]
        mode: Option<f64>,
        #[serde(default)]
        repartition: Option<f64>,
    },
    Beta {
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        beta: Option<f64>,
        /// Mode in scale units, used when `alpha`/`beta` are omitted.
        #[serde(default)]
        mode: Option<f64>,
    },
}

impl Default for LawSpec {
    fn default() -> Self {
        LawSpec::Uniform
    }
}

impl LawSpec {
    pub fn triangular() -> Self {
        LawSpec::Triangular {
            mode: None,
            repartition: None,
        }
    }

    pub fn beta(alpha: f64, beta: f64) -> Self {
        LawSpec::Beta {
            alpha: Some(alpha),
            beta: Some(beta),
            mode: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LawSpec::Uniform => "uniform",
            LawSpec::Normal { .. } => "normal",
            LawSpec::Triangular { .. } => "triangular",
            LawSpec::Beta { .. } => "beta",
        }
    }

    /// The explicit mode, when the law carries one.
    pub fn mode(&self) -> Option<f64> {
        match self {
            LawSpec::Triangular { mode, .. } | LawSpec::Beta { mode, .. } => *mode,
            LawSpec::Normal { mu, .. } => *mu,
            LawSpec::Uniform => None,
        }
    }

    /// Bind the law to `[min, max]`, filling every open parameter.
    ///
    /// Defaults: normal `mu` = midpoint and `sigma` = span / 4; triangular mode
    /// = midpoint and repartition 0.5; beta parameters derived from the mode
    /// (midpoint by default).
    pub fn resolve(&self, min: f64, max: f64) -> Result<Law, LawError> {
        check_scale(min, max)?;
        let mid = 0.5 * (min + max);
        let span = max - min;
        match *self {
            LawSpec::Uniform => Ok(Law::Uniform { min, max }),
            LawSpec::Normal { mu, sigma } => {
                let mu = mu.unwrap_or(mid);
                let sigma = sigma.unwrap_or(0.25 * span);
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(LawError::InvalidParameter {
                        law: "normal",
                        name: "sigma",
                        value: sigma,
                    });
                }
                Ok(Law::Normal {
                    min,
                    max,
                    mu,
                    sigma,
                })
            }
            LawSpec::Triangular { mode, repartition } => {
                let mode = mode.unwrap_or(mid);
                check_mode(mode, min, max)?;
                let repartition = repartition.unwrap_or(0.5);
                if !(0.0..=1.0).contains(&repartition) {
                    return Err(LawError::InvalidRepartition(repartition));
                }
                Ok(Law::Triangular {
                    min,
                    max,
                    mode,
                    repartition,
                })
            }
            LawSpec::Beta { alpha, beta, mode } => {
                let (alpha, beta) = match (alpha, beta) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        let mode = mode.unwrap_or(mid);
                        check_mode(mode, min, max)?;
                        beta_from_mode((mode - min) / span)?
                    }
                };
                for (name, value) in [("alpha", alpha), ("beta", beta)] {
                    if !(value.is_finite() && value > 0.0) {
                        return Err(LawError::InvalidParameter {
                            law: "beta",
                            name,
                            value,
                        });
                    }
                }
                Ok(Law::Beta {
                    min,
                    max,
                    alpha,
                    beta,
                })
            }
        }
    }
}

impl FromStr for LawSpec {
    type Err = LawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(LawSpec::Uniform),
            "normal" => Ok(LawSpec::Normal {
                mu: None,
                sigma: None,
            }),
            "triangular" => Ok(LawSpec::triangular()),
            "beta" => Ok(LawSpec::Beta {
                alpha: None,
                beta: None,
                mode: None,
            }),
            other => Err(LawError::UnknownLaw(other.to_string())),
        }
    }
}

impl fmt::Display for LawSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A law bound to its support, as recorded on generated actions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum Law {
    Uniform {
        min: f64,
        max: f64,
    },
    /// Normal law truncated to `[min, max]` by rejection.
    Normal {
        min: f64,
        max: f64,
        mu: f64,
        sigma: f64,
    },
    Triangular {
        min: f64,
        max: f64,
        mode: f64,
        repartition: f64,
    },
    /// Standard beta rescaled to `[min, max]`.
    Beta {
        min: f64,
        max: f64,
        alpha: f64,
        beta: f64,
    },
}

impl Law {
    pub fn name(&self) -> &'static str {
        match self {
            Law::Uniform { .. } => "uniform",
            Law::Normal { .. } => "normal",
            Law::Triangular { .. } => "triangular",
            Law::Beta { .. } => "beta",
        }
    }

    pub fn support(&self) -> (f64, f64) {
        match *self {
            Law::Uniform { min, max }
            | Law::Normal { min, max, .. }
            | Law::Triangular { min, max, .. }
            | Law::Beta { min, max, .. } => (min, max),
        }
    }

    pub fn sample(&self, rng: &mut NumericRng) -> Result<f64, RngError> {
        match *self {
            Law::Uniform { min, max } => Ok(rng.uniform(min, max)),
            Law::Normal { min, max, mu, sigma } => rng.truncated_normal(mu, sigma, min, max),
            Law::Triangular {
                min,
                max,
                mode,
                repartition,
            } => rng.triangular(min, max, mode, repartition),
            Law::Beta {
                min,
                max,
                alpha,
                beta,
            } => Ok(min + rng.beta(alpha, beta)? * (max - min)),
        }
    }
}

/// Beta parameters whose mode is `xm` on (0, 1).
///
/// `(2, 1/xm)` for `xm <= 0.5`, `(1/(1-xm), 2)` above.
pub fn beta_from_mode(xm: f64) -> Result<(f64, f64), LawError> {
    if !(xm > 0.0 && xm < 1.0) {
        return Err(LawError::ModeOutsideScale {
            mode: xm,
            min: 0.0,
            max: 1.0,
        });
    }
    if xm <= 0.5 {
        Ok((2.0, 1.0 / xm))
    } else {
        Ok((1.0 / (1.0 - xm), 2.0))
    }
}

fn check_scale(min: f64, max: f64) -> Result<(), LawError> {
    if min.is_finite() && max.is_finite() && min < max {
        Ok(())
    } else {
        Err(LawError::DegenerateScale { min, max })
    }
}

fn check_mode(mode: f64, min: f64, max: f64) -> Result<(), LawError> {
    if (min..=max).contains(&mode) {
        Ok(())
    } else {
        Err(LawError::ModeOutsideScale { mode, min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_and_unknown_names() {
        assert_eq!("Uniform".parse::<LawSpec>().unwrap(), LawSpec::Uniform);
        assert_eq!("triangular".parse::<LawSpec>().unwrap(), LawSpec::triangular());
        assert_eq!(
            "cauchy".parse::<LawSpec>(),
            Err(LawError::UnknownLaw("cauchy".to_string()))
        );
    }

    #[test]
    fn resolve_fills_defaults() {
        let law = LawSpec::triangular().resolve(0.0, 100.0).unwrap();
        assert_eq!(
            law,
            Law::Triangular {
                min: 0.0,
                max: 100.0,
                mode: 50.0,
                repartition: 0.5
            }
        );
        let normal = "normal".parse::<LawSpec>().unwrap().resolve(0.0, 100.0).unwrap();
        assert_eq!(
            normal,
            Law::Normal {
                min: 0.0,
                max: 100.0,
                mu: 50.0,
                sigma: 25.0
            }
        );
    }

    #[test]
    fn beta_parameters_from_mode() {
        assert_eq!(beta_from_mode(0.5).unwrap(), (2.0, 2.0));
        assert_eq!(beta_from_mode(0.25).unwrap(), (2.0, 4.0));
        let (a, b) = beta_from_mode(0.75).unwrap();
        assert!((a - 4.0).abs() < 1e-12 && b == 2.0);
        // mode of Beta(a, b) is (a - 1) / (a + b - 2)
        for xm in [0.1, 0.3, 0.6, 0.9] {
            let (a, b) = beta_from_mode(xm).unwrap();
            assert!(((a - 1.0) / (a + b - 2.0) - xm).abs() < 1e-12);
        }
        assert!(beta_from_mode(0.0).is_err());
    }

    #[test]
    fn resolve_rejects_bad_parameters() {
        let mode_out = LawSpec::Triangular {
            mode: Some(120.0),
            repartition: None,
        };
        assert!(matches!(
            mode_out.resolve(0.0, 100.0),
            Err(LawError::ModeOutsideScale { .. })
        ));
        let bad_r = LawSpec::Triangular {
            mode: None,
            repartition: Some(1.2),
        };
        assert_eq!(
            bad_r.resolve(0.0, 1.0),
            Err(LawError::InvalidRepartition(1.2))
        );
        assert!(matches!(
            LawSpec::Uniform.resolve(5.0, 5.0),
            Err(LawError::DegenerateScale { .. })
        ));
    }

    #[test]
    fn samples_stay_in_support() {
        let mut rng = NumericRng::seeded(17);
        for spec in [
            LawSpec::Uniform,
            "normal".parse().unwrap(),
            LawSpec::triangular(),
            LawSpec::beta(2.0, 2.0),
        ] {
            let law = spec.resolve(10.0, 20.0).unwrap();
            for _ in 0..500 {
                let x = law.sample(&mut rng).unwrap();
                assert!((10.0..=20.0).contains(&x), "{} drew {x}", law.name());
            }
        }
    }

    #[test]
    fn law_spec_json_shape() {
        let spec: LawSpec =
            serde_json::from_str(r#"{"law":"triangular","mode":30.0}"#).unwrap();
        assert_eq!(
            spec,
            LawSpec::Triangular {
                mode: Some(30.0),
                repartition: None
            }
        );
    }
}
