//! Random-number parameters: closed-form means for the deterministic pass and
//! seeded draws for Monte Carlo trials.

use crate::error::{Result, SimError};
use crate::param::types::Aspect;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Exp, Gamma, LogNormal, Normal, Poisson, Uniform, Weibull};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionFamily {
    Normal,
    Lognormal,
    Uniform,
    Bernoulli,
    Poisson,
    Exponential,
    Erlang,
    Weibull,
}

impl DistributionFamily {
    pub fn name(&self) -> &'static str {
        match self {
            DistributionFamily::Normal => "normal",
            DistributionFamily::Lognormal => "lognormal",
            DistributionFamily::Uniform => "uniform",
            DistributionFamily::Bernoulli => "bernoulli",
            DistributionFamily::Poisson => "poisson",
            DistributionFamily::Exponential => "exponential",
            DistributionFamily::Erlang => "erlang",
            DistributionFamily::Weibull => "weibull",
        }
    }
}

/// A number described by a distribution family and its named parameters
/// (`mean`/`stddev`, `scale`/`shape`, `a`/`b`, `p`, `rate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomParam {
    pub distr: DistributionFamily,
    #[serde(default)]
    pub distr_descr: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<Aspect>,
}

impl RandomParam {
    pub fn new(distr: DistributionFamily, descr: &[(&str, f64)]) -> Self {
        Self {
            distr,
            distr_descr: descr.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            unit: None,
            aspects: Vec::new(),
        }
    }

    fn arg(&self, name: &str) -> f64 {
        self.distr_descr.get(name).copied().unwrap_or(0.0)
    }

    /// Uniform bounds with the upper bound clamped to be at least the lower one.
    fn uniform_bounds(&self) -> (f64, f64) {
        let a = self.arg("a");
        let b = self.arg("b");
        (a, if b < a { a } else { b })
    }

    /// Closed-form expectation of the distribution.
    pub fn mean(&self) -> f64 {
        match self.distr {
            DistributionFamily::Normal => self.arg("mean"),
            DistributionFamily::Lognormal => {
                let (mu, sigma) = (self.arg("scale"), self.arg("shape"));
                (mu + sigma * sigma / 2.0).exp()
            }
            DistributionFamily::Uniform => {
                let (a, b) = self.uniform_bounds();
                (a + b) / 2.0
            }
            DistributionFamily::Bernoulli => self.arg("p"),
            DistributionFamily::Poisson => self.arg("rate"),
            DistributionFamily::Exponential => 1.0 / self.arg("rate"),
            DistributionFamily::Erlang => self.arg("shape") / self.arg("rate"),
            DistributionFamily::Weibull => {
                let (scale, shape) = (self.arg("scale"), self.arg("shape"));
                scale * gamma(1.0 + 1.0 / shape)
            }
        }
    }

    /// Draws one value from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let family = self.distr.name();
        let invalid = |e: &dyn std::fmt::Display| SimError::InvalidDistribution {
            family,
            detail: e.to_string(),
        };
        let value = match self.distr {
            DistributionFamily::Normal => Normal::new(self.arg("mean"), self.arg("stddev"))
                .map_err(|e| invalid(&e))?
                .sample(rng),
            DistributionFamily::Lognormal => LogNormal::new(self.arg("scale"), self.arg("shape"))
                .map_err(|e| invalid(&e))?
                .sample(rng),
            DistributionFamily::Uniform => {
                let (a, b) = self.uniform_bounds();
                if !a.is_finite() || !b.is_finite() {
                    return Err(invalid(&"bounds must be finite"));
                }
                Uniform::new_inclusive(a, b).sample(rng)
            }
            DistributionFamily::Bernoulli => {
                let hit = Bernoulli::new(self.arg("p")).map_err(|e| invalid(&e))?.sample(rng);
                if hit { 1.0 } else { 0.0 }
            }
            DistributionFamily::Poisson => Poisson::new(self.arg("rate"))
                .map_err(|e| invalid(&e))?
                .sample(rng),
            DistributionFamily::Exponential => Exp::new(self.arg("rate"))
                .map_err(|e| invalid(&e))?
                .sample(rng),
            DistributionFamily::Erlang => {
                let rate = self.arg("rate");
                if rate <= 0.0 {
                    return Err(invalid(&"rate must be positive"));
                }
                Gamma::new(self.arg("shape"), 1.0 / rate).map_err(|e| invalid(&e))?.sample(rng)
            }
            DistributionFamily::Weibull => Weibull::new(self.arg("scale"), self.arg("shape"))
                .map_err(|e| invalid(&e))?
                .sample(rng),
        };
        Ok(value)
    }
}

/// Lanczos approximation of the gamma function (g = 7, n = 9).
fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * gamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut acc = COEF[0];
        for (i, c) in COEF.iter().enumerate().skip(1) {
            acc += c / (x + i as f64);
        }
        let t = x + G + 0.5;
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;

    #[rstest]
    #[case(DistributionFamily::Normal, &[("mean", 5.0), ("stddev", 2.0)], 5.0)]
    #[case(DistributionFamily::Uniform, &[("a", 2.0), ("b", 4.0)], 3.0)]
    #[case(DistributionFamily::Uniform, &[("a", 4.0), ("b", 1.0)], 4.0)]
    #[case(DistributionFamily::Bernoulli, &[("p", 0.25)], 0.25)]
    #[case(DistributionFamily::Poisson, &[("rate", 7.0)], 7.0)]
    #[case(DistributionFamily::Exponential, &[("rate", 4.0)], 0.25)]
    #[case(DistributionFamily::Erlang, &[("shape", 3.0), ("rate", 2.0)], 1.5)]
    #[case(DistributionFamily::Weibull, &[("scale", 2.0), ("shape", 1.0)], 2.0)]
    fn test_closed_form_means(
        #[case] family: DistributionFamily,
        #[case] descr: &[(&str, f64)],
        #[case] expected: f64,
    ) {
        assert_relative_eq!(RandomParam::new(family, descr).mean(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_lognormal_mean() {
        let p = RandomParam::new(DistributionFamily::Lognormal, &[("scale", 0.0), ("shape", 1.0)]);
        assert_relative_eq!(p.mean(), 0.5f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_gamma_matches_factorial() {
        assert_relative_eq!(gamma(5.0), 24.0, epsilon = 1e-9);
        assert_relative_eq!(gamma(0.5), std::f64::consts::PI.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_sampling_is_reproducible_for_a_seed() {
        let p = RandomParam::new(DistributionFamily::Normal, &[("mean", 10.0), ("stddev", 3.0)]);
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(p.sample(&mut a).unwrap(), p.sample(&mut b).unwrap());
        }
    }

    #[test]
    fn test_bernoulli_samples_are_binary() {
        let p = RandomParam::new(DistributionFamily::Bernoulli, &[("p", 0.5)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let draws: Vec<f64> = (0..200).map(|_| p.sample(&mut rng).unwrap()).collect();
        assert!(draws.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert!(draws.iter().any(|v| *v == 1.0));
        assert!(draws.iter().any(|v| *v == 0.0));
    }

    #[test]
    fn test_weibull_samples_are_random() {
        let p = RandomParam::new(DistributionFamily::Weibull, &[("scale", 2.0), ("shape", 1.5)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let first = p.sample(&mut rng).unwrap();
        let differs = (0..20).any(|_| p.sample(&mut rng).unwrap() != first);
        assert!(differs);
    }

    #[test]
    fn test_invalid_parameters_are_errors() {
        let p = RandomParam::new(DistributionFamily::Bernoulli, &[("p", 1.5)]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(p.sample(&mut rng), Err(SimError::InvalidDistribution { .. })));
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"distr":"NORMAL","distrDescr":{"mean":3,"stddev":1},"unit":"tps"}"#;
        let p: RandomParam = serde_json::from_str(json).unwrap();
        assert_eq!(p.distr, DistributionFamily::Normal);
        assert_eq!(p.mean(), 3.0);
    }
}
