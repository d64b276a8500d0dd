//! Scalar random variables and their arithmetic.
//!
//! An [`UncertainValue`] is a compact tagged representation of a scalar
//! random variable. Point values stay symbolic (`Fixed`), analytic
//! distributions keep their parameters (`Uniform`, `Normal`), and anything
//! produced by combining random operands collapses into a flat `Empirical`
//! sample buffer of the configured size. `Mapped` values defer sampling to a
//! closure and are materialised by the next binary operation that consumes
//! them, so representation depth stays bounded.
//!
//! All sampling goes through a [`SampleConfig`], which owns the seeded RNG
//! and the per-operation sample budget. There is no global RNG state; two
//! runs with the same seed and budget draw identical sample sequences.

use std::fmt;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::UncertainError;

/// RNG and sampling-budget context threaded through every stochastic
/// operation.
#[derive(Debug)]
pub struct SampleConfig {
    rng: SmallRng,
    samples: usize,
}

impl SampleConfig {
    pub fn new(seed: u64, samples: usize) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            samples,
        }
    }

    /// Number of samples drawn per stochastic operand.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// A uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.random()
    }

    /// A standard normal draw.
    pub fn standard_normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    /// A uniform index in `[0, len)`.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }
}

/// A lazy sampling closure backing [`UncertainValue::Mapped`].
#[derive(Clone)]
pub struct MappedFn(Arc<dyn Fn(&mut SampleConfig) -> f64 + Send + Sync>);

impl MappedFn {
    pub fn new(f: impl Fn(&mut SampleConfig) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, cfg: &mut SampleConfig) -> f64 {
        (self.0)(cfg)
    }
}

impl fmt::Debug for MappedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MappedFn")
    }
}

/// A scalar random variable.
#[derive(Debug, Clone)]
pub enum UncertainValue {
    /// A deterministic number.
    Fixed { value: f64 },
    /// Uniform on `[min, max)`; requires `min < max`.
    Uniform { min: f64, max: f64 },
    /// Gaussian; requires `stddev > 0`.
    Normal { mean: f64, stddev: f64 },
    /// A bag of equally likely observed samples; must be non-empty.
    Empirical { samples: Vec<f64> },
    /// A custom sampling function; cannot be encoded or averaged.
    Mapped(MappedFn),
}

impl PartialEq for UncertainValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UncertainValue::Fixed { value: a }, UncertainValue::Fixed { value: b }) => a == b,
            (
                UncertainValue::Uniform { min: a1, max: a2 },
                UncertainValue::Uniform { min: b1, max: b2 },
            ) => a1 == b1 && a2 == b2,
            (
                UncertainValue::Normal {
                    mean: a1,
                    stddev: a2,
                },
                UncertainValue::Normal {
                    mean: b1,
                    stddev: b2,
                },
            ) => a1 == b1 && a2 == b2,
            (
                UncertainValue::Empirical { samples: a },
                UncertainValue::Empirical { samples: b },
            ) => a == b,
            // Mapped values compare by identity of nothing: never equal.
            _ => false,
        }
    }
}

/// Quantile query handle for a value, precomputed once per emission.
pub enum Quantiles {
    Point(f64),
    Uniform { min: f64, max: f64 },
    Sorted(Vec<f64>),
}

impl Quantiles {
    /// The p-th quantile for `p` in `[0, 1]`, with linear interpolation
    /// between empirical samples.
    pub fn at(&self, p: f64) -> f64 {
        match self {
            Quantiles::Point(v) => *v,
            Quantiles::Uniform { min, max } => min + p * (max - min),
            Quantiles::Sorted(sorted) => {
                let n = sorted.len();
                if n == 1 {
                    return sorted[0];
                }
                let pos = p * (n - 1) as f64;
                let lower = pos.floor() as usize;
                let upper = pos.ceil() as usize;
                if lower == upper {
                    return sorted[lower];
                }
                let weight = pos - lower as f64;
                sorted[lower] * (1.0 - weight) + sorted[upper] * weight
            }
        }
    }
}

impl UncertainValue {
    pub fn fixed(value: f64) -> Self {
        UncertainValue::Fixed { value }
    }

    pub fn uniform(min: f64, max: f64) -> Self {
        UncertainValue::Uniform { min, max }
    }

    pub fn normal(mean: f64, stddev: f64) -> Self {
        UncertainValue::Normal { mean, stddev }
    }

    pub fn empirical(samples: Vec<f64>) -> Self {
        UncertainValue::Empirical { samples }
    }

    pub fn mapped(f: impl Fn(&mut SampleConfig) -> f64 + Send + Sync + 'static) -> Self {
        UncertainValue::Mapped(MappedFn::new(f))
    }

    fn variant_name(&self) -> &'static str {
        match self {
            UncertainValue::Fixed { .. } => "fixed",
            UncertainValue::Uniform { .. } => "uniform",
            UncertainValue::Normal { .. } => "normal",
            UncertainValue::Empirical { .. } => "empirical",
            UncertainValue::Mapped(_) => "mapped",
        }
    }

    /// Whether the variant satisfies its parameter constraints.
    pub fn is_valid(&self) -> bool {
        match self {
            UncertainValue::Fixed { .. } => true,
            UncertainValue::Uniform { min, max } => min < max,
            UncertainValue::Normal { stddev, .. } => *stddev > 0.0,
            UncertainValue::Empirical { samples } => !samples.is_empty(),
            UncertainValue::Mapped(_) => true,
        }
    }

    /// A fixed zero, the additive identity.
    pub fn is_zero(&self) -> bool {
        matches!(self, UncertainValue::Fixed { value } if *value == 0.0)
    }

    fn as_fixed(&self) -> Option<f64> {
        match self {
            UncertainValue::Fixed { value } => Some(*value),
            _ => None,
        }
    }

    /// The expected value. Fails for `Mapped`, which has no closed form
    /// without consuming RNG draws.
    pub fn mean(&self) -> Result<f64, UncertainError> {
        match self {
            UncertainValue::Fixed { value } => Ok(*value),
            UncertainValue::Uniform { min, max } => Ok((min + max) / 2.0),
            UncertainValue::Normal { mean, .. } => Ok(*mean),
            UncertainValue::Empirical { samples } => {
                if samples.is_empty() {
                    return Ok(0.0);
                }
                Ok(samples.iter().sum::<f64>() / samples.len() as f64)
            }
            UncertainValue::Mapped(_) => Err(UncertainError::MeanUndefined("mapped")),
        }
    }

    /// Quantile handle. Supported for `Fixed`, `Uniform` (linear) and
    /// `Empirical` (sorted copy, linear interpolation at `p * (n - 1)`).
    pub fn quantiles(&self) -> Result<Quantiles, UncertainError> {
        match self {
            UncertainValue::Fixed { value } => Ok(Quantiles::Point(*value)),
            UncertainValue::Uniform { min, max } => Ok(Quantiles::Uniform {
                min: *min,
                max: *max,
            }),
            UncertainValue::Empirical { samples } => {
                if samples.is_empty() {
                    return Err(UncertainError::QuantilesUndefined("empirical"));
                }
                let mut sorted = samples.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                Ok(Quantiles::Sorted(sorted))
            }
            other => Err(UncertainError::QuantilesUndefined(other.variant_name())),
        }
    }

    /// Draw a single sample.
    pub fn sample(&self, cfg: &mut SampleConfig) -> f64 {
        match self {
            UncertainValue::Fixed { value } => *value,
            UncertainValue::Uniform { min, max } => min + cfg.uniform() * (max - min),
            UncertainValue::Normal { mean, stddev } => cfg.standard_normal() * stddev + mean,
            UncertainValue::Empirical { samples } => {
                if samples.is_empty() {
                    return 0.0;
                }
                samples[cfg.index(samples.len())]
            }
            UncertainValue::Mapped(f) => f.call(cfg),
        }
    }

    /// Collapse a `Mapped` value into a flat empirical buffer of the
    /// configured size. All other variants pass through unchanged.
    pub fn materialize(&self, cfg: &mut SampleConfig) -> UncertainValue {
        match self {
            UncertainValue::Mapped(_) => {
                let samples = (0..cfg.samples()).map(|_| self.sample(cfg)).collect();
                UncertainValue::empirical(samples)
            }
            other => other.clone(),
        }
    }

    fn sample_with_fixed(
        &self,
        cfg: &mut SampleConfig,
        fixed: f64,
        op: impl Fn(f64, f64) -> f64,
    ) -> UncertainValue {
        let samples = (0..cfg.samples())
            .map(|_| op(self.sample(cfg), fixed))
            .collect();
        UncertainValue::empirical(samples)
    }

    fn operate(
        &self,
        cfg: &mut SampleConfig,
        other: &UncertainValue,
        op: impl Fn(f64, f64) -> f64,
    ) -> UncertainValue {
        match (self.as_fixed(), other.as_fixed()) {
            (Some(a), Some(b)) => UncertainValue::fixed(op(a, b)),
            (Some(a), None) => other.sample_with_fixed(cfg, a, |b, a| op(a, b)),
            (None, Some(b)) => self.sample_with_fixed(cfg, b, op),
            (None, None) => {
                let samples = (0..cfg.samples())
                    .map(|_| op(self.sample(cfg), other.sample(cfg)))
                    .collect();
                UncertainValue::empirical(samples)
            }
        }
    }

    /// Apply `op` against a bare scalar without wrapping it.
    pub fn apply_fixed(
        &self,
        cfg: &mut SampleConfig,
        fixed: f64,
        op: impl Fn(f64, f64) -> f64,
    ) -> UncertainValue {
        match self.as_fixed() {
            Some(a) => UncertainValue::fixed(op(a, fixed)),
            None => self.sample_with_fixed(cfg, fixed, op),
        }
    }

    pub fn add(&self, cfg: &mut SampleConfig, other: &UncertainValue) -> UncertainValue {
        self.operate(cfg, other, |a, b| a + b)
    }

    pub fn sub(&self, cfg: &mut SampleConfig, other: &UncertainValue) -> UncertainValue {
        self.operate(cfg, other, |a, b| a - b)
    }

    pub fn mul(&self, cfg: &mut SampleConfig, other: &UncertainValue) -> UncertainValue {
        self.operate(cfg, other, |a, b| a * b)
    }

    /// Exponentiation. A negative base with a non-integer exponent yields 0
    /// rather than failing; the complex branch has no meaning for balances.
    pub fn pow(&self, cfg: &mut SampleConfig, other: &UncertainValue) -> UncertainValue {
        self.operate(cfg, other, |a, b| {
            if a < 0.0 && b.fract() != 0.0 {
                return 0.0;
            }
            a.powf(b)
        })
    }

    /// `exp(self)` as a lazy value; sampling draws from `self` each time.
    pub fn exp(&self) -> UncertainValue {
        let inner = self.clone();
        UncertainValue::mapped(move |cfg| inner.sample(cfg).exp())
    }

    /// Textual encoding `name(a[,b])` with shortest-round-trip float
    /// formatting. Only `Fixed`, `Uniform` and `Normal` are encodable.
    pub fn encode(&self) -> Result<String, UncertainError> {
        match self {
            UncertainValue::Fixed { value } => Ok(format!("fixed({value})")),
            UncertainValue::Uniform { min, max } => Ok(format!("uniform({min},{max})")),
            UncertainValue::Normal { mean, stddev } => Ok(format!("normal({mean},{stddev})")),
            other => Err(UncertainError::Unencodable(other.variant_name())),
        }
    }

    /// Parse the textual encoding produced by [`encode`](Self::encode).
    pub fn decode(encoded: &str) -> Result<UncertainValue, UncertainError> {
        let open = encoded
            .find('(')
            .ok_or_else(|| UncertainError::Malformed(encoded.to_string()))?;
        let name = &encoded[..open];
        let body = encoded[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| UncertainError::Malformed(encoded.to_string()))?;
        match name {
            "fixed" => {
                let value = parse_number(body)?;
                Ok(UncertainValue::fixed(value))
            }
            "uniform" => {
                let (min, max) = parse_pair(encoded, body)?;
                let v = UncertainValue::uniform(min, max);
                if !v.is_valid() {
                    return Err(UncertainError::InvalidParameters {
                        name: "uniform",
                        a: min,
                        b: max,
                    });
                }
                Ok(v)
            }
            "normal" => {
                let (mean, stddev) = parse_pair(encoded, body)?;
                let v = UncertainValue::normal(mean, stddev);
                if !v.is_valid() {
                    return Err(UncertainError::InvalidParameters {
                        name: "normal",
                        a: mean,
                        b: stddev,
                    });
                }
                Ok(v)
            }
            other => Err(UncertainError::UnknownDistribution(other.to_string())),
        }
    }
}

fn parse_number(field: &str) -> Result<f64, UncertainError> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Err(UncertainError::Malformed(field.to_string()));
    }
    trimmed.parse().map_err(|source| UncertainError::ParseNumber {
        input: trimmed.to_string(),
        source,
    })
}

fn parse_pair(encoded: &str, body: &str) -> Result<(f64, f64), UncertainError> {
    let (a, b) = body
        .split_once(',')
        .ok_or_else(|| UncertainError::Malformed(encoded.to_string()))?;
    if b.contains(',') {
        return Err(UncertainError::Malformed(encoded.to_string()));
    }
    Ok((parse_number(a)?, parse_number(b)?))
}

impl fmt::Display for UncertainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UncertainValue::Fixed { value } => write!(f, "Fixed({value:.6})"),
            UncertainValue::Uniform { min, max } => write!(f, "Uniform({min:.6}, {max:.6})"),
            UncertainValue::Normal { mean, stddev } => write!(f, "Normal({mean:.6}, {stddev:.6})"),
            UncertainValue::Empirical { samples } => {
                let mean = self.mean().unwrap_or(0.0);
                match self.quantiles() {
                    Ok(q) => {
                        let spread = q.at(0.95) - q.at(0.05);
                        write!(f, "Empirical({mean:.6} [{spread:.6}], {} samples)", samples.len())
                    }
                    Err(_) => write!(f, "Empirical(empty)"),
                }
            }
            UncertainValue::Mapped(_) => f.write_str("Mapped(defined by custom sampling function)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(samples: usize) -> SampleConfig {
        SampleConfig::new(42, samples)
    }

    #[test]
    fn test_decode_fixed() {
        let cases = [
            ("fixed(1)", UncertainValue::fixed(1.0)),
            ("fixed(1.5)", UncertainValue::fixed(1.5)),
            ("fixed(-1.5)", UncertainValue::fixed(-1.5)),
        ];
        for (encoded, want) in cases {
            let got = UncertainValue::decode(encoded).unwrap();
            assert_eq!(got, want, "decoding {encoded}");
        }
    }

    #[test]
    fn test_decode_uniform_and_normal() {
        assert_eq!(
            UncertainValue::decode("uniform(1,2)").unwrap(),
            UncertainValue::uniform(1.0, 2.0)
        );
        assert_eq!(
            UncertainValue::decode("normal(0.04, 0.02)").unwrap(),
            UncertainValue::normal(0.04, 0.02)
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for encoded in [
            "fixed",
            "fixed(",
            "fixed()",
            "fixed(1",
            "uniform(1)",
            "uniform(1,2,3)",
            "normal(1,)",
            "gamma(1,2)",
            "",
        ] {
            assert!(
                UncertainValue::decode(encoded).is_err(),
                "expected decode failure for {encoded:?}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_invalid_parameters() {
        assert!(UncertainValue::decode("uniform(2,1)").is_err());
        assert!(UncertainValue::decode("normal(0,0)").is_err());
        assert!(UncertainValue::decode("normal(0,-1)").is_err());
    }

    #[test]
    fn test_encode_round_trip() {
        let values = [
            UncertainValue::fixed(0.0),
            UncertainValue::fixed(12345.6789),
            UncertainValue::fixed(-0.001),
            UncertainValue::uniform(-1.5, 2.25),
            UncertainValue::normal(0.04, 0.02),
        ];
        for v in values {
            let encoded = v.encode().unwrap();
            let decoded = UncertainValue::decode(&encoded).unwrap();
            assert_eq!(decoded, v, "round trip through {encoded}");
        }
    }

    #[test]
    fn test_encode_refuses_empirical_and_mapped() {
        assert!(UncertainValue::empirical(vec![1.0, 2.0]).encode().is_err());
        assert!(UncertainValue::mapped(|_| 1.0).encode().is_err());
    }

    #[test]
    fn test_mean() {
        assert_eq!(UncertainValue::fixed(3.0).mean().unwrap(), 3.0);
        assert_eq!(UncertainValue::uniform(1.0, 3.0).mean().unwrap(), 2.0);
        assert_eq!(UncertainValue::normal(0.5, 1.0).mean().unwrap(), 0.5);
        assert_eq!(
            UncertainValue::empirical(vec![1.0, 2.0, 3.0]).mean().unwrap(),
            2.0
        );
        assert!(UncertainValue::mapped(|_| 1.0).mean().is_err());
    }

    #[test]
    fn test_quantiles_uniform_linear() {
        let q = UncertainValue::uniform(0.0, 10.0).quantiles().unwrap();
        assert_eq!(q.at(0.0), 0.0);
        assert_eq!(q.at(0.5), 5.0);
        assert_eq!(q.at(1.0), 10.0);
    }

    #[test]
    fn test_quantiles_empirical_interpolation() {
        let q = UncertainValue::empirical(vec![3.0, 1.0, 2.0, 4.0])
            .quantiles()
            .unwrap();
        assert_eq!(q.at(0.0), 1.0);
        assert_eq!(q.at(1.0), 4.0);
        // pos = 0.5 * 3 = 1.5 -> halfway between 2 and 3
        assert!((q.at(0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_quantiles_unsupported() {
        assert!(UncertainValue::normal(0.0, 1.0).quantiles().is_err());
        assert!(UncertainValue::mapped(|_| 1.0).quantiles().is_err());
    }

    #[test]
    fn test_operate_both_fixed() {
        let mut cfg = cfg(100);
        let a = UncertainValue::fixed(2.0);
        let b = UncertainValue::fixed(3.0);
        assert_eq!(a.add(&mut cfg, &b), UncertainValue::fixed(5.0));
        assert_eq!(a.sub(&mut cfg, &b), UncertainValue::fixed(-1.0));
        assert_eq!(a.mul(&mut cfg, &b), UncertainValue::fixed(6.0));
        assert_eq!(a.pow(&mut cfg, &b), UncertainValue::fixed(8.0));
    }

    #[test]
    fn test_operate_mixed_produces_empirical_of_budget_size() {
        let mut cfg = cfg(64);
        let a = UncertainValue::fixed(1.0);
        let b = UncertainValue::uniform(0.0, 1.0);
        for v in [a.add(&mut cfg, &b), b.add(&mut cfg, &a), b.mul(&mut cfg, &b)] {
            match v {
                UncertainValue::Empirical { samples } => assert_eq!(samples.len(), 64),
                other => panic!("expected empirical, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_mixed_operand_order_is_preserved() {
        // fixed - uniform must subtract the sample from the scalar, not the
        // other way around.
        let mut cfg = cfg(200);
        let ten = UncertainValue::fixed(10.0);
        let u = UncertainValue::uniform(0.0, 1.0);
        let diff = ten.sub(&mut cfg, &u);
        let mean = diff.mean().unwrap();
        assert!((mean - 9.5).abs() < 0.1, "mean {mean} should be near 9.5");
    }

    #[test]
    fn test_pow_negative_base_non_integer_exponent() {
        let mut cfg = cfg(10);
        let base = UncertainValue::fixed(-2.0);
        let exponent = UncertainValue::fixed(0.5);
        assert_eq!(base.pow(&mut cfg, &exponent), UncertainValue::fixed(0.0));
        // Integer exponents still work.
        assert_eq!(
            base.pow(&mut cfg, &UncertainValue::fixed(2.0)),
            UncertainValue::fixed(4.0)
        );
    }

    #[test]
    fn test_exp_is_lazy_and_samples_inner() {
        let mut cfg = cfg(500);
        let v = UncertainValue::fixed(1.0).exp();
        assert!(matches!(v, UncertainValue::Mapped(_)));
        let s = v.sample(&mut cfg);
        assert!((s - std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn test_apply_fixed() {
        let mut cfg = cfg(32);
        let fixed = UncertainValue::fixed(4.0).apply_fixed(&mut cfg, 2.0, |a, b| a * b);
        assert_eq!(fixed, UncertainValue::fixed(8.0));
        let stochastic =
            UncertainValue::uniform(0.0, 1.0).apply_fixed(&mut cfg, 2.0, |a, b| a * b);
        assert!(matches!(stochastic, UncertainValue::Empirical { ref samples } if samples.len() == 32));
    }

    #[test]
    fn test_sampling_is_deterministic_per_seed() {
        let v = UncertainValue::normal(0.0, 1.0);
        let mut a = SampleConfig::new(7, 16);
        let mut b = SampleConfig::new(7, 16);
        let sa: Vec<f64> = (0..100).map(|_| v.sample(&mut a)).collect();
        let sb: Vec<f64> = (0..100).map(|_| v.sample(&mut b)).collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_materialize_mapped() {
        let mut cfg = cfg(25);
        let v = UncertainValue::uniform(0.0, 1.0).exp().materialize(&mut cfg);
        match v {
            UncertainValue::Empirical { samples } => {
                assert_eq!(samples.len(), 25);
                assert!(samples.iter().all(|s| (1.0..std::f64::consts::E).contains(s)));
            }
            other => panic!("expected empirical, got {other:?}"),
        }
    }

    #[test]
    fn test_is_zero() {
        assert!(UncertainValue::fixed(0.0).is_zero());
        assert!(!UncertainValue::fixed(0.1).is_zero());
        assert!(!UncertainValue::uniform(-1.0, 1.0).is_zero());
    }

    #[test]
    fn test_is_valid() {
        assert!(UncertainValue::uniform(0.0, 1.0).is_valid());
        assert!(!UncertainValue::uniform(1.0, 1.0).is_valid());
        assert!(!UncertainValue::normal(0.0, 0.0).is_valid());
        assert!(!UncertainValue::empirical(vec![]).is_valid());
    }
}
