//! Per-account growth models.
//!
//! A growth model turns (day, total balance) into a per-day delta. Deltas
//! accumulate into an entity's accrued appreciation; cash-flow rules decide
//! when they become balance effects. The variants form a small sum type so
//! the loop pays a single dispatch per entity per day.

use jiff::civil::Date;

use crate::uncertain::{SampleConfig, UncertainValue};

const DAYS_PER_YEAR: f64 = 365.0;

/// Activity window of a growth model, inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    pub start: Date,
    pub end: Option<Date>,
}

impl TimeFrame {
    pub fn contains(&self, day: Date) -> bool {
        self.start <= day && self.end.is_none_or(|end| day < end)
    }
}

impl Default for TimeFrame {
    fn default() -> Self {
        Self {
            start: Date::MIN,
            end: None,
        }
    }
}

/// Compounds daily at a (possibly uncertain) annual rate: the daily factor
/// is `(1 + r)^(1/365)`.
#[derive(Debug, Clone)]
pub struct FixedGrowth {
    pub time_frame: TimeFrame,
    pub annual_rate: UncertainValue,
}

impl FixedGrowth {
    fn apply(&self, cfg: &mut SampleConfig, balance: &UncertainValue) -> UncertainValue {
        let one = UncertainValue::fixed(1.0);
        let daily_factor = self
            .annual_rate
            .add(cfg, &one)
            .pow(cfg, &UncertainValue::fixed(1.0 / DAYS_PER_YEAR));
        let delta_factor = daily_factor.sub(cfg, &one);
        balance.mul(cfg, &delta_factor)
    }
}

/// Geometric Brownian growth: the daily log-return is drawn from
/// `N(rate/365, vol/sqrt(365))` and the delta is
/// `balance * (exp(log_return) - 1)`.
#[derive(Debug, Clone)]
pub struct LogNormalGrowth {
    pub time_frame: TimeFrame,
    pub annual_rate: UncertainValue,
    pub annual_volatility: Option<UncertainValue>,
}

impl LogNormalGrowth {
    fn apply(&self, cfg: &mut SampleConfig, balance: &UncertainValue) -> UncertainValue {
        let daily_mu = self
            .annual_rate
            .mul(cfg, &UncertainValue::fixed(1.0 / DAYS_PER_YEAR));
        let daily_sigma = match &self.annual_volatility {
            Some(vol) if vol.is_valid() => {
                vol.mul(cfg, &UncertainValue::fixed(1.0 / DAYS_PER_YEAR.sqrt()))
            }
            _ => UncertainValue::fixed(0.0),
        };

        let daily_log_return = UncertainValue::mapped(move |cfg| {
            let mu = daily_mu.sample(cfg);
            let sigma = daily_sigma.sample(cfg);
            cfg.standard_normal() * sigma + mu
        });

        let daily_growth = daily_log_return.exp().sub(cfg, &UncertainValue::fixed(1.0));
        balance.mul(cfg, &daily_growth)
    }
}

/// An ordered set of models; at most one member applies per day.
#[derive(Debug, Clone)]
pub struct CombinedGrowth {
    models: Vec<GrowthModel>,
}

impl CombinedGrowth {
    /// Children are kept sorted ascending by start date.
    pub fn new(mut models: Vec<GrowthModel>) -> Self {
        models.sort_by_key(|m| m.starts_on());
        Self { models }
    }

    pub fn models(&self) -> &[GrowthModel] {
        &self.models
    }

    /// The first model (in start-date order) whose start is at or before
    /// `day` and that is active on `day`.
    fn select(&self, day: Date) -> Option<&GrowthModel> {
        for model in &self.models {
            if model.starts_on() > day {
                break;
            }
            if model.is_active_on(day) {
                return Some(model);
            }
        }
        None
    }
}

/// A per-entity rule computing a per-day balance change.
#[derive(Debug, Clone)]
pub enum GrowthModel {
    Fixed(FixedGrowth),
    LogNormal(LogNormalGrowth),
    Combined(CombinedGrowth),
}

impl GrowthModel {
    pub fn starts_on(&self) -> Date {
        match self {
            GrowthModel::Fixed(g) => g.time_frame.start,
            GrowthModel::LogNormal(g) => g.time_frame.start,
            GrowthModel::Combined(g) => {
                g.models.first().map(|m| m.starts_on()).unwrap_or(Date::MIN)
            }
        }
    }

    pub fn is_active_on(&self, day: Date) -> bool {
        match self {
            GrowthModel::Fixed(g) => g.time_frame.contains(day),
            GrowthModel::LogNormal(g) => g.time_frame.contains(day),
            GrowthModel::Combined(g) => g.models.iter().any(|m| m.is_active_on(day)),
        }
    }

    /// One day's delta for the given total balance. Inactive models (and a
    /// combined model with no active member) contribute zero.
    pub fn apply(
        &self,
        cfg: &mut SampleConfig,
        day: Date,
        balance: &UncertainValue,
    ) -> UncertainValue {
        match self {
            GrowthModel::Fixed(g) => g.apply(cfg, balance),
            GrowthModel::LogNormal(g) => g.apply(cfg, balance),
            GrowthModel::Combined(g) => match g.select(day) {
                Some(model) => model.apply(cfg, day, balance),
                None => UncertainValue::fixed(0.0),
            },
        }
    }
}
