//! Session configuration.
//!
//! Every tunable of the simulator lives here with its default. A configuration can be built in code
//! or loaded from a TOML file where every section and field is optional:
//!
//! ```toml
//! history_capacity = 1000
//!
//! [trend]
//! chance = 0.1
//!
//! [ledger.spread]
//! kind = "fixed"
//! value = 0.2
//!
//! [tiers.low]
//! price_min = 9.0
//! price_max = 10.0
//! balance = 250.0
//! ```

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    engine::{PatternKind, Spread},
    errors::{Error, Result},
};

/// Volatility tier of a session.
///
/// The tier selects the price range of the seed candle and the starting balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Prices around 10.
    #[default]
    Low,
    /// Prices around 100.
    Medium,
    /// Prices around 1 000.
    High,
    /// Prices around 10 000.
    Ultra,
}

impl Tier {
    /// All tiers, from the lowest price range to the highest.
    pub const ALL: [Tier; 4] = [Tier::Low, Tier::Medium, Tier::High, Tier::Ultra];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
            Tier::Ultra => "ultra",
        };
        f.write_str(name)
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Tier::Low),
            "medium" => Ok(Tier::Medium),
            "high" => Ok(Tier::High),
            "ultra" => Ok(Tier::Ultra),
            _ => Err(Error::UnknownTier(s.to_string())),
        }
    }
}

/// Price range, balance and price floor of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Lowest seed price.
    pub price_min: f64,
    /// Highest seed price.
    pub price_max: f64,
    /// Starting balance of the ledger.
    pub balance: f64,
    /// No price of the session may go below this value.
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,
}

fn default_price_floor() -> f64 {
    0.01
}

impl TierConfig {
    fn new(price_min: f64, price_max: f64, balance: f64) -> Self {
        Self {
            price_min,
            price_max,
            balance,
            price_floor: default_price_floor(),
        }
    }
}

/// The table of the four tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tiers {
    /// Low tier.
    pub low: TierConfig,
    /// Medium tier.
    pub medium: TierConfig,
    /// High tier.
    pub high: TierConfig,
    /// Ultra tier.
    pub ultra: TierConfig,
}

impl Default for Tiers {
    fn default() -> Self {
        Self {
            low: TierConfig::new(9.0, 10.0, 100.0),
            medium: TierConfig::new(90.0, 100.0, 500.0),
            high: TierConfig::new(900.0, 1000.0, 1000.0),
            ultra: TierConfig::new(9000.0, 10000.0, 10000.0),
        }
    }
}

impl Tiers {
    /// Returns the configuration of a tier.
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Low => &self.low,
            Tier::Medium => &self.medium,
            Tier::High => &self.high,
            Tier::Ultra => &self.ultra,
        }
    }
}

/// How the bounds of a raw move are derived from the price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum VolatilityModel {
    /// Bounds are a fixed share of the price.
    Proportional {
        /// Smallest move as a share of the price.
        min_rate: f64,
        /// Largest move as a share of the price.
        max_rate: f64,
    },
    /// Bounds scale with the decimal magnitude of the price, `10^floor(log10(price))`.
    Magnitude {
        /// Smallest move in units of the magnitude.
        min_factor: f64,
        /// Largest move in units of the magnitude.
        max_factor: f64,
    },
}

impl Default for VolatilityModel {
    fn default() -> Self {
        Self::Proportional {
            min_rate: 0.0055,
            max_rate: 0.105,
        }
    }
}

/// Volatility estimator tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// Move bounds model.
    pub model: VolatilityModel,
    /// Exponent applied to the uniform draw, above `1.0` favours small moves.
    pub skew: f64,
    /// Weight of the previous smoothed value.
    pub memory: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            model: VolatilityModel::default(),
            skew: 2.5,
            memory: 0.8,
        }
    }
}

/// Candle wick tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleConfig {
    /// Largest wick beyond the body, in units of volatility.
    pub wick_factor: f64,
    /// Largest wick of the seed candle, as a share of its price.
    pub seed_wick_rate: f64,
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            wick_factor: 0.3,
            seed_wick_rate: 0.005,
        }
    }
}

/// Retracement controller tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetracementConfig {
    /// A move triggers a retracement when it reaches `threshold_factor * 10^floor(log10(price))`.
    pub threshold_factor: f64,
    /// Smallest share of the move given back.
    pub min_fraction: f64,
    /// Largest share of the move given back.
    pub max_fraction: f64,
    /// Fewest candles of a retracement.
    pub min_steps: usize,
    /// Most candles of a retracement.
    pub max_steps: usize,
    /// Noise bound, as a share of the interpolated step.
    pub noise: f64,
    /// Chance that a step moves against the retracement.
    pub counter_chance: f64,
    /// Size of a counter step, as a share of the interpolated step.
    pub counter_factor: f64,
}

impl Default for RetracementConfig {
    fn default() -> Self {
        Self {
            threshold_factor: 0.5,
            min_fraction: 0.6,
            max_fraction: 0.8,
            min_steps: 10,
            max_steps: 19,
            noise: 0.5,
            counter_chance: 0.3,
            counter_factor: 0.5,
        }
    }
}

/// Trend controller tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Chance to start a trend on an idle tick.
    pub chance: f64,
    /// Fewest candles of a trend.
    pub min_steps: usize,
    /// Most candles of a trend.
    pub max_steps: usize,
    /// Step size in units of volatility.
    pub vol_factor: f64,
    /// Noise bound, as a share of the step.
    pub noise: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            chance: 0.15,
            min_steps: 25,
            max_steps: 50,
            vol_factor: 0.5,
            noise: 0.2,
        }
    }
}

/// Pattern engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Drift ticks between two patterns.
    pub cooldown: usize,
    /// Fewest candles of a pattern.
    pub min_steps: usize,
    /// Most candles of a pattern.
    pub max_steps: usize,
    /// Patterns the scheduler draws from. An empty list disables automatic scheduling.
    pub enabled: Vec<PatternKind>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            cooldown: 120,
            min_steps: 80,
            max_steps: 150,
            enabled: PatternKind::ALL.to_vec(),
        }
    }
}

/// Spike tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Chance of a spike on a drift tick.
    pub chance: f64,
    /// Smallest spike, as a share of the price.
    pub min_rate: f64,
    /// Largest spike, as a share of the price.
    pub max_rate: f64,
    /// Wick size in units of volatility, kept small so the body dominates.
    pub wick_factor: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            chance: 0.001,
            min_rate: 0.15,
            max_rate: 0.30,
            wick_factor: 0.05,
        }
    }
}

/// Position ledger tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Bid/ask spread applied at entry and exit.
    pub spread: Spread,
    /// Size of every position.
    pub size: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            spread: Spread::default(),
            size: 1.0,
        }
    }
}

/// Full configuration of a market session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Candles kept in the price history before the oldest is evicted.
    pub history_capacity: usize,
    /// Wall-clock period of the tick timer.
    pub tick_interval_ms: u64,
    /// Volatility estimator.
    pub volatility: VolatilityConfig,
    /// Candle wicks.
    pub candle: CandleConfig,
    /// Retracement controller.
    pub retracement: RetracementConfig,
    /// Trend controller.
    pub trend: TrendConfig,
    /// Pattern engine.
    pub pattern: PatternConfig,
    /// Spikes.
    pub spike: SpikeConfig,
    /// Position ledger.
    pub ledger: LedgerConfig,
    /// Tier table.
    pub tiers: Tiers,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            history_capacity: 3000,
            tick_interval_ms: 1000,
            volatility: VolatilityConfig::default(),
            candle: CandleConfig::default(),
            retracement: RetracementConfig::default(),
            trend: TrendConfig::default(),
            pattern: PatternConfig::default(),
            spike: SpikeConfig::default(),
            ledger: LedgerConfig::default(),
            tiers: Tiers::default(),
        }
    }
}

impl MarketConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks every tunable is in range.
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(Error::InvalidCapacity(self.history_capacity));
        }

        let VolatilityConfig { model, skew, memory } = self.volatility;
        match model {
            VolatilityModel::Proportional { min_rate, max_rate } => {
                ensure_range("volatility rate", min_rate, max_rate)?;
                ensure(min_rate > 0.0, "volatility.min_rate must be positive")?;
            }
            VolatilityModel::Magnitude { min_factor, max_factor } => {
                ensure_range("volatility factor", min_factor, max_factor)?;
                ensure(min_factor > 0.0, "volatility.min_factor must be positive")?;
            }
        }
        ensure(skew > 0.0, "volatility.skew must be positive")?;
        ensure_probability("volatility.memory", memory)?;

        ensure(self.candle.wick_factor >= 0.0, "candle.wick_factor must not be negative")?;
        ensure(self.candle.seed_wick_rate >= 0.0, "candle.seed_wick_rate must not be negative")?;

        let retrace = &self.retracement;
        ensure(retrace.threshold_factor > 0.0, "retracement.threshold_factor must be positive")?;
        ensure_range("retracement fraction", retrace.min_fraction, retrace.max_fraction)?;
        ensure_probability("retracement.max_fraction", retrace.max_fraction)?;
        ensure_steps("retracement", retrace.min_steps, retrace.max_steps)?;
        ensure((0.0..=1.0).contains(&retrace.noise), "retracement.noise must be in [0, 1]")?;
        ensure_probability("retracement.counter_chance", retrace.counter_chance)?;
        ensure(retrace.counter_factor >= 0.0, "retracement.counter_factor must not be negative")?;

        let trend = &self.trend;
        ensure_probability("trend.chance", trend.chance)?;
        ensure_steps("trend", trend.min_steps, trend.max_steps)?;
        ensure(trend.vol_factor >= 0.0, "trend.vol_factor must not be negative")?;
        ensure(trend.noise >= 0.0, "trend.noise must not be negative")?;

        ensure_steps("pattern", self.pattern.min_steps, self.pattern.max_steps)?;

        let spike = &self.spike;
        ensure_probability("spike.chance", spike.chance)?;
        ensure_range("spike rate", spike.min_rate, spike.max_rate)?;
        ensure(spike.max_rate < 1.0, "spike.max_rate must be below 1")?;
        ensure(spike.wick_factor >= 0.0, "spike.wick_factor must not be negative")?;

        match self.ledger.spread {
            Spread::Fixed { value } => ensure(value >= 0.0, "ledger.spread.value must not be negative")?,
            Spread::Dynamic { rate, min } => {
                ensure(rate >= 0.0, "ledger.spread.rate must not be negative")?;
                ensure(min >= 0.0, "ledger.spread.min must not be negative")?;
            }
        }
        ensure(self.ledger.size > 0.0, "ledger.size must be positive")?;

        for tier in Tier::ALL {
            let cfg = self.tiers.get(tier);
            ensure(cfg.price_floor > 0.0, format!("tiers.{tier}.price_floor must be positive"))?;
            ensure(
                cfg.price_min > cfg.price_floor,
                format!("tiers.{tier}.price_min must be above the price floor"),
            )?;
            ensure_range(&format!("tiers.{tier} price"), cfg.price_min, cfg.price_max)?;
            ensure(cfg.balance > 0.0, format!("tiers.{tier}.balance must be positive"))?;
        }

        Ok(())
    }
}

fn ensure(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidConfig(message.into()))
    }
}

fn ensure_range(name: &str, min: f64, max: f64) -> Result<()> {
    ensure(
        min.is_finite() && max.is_finite() && min >= 0.0 && min <= max,
        format!("{name} range [{min}, {max}] is invalid"),
    )
}

fn ensure_steps(name: &str, min: usize, max: usize) -> Result<()> {
    ensure(min > 0 && min <= max, format!("{name} steps range [{min}, {max}] is invalid"))
}

fn ensure_probability(name: &str, p: f64) -> Result<()> {
    ensure((0.0..=1.0).contains(&p), format!("{name} must be in [0, 1] (got: {p})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MarketConfig::default().validate().is_ok());
    }

    #[test]
    fn tier_from_str() {
        assert_eq!(Tier::Low, "low".parse().unwrap());
        assert_eq!(Tier::Medium, " Medium ".parse().unwrap());
        assert_eq!(Tier::Ultra, "ULTRA".parse().unwrap());
        assert!(matches!("extreme".parse::<Tier>(), Err(Error::UnknownTier(_))));
    }

    #[test]
    fn tier_table() {
        let tiers = Tiers::default();
        assert_eq!(9.0, tiers.get(Tier::Low).price_min);
        assert_eq!(500.0, tiers.get(Tier::Medium).balance);
        assert_eq!(1000.0, tiers.get(Tier::High).price_max);
        assert_eq!(10000.0, tiers.get(Tier::Ultra).balance);
    }

    #[test]
    fn partial_toml() {
        let config = MarketConfig::from_toml_str(
            r#"
            history_capacity = 500

            [trend]
            chance = 0.05

            [volatility.model]
            model = "magnitude"
            min_factor = 0.01
            max_factor = 0.2

            [ledger.spread]
            kind = "fixed"
            value = 0.2

            [tiers.low]
            price_min = 9.0
            price_max = 10.0
            balance = 250.0
            "#,
        )
        .unwrap();

        assert_eq!(500, config.history_capacity);
        assert_eq!(0.05, config.trend.chance);
        assert_eq!(25, config.trend.min_steps);
        assert_eq!(Spread::Fixed { value: 0.2 }, config.ledger.spread);
        assert_eq!(250.0, config.tiers.low.balance);
        assert_eq!(0.01, config.tiers.low.price_floor);
        assert_eq!(500.0, config.tiers.medium.balance);
        assert!(matches!(config.volatility.model, VolatilityModel::Magnitude { .. }));
    }

    #[test]
    fn pattern_names_in_toml() {
        let config = MarketConfig::from_toml_str(
            r#"
            [pattern]
            enabled = ["doubleTop", "triangle"]
            "#,
        )
        .unwrap();
        assert_eq!(vec![PatternKind::DoubleTop, PatternKind::Triangle], config.pattern.enabled);
    }

    #[test]
    fn invalid_probability() {
        let mut config = MarketConfig::default();
        config.trend.chance = 1.5;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn invalid_steps() {
        let mut config = MarketConfig::default();
        config.retracement.min_steps = 20;
        config.retracement.max_steps = 10;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn invalid_capacity() {
        let mut config = MarketConfig::default();
        config.history_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidCapacity(0))));
    }

    #[test]
    fn invalid_tier_floor() {
        let mut config = MarketConfig::default();
        config.tiers.low.price_floor = 20.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn malformed_toml() {
        let result = MarketConfig::from_toml_str("history_capacity = \"many\"");
        assert!(matches!(result, Err(Error::TomlError(_))));
    }
}
