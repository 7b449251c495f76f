use std::{collections::vec_deque::Iter, time::Duration};

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    PriceScale,
    config::{MarketConfig, Tier},
    engine::*,
    errors::{Error, Result},
    utils::{centered, coin, session_rng, uniform},
};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// A candle was appended.
    Candle(Candle),
    /// A queued pattern was started; no candle was drawn on this tick.
    PatternStarted(PatternKind),
    /// The market is closed, nothing happened.
    Closed,
}

/// Direction of the last price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceDirection {
    /// The last close is above the previous one.
    Up,
    /// The last close is below the previous one.
    Down,
    /// Unchanged, or a single candle.
    Flat,
}

/// Read-only snapshot handed to listeners after every update.
#[derive(Clone, Copy)]
pub struct MarketView<'a> {
    tier: Tier,
    history: &'a PriceHistory,
    ledger: &'a Ledger,
}

impl<'a> MarketView<'a> {
    /// Returns the tier of the session.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Returns the candles, oldest first.
    pub fn candles(&self) -> Iter<'a, Candle> {
        self.history.iter()
    }

    /// Returns the most recent candle.
    pub fn last(&self) -> Option<&'a Candle> {
        self.history.last()
    }

    /// Returns the last close.
    pub fn last_price(&self) -> Option<f64> {
        self.history.last().map(Candle::close)
    }

    /// Returns the direction of the last price change.
    pub fn direction(&self) -> PriceDirection {
        match (self.history.previous(), self.history.last()) {
            (Some(previous), Some(last)) if last.close() > previous.close() => PriceDirection::Up,
            (Some(previous), Some(last)) if last.close() < previous.close() => PriceDirection::Down,
            _ => PriceDirection::Flat,
        }
    }

    /// Returns the highest high of the session.
    pub fn session_high(&self) -> Option<f64> {
        self.history.session_high()
    }

    /// Returns the lowest low of the session.
    pub fn session_low(&self) -> Option<f64> {
        self.history.session_low()
    }

    /// Returns the realized balance.
    pub fn balance(&self) -> f64 {
        self.ledger.balance()
    }

    /// Returns the balance including floating profit/loss.
    pub fn total_balance(&self) -> f64 {
        self.ledger.total_balance()
    }

    /// Returns the open positions.
    pub fn positions(&self) -> impl Iterator<Item = &'a Position> {
        self.ledger.positions()
    }
}

/// Receives a snapshot after every appended candle and every ledger change.
///
/// Listeners run after the ledger has been marked to market, so the snapshot never shows stale P/L.
pub trait MarketListener {
    /// Called with the updated market.
    fn on_update(&mut self, view: &MarketView<'_>);
}

impl<F> MarketListener for F
where
    F: FnMut(&MarketView<'_>),
{
    fn on_update(&mut self, view: &MarketView<'_>) {
        self(view)
    }
}

/// The market session and its tick scheduler.
///
/// Every tick takes exactly one path, in this order:
/// 1. an active pattern draws the candle;
/// 2. while the pattern cooldown runs, a drift step draws it and the cooldown counts down;
/// 3. a queued pattern is started, without drawing a candle, and any pending retracement is dropped;
/// 4. otherwise a drift step draws it.
///
/// A drift step is a rare spike, else an active retracement, else an active trend, else a random walk.
/// Every candle is appended to the history, then the ledger is marked to market, then listeners run.
pub struct Market {
    config: MarketConfig,
    tier: Tier,
    seed: Option<u64>,
    rng: StdRng,
    history: PriceHistory,
    volatility: VolatilityEstimator,
    wicks: WickShaper,
    retracement: Retracement,
    trend: Trend,
    patterns: PatternEngine,
    ledger: Ledger,
    open: bool,
    listeners: Vec<Box<dyn MarketListener>>,
}

impl Market {
    /// Creates a closed market with a seed candle.
    ///
    /// ### Arguments
    /// * `config` - Tunables of the session, validated here.
    /// * `tier` - Price range and starting balance.
    /// * `seed` - Seed of the random source; `None` draws one from the OS.
    ///
    /// ### Returns
    /// The market, or a configuration error.
    ///
    /// ### Example
    /// ```rust
    /// use sms_rs::prelude::*;
    ///
    /// let market = Market::new(MarketConfig::default(), Tier::High, Some(1)).unwrap();
    /// let seed = market.history().last().unwrap();
    /// assert!((900.0..=1000.0).contains(&seed.close()));
    /// assert_eq!(1000.0, market.ledger().balance());
    /// ```
    pub fn new(config: MarketConfig, tier: Tier, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let tier_config = *config.tiers.get(tier);

        let mut market = Self {
            tier,
            seed,
            rng: session_rng(seed),
            history: PriceHistory::new(config.history_capacity)?,
            volatility: VolatilityEstimator::new(&config.volatility),
            wicks: WickShaper::new(config.candle.wick_factor, tier_config.price_floor),
            retracement: Retracement::new(config.retracement, tier_config.price_floor),
            trend: Trend::new(config.trend),
            patterns: PatternEngine::new(config.pattern.clone()),
            ledger: Ledger::new(&config.ledger, tier_config.balance)?,
            open: false,
            listeners: Vec::new(),
            config,
        };
        market.seed_candle()?;
        Ok(market)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Returns the tier.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Returns the price history.
    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Returns the position ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Returns the retracement controller.
    pub fn retracement(&self) -> &Retracement {
        &self.retracement
    }

    /// Returns the trend controller.
    pub fn trend(&self) -> &Trend {
        &self.trend
    }

    /// Returns the pattern engine.
    pub fn patterns(&self) -> &PatternEngine {
        &self.patterns
    }

    /// Returns the last smoothed volatility.
    pub fn volatility(&self) -> Option<f64> {
        self.volatility.smoothed()
    }

    /// Returns the timer period.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.tick_interval_ms)
    }

    /// Returns a snapshot of the market.
    pub fn view(&self) -> MarketView<'_> {
        MarketView {
            tier: self.tier,
            history: &self.history,
            ledger: &self.ledger,
        }
    }

    /// Registers a listener.
    pub fn add_listener(&mut self, listener: impl MarketListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Returns `true` while the timer is armed.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Opens the market. Opening an open market does nothing.
    pub fn start(&mut self) {
        if !self.open {
            self.open = true;
            info!(tier = %self.tier, "market opened");
        }
    }

    /// Closes the market. Closing a closed market does nothing.
    pub fn stop(&mut self) {
        if self.open {
            self.open = false;
            info!(tier = %self.tier, "market closed");
        }
    }

    /// Flips the market between open and closed and returns the new state.
    pub fn toggle(&mut self) -> bool {
        if self.open { self.stop() } else { self.start() }
        self.open
    }

    /// Runs one tick if the market is open.
    pub fn on_timer(&mut self) -> Result<TickOutcome> {
        if !self.open {
            return Ok(TickOutcome::Closed);
        }
        self.tick()
    }

    /// Runs one tick, whether the market is open or not.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let last = self.history.last_close()?;

        if self.patterns.is_active() {
            let volatility = self.volatility.sample(last, &mut self.rng);
            let floor = self.wicks.floor();
            let close = self
                .patterns
                .step(last, volatility, floor, &mut self.rng)
                .unwrap_or(last);
            let candle = self
                .wicks
                .shape(self.history.next_index(), last, close, volatility, &mut self.rng);
            return Ok(self.append(candle));
        }

        if self.patterns.cooldown() > 0 {
            let candle = self.drift(last);
            self.patterns.tick_cooldown(&mut self.rng);
            return Ok(self.append(candle));
        }

        if let Some(kind) = self.patterns.next_queued() {
            let volatility = self.current_volatility(last);
            self.retracement.clear();
            self.patterns.start(kind, last, volatility, &mut self.rng);
            return Ok(TickOutcome::PatternStarted(kind));
        }

        let candle = self.drift(last);
        Ok(self.append(candle))
    }

    /// Appends a candle closing `|delta|` above the last close.
    ///
    /// The upper wick spikes, the lower tail stays minimal. A large enough move schedules a retracement.
    ///
    /// ### Returns
    /// The appended candle, or `InvalidDelta` if `delta` is not finite.
    pub fn pump(&mut self, delta: f64) -> Result<Candle> {
        if !delta.is_finite() {
            warn!(delta, "pump rejected");
            return Err(Error::InvalidDelta(delta));
        }
        self.manual_move(delta.abs())
    }

    /// Appends a candle closing `|delta|` below the last close, never below the price floor.
    ///
    /// ### Returns
    /// The appended candle, or `InvalidDelta` if `delta` is not finite.
    pub fn dump(&mut self, delta: f64) -> Result<Candle> {
        if !delta.is_finite() {
            warn!(delta, "dump rejected");
            return Err(Error::InvalidDelta(delta));
        }
        self.manual_move(-delta.abs())
    }

    /// Queues a pattern. It starts once the cooldown is over and nothing else is queued before it.
    pub fn schedule_pattern(&mut self, kind: PatternKind) {
        self.patterns.schedule(kind);
    }

    /// Starts a pattern right away, replacing any running one. A pending retracement is dropped.
    ///
    /// ### Returns
    /// The number of candles the pattern will draw.
    pub fn start_pattern(&mut self, kind: PatternKind) -> Result<usize> {
        let last = self.history.last_close()?;
        let volatility = self.current_volatility(last);
        self.retracement.clear();
        Ok(self.patterns.start(kind, last, volatility, &mut self.rng))
    }

    /// Resets the whole session for `tier`: history, controllers, random source and ledger.
    ///
    /// The market is closed and a new seed candle is drawn from the tier's price range.
    pub fn apply_tier(&mut self, tier: Tier) -> Result<()> {
        self.stop();
        let tier_config = *self.config.tiers.get(tier);

        self.tier = tier;
        self.rng = session_rng(self.seed);
        self.history.clear();
        self.volatility.reset();
        self.wicks = WickShaper::new(self.config.candle.wick_factor, tier_config.price_floor);
        self.retracement = Retracement::new(self.config.retracement, tier_config.price_floor);
        self.trend.clear();
        self.patterns.reset();
        self.ledger.reset(tier_config.balance)?;
        info!(%tier, balance = tier_config.balance, "tier applied");

        self.seed_candle()?;
        self.notify();
        Ok(())
    }

    /// Opens a long position at the last close plus spread.
    ///
    /// ### Returns
    /// The position id, or `MarketClosed` while the market is closed.
    pub fn place_buy(&mut self, take_profit: Option<f64>, stop_loss: Option<f64>) -> Result<u32> {
        self.place(PositionSide::Buy, take_profit, stop_loss)
    }

    /// Opens a short position at the last close minus spread.
    ///
    /// ### Returns
    /// The position id, or `MarketClosed` while the market is closed.
    pub fn place_sell(&mut self, take_profit: Option<f64>, stop_loss: Option<f64>) -> Result<u32> {
        self.place(PositionSide::Sell, take_profit, stop_loss)
    }

    /// Closes a position at the last close and returns the realized profit.
    pub fn close_position(&mut self, id: u32) -> Result<f64> {
        let last = self.history.last_close()?;
        let profit = self.ledger.close(id, last)?;
        self.notify();
        Ok(profit)
    }

    fn place(&mut self, side: PositionSide, take_profit: Option<f64>, stop_loss: Option<f64>) -> Result<u32> {
        if !self.open {
            warn!(?side, "order rejected: market closed");
            return Err(Error::MarketClosed);
        }
        let last = self.history.last_close()?;
        let id = self.ledger.open(side, last, take_profit, stop_loss)?;
        self.notify();
        Ok(id)
    }

    /// Draws the first candle of the session: open equals close, short wicks.
    fn seed_candle(&mut self) -> Result<()> {
        let tier_config = self.config.tiers.get(self.tier);
        let price = uniform(&mut self.rng, tier_config.price_min, tier_config.price_max);
        let wick = price * self.config.candle.seed_wick_rate;

        let candle = CandleBuilder::builder()
            .index(self.history.next_index())
            .open(price)
            .high(price + self.rng.random::<f64>() * wick)
            .low((price - self.rng.random::<f64>() * wick).floored(tier_config.price_floor))
            .close(price)
            .build()?;
        debug!(price, "seed candle");
        self.history.push(candle);
        Ok(())
    }

    /// Draws a drift candle: spike, retracement, trend or random walk.
    fn drift(&mut self, last: f64) -> Candle {
        let volatility = self.volatility.sample(last, &mut self.rng);
        let index = self.history.next_index();
        let floor = self.wicks.floor();

        let spike = self.config.spike;
        if self.rng.random_bool(spike.chance) {
            let rate = uniform(&mut self.rng, spike.min_rate, spike.max_rate);
            let close = (last * (1.0 + coin(&mut self.rng) * rate)).floored(floor);
            debug!(last, close, "spike");
            return self
                .wicks
                .spike(index, last, close, volatility, spike.wick_factor, &mut self.rng);
        }

        if !self.retracement.is_active() {
            self.trend.maybe_start(&mut self.rng);
        }

        let close = if let Some(close) = self.retracement.step(last, &mut self.rng) {
            close
        } else if let Some(close) = self.trend.step(last, volatility, floor, &mut self.rng) {
            close
        } else {
            let close = (last + centered(&mut self.rng) * volatility).floored(floor);
            self.retracement.try_trigger(last, close, &mut self.rng);
            close
        };

        self.wicks.shape(index, last, close, volatility, &mut self.rng)
    }

    fn manual_move(&mut self, delta: f64) -> Result<Candle> {
        let last = self.history.last_close()?;
        let volatility = self.volatility.sample(last, &mut self.rng);
        let close = (last + delta).floored(self.wicks.floor());
        let candle = self
            .wicks
            .manual(self.history.next_index(), last, close, volatility, &mut self.rng);
        info!(last, close = candle.close(), "manual move");

        self.retracement.try_trigger(last, candle.close(), &mut self.rng);
        self.append(candle);
        Ok(candle)
    }

    fn current_volatility(&mut self, last: f64) -> f64 {
        match self.volatility.smoothed() {
            Some(volatility) => volatility,
            None => self.volatility.sample(last, &mut self.rng),
        }
    }

    fn append(&mut self, candle: Candle) -> TickOutcome {
        self.history.push(candle);
        self.ledger.mark_to_market(&candle);
        self.notify();
        TickOutcome::Candle(candle)
    }

    fn notify(&mut self) {
        let view = MarketView {
            tier: self.tier,
            history: &self.history,
            ledger: &self.ledger,
        };
        for listener in self.listeners.iter_mut() {
            listener.on_update(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn market(tier: Tier, seed: u64) -> Market {
        Market::new(MarketConfig::default(), tier, Some(seed)).unwrap()
    }

    fn assert_valid(candle: &Candle) {
        assert!(candle.high() >= candle.open().max(candle.close()));
        assert!(candle.low() <= candle.open().min(candle.close()));
        assert!(candle.low() > 0.0);
    }

    #[test]
    fn seed_candle_in_tier_range() {
        for (tier, min, max) in [
            (Tier::Low, 9.0, 10.0),
            (Tier::Medium, 90.0, 100.0),
            (Tier::High, 900.0, 1000.0),
            (Tier::Ultra, 9000.0, 10000.0),
        ] {
            let market = market(tier, 3);
            assert_eq!(1, market.history().len());
            let seed = market.history().last().unwrap();
            assert_eq!(1, seed.index());
            assert_eq!(seed.open(), seed.close());
            assert!((min..max).contains(&seed.close()));
            assert!(seed.high() - seed.close() <= seed.close() * 0.005);
            assert_valid(seed);
            assert_eq!(Some(seed.high()), market.history().session_high());
            assert!(!market.is_open());
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = MarketConfig {
            history_capacity: 0,
            ..MarketConfig::default()
        };
        assert!(matches!(
            Market::new(config, Tier::Low, Some(1)),
            Err(Error::InvalidCapacity(0))
        ));
    }

    #[test]
    fn same_seed_same_session() {
        let mut a = market(Tier::Medium, 42);
        let mut b = market(Tier::Medium, 42);
        for _ in 0..500 {
            assert_eq!(a.tick().unwrap(), b.tick().unwrap());
        }
    }

    #[test]
    fn scenario_long_session_keeps_invariants() {
        let mut market = market(Tier::Low, 7);
        let mut candles = 0;
        let mut started = 0;
        for _ in 0..3500 {
            match market.tick().unwrap() {
                TickOutcome::Candle(candle) => {
                    assert_valid(&candle);
                    candles += 1;
                }
                TickOutcome::PatternStarted(_) => started += 1,
                TickOutcome::Closed => unreachable!(),
            }
        }
        // the cooldown of 120 ticks makes patterns inevitable
        assert!(started > 0);
        assert_eq!(3500, candles + started);

        let indexes = market.history().iter().map(Candle::index).collect::<Vec<_>>();
        assert!(indexes.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(3000, market.history().len());
        assert_eq!(candles as u64 + 1, *indexes.last().unwrap());
    }

    #[test]
    fn closed_market_does_not_tick() {
        let mut market = market(Tier::Low, 1);
        assert_eq!(TickOutcome::Closed, market.on_timer().unwrap());
        assert_eq!(1, market.history().len());

        market.start();
        assert!(matches!(market.on_timer().unwrap(), TickOutcome::Candle(_)));
        assert_eq!(2, market.history().len());
    }

    #[test]
    fn toggle_and_idempotent_start() {
        let mut market = market(Tier::Low, 1);
        market.start();
        market.start();
        assert!(market.is_open());
        assert!(!market.toggle());
        market.stop();
        assert!(!market.is_open());
        assert!(market.toggle());
    }

    #[test]
    fn queued_pattern_starts_without_a_candle() {
        let config = MarketConfig {
            pattern: crate::config::PatternConfig {
                cooldown: 2,
                min_steps: 80,
                max_steps: 80,
                enabled: vec![PatternKind::Triangle],
            },
            ..MarketConfig::default()
        };
        let mut market = Market::new(config, Tier::Medium, Some(5)).unwrap();

        assert!(matches!(market.tick().unwrap(), TickOutcome::Candle(_)));
        assert!(matches!(market.tick().unwrap(), TickOutcome::Candle(_)));
        assert_eq!(
            TickOutcome::PatternStarted(PatternKind::Triangle),
            market.tick().unwrap()
        );
        assert_eq!(3, market.history().len());

        for _ in 0..80 {
            assert!(market.patterns().is_active());
            assert!(matches!(market.tick().unwrap(), TickOutcome::Candle(_)));
        }
        assert!(!market.patterns().is_active());
        assert_eq!(2, market.patterns().cooldown());
        assert_eq!(83, market.history().len());
    }

    #[test]
    fn start_pattern_overrides_drift() {
        let mut market = market(Tier::Medium, 9);
        let steps = market.start_pattern(PatternKind::HeadShoulders).unwrap();
        assert!((80..=150).contains(&steps));
        for _ in 0..steps {
            assert!(market.patterns().is_active());
            market.tick().unwrap();
        }
        assert!(!market.patterns().is_active());
        assert_eq!(steps + 1, market.history().len());
    }

    #[test]
    fn pump_and_dump() {
        let mut market = market(Tier::Medium, 11);
        let last = market.history().last_close().unwrap();

        let candle = market.pump(5.0).unwrap();
        assert_eq!(last, candle.open());
        assert!((candle.close() - (last + 5.0)).abs() < 1e-9);
        assert_valid(&candle);

        let candle = market.dump(1000.0).unwrap();
        assert_eq!(0.01, candle.close());
        assert_valid(&candle);

        assert!(matches!(market.pump(f64::NAN), Err(Error::InvalidDelta(_))));
        assert!(matches!(market.dump(f64::INFINITY), Err(Error::InvalidDelta(_))));
        assert_eq!(3, market.history().len());
    }

    #[test]
    fn pump_and_dump_ignore_the_sign() {
        let mut market = market(Tier::Medium, 11);
        let last = market.history().last_close().unwrap();

        let pumped = market.pump(-5.0).unwrap();
        assert!((pumped.close() - (last + 5.0)).abs() < 1e-9);

        let dumped = market.dump(-5.0).unwrap();
        assert!((dumped.close() - last).abs() < 1e-9);
    }

    #[test]
    fn trend_pauses_during_retracement() {
        let mut config = MarketConfig::default();
        config.trend.chance = 1.0;
        config.spike.chance = 0.0;
        config.pattern.cooldown = 10_000;
        let mut market = Market::new(config, Tier::Medium, Some(13)).unwrap();

        market.tick().unwrap();
        assert!(market.trend().is_active());

        // above the threshold of 50 even if the trend lifted the price past 100
        market.pump(60.0).unwrap();
        assert!(market.retracement().is_active());
        let trend_left = market.trend().remaining();
        let target = market.retracement().target().unwrap();

        let mut close = 0.0;
        for _ in 0..market.retracement().remaining() {
            if let TickOutcome::Candle(candle) = market.tick().unwrap() {
                close = candle.close();
            }
            assert_eq!(trend_left, market.trend().remaining());
        }
        assert!(!market.retracement().is_active());
        assert_eq!(target, close);

        market.tick().unwrap();
        assert_eq!(trend_left - 1, market.trend().remaining());
    }

    #[test]
    fn spikes_move_the_body_without_retracing() {
        let mut config = MarketConfig::default();
        config.spike.chance = 1.0;
        config.pattern.cooldown = 10_000;
        let wick_factor = config.spike.wick_factor;
        let mut market = Market::new(config, Tier::Medium, Some(14)).unwrap();

        for _ in 0..20 {
            let last = market.history().last_close().unwrap();
            let TickOutcome::Candle(candle) = market.tick().unwrap() else {
                panic!("spike ticks always draw a candle");
            };
            let rate = (candle.close() / last - 1.0).abs();
            assert!((0.15 - 1e-9..0.30 + 1e-9).contains(&rate), "rate {rate}");

            let reach = market.volatility().unwrap() * wick_factor;
            assert!(candle.high() - candle.open().max(candle.close()) <= reach + 1e-9);
            assert!(candle.open().min(candle.close()) - candle.low() <= reach + 1e-9);
            assert!(!market.retracement().is_active());
        }
    }

    #[test]
    fn pattern_start_drops_pending_retracement() {
        let mut market = market(Tier::Medium, 15);
        market.pump(30.0).unwrap();
        assert!(market.retracement().is_active());

        let steps = market.start_pattern(PatternKind::Flag).unwrap();
        assert!(!market.retracement().is_active());
        for _ in 0..steps {
            market.tick().unwrap();
        }
        assert!(!market.patterns().is_active());
        assert!(!market.retracement().is_active());
    }

    #[test]
    fn scenario_large_pump_schedules_retracement() {
        let mut market = market(Tier::Medium, 12);
        let last = market.history().last_close().unwrap();

        // threshold at the 10s magnitude is 5
        market.pump(30.0).unwrap();
        assert!(market.retracement().is_active());
        let target = market.retracement().target().unwrap();
        assert!(target > last && target < last + 30.0);

        // the cooldown keeps patterns away while the retracement plays out, a spike only delays it
        let steps = market.retracement().remaining();
        let mut close = market.history().last_close().unwrap();
        let mut ticks = 0;
        while market.retracement().is_active() {
            if let TickOutcome::Candle(candle) = market.tick().unwrap() {
                close = candle.close();
            }
            ticks += 1;
            assert!(ticks <= steps + 2);
        }
        assert_eq!(target, close);
    }

    #[test]
    fn orders_require_open_market() {
        let mut market = market(Tier::Low, 2);
        assert!(matches!(market.place_buy(None, None), Err(Error::MarketClosed)));
        assert!(matches!(market.place_sell(None, None), Err(Error::MarketClosed)));

        market.start();
        let id = market.place_buy(None, None).unwrap();
        assert!(market.ledger().position(id).unwrap().is_open());

        market.stop();
        market.close_position(id).unwrap();
        assert!(!market.ledger().position(id).unwrap().is_open());
        assert!(matches!(market.close_position(id), Err(Error::PositionClosed(_))));
        assert!(matches!(market.close_position(42), Err(Error::PositionNotFound(42))));
    }

    #[test]
    fn scenario_dump_triggers_margin_call() {
        let mut config = MarketConfig::default();
        config.ledger.spread = Spread::Fixed { value: 0.2 };
        let mut market = Market::new(config, Tier::High, Some(3)).unwrap();
        market.start();
        for _ in 0..3 {
            market.place_buy(None, None).unwrap();
        }

        // three longs losing 400 each against a balance of 1000
        market.dump(400.0).unwrap();
        assert_eq!(0, market.ledger().positions().count());
        assert_eq!(3, market.ledger().history().count());
        assert!(
            market
                .ledger()
                .history()
                .all(|p| p.close_reason() == Some(CloseReason::MarginCall))
        );
        assert_eq!(0.0, market.ledger().balance());
        assert!(matches!(market.place_buy(None, None), Err(Error::NegZeroBalance(_))));
    }

    #[test]
    fn apply_tier_resets_everything() {
        let mut market = market(Tier::Low, 4);
        market.start();
        market.place_buy(None, None).unwrap();
        market.pump(3.0).unwrap();
        for _ in 0..50 {
            market.tick().unwrap();
        }

        market.apply_tier(Tier::Ultra).unwrap();
        assert!(!market.is_open());
        assert_eq!(Tier::Ultra, market.tier());
        assert_eq!(1, market.history().len());
        assert_eq!(1, market.history().last().unwrap().index());
        assert!(market.history().last_close().unwrap() >= 9000.0);
        assert_eq!(0, market.ledger().positions().count());
        assert_eq!(0, market.ledger().history().count());
        assert_eq!(10000.0, market.ledger().balance());
        assert!(!market.retracement().is_active());
        assert!(!market.trend().is_active());
        assert!(!market.patterns().is_active());
        assert!(market.volatility().is_none());

        // same seed and tier replays the fresh session
        let fresh = self::market(Tier::Ultra, 4);
        assert_eq!(fresh.history().last(), market.history().last());
    }

    #[test]
    fn listeners_see_marked_ledger() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut market = market(Tier::Medium, 6);
        market.start();
        market.place_sell(None, None).unwrap();

        let log = Rc::clone(&seen);
        market.add_listener(move |view: &MarketView<'_>| {
            let profit = view.positions().map(Position::profit).sum::<f64>();
            log.borrow_mut().push((view.last_price(), view.direction(), profit, view.total_balance()));
        });

        for _ in 0..5 {
            market.on_timer().unwrap();
        }

        let seen = seen.borrow();
        assert_eq!(5, seen.len());
        for (price, _, profit, total) in seen.iter() {
            assert!(price.is_some());
            assert!((total - (500.0 + profit)).abs() < 1e-9);
        }
    }

    #[test]
    fn direction_of_last_change() {
        let mut market = market(Tier::Medium, 8);
        assert_eq!(PriceDirection::Flat, market.view().direction());
        market.pump(1.0).unwrap();
        assert_eq!(PriceDirection::Up, market.view().direction());
        market.dump(2.0).unwrap();
        assert_eq!(PriceDirection::Down, market.view().direction());
    }
}
