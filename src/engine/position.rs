use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    engine::Candle,
    errors::{Error, Result},
};

/// Represents the side of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    /// Long: profits when the price rises.
    Buy,
    /// Short: profits when the price falls.
    Sell,
}

impl PositionSide {
    /// Returns `1.0` for a buy, `-1.0` for a sell.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Closed by the user.
    Manual,
    /// The take-profit level was crossed.
    TakeProfit,
    /// The stop-loss level was crossed.
    StopLoss,
    /// Liquidated because floating losses exceeded the balance.
    MarginCall,
}

/// A paper position against the synthetic feed.
///
/// `take_profit` and `stop_loss` are levels on the market price. They are checked against the intrabar
/// high and low of every new candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    id: u32,
    side: PositionSide,
    entry_price: f64,
    size: f64,
    exit_price: Option<f64>,
    profit: f64,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    close_reason: Option<CloseReason>,
}

impl Position {
    /// Creates an open position.
    ///
    /// ### Arguments
    /// * `id` - Identifier, unique in the session.
    /// * `side` - Buy or sell.
    /// * `entry_price` - Price paid, spread included.
    /// * `size` - Units held.
    /// * `take_profit` - Optional take-profit level.
    /// * `stop_loss` - Optional stop-loss level.
    ///
    /// ### Returns
    /// The position, or `InvalidPrice` if a price or the size is not finite and positive.
    pub fn new(
        id: u32,
        side: PositionSide,
        entry_price: f64,
        size: f64,
        take_profit: Option<f64>,
        stop_loss: Option<f64>,
    ) -> Result<Self> {
        for price in [Some(entry_price), Some(size), take_profit, stop_loss].into_iter().flatten() {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::InvalidPrice(price));
            }
        }

        Ok(Self {
            id,
            side,
            entry_price,
            size,
            exit_price: None,
            profit: 0.0,
            take_profit,
            stop_loss,
            opened_at: Utc::now(),
            closed_at: None,
            close_reason: None,
        })
    }

    /// Returns the identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the side.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    /// Returns the entry price.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the size.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Returns the exit price once closed.
    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    /// Returns the floating profit while open, the realized profit once closed.
    pub fn profit(&self) -> f64 {
        self.profit
    }

    /// Returns the take-profit level.
    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    /// Returns the stop-loss level.
    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    /// Returns when the position was opened.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Returns when the position was closed.
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Returns why the position was closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Returns `true` until the position is closed.
    pub fn is_open(&self) -> bool {
        self.exit_price.is_none()
    }

    /// Estimates the profit if the position exited at `exit_price`.
    pub fn estimate_pnl(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.size * self.side.sign()
    }

    /// Checks the take-profit and stop-loss levels against the candle's range.
    ///
    /// The take profit is checked first, so a candle crossing both levels takes the profit.
    /// The exit is the level itself, even when the candle gaps through it. The ledger then applies
    /// the spread to that level, so a BUY with a take profit at 105 fills below 105.
    ///
    /// ### Returns
    /// The crossed level and the matching reason.
    pub fn exit_trigger(&self, candle: &Candle) -> Option<(f64, CloseReason)> {
        let (favourable, adverse) = match self.side {
            PositionSide::Buy => (candle.high(), candle.low()),
            PositionSide::Sell => (candle.low(), candle.high()),
        };
        let sign = self.side.sign();

        if let Some(tp) = self.take_profit
            && (favourable - tp) * sign >= 0.0
        {
            return Some((tp, CloseReason::TakeProfit));
        }
        if let Some(sl) = self.stop_loss
            && (adverse - sl) * sign <= 0.0
        {
            return Some((sl, CloseReason::StopLoss));
        }
        None
    }

    /// Sets the floating profit at `mark_price`.
    pub(crate) fn mark(&mut self, mark_price: f64) -> f64 {
        self.profit = self.estimate_pnl(mark_price);
        self.profit
    }

    /// Closes the position at `exit_price` and returns the realized profit.
    pub(crate) fn close(&mut self, exit_price: f64, reason: CloseReason) -> f64 {
        let profit = self.mark(exit_price);
        self.exit_price = Some(exit_price);
        self.closed_at = Some(Utc::now());
        self.close_reason = Some(reason);
        profit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CandleBuilder;

    fn candle(high: f64, low: f64) -> Candle {
        let mid = (high + low) / 2.0;
        CandleBuilder::builder()
            .index(1)
            .open(mid)
            .high(high)
            .low(low)
            .close(mid)
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_bad_prices() {
        assert!(matches!(
            Position::new(1, PositionSide::Buy, 0.0, 1.0, None, None),
            Err(Error::InvalidPrice(_))
        ));
        assert!(matches!(
            Position::new(1, PositionSide::Buy, 10.0, 1.0, Some(f64::NAN), None),
            Err(Error::InvalidPrice(_))
        ));
        assert!(matches!(
            Position::new(1, PositionSide::Sell, 10.0, 1.0, None, Some(-1.0)),
            Err(Error::InvalidPrice(_))
        ));
    }

    #[test]
    fn pnl_by_side() {
        let buy = Position::new(1, PositionSide::Buy, 100.0, 2.0, None, None).unwrap();
        assert_eq!(20.0, buy.estimate_pnl(110.0));
        assert_eq!(-20.0, buy.estimate_pnl(90.0));

        let sell = Position::new(2, PositionSide::Sell, 100.0, 2.0, None, None).unwrap();
        assert_eq!(-20.0, sell.estimate_pnl(110.0));
        assert_eq!(20.0, sell.estimate_pnl(90.0));
    }

    #[test]
    fn buy_exit_triggers() {
        let position = Position::new(1, PositionSide::Buy, 100.0, 1.0, Some(110.0), Some(95.0)).unwrap();
        assert_eq!(None, position.exit_trigger(&candle(109.0, 96.0)));
        assert_eq!(Some((110.0, CloseReason::TakeProfit)), position.exit_trigger(&candle(110.0, 96.0)));
        assert_eq!(Some((95.0, CloseReason::StopLoss)), position.exit_trigger(&candle(105.0, 94.0)));
    }

    #[test]
    fn gap_through_stop_exits_at_level() {
        let position = Position::new(1, PositionSide::Buy, 100.0, 1.0, None, Some(95.0)).unwrap();
        // the whole bar trades below the stop
        assert_eq!(Some((95.0, CloseReason::StopLoss)), position.exit_trigger(&candle(90.0, 85.0)));
    }

    #[test]
    fn sell_exit_triggers() {
        let position = Position::new(1, PositionSide::Sell, 100.0, 1.0, Some(90.0), Some(105.0)).unwrap();
        assert_eq!(None, position.exit_trigger(&candle(104.0, 91.0)));
        assert_eq!(Some((90.0, CloseReason::TakeProfit)), position.exit_trigger(&candle(101.0, 89.0)));
        assert_eq!(Some((105.0, CloseReason::StopLoss)), position.exit_trigger(&candle(106.0, 99.0)));
    }

    #[test]
    fn take_profit_wins_when_both_cross() {
        let position = Position::new(1, PositionSide::Buy, 100.0, 1.0, Some(110.0), Some(95.0)).unwrap();
        assert_eq!(Some((110.0, CloseReason::TakeProfit)), position.exit_trigger(&candle(111.0, 94.0)));
    }

    #[test]
    fn close_records_exit() {
        let mut position = Position::new(1, PositionSide::Buy, 100.0, 1.0, None, None).unwrap();
        assert!(position.is_open());
        assert_eq!(5.0, position.mark(105.0));
        assert!(position.is_open());

        assert_eq!(-3.0, position.close(97.0, CloseReason::Manual));
        assert!(!position.is_open());
        assert_eq!(Some(97.0), position.exit_price());
        assert_eq!(Some(CloseReason::Manual), position.close_reason());
        assert!(position.closed_at().unwrap() >= position.opened_at());
    }
}
