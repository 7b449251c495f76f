use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(feature = "metrics")]
use chrono::Utc;

#[cfg(feature = "metrics")]
use crate::metrics::Event;
use crate::{
    config::LedgerConfig,
    engine::{Candle, CloseReason, Position, PositionSide, Wallet},
    errors::{Error, Result},
};

/// Bid/ask gap applied at entry and exit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Spread {
    /// Constant gap.
    Fixed {
        /// Gap in price units.
        value: f64,
    },
    /// Gap proportional to the price: `max(min, price * rate)`.
    Dynamic {
        /// Share of the price.
        rate: f64,
        /// Smallest gap.
        min: f64,
    },
}

impl Default for Spread {
    fn default() -> Self {
        Self::Dynamic { rate: 0.002, min: 0.01 }
    }
}

impl Spread {
    /// Returns the gap at `price`.
    pub fn for_price(&self, price: f64) -> f64 {
        match *self {
            Self::Fixed { value } => value,
            Self::Dynamic { rate, min } => (price * rate).max(min),
        }
    }

    /// Returns the price paid to open `side` when the market is at `price`.
    pub fn entry_price(&self, side: PositionSide, price: f64) -> f64 {
        price + side.sign() * self.for_price(price)
    }

    /// Returns the price received to close `side` when the market is at `price`.
    pub fn exit_price(&self, side: PositionSide, price: f64) -> f64 {
        price - side.sign() * self.for_price(price)
    }
}

/// Open positions, closed trades and the account they settle into.
///
/// Positions are marked to market on every appended candle: take-profit and stop-loss levels are
/// checked on the intrabar range, then the floating profit of the survivors is computed on the close
/// minus spread. If the floating loss exceeds the balance every position is liquidated and the balance
/// drops to exactly zero.
#[derive(Debug, Clone)]
pub struct Ledger {
    spread: Spread,
    size: f64,
    wallet: Wallet,
    next_id: u32,
    positions: Vec<Position>,
    history: Vec<Position>,
    #[cfg(feature = "metrics")]
    events: Vec<Event>,
}

impl std::ops::Deref for Ledger {
    type Target = Wallet;

    fn deref(&self) -> &Self::Target {
        &self.wallet
    }
}

impl Ledger {
    /// Creates an empty ledger.
    ///
    /// ### Arguments
    /// * `config` - Spread and position size.
    /// * `balance` - Starting balance.
    ///
    /// ### Returns
    /// The ledger, or `NegZeroBalance` if the balance is not positive.
    pub fn new(config: &LedgerConfig, balance: f64) -> Result<Self> {
        Ok(Self {
            spread: config.spread,
            size: config.size,
            wallet: Wallet::new(balance)?,
            next_id: 1,
            positions: Vec::new(),
            history: Vec::new(),
            #[cfg(feature = "metrics")]
            events: Vec::new(),
        })
    }

    /// Returns the spread model.
    pub fn spread(&self) -> Spread {
        self.spread
    }

    /// Returns the account.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Returns the open positions, oldest first.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    /// Returns the closed positions, in closing order.
    pub fn history(&self) -> impl Iterator<Item = &Position> {
        self.history.iter()
    }

    /// Finds a position, open or closed.
    pub fn position(&self, id: u32) -> Option<&Position> {
        self.positions.iter().chain(self.history.iter()).find(|p| p.id() == id)
    }

    /// Returns the logged events.
    #[cfg(feature = "metrics")]
    pub fn events(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Opens a position at the market price plus spread.
    ///
    /// ### Arguments
    /// * `side` - Buy or sell.
    /// * `price` - Last close of the market.
    /// * `take_profit` - Optional take-profit level.
    /// * `stop_loss` - Optional stop-loss level.
    ///
    /// ### Returns
    /// The id of the new position, or an error if the balance is exhausted or a price is invalid.
    pub fn open(
        &mut self,
        side: PositionSide,
        price: f64,
        take_profit: Option<f64>,
        stop_loss: Option<f64>,
    ) -> Result<u32> {
        if self.wallet.balance() <= 0.0 {
            return Err(Error::NegZeroBalance(self.wallet.balance()));
        }

        let entry = self.spread.entry_price(side, price);
        let position = Position::new(self.next_id, side, entry, self.size, take_profit, stop_loss)?;
        self.next_id += 1;
        info!(id = position.id(), ?side, entry, "position opened");

        #[cfg(feature = "metrics")]
        self.events.push(Event::OpenPosition(position.opened_at(), position));

        self.positions.push(position);
        Ok(position.id())
    }

    /// Closes a position at the market price minus spread.
    ///
    /// ### Returns
    /// The realized profit, or `PositionNotFound` / `PositionClosed`.
    pub fn close(&mut self, id: u32, price: f64) -> Result<f64> {
        let Some(i) = self.positions.iter().position(|p| p.id() == id) else {
            if self.history.iter().any(|p| p.id() == id) {
                return Err(Error::PositionClosed(id));
            }
            return Err(Error::PositionNotFound(id));
        };

        let mut position = self.positions.remove(i);
        let exit = self.spread.exit_price(position.side(), price);
        let profit = self.settle(&mut position, exit, CloseReason::Manual);
        self.refresh_unrealized();
        Ok(profit)
    }

    /// Marks every open position to `candle`.
    ///
    /// A margin call only fires while positions are open. A realized loss that leaves the balance
    /// negative stays on the books.
    ///
    /// ### Returns
    /// The positions closed by this candle, by take profit, stop loss or margin call.
    pub fn mark_to_market(&mut self, candle: &Candle) -> Vec<Position> {
        let mut closed = Vec::new();
        let mut survivors = Vec::with_capacity(self.positions.len());

        for mut position in std::mem::take(&mut self.positions) {
            match position.exit_trigger(candle) {
                Some((level, reason)) => {
                    let exit = self.spread.exit_price(position.side(), level);
                    self.settle(&mut position, exit, reason);
                    closed.push(position);
                }
                None => survivors.push(position),
            }
        }

        let mut floating = 0.0;
        for position in survivors.iter_mut() {
            floating += position.mark(self.spread.exit_price(position.side(), candle.close()));
        }
        self.positions = survivors;

        if !self.positions.is_empty() && -floating > self.wallet.balance() {
            warn!(loss = -floating, balance = self.wallet.balance(), "margin call");
            #[cfg(feature = "metrics")]
            self.events.push(Event::MarginCall {
                datetime: Utc::now(),
                loss: -floating,
            });

            for mut position in std::mem::take(&mut self.positions) {
                let exit = self.spread.exit_price(position.side(), candle.close());
                position.close(exit, CloseReason::MarginCall);
                info!(id = position.id(), exit, profit = position.profit(), "position liquidated");
                self.archive(position);
                closed.push(position);
            }
            self.wallet.liquidate();
            #[cfg(feature = "metrics")]
            self.events.push(Event::from((Utc::now(), &self.wallet)));
        } else {
            self.wallet.set_unrealized_pnl(floating);
        }

        closed
    }

    /// Drops every position and restarts the account with `balance`.
    pub fn reset(&mut self, balance: f64) -> Result<()> {
        self.wallet.reset(balance)?;
        self.next_id = 1;
        self.positions.clear();
        self.history.clear();
        #[cfg(feature = "metrics")]
        self.events.clear();
        Ok(())
    }

    fn settle(&mut self, position: &mut Position, exit: f64, reason: CloseReason) -> f64 {
        let profit = position.close(exit, reason);
        self.wallet.add(profit);
        info!(id = position.id(), ?reason, exit, profit, "position closed");
        self.archive(*position);
        #[cfg(feature = "metrics")]
        self.events.push(Event::from((Utc::now(), &self.wallet)));
        profit
    }

    fn archive(&mut self, position: Position) {
        #[cfg(feature = "metrics")]
        self.events.push(Event::ClosePosition(position.closed_at().unwrap_or_default(), position));
        self.history.push(position);
    }

    fn refresh_unrealized(&mut self) {
        let floating: f64 = self.positions.iter().map(Position::profit).sum();
        self.wallet.set_unrealized_pnl(floating);
    }
}
