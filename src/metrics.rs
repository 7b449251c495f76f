//! Trade metrics for a market session.
//!
//! This module provides tools to calculate:
//! - Max drawdown
//! - Profit factor
//! - Win rate
//!
//! Events generated by the ledger.
//!
//! The `Event` enum records positions opened and closed, wallet updates and margin calls.
//! It needs to enable `metrics` feature to use it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::*;

/// Events generated by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A position has been opened.
    OpenPosition(DateTime<Utc>, Position),

    /// A position has been closed, manually, by an exit level or by a margin call.
    ClosePosition(DateTime<Utc>, Position),

    /// Floating losses exceeded the balance and every position was liquidated.
    MarginCall {
        /// Moment
        datetime: DateTime<Utc>,
        /// Floating loss that triggered the liquidation.
        loss: f64,
    },

    /// The wallet balance has been updated.
    ///
    /// This event is triggered after each realized trade.
    WalletUpdate {
        /// Moment
        datetime: DateTime<Utc>,
        /// Realized balance.
        balance: f64,
        /// Floating profit and loss.
        unrealized_pnl: f64,
    },
}

impl From<(DateTime<Utc>, &Wallet)> for Event {
    fn from((datetime, value): (DateTime<Utc>, &Wallet)) -> Self {
        Self::WalletUpdate {
            datetime,
            balance: value.balance(),
            unrealized_pnl: value.unrealized_pnl(),
        }
    }
}

/// A collection of trading metrics calculated from a series of events.
///
/// It is typically constructed from a `Ledger` or a `Market`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    balance: f64,
    events: Vec<Event>,
    initial_balance: f64,
}

impl From<&Ledger> for Metrics {
    fn from(value: &Ledger) -> Self {
        Self {
            balance: value.balance(),
            initial_balance: value.initial_balance(),
            events: value.events().cloned().collect(),
        }
    }
}

impl From<&Market> for Metrics {
    fn from(value: &Market) -> Self {
        Self::from(value.ledger())
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance from a list of events, an initial balance and a final balance.
    pub fn new(events: Vec<Event>, initial_balance: f64, balance: f64) -> Self {
        Self {
            events,
            balance,
            initial_balance,
        }
    }

    /// Returns the initial balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the events.
    pub fn events(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Returns the balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    fn closed_profits(&self) -> impl Iterator<Item = f64> + '_ {
        self.events.iter().filter_map(|event| match event {
            Event::ClosePosition(_, position) => Some(position.profit()),
            _ => None,
        })
    }

    /// Returns the number of closed trades.
    pub fn trades(&self) -> usize {
        self.closed_profits().count()
    }

    /// Returns the number of margin calls.
    pub fn margin_calls(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::MarginCall { .. }))
            .count()
    }

    /// Computes the maximum drawdown of the realized balance as a percentage.
    pub fn max_drawdown(&self) -> f64 {
        let mut max_peak = self.initial_balance;
        let mut max_drawdown = 0.0;

        for event in &self.events {
            if let Event::WalletUpdate { balance, .. } = event {
                if *balance > max_peak {
                    max_peak = *balance;
                }
                let drawdown = (max_peak - balance) / max_peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown * 100.0
    }

    /// Computes the profit factor, gross gains over gross losses.
    pub fn profit_factor(&self) -> f64 {
        let mut total_gains = 0.0;
        let mut total_losses = 0.0;

        for pnl in self.closed_profits() {
            if pnl > 0.0 {
                total_gains += pnl;
            } else {
                total_losses += pnl.abs();
            }
        }

        if total_losses == 0.0 {
            return f64::INFINITY;
        }

        total_gains / total_losses
    }

    /// Computes the win rate as a percentage of winning trades.
    pub fn win_rate(&self) -> f64 {
        let mut winning_trades = 0;
        let mut total_trades = 0;

        for pnl in self.closed_profits() {
            total_trades += 1;
            if pnl > 0.0 {
                winning_trades += 1;
            }
        }

        if total_trades == 0 {
            return 0.0;
        }

        (winning_trades as f64 / total_trades as f64) * 100.0
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Session Metrics ===")?;
        writeln!(f, "Initial Balance: {:.2}", self.initial_balance)?;
        writeln!(f, "Final Balance: {:.2}", self.balance)?;
        writeln!(f, "Trades: {}", self.trades())?;
        writeln!(f, "Margin Calls: {}", self.margin_calls())?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown())?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor())?;
        write!(f, "Win Rate: {:.2}%", self.win_rate())
    }
}

#[cfg(test)]
// Helper function to create a closed position with the given profit
fn create_position(pnl: f64) -> Position {
    let mut position = Position::new(1, PositionSide::Buy, 100.0, 1.0, None, None).unwrap();
    position.close(100.0 + pnl, CloseReason::Manual);
    position
}

#[cfg(test)]
fn wallet_update(balance: f64) -> Event {
    Event::WalletUpdate {
        datetime: DateTime::default(),
        balance,
        unrealized_pnl: 0.0,
    }
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    let events = vec![
        wallet_update(10000.0),
        wallet_update(12000.0),
        wallet_update(9000.0),
        wallet_update(11000.0),
    ];
    let metrics = Metrics::new(events, 10000.0, 11000.0);
    assert_eq!(metrics.max_drawdown(), 25.0); // (12000 - 9000) / 12000 = 25%
}

#[cfg(test)]
#[test]
fn max_drawdown_no_events() {
    let metrics = Metrics::new(vec![], 10000.0, 10000.0);
    assert_eq!(metrics.max_drawdown(), 0.0);
}

#[cfg(test)]
#[test]
fn max_drawdown_after_margin_call() {
    let events = vec![wallet_update(150.0), wallet_update(0.0)];
    let metrics = Metrics::new(events, 100.0, 0.0);
    assert_eq!(metrics.max_drawdown(), 100.0);
}

#[cfg(test)]
#[test]
fn profit_factor() {
    let events = vec![
        Event::ClosePosition(DateTime::default(), create_position(20.0)),
        Event::ClosePosition(DateTime::default(), create_position(-10.0)),
    ];
    let metrics = Metrics::new(events, 10000.0, 10010.0);
    assert_eq!(metrics.profit_factor(), 2.0); // 20 / 10 = 2.0
}

#[cfg(test)]
#[test]
fn profit_factor_no_losses() {
    let events = vec![Event::ClosePosition(DateTime::default(), create_position(20.0))];
    let metrics = Metrics::new(events, 10000.0, 10020.0);
    assert_eq!(metrics.profit_factor(), f64::INFINITY);
}

#[cfg(test)]
#[test]
fn win_rate() {
    let events = vec![
        Event::OpenPosition(DateTime::default(), create_position(0.0)),
        Event::ClosePosition(DateTime::default(), create_position(20.0)),
        Event::ClosePosition(DateTime::default(), create_position(-10.0)),
    ];
    let metrics = Metrics::new(events, 10000.0, 10010.0);
    assert_eq!(metrics.trades(), 2);
    assert_eq!(metrics.win_rate(), 50.0); // 1 win out of 2 trades
}

#[cfg(test)]
#[test]
fn win_rate_no_trades() {
    let metrics = Metrics::new(vec![], 10000.0, 10000.0);
    assert_eq!(metrics.win_rate(), 0.0);
}

#[cfg(test)]
#[test]
fn from_ledger_events() {
    let config = crate::config::LedgerConfig {
        spread: Spread::Fixed { value: 0.0 },
        ..Default::default()
    };
    let mut ledger = Ledger::new(&config, 100.0).unwrap();
    let id = ledger.open(PositionSide::Buy, 50.0, None, None).unwrap();
    ledger.close(id, 60.0).unwrap();
    ledger.open(PositionSide::Sell, 60.0, None, None).unwrap();
    // the sell loses 140 on a balance of 110
    let candle = CandleBuilder::builder()
        .index(1)
        .open(200.0)
        .high(200.0)
        .low(200.0)
        .close(200.0)
        .build()
        .unwrap();
    ledger.mark_to_market(&candle);

    let metrics = Metrics::from(&ledger);
    assert_eq!(metrics.trades(), 2);
    assert_eq!(metrics.margin_calls(), 1);
    assert_eq!(metrics.win_rate(), 50.0);
    assert_eq!(metrics.balance(), 0.0);
    assert_eq!(metrics.max_drawdown(), 100.0);
}
