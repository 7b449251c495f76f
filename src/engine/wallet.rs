use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Represents the trading account behind the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    // Starting balance of the session
    initial_balance: f64,
    // Realized balance
    balance: f64,
    // Floating profit/loss of open positions
    unrealized_pnl: f64,
}

impl Wallet {
    /// Creates a new wallet with the given initial balance.
    /// Non-positive balances are rejected.
    pub fn new(balance: f64) -> Result<Self> {
        if balance <= 0.0 || !balance.is_finite() {
            return Err(Error::NegZeroBalance(balance));
        }

        Ok(Self {
            initial_balance: balance,
            balance,
            unrealized_pnl: 0.0,
        })
    }

    /// Returns the starting balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the realized balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Returns the floating profit/loss of open positions.
    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    /// Returns the balance including floating profit/loss.
    pub fn total_balance(&self) -> f64 {
        self.balance + self.unrealized_pnl
    }

    /// Realizes a profit (or a loss) into the balance.
    pub(crate) fn add(&mut self, amount: f64) -> f64 {
        self.balance += amount;
        self.balance
    }

    /// Updates the unrealized P&L.
    pub(crate) fn set_unrealized_pnl(&mut self, pnl: f64) {
        self.unrealized_pnl = pnl;
    }

    /// Wipes the account after a margin call.
    pub(crate) fn liquidate(&mut self) {
        self.balance = 0.0;
        self.unrealized_pnl = 0.0;
    }

    /// Restarts the account with a new starting balance.
    pub(crate) fn reset(&mut self, balance: f64) -> Result<()> {
        *self = Self::new(balance)?;
        Ok(())
    }
}

#[cfg(test)]
#[test]
fn new_wallet_valid_balance() {
    let wallet = Wallet::new(100.0).unwrap();
    assert_eq!(wallet.balance(), 100.0);
    assert_eq!(wallet.initial_balance(), 100.0);
    assert_eq!(wallet.total_balance(), 100.0);
}

#[cfg(test)]
#[test]
fn new_wallet_invalid_balance() {
    let result = Wallet::new(0.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Wallet::new(-10.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Wallet::new(f64::INFINITY);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));
}

#[cfg(test)]
#[test]
fn add_profit_and_loss() {
    let mut wallet = Wallet::new(100.0).unwrap();
    assert_eq!(wallet.add(15.0), 115.0);
    assert_eq!(wallet.add(-40.0), 75.0);
    assert_eq!(wallet.initial_balance(), 100.0);
}

#[cfg(test)]
#[test]
fn total_balance_with_unrealized_pnl() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.set_unrealized_pnl(-30.0);
    assert_eq!(wallet.balance(), 100.0);
    assert_eq!(wallet.total_balance(), 70.0);
}

#[cfg(test)]
#[test]
fn liquidate_zeroes_balance() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.set_unrealized_pnl(-130.0);
    wallet.liquidate();
    assert_eq!(wallet.balance(), 0.0);
    assert_eq!(wallet.total_balance(), 0.0);
}

#[cfg(test)]
#[test]
fn reset_wallet() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.add(50.0);
    wallet.set_unrealized_pnl(5.0);
    wallet.reset(1000.0).unwrap();
    assert_eq!(wallet.balance(), 1000.0);
    assert_eq!(wallet.initial_balance(), 1000.0);
    assert_eq!(wallet.unrealized_pnl(), 0.0);

    assert!(matches!(wallet.reset(0.0), Err(Error::NegZeroBalance(_))));
}
