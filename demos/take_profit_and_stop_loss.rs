//! # Take profit and Stop loss
//!
//! Opens a long and a short with a 2:1 reward/risk bracket around the market and lets the synthetic
//! feed hit the levels on the intrabar high and low.

use sms_rs::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut market = Market::new(MarketConfig::default(), Tier::High, Some(7))?;
    market.start();

    let price = market.history().last_close()?;
    let long = market.place_buy(Some(price * 1.04), Some(price * 0.98))?;
    let short = market.place_sell(Some(price * 0.96), Some(price * 1.02))?;

    let mut ticks = 0;
    while market.ledger().positions().count() > 0 && ticks < 5_000 {
        market.on_timer()?;
        ticks += 1;
    }

    for id in [long, short] {
        let Some(position) = market.ledger().position(id).copied() else {
            continue;
        };
        if position.is_open() {
            let profit = market.close_position(id)?;
            println!("#{id} still open after {ticks} ticks, closed for {profit:.2}");
        } else {
            println!(
                "#{id} {:?} closed by {:?} at {:.2}: {:.2}",
                position.side(),
                position.close_reason(),
                position.exit_price().unwrap_or_default(),
                position.profit()
            );
        }
    }

    #[cfg(feature = "metrics")]
    {
        let metrics = Metrics::from(&market);
        println!("{metrics}");
    }

    #[cfg(not(feature = "metrics"))]
    {
        let ledger = market.ledger();
        println!("balance {:.2} (initial {:.2})", ledger.balance(), ledger.initial_balance());
    }

    Ok(())
}
