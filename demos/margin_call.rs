//! # Margin Call
//!
//! Stacks longs on a low tier account and dumps the market until the floating loss exceeds the
//! balance. Every position is liquidated and the balance drops to zero.

use sms_rs::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut market = Market::new(MarketConfig::default(), Tier::Low, Some(3))?;
    market.add_listener(|view: &MarketView<'_>| {
        println!(
            "price {:>6.2} balance {:>7.2} equity {:>7.2} open {}",
            view.last_price().unwrap_or_default(),
            view.balance(),
            view.total_balance(),
            view.positions().count()
        );
    });
    market.start();

    for _ in 0..20 {
        market.place_buy(None, None)?;
    }

    while market.ledger().balance() > 0.0 {
        market.dump(1.0)?;
    }

    for position in market.ledger().history() {
        println!("#{} {:?} {:.2}", position.id(), position.close_reason(), position.profit());
    }

    match market.place_buy(None, None) {
        Ok(_) => println!("unexpected fill"),
        Err(e) => println!("rejected: {e}"),
    }
    Ok(())
}
