//! # Pump and Retrace
//!
//! Pumps a medium tier market well above the retracement threshold, then ticks until the scheduled
//! retracement has given back part of the move.

use sms_rs::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut market = Market::new(MarketConfig::default(), Tier::Medium, Some(42))?;
    market.start();

    let before = market.history().last_close()?;
    let pumped = market.pump(before * 0.3)?;
    println!("pumped {before:.2} -> {:.2}", pumped.close());

    let Some(target) = market.retracement().target() else {
        println!("move below the threshold, no retracement");
        return Ok(());
    };
    println!("retracing to {target:.2} over {} candles", market.retracement().remaining());

    while market.retracement().is_active() {
        if let TickOutcome::Candle(candle) = market.on_timer()? {
            println!(
                "#{:<4} o {:>8.2} h {:>8.2} l {:>8.2} c {:>8.2}",
                candle.index(),
                candle.open(),
                candle.high(),
                candle.low(),
                candle.close()
            );
        }
    }

    let view = market.view();
    println!(
        "settled at {:.2}, session high {:.2}",
        view.last_price().unwrap_or_default(),
        view.session_high().unwrap_or_default()
    );
    Ok(())
}
