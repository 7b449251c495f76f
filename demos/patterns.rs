//! # Chart Patterns
//!
//! Runs every chart pattern back to back and prints the closes at each phase boundary.

use sms_rs::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut market = Market::new(MarketConfig::default(), Tier::Medium, Some(11))?;

    for kind in PatternKind::ALL {
        let steps = market.start_pattern(kind)?;
        let start = market.history().last_close()?;

        let mut closes = Vec::with_capacity(steps);
        while market.patterns().is_active() {
            if let TickOutcome::Candle(candle) = market.tick()? {
                closes.push(candle.close());
            }
        }

        let at = |progress: f64| closes[((steps as f64 * progress) as usize).min(steps - 1)];
        println!(
            "{kind:<14} {steps:>3} candles: {start:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2}",
            at(0.2),
            at(0.35),
            at(0.55),
            at(0.75),
            at(1.0)
        );
    }

    Ok(())
}
