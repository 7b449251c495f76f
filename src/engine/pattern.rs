//! Scripted chart patterns.
//!
//! While a pattern is active it overrides drift for a bounded number of candles. Each pattern splits
//! its duration into ordered phases keyed on `progress = elapsed / total`, and every phase blends the
//! last close toward a phase target with bounded noise, so the shape stays recognizable.
//!
//! | Pattern          | Phases                                                                |
//! |------------------|-----------------------------------------------------------------------|
//! | Double top       | impulse up, flat top, pullback, second top, breakdown                 |
//! | Double bottom    | impulse down, flat bottom, bounce, second bottom, breakout            |
//! | Head & shoulders | left shoulder, head, pullback, right shoulder, breakdown              |
//! | Triangle         | converging channel (symmetrical, ascending or descending)             |
//! | Flag             | pole, counter-sloped consolidation, continuation                      |
//! | Wedge            | sloped converging channel, breakout against the slope                 |

use std::{collections::VecDeque, fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    PriceScale,
    config::PatternConfig,
    engine::TrendDirection,
    errors::{Error, Result},
    utils::{centered, uniform_steps},
};

/// Strong directional move, in units of volatility.
const IMPULSE: f64 = 1.5;
/// Counter move between two extremes, in units of volatility.
const PULLBACK: f64 = 0.8;
/// Final break of the formation, in units of volatility.
const BREAKOUT: f64 = 1.2;
/// Share of the distance to a phase target covered per candle.
const CONVERGE: f64 = 0.3;
/// Noise bound, in units of volatility.
const NOISE: f64 = 0.2;
/// Extra height of the head above the left shoulder, in units of volatility.
const HEAD_EXTRA: f64 = 4.0;
/// Half height of a triangle or wedge at its start, in units of volatility.
const CHANNEL_HALF_WIDTH: f64 = 3.0;
/// Share of the channel width lost by the end of a triangle or wedge.
const CONVERGENCE: f64 = 0.85;
/// Total rise (or fall) of a wedge center, in units of volatility.
const WEDGE_RISE: f64 = 8.0;
/// Counter drift of a flag per candle, in units of volatility.
const FLAG_DRIFT: f64 = 0.25;

/// Name of a chart pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternKind {
    /// Two peaks at the same level, then a breakdown.
    DoubleTop,
    /// Two troughs at the same level, then a breakout.
    DoubleBottom,
    /// Three peaks with a higher middle one, then a breakdown.
    HeadShoulders,
    /// Converging channel.
    Triangle,
    /// Pole and counter-sloped consolidation.
    Flag,
    /// Sloped converging channel.
    Wedge,
}

impl PatternKind {
    /// Every pattern.
    pub const ALL: [PatternKind; 6] = [
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::HeadShoulders,
        PatternKind::Triangle,
        PatternKind::Flag,
        PatternKind::Wedge,
    ];
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DoubleTop => "doubleTop",
            Self::DoubleBottom => "doubleBottom",
            Self::HeadShoulders => "headShoulders",
            Self::Triangle => "triangle",
            Self::Flag => "flag",
            Self::Wedge => "wedge",
        };
        f.pad(name)
    }
}

impl FromStr for PatternKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match name.as_str() {
            "doubletop" => Ok(Self::DoubleTop),
            "doublebottom" => Ok(Self::DoubleBottom),
            "headshoulders" | "headandshoulders" => Ok(Self::HeadShoulders),
            "triangle" => Ok(Self::Triangle),
            "flag" => Ok(Self::Flag),
            "wedge" => Ok(Self::Wedge),
            _ => Err(Error::UnknownPattern(s.to_string())),
        }
    }
}

/// Shape of a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriangleKind {
    /// Falling resistance and rising support.
    Symmetrical,
    /// Flat resistance and rising support.
    Ascending,
    /// Falling resistance and flat support.
    Descending,
}

impl TriangleKind {
    fn random<R: Rng>(rng: &mut R) -> Self {
        match rng.random_range(0..3) {
            0 => Self::Symmetrical,
            1 => Self::Ascending,
            _ => Self::Descending,
        }
    }
}

/// Converging channel of a triangle, fixed when the pattern starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    kind: TriangleKind,
    center: f64,
    half_width: f64,
}

impl Triangle {
    /// Creates a triangle around `center` with an initial half height of `half_width`.
    pub fn new(kind: TriangleKind, center: f64, half_width: f64) -> Self {
        Self {
            kind,
            center,
            half_width,
        }
    }

    /// Returns the shape.
    pub fn kind(&self) -> TriangleKind {
        self.kind
    }

    /// Returns the `(upper, lower)` bounds at `progress` in `[0, 1]`.
    pub fn channel(&self, progress: f64) -> (f64, f64) {
        let (c, w) = (self.center, self.half_width);
        let narrowing = 1.0 - CONVERGENCE * progress.clamp(0.0, 1.0);
        match self.kind {
            TriangleKind::Symmetrical => (c + w * narrowing, c - w * narrowing),
            TriangleKind::Ascending => (c + w, c + w - 2.0 * w * narrowing),
            TriangleKind::Descending => (c - w + 2.0 * w * narrowing, c - w),
        }
    }

    /// Returns the channel height at `progress`.
    pub fn width(&self, progress: f64) -> f64 {
        let (upper, lower) = self.channel(progress);
        upper - lower
    }
}

/// Sloped converging channel of a wedge, fixed when the pattern starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wedge {
    slope: TrendDirection,
    base: f64,
    half_width: f64,
    rise: f64,
}

/// Share of a wedge spent inside the channel, the rest is the breakout.
const WEDGE_CHANNEL: f64 = 0.8;

impl Wedge {
    /// Returns the direction both bounds slope toward.
    pub fn slope(&self) -> TrendDirection {
        self.slope
    }

    /// Returns the `(upper, lower)` bounds at `progress` in `[0, 1]` of the channel phase.
    pub fn channel(&self, progress: f64) -> (f64, f64) {
        let q = progress.clamp(0.0, 1.0);
        let center = self.base + self.slope.sign() * self.rise * q;
        let half = self.half_width * (1.0 - CONVERGENCE * q);
        (center + half, center - half)
    }
}

/// A pattern with the scratch values it captures while running.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Highest close of the first top, reused as the level of the second.
    DoubleTop {
        /// Level of the first top.
        first_top: f64,
    },
    /// Lowest close of the first bottom, reused as the level of the second.
    DoubleBottom {
        /// Level of the first bottom.
        first_bottom: f64,
    },
    /// Head and shoulders levels.
    HeadShoulders {
        /// Close when the pattern started.
        base: f64,
        /// Highest close of the left shoulder.
        left_shoulder: f64,
        /// Head target, captured when the head phase starts.
        head: Option<f64>,
        /// Pullback target, captured when the pullback phase starts.
        neckline: Option<f64>,
    },
    /// Converging channel.
    Triangle(Triangle),
    /// Pole then consolidation.
    Flag {
        /// Direction of the pole and of the continuation.
        direction: TrendDirection,
        /// Close at the end of the pole, captured when the consolidation starts.
        pole_end: Option<f64>,
        /// Step of the consolidation center per candle.
        drift: f64,
        /// Height of the consolidation channel.
        width: f64,
        /// Candles spent in the consolidation.
        consolidation: usize,
    },
    /// Sloped converging channel.
    Wedge(Wedge),
}

impl Pattern {
    /// Creates the scratch state of `kind` starting from `last` at `volatility`.
    pub fn new<R: Rng>(kind: PatternKind, last: f64, volatility: f64, rng: &mut R) -> Self {
        match kind {
            PatternKind::DoubleTop => Self::DoubleTop { first_top: last },
            PatternKind::DoubleBottom => Self::DoubleBottom { first_bottom: last },
            PatternKind::HeadShoulders => Self::HeadShoulders {
                base: last,
                left_shoulder: last,
                head: None,
                neckline: None,
            },
            PatternKind::Triangle => Self::Triangle(Triangle::new(
                TriangleKind::random(rng),
                last,
                volatility * CHANNEL_HALF_WIDTH,
            )),
            PatternKind::Flag => Self::Flag {
                direction: TrendDirection::random(rng),
                pole_end: None,
                drift: volatility * FLAG_DRIFT,
                width: volatility * IMPULSE,
                consolidation: 0,
            },
            PatternKind::Wedge => Self::Wedge(Wedge {
                slope: TrendDirection::random(rng),
                base: last,
                half_width: volatility * CHANNEL_HALF_WIDTH,
                rise: volatility * WEDGE_RISE,
            }),
        }
    }

    /// Returns the name of the pattern.
    pub fn kind(&self) -> PatternKind {
        match self {
            Self::DoubleTop { .. } => PatternKind::DoubleTop,
            Self::DoubleBottom { .. } => PatternKind::DoubleBottom,
            Self::HeadShoulders { .. } => PatternKind::HeadShoulders,
            Self::Triangle(_) => PatternKind::Triangle,
            Self::Flag { .. } => PatternKind::Flag,
            Self::Wedge(_) => PatternKind::Wedge,
        }
    }

    /// Computes the next close at `progress`, before flooring.
    fn next_close<R: Rng>(&mut self, progress: f64, last: f64, vol: f64, rng: &mut R) -> f64 {
        let noise = centered(rng) * vol * NOISE;
        match self {
            Self::DoubleTop { first_top } => {
                if progress < 0.2 {
                    let close = last + vol * IMPULSE;
                    *first_top = first_top.max(close);
                    close
                } else if progress < 0.35 {
                    let close = last + noise;
                    *first_top = first_top.max(close);
                    close
                } else if progress < 0.55 {
                    last - vol * PULLBACK
                } else if progress < 0.75 {
                    last.toward(*first_top, CONVERGE) + noise
                } else {
                    last - vol * BREAKOUT
                }
            }
            Self::DoubleBottom { first_bottom } => {
                if progress < 0.2 {
                    let close = last - vol * IMPULSE;
                    *first_bottom = first_bottom.min(close);
                    close
                } else if progress < 0.35 {
                    let close = last + noise;
                    *first_bottom = first_bottom.min(close);
                    close
                } else if progress < 0.55 {
                    last + vol * PULLBACK
                } else if progress < 0.75 {
                    last.toward(*first_bottom, CONVERGE) + noise
                } else {
                    last + vol * BREAKOUT
                }
            }
            Self::HeadShoulders {
                base,
                left_shoulder,
                head,
                neckline,
            } => {
                if progress < 0.2 {
                    let close = last + vol * BREAKOUT + noise;
                    *left_shoulder = left_shoulder.max(close);
                    close
                } else if progress < 0.4 {
                    let target = *head.get_or_insert(*left_shoulder + vol * HEAD_EXTRA);
                    last.toward(target, CONVERGE) + noise
                } else if progress < 0.55 {
                    let target = *neckline.get_or_insert(base.toward(*left_shoulder, 0.5));
                    last.toward(target, CONVERGE) + noise
                } else if progress < 0.75 {
                    last.toward(*left_shoulder, CONVERGE) + noise
                } else {
                    last - vol * BREAKOUT
                }
            }
            Self::Triangle(triangle) => {
                let (upper, lower) = triangle.channel(progress);
                lower + rng.random::<f64>() * (upper - lower)
            }
            Self::Flag {
                direction,
                pole_end,
                drift,
                width,
                consolidation,
            } => {
                let sign = direction.sign();
                if progress < 0.3 {
                    last + sign * vol * IMPULSE + noise
                } else if progress < 0.85 {
                    let top = *pole_end.get_or_insert(last);
                    *consolidation += 1;
                    let center = top - sign * *drift * *consolidation as f64;
                    center + centered(rng) * *width
                } else {
                    last + sign * vol * BREAKOUT + noise
                }
            }
            Self::Wedge(wedge) => {
                if progress < WEDGE_CHANNEL {
                    let (upper, lower) = wedge.channel(progress / WEDGE_CHANNEL);
                    let point = lower + rng.random::<f64>() * (upper - lower);
                    last.toward(point, 0.5)
                } else {
                    last - wedge.slope.sign() * vol * BREAKOUT
                }
            }
        }
    }
}

/// A running pattern and its step counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePattern {
    pattern: Pattern,
    total_steps: usize,
    remaining: usize,
}

impl ActivePattern {
    /// Returns the scratch state.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the name of the pattern.
    pub fn kind(&self) -> PatternKind {
        self.pattern.kind()
    }

    /// Returns the duration in candles.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Returns the number of candles left.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Returns the number of candles already emitted.
    pub fn elapsed(&self) -> usize {
        self.total_steps - self.remaining
    }

    /// Returns `elapsed / total`.
    pub fn progress(&self) -> f64 {
        self.elapsed() as f64 / self.total_steps as f64
    }
}

/// Pattern state machine: idle, scheduled (queued names) or active.
///
/// A cooldown counts down on drift ticks. When it reaches zero a random pattern is queued. A queued
/// pattern starts once nothing is active, runs for its duration and re-arms the cooldown.
#[derive(Debug, Clone)]
pub struct PatternEngine {
    config: PatternConfig,
    active: Option<ActivePattern>,
    queue: VecDeque<PatternKind>,
    cooldown: usize,
}

impl PatternEngine {
    /// Creates an engine with the cooldown armed.
    pub fn new(config: PatternConfig) -> Self {
        let cooldown = config.cooldown;
        Self {
            config,
            active: None,
            queue: VecDeque::new(),
            cooldown,
        }
    }

    /// Returns the running pattern.
    pub fn active(&self) -> Option<&ActivePattern> {
        self.active.as_ref()
    }

    /// Returns `true` while a pattern drives the price.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Returns the drift ticks left before the next pattern is queued.
    pub fn cooldown(&self) -> usize {
        self.cooldown
    }

    /// Returns the queued patterns, next first.
    pub fn queue(&self) -> impl Iterator<Item = &PatternKind> {
        self.queue.iter()
    }

    /// Queues a pattern.
    pub fn schedule(&mut self, kind: PatternKind) {
        debug!(pattern = %kind, "pattern scheduled");
        self.queue.push_back(kind);
    }

    /// Counts one drift tick down. When the cooldown reaches zero a random enabled pattern is queued.
    ///
    /// ### Returns
    /// The queued pattern, if any.
    pub fn tick_cooldown<R: Rng>(&mut self, rng: &mut R) -> Option<PatternKind> {
        if self.cooldown == 0 {
            return None;
        }
        self.cooldown -= 1;
        if self.cooldown > 0 || self.config.enabled.is_empty() {
            return None;
        }
        let kind = self.config.enabled[rng.random_range(0..self.config.enabled.len())];
        self.schedule(kind);
        Some(kind)
    }

    /// Pops the next queued pattern.
    pub fn next_queued(&mut self) -> Option<PatternKind> {
        self.queue.pop_front()
    }

    /// Starts `kind` with a random duration, replacing any running pattern.
    pub fn start<R: Rng>(&mut self, kind: PatternKind, last: f64, volatility: f64, rng: &mut R) -> usize {
        let steps = uniform_steps(rng, self.config.min_steps, self.config.max_steps);
        self.start_with_steps(kind, steps, last, volatility, rng);
        steps
    }

    /// Starts `kind` for exactly `steps` candles, replacing any running pattern.
    pub fn start_with_steps<R: Rng>(&mut self, kind: PatternKind, steps: usize, last: f64, volatility: f64, rng: &mut R) {
        let steps = steps.max(1);
        debug!(pattern = %kind, steps, "pattern started");
        self.active = Some(ActivePattern {
            pattern: Pattern::new(kind, last, volatility, rng),
            total_steps: steps,
            remaining: steps,
        });
    }

    /// Computes the next close of the running pattern and counts the step.
    ///
    /// On the last step the pattern is cleared and the cooldown re-armed.
    ///
    /// ### Returns
    /// `None` when no pattern is active.
    pub fn step<R: Rng>(&mut self, last: f64, volatility: f64, floor: f64, rng: &mut R) -> Option<f64> {
        let active = self.active.as_mut()?;
        let progress = active.progress();
        let close = active.pattern.next_close(progress, last, volatility, rng).floored(floor);

        active.remaining -= 1;
        if active.remaining == 0 {
            debug!(pattern = %active.kind(), "pattern finished");
            self.active = None;
            self.cooldown = self.config.cooldown;
        }
        Some(close)
    }

    /// Drops the running pattern and the queue, and re-arms the cooldown.
    pub fn reset(&mut self) {
        self.active = None;
        self.queue.clear();
        self.cooldown = self.config.cooldown;
    }
}
