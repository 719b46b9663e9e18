//! Quote pricing: fair value, minimum profitable quotes, and the aggression
//! adjustment that keeps quotes from crossing the quoted venue's book.
//!
//! All arithmetic is `Decimal` so tick quantization is exact.

use rust_decimal::Decimal;
use venues::Bbo;

/// Pricing parameters: venue tick and the combined fee/profit/risk offset.
#[derive(Debug, Clone, Copy)]
pub struct QuoteParams {
    pub tick: Decimal,
    pub offset: Decimal,
}

/// The prices the strategy wants resting on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteTargets {
    pub bid: Decimal,
    pub ask: Decimal,
}

/// Round down to the nearest tick.
pub fn floor_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).floor() * tick
}

/// Round up to the nearest tick.
pub fn ceil_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).ceil() * tick
}

/// Compute quote targets from both venues' tops of book.
///
/// Fair value is the midpoint of the two venue mids. The minimum quotes are
/// the tick-quantized prices still profitable after the offset:
///
/// ```text
///   min_bid = floor_to_tick(mid · (1 − offset))
///   min_ask = ceil_to_tick (mid · (1 + offset))
/// ```
///
/// When the quoted venue trades below the hedge venue, the bid is capped one
/// tick under the quoted venue's best ask (never cross our own market) and
/// the ask is pulled up to at least the hedge venue's best ask, so an ask
/// fill can be covered by taking the hedge venue's offer. The mirror
/// adjustment applies when the quoted venue trades rich.
pub fn compute_targets(quoted: &Bbo, hedge: &Bbo, params: &QuoteParams) -> QuoteTargets {
    let mid_a = quoted.mid();
    let mid_b = hedge.mid();
    let mid = (mid_a + mid_b) / Decimal::TWO;

    let min_bid = floor_to_tick(mid * (Decimal::ONE - params.offset), params.tick);
    let min_ask = ceil_to_tick(mid * (Decimal::ONE + params.offset), params.tick);

    let (bid, ask) = if mid_a < mid_b {
        (
            min_bid.min(quoted.ask - params.tick),
            min_ask.max(ceil_to_tick(hedge.ask, params.tick)),
        )
    } else if mid_a > mid_b {
        (
            min_bid.min(floor_to_tick(hedge.bid, params.tick)),
            min_ask.max(quoted.bid + params.tick),
        )
    } else {
        (min_bid, min_ask)
    };

    QuoteTargets { bid, ask }
}
