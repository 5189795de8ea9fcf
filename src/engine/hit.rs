use super::types::Side;

/// Barrier event inside a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitEvent {
    TakeProfit,
    StopLoss,
}

impl HitEvent {
    /// ±1 encoding used by the batched simulator.
    pub fn code(self) -> i8 {
        match self {
            HitEvent::TakeProfit => 1,
            HitEvent::StopLoss => -1,
        }
    }
}

/// Priority order (first, second) for a segment moving `p0 -> p1`.
///
/// Rising price serves the buyer's take-profit before the stop; a seller
/// sees the mirror image. A flat segment has no priority: only the
/// both-barriers tie-break below can fire on it.
fn segment_priority(side: Side, p0: f64, p1: f64) -> (Option<HitEvent>, Option<HitEvent>) {
    if p1 > p0 {
        match side {
            Side::Buy => (Some(HitEvent::TakeProfit), Some(HitEvent::StopLoss)),
            Side::Sell => (Some(HitEvent::StopLoss), Some(HitEvent::TakeProfit)),
        }
    } else if p1 < p0 {
        match side {
            Side::Buy => (Some(HitEvent::StopLoss), Some(HitEvent::TakeProfit)),
            Side::Sell => (Some(HitEvent::TakeProfit), Some(HitEvent::StopLoss)),
        }
    } else {
        (None, None)
    }
}

/// Adjudicate one segment of the synthetic tick path.
///
/// When both barriers fit inside the segment the stop wins: the losing side
/// is assumed to be served first whenever the path could have touched either.
pub fn resolve_segment(side: Side, p0: f64, p1: f64, sl: f64, tp: f64) -> Option<HitEvent> {
    let (lo, hi) = if p0 <= p1 { (p0, p1) } else { (p1, p0) };
    let hit_tp = (lo..=hi).contains(&tp);
    let hit_sl = (lo..=hi).contains(&sl);

    if hit_tp && hit_sl {
        return Some(HitEvent::StopLoss);
    }

    let (first, second) = segment_priority(side, p0, p1);
    for event in [first, second].into_iter().flatten() {
        match event {
            HitEvent::TakeProfit if hit_tp => return Some(HitEvent::TakeProfit),
            HitEvent::StopLoss if hit_sl => return Some(HitEvent::StopLoss),
            _ => {}
        }
    }
    None
}

/// Walk the three consecutive segments of a 4-tick path and return the first
/// barrier event, or `None` when the bar resolves nothing.
pub fn resolve_hit(side: Side, path: &[f64; 4], sl: f64, tp: f64) -> Option<HitEvent> {
    for pair in path.windows(2) {
        if let Some(event) = resolve_segment(side, pair[0], pair[1], sl, tp) {
            return Some(event);
        }
    }
    None
}
