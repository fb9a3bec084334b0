//! Rollover detector — spec §4.P (futures only).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverDecision {
    Roll,
    Hold,
}

/// Days-to-expiry takes priority over the volume crossover check (spec
/// §4.P): close to expiry rolls unconditionally regardless of volume.
pub fn check_rollover(days_to_expiry: i64, front_month_volume: u64, next_month_volume: u64, days_before_expiry: i64) -> RolloverDecision {
    if days_to_expiry <= days_before_expiry {
        RolloverDecision::Roll
    } else if next_month_volume > front_month_volume {
        RolloverDecision::Roll
    } else {
        RolloverDecision::Hold
    }
}
