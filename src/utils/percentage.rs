use std::{fmt::Display, ops::Deref};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || !value.is_finite() {
            None
        } else {
            Some(Percentage(value))
        }
    }

    pub fn zero() -> Percentage {
        Percentage(0.)
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// How much of a working day (`working_hours`) the tracked time fills. Can go past 100%.
/// Non-positive working hours give 0%.
pub fn capacity_percentage(tracked_seconds: i64, working_hours: f64) -> Percentage {
    if working_hours <= 0. {
        return Percentage::zero();
    }
    let tracked_hours = tracked_seconds.max(0) as f64 / 3600.;
    Percentage::new_opt(tracked_hours / working_hours * 100.).unwrap_or_else(Percentage::zero)
}
