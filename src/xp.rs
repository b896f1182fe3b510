use std::fmt;

use serde::Serialize;

use crate::error::{non_negative, Result};
use crate::models::RewardFlags;

/// Bonus multipliers as exact ratios, applied in this order.
const FIRST_TRY_BONUS: (u128, u128) = (125, 100);
const UNDER_TIME_BONUS: (u128, u128) = (110, 100);
const PERFECT_SCORE_BONUS: (u128, u128) = (115, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LevelTitle {
    Newcomer,
    Apprentice,
    Coder,
    Developer,
    Engineer,
    Expert,
    Master,
    Legend,
}

impl LevelTitle {
    pub fn as_str(self) -> &'static str {
        match self {
            LevelTitle::Newcomer => "Newcomer",
            LevelTitle::Apprentice => "Apprentice",
            LevelTitle::Coder => "Coder",
            LevelTitle::Developer => "Developer",
            LevelTitle::Engineer => "Engineer",
            LevelTitle::Expert => "Expert",
            LevelTitle::Master => "Master",
            LevelTitle::Legend => "Legend",
        }
    }
}

impl fmt::Display for LevelTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative XP needed to reach `level`.
///
/// Reaching level `L` from `L - 1` costs `L * 100`, so the threshold is
/// `50 * L * (L + 1) - 100`. Levels 0 and 1 need nothing. Saturates at
/// `u64::MAX` for levels no XP total can reach.
pub fn xp_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let level = u128::from(level);
    let threshold = 50 * level * (level + 1) - 100;
    u64::try_from(threshold).unwrap_or(u64::MAX)
}

/// Largest level whose threshold does not exceed `total_xp`.
pub fn level_from_xp(total_xp: i64) -> Result<u32> {
    let xp = non_negative("total_xp", total_xp)?;
    Ok(level_for(xp))
}

// Solves 50 * L * (L + 1) <= xp + 100 for the largest integer L. The float
// estimate is only a starting point; the integer checks decide.
fn level_for(xp: u64) -> u32 {
    let budget = (xp + 100) / 50;
    let mut level = ((((4 * budget + 1) as f64).sqrt() - 1.0) / 2.0) as u64;
    while level > 1 && level * (level + 1) > budget {
        level -= 1;
    }
    while (level + 1) * (level + 2) <= budget {
        level += 1;
    }
    u32::try_from(level.max(1)).unwrap_or(u32::MAX)
}

/// Percentage of the way from the current level threshold to the next one,
/// rounded half up and clamped to `0..=100`.
pub fn progress_to_next(total_xp: i64) -> Result<u8> {
    let xp = non_negative("total_xp", total_xp)?;
    let level = level_for(xp);
    let into_level = u128::from(xp - xp_for_level(level));
    let span = (u128::from(level) + 1) * 100;
    let percent = (into_level * 200 + span) / (span * 2);
    Ok(percent.min(100) as u8)
}

/// XP still missing before the next level is reached.
pub fn xp_to_next(total_xp: i64) -> Result<u64> {
    let xp = non_negative("total_xp", total_xp)?;
    let level = level_for(xp);
    Ok(xp_for_level(level.saturating_add(1)).saturating_sub(xp))
}

pub fn title_for_level(level: u32) -> LevelTitle {
    match level {
        50.. => LevelTitle::Legend,
        40..=49 => LevelTitle::Master,
        30..=39 => LevelTitle::Expert,
        20..=29 => LevelTitle::Engineer,
        15..=19 => LevelTitle::Developer,
        10..=14 => LevelTitle::Coder,
        5..=9 => LevelTitle::Apprentice,
        _ => LevelTitle::Newcomer,
    }
}

/// Applies every earned bonus to `base_xp` as one running product and rounds
/// once, half up, at the end.
pub fn calculate_reward(base_xp: i64, flags: RewardFlags) -> Result<u64> {
    let base = non_negative("base_xp", base_xp)?;
    let mut numerator = u128::from(base);
    let mut denominator = 1u128;

    for (earned, (num, den)) in [
        (flags.first_try, FIRST_TRY_BONUS),
        (flags.under_time, UNDER_TIME_BONUS),
        (flags.perfect_score, PERFECT_SCORE_BONUS),
    ] {
        if earned {
            numerator *= num;
            denominator *= den;
        }
    }

    let rounded = (numerator * 2 + denominator) / (denominator * 2);
    Ok(u64::try_from(rounded).unwrap_or(u64::MAX))
}
