//! Dirt and aging levels computed at read time.
//!
//! These reproduce the contract's integer arithmetic: thresholds are whole
//! days, intervals are floor-divided, and nothing here reads the clock. Callers
//! pass `now` explicitly.

use crate::{AgingThresholds, ChainConfig, DerivedDynamic, DerivedView, FrameTier, TokenRecord};
use chrono::{DateTime, Utc};

/// Timestamps above this are milliseconds.
pub const MILLISECOND_CUTOFF: u64 = 10_000_000_000;

pub const SECONDS_PER_DAY: u64 = 86_400;

pub const MAX_AGING_LEVEL: u8 = 10;

pub const MAX_DIRT_LEVEL: u8 = 2;

/// Bring a seconds-or-milliseconds timestamp to seconds.
pub fn normalize_timestamp(raw: u64) -> u64 {
    if raw > MILLISECOND_CUTOFF {
        raw / 1000
    } else {
        raw
    }
}

/// Seconds since `last_cleaned`, or `None` when it lies in the future.
fn elapsed_secs(last_cleaned: u64, now: DateTime<Utc>) -> Option<u128> {
    let elapsed = i128::from(now.timestamp()) - i128::from(normalize_timestamp(last_cleaned));
    u128::try_from(elapsed).ok()
}

fn days_to_secs(days: u64) -> u128 {
    u128::from(days) * u128::from(SECONDS_PER_DAY)
}

/// Dirt level in `0..=2`.
pub fn dirt_level(
    last_cleaned: u64,
    frame: FrameTier,
    thresholds: &AgingThresholds,
    now: DateTime<Utc>,
) -> u8 {
    let Some(elapsed) = elapsed_secs(last_cleaned, now) else {
        return 0;
    };
    if frame.is_dirt_immune() {
        return 0;
    }

    let (num, den) = frame.dirt_threshold_scale();
    let scaled = |days: u64| days_to_secs(days) * u128::from(num) / u128::from(den);

    if elapsed >= scaled(thresholds.dirt_level2_days) {
        2
    } else if elapsed >= scaled(thresholds.dirt_level1_days) {
        1
    } else {
        0
    }
}

/// Aging level in `0..=10`: the stored base plus one step per elapsed interval.
pub fn aging_level(
    last_cleaned: u64,
    frame: FrameTier,
    base_aging_level: u8,
    thresholds: &AgingThresholds,
    now: DateTime<Utc>,
) -> u8 {
    let base = base_aging_level.min(MAX_AGING_LEVEL);
    let Some(elapsed) = elapsed_secs(last_cleaned, now) else {
        return base;
    };

    let interval = days_to_secs(thresholds.aging_advance_days) * 100
        / u128::from(frame.aging_multiplier());
    if interval == 0 {
        return base;
    }

    let advanced = elapsed / interval;
    let level = (u128::from(base) + advanced).min(u128::from(MAX_AGING_LEVEL));
    level as u8
}

/// Attach derived levels to a record.
///
/// Without a config the levels degrade to dirt 0 and the clamped stored base.
pub fn derive_view(
    record: TokenRecord,
    config: Option<&ChainConfig>,
    now: DateTime<Utc>,
) -> DerivedView {
    let TokenRecord { permanent, dynamic } = record;
    let (dirt, aging) = match config {
        Some(config) => (
            dirt_level(dynamic.last_cleaned, dynamic.frame_level, &config.thresholds, now),
            aging_level(
                dynamic.last_cleaned,
                dynamic.frame_level,
                dynamic.base_aging_level,
                &config.thresholds,
                now,
            ),
        ),
        None => (0, dynamic.base_aging_level.min(MAX_AGING_LEVEL)),
    };

    DerivedView {
        token_id: permanent.token_id,
        permanent,
        dynamic: DerivedDynamic {
            record: dynamic,
            dirt_level: dirt,
            aging_level: aging,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
