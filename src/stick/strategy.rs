use super::profile::ControlProfile;
use super::range::StickRange;

/// Maps user intent to raw stick values. Closed over two variants; no open
/// runtime polymorphism is needed since every family picks one of these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Accel/decel with expo curve and an immediate boost on direction reversal.
    /// Used for discrete (keyboard-style) direction input.
    Incremental,
    /// Absolute mapping of a normalised input, with an optional expo curve.
    /// Used for continuous (joystick-style) input.
    Direct,
}

impl Strategy {
    /// Advance one axis by one tick. `value` is the normalised input in
    /// `[-1, +1]`; for `Incremental` only its sign is meaningful (direction).
    /// `boost_enabled` gates the immediate-response jump (pitch/roll only).
    #[allow(clippy::too_many_arguments)]
    pub fn apply_axis(
        &self,
        range: &StickRange,
        profile: &ControlProfile,
        cur: f64,
        value: f64,
        dt: f64,
        last_dir: &mut f64,
        boost_enabled: bool,
    ) -> f64 {
        match self {
            Strategy::Direct => {
                let expo = profile.expo_factor;
                let v = if expo != 0.0 {
                    value.signum() * value.abs().powf(1.0 + expo)
                } else {
                    value
                };
                *last_dir = value.signum();
                scale_normalised(range, v)
            }
            Strategy::Incremental => {
                let accel_rate = profile.accel_ratio * range.half_range();
                let decel_rate = profile.decel_ratio * range.half_range();
                let immediate_response = profile.immediate_ratio * range.full_range();
                let direction = value.signum();

                let new = if direction > 0.0 {
                    let mut cur = cur;
                    if boost_enabled && *last_dir <= 0.0 {
                        let jump = (range.max - cur).min(immediate_response);
                        cur += jump;
                    }
                    let distance_to_max = range.max - cur;
                    let accel = accel_rate * dt * (1.0 + profile.expo_factor * distance_to_max / range.half_range());
                    (cur + accel).min(range.max)
                } else if direction < 0.0 {
                    let mut cur = cur;
                    if boost_enabled && *last_dir >= 0.0 {
                        let jump = (cur - range.min).min(immediate_response);
                        cur -= jump;
                    }
                    let distance_to_min = cur - range.min;
                    let accel = accel_rate * dt * (1.0 + profile.expo_factor * distance_to_min / (range.mid - range.min));
                    (cur - accel).max(range.min)
                } else if cur > range.mid {
                    let distance_from_center = cur - range.mid;
                    let decel = decel_rate * dt * (1.0 + 0.5 * distance_from_center / range.half_range());
                    (cur - decel).max(range.mid)
                } else if cur < range.mid {
                    let distance_from_center = range.mid - cur;
                    let decel = decel_rate * dt * (1.0 + 0.5 * distance_from_center / (range.mid - range.min));
                    (cur + decel).min(range.mid)
                } else {
                    cur
                };

                *last_dir = direction;
                new
            }
        }
    }
}

fn scale_normalised(range: &StickRange, value: f64) -> f64 {
    if value >= 0.0 {
        range.mid + value * range.half_range()
    } else {
        range.mid + value * (range.mid - range.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> StickRange {
        StickRange::new(60.0, 128.0, 200.0)
    }

    #[test]
    fn direct_maps_full_deflection_to_bounds() {
        let profile = super::super::profile::ControlProfile { expo_factor: 0.0, ..super::super::profile::NORMAL };
        let mut last_dir = 0.0;
        let r = range();
        let max = Strategy::Direct.apply_axis(&r, &profile, r.mid, 1.0, 0.1, &mut last_dir, false);
        let min = Strategy::Direct.apply_axis(&r, &profile, r.mid, -1.0, 0.1, &mut last_dir, false);
        assert!((max - r.max).abs() < 1e-9);
        assert!((min - r.min).abs() < 1e-9);
    }

    #[test]
    fn incremental_decays_toward_mid() {
        let r = range();
        let profile = super::super::profile::ControlProfile {
            accel_ratio: 2.5,
            decel_ratio: 2.5,
            expo_factor: 0.0,
            immediate_ratio: 0.0,
            name: "test",
        };
        let mut last_dir = 0.0;
        let new = Strategy::Incremental.apply_axis(&r, &profile, r.max, 0.0, 0.1, &mut last_dir, false);
        // decel_rate = 2.5 * 72 = 180; decel = 180*0.1*(1+0.5*1.0) = 27.0
        assert!((new - 173.0).abs() < 1e-9, "got {new}");
    }

    #[test]
    fn incremental_stays_within_bounds() {
        let r = range();
        let profile = super::super::profile::NORMAL;
        let mut last_dir = 0.0;
        for _ in 0..1000 {
            let v = Strategy::Incremental.apply_axis(&r, &profile, r.max, 1.0, 0.1, &mut last_dir, true);
            assert!(v <= r.max && v >= r.min);
        }
    }
}
