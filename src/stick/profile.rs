/// Profile parameters expressed as ratios of the stick range.
///
/// - `accel_ratio` / `decel_ratio`: fraction of half-range applied per second.
/// - `expo_factor`: dimensionless curve exponent.
/// - `immediate_ratio`: fraction of full range for the one-shot direction-change boost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlProfile {
    pub name: &'static str,
    pub accel_ratio: f64,
    pub decel_ratio: f64,
    pub expo_factor: f64,
    pub immediate_ratio: f64,
}

pub const NORMAL: ControlProfile = ControlProfile {
    name: "normal",
    accel_ratio: 2.0,
    decel_ratio: 4.0,
    expo_factor: 0.5,
    immediate_ratio: 0.02,
};

pub const PRECISE: ControlProfile = ControlProfile {
    name: "precise",
    accel_ratio: 1.2,
    decel_ratio: 5.0,
    expo_factor: 0.3,
    immediate_ratio: 0.01,
};

pub const AGGRESSIVE: ControlProfile = ControlProfile {
    name: "aggressive",
    accel_ratio: 4.0,
    decel_ratio: 3.0,
    expo_factor: 1.2,
    immediate_ratio: 0.10,
};

/// The fixed cycle order used by `StickModel::set_sensitivity`.
pub const PRESET_CYCLE: [ControlProfile; 3] = [NORMAL, PRECISE, AGGRESSIVE];

pub fn by_name(name: &str) -> Option<ControlProfile> {
    PRESET_CYCLE.iter().copied().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_name() {
        assert_eq!(by_name("precise"), Some(PRECISE));
        assert_eq!(by_name("nonexistent"), None);
    }
}
