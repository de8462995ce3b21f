use super::profile::{self, ControlProfile};
use super::range::StickRange;
use super::strategy::Strategy;

/// Normalised stick input, each axis clamped to `[-1, +1]` on ingress.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisInput {
    pub throttle: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl AxisInput {
    pub fn clamped(throttle: f64, yaw: f64, pitch: f64, roll: f64) -> AxisInput {
        AxisInput {
            throttle: throttle.max(-1.0).min(1.0),
            yaw: yaw.max(-1.0).min(1.0),
            pitch: pitch.max(-1.0).min(1.0),
            roll: roll.max(-1.0).min(1.0),
        }
    }
}

/// One-shot command flags. Not every family honors every flag; an encoder
/// reads only the subset its wire format has room for.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OneShotFlags {
    pub takeoff: bool,
    pub land: bool,
    pub emergency_stop: bool,
    pub flip: bool,
    pub calibrate: bool,
}

/// Snapshot returned by `StickModel::state()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub throttle: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub headless: bool,
    pub recording: bool,
}

/// Mutable per-session stick state shared by every family's control encoder.
#[derive(Debug, Clone)]
pub struct StickModel {
    range: StickRange,
    profile: ControlProfile,
    strategy: Strategy,

    throttle: f64,
    yaw: f64,
    pitch: f64,
    roll: f64,

    last_throttle_dir: f64,
    last_yaw_dir: f64,
    last_pitch_dir: f64,
    last_roll_dir: f64,

    pub flags: OneShotFlags,
    headless: bool,
    recording: bool,
}

impl StickModel {
    pub fn new(range: StickRange) -> StickModel {
        StickModel {
            range,
            profile: profile::NORMAL,
            strategy: Strategy::Incremental,
            throttle: range.mid,
            yaw: range.mid,
            pitch: range.mid,
            roll: range.mid,
            last_throttle_dir: 0.0,
            last_yaw_dir: 0.0,
            last_pitch_dir: 0.0,
            last_roll_dir: 0.0,
            flags: OneShotFlags::default(),
            headless: false,
            recording: false,
        }
    }

    pub fn range(&self) -> StickRange {
        self.range
    }

    /// Advance all four axes one tick. Pitch and roll get the immediate
    /// direction-change boost; throttle and yaw do not.
    pub fn update(&mut self, dt: f64, axes: AxisInput) {
        self.throttle = self.strategy.apply_axis(
            &self.range, &self.profile, self.throttle, axes.throttle, dt, &mut self.last_throttle_dir, false,
        );
        self.yaw = self.strategy.apply_axis(
            &self.range, &self.profile, self.yaw, axes.yaw, dt, &mut self.last_yaw_dir, false,
        );
        self.pitch = self.strategy.apply_axis(
            &self.range, &self.profile, self.pitch, axes.pitch, dt, &mut self.last_pitch_dir, true,
        );
        self.roll = self.strategy.apply_axis(
            &self.range, &self.profile, self.roll, axes.roll, dt, &mut self.last_roll_dir, true,
        );
    }

    pub fn set_profile(&mut self, name: &str) {
        if let Some(p) = profile::by_name(name) {
            self.profile = p;
        }
    }

    /// Cycles through `[normal, precise, aggressive]`.
    pub fn set_sensitivity(&mut self, index: usize) {
        self.profile = profile::PRESET_CYCLE[index % profile::PRESET_CYCLE.len()];
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    pub fn takeoff(&mut self) {
        self.flags.takeoff = true;
    }
    pub fn land(&mut self) {
        self.flags.land = true;
    }
    pub fn emergency_stop(&mut self) {
        self.flags.emergency_stop = true;
    }
    pub fn flip(&mut self) {
        self.flags.flip = true;
    }
    pub fn calibrate(&mut self) {
        self.flags.calibrate = true;
    }

    pub fn toggle_headless(&mut self) -> bool {
        self.headless = !self.headless;
        self.headless
    }
    pub fn headless(&self) -> bool {
        self.headless
    }

    pub fn toggle_record(&mut self) -> bool {
        self.recording = !self.recording;
        self.recording
    }
    pub fn recording(&self) -> bool {
        self.recording
    }

    /// Clears every non-toggle one-shot flag. Encoders call this exactly
    /// once per emitted packet, after reading the flags into the wire frame.
    pub fn clear_one_shots(&mut self) {
        self.flags = OneShotFlags::default();
    }

    pub fn state(&self) -> ControlState {
        ControlState {
            throttle: self.throttle,
            yaw: self.yaw,
            pitch: self.pitch,
            roll: self.roll,
            headless: self.headless,
            recording: self.recording,
        }
    }

    pub fn raw(&self) -> (f64, f64, f64, f64) {
        (self.throttle, self.yaw, self.pitch, self.roll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_mid() {
        let m = StickModel::new(StickRange::new(60.0, 128.0, 200.0));
        let s = m.state();
        assert_eq!(s.throttle, 128.0);
        assert_eq!(s.roll, 128.0);
    }

    #[test]
    fn axes_stay_in_bounds_under_sustained_input() {
        let mut m = StickModel::new(StickRange::new(60.0, 128.0, 200.0));
        for _ in 0..10_000 {
            m.update(0.05, AxisInput::clamped(1.0, -1.0, 1.0, -1.0));
        }
        let s = m.state();
        let r = m.range();
        for v in [s.throttle, s.yaw, s.pitch, s.roll] {
            assert!(v >= r.min && v <= r.max);
        }
    }

    #[test]
    fn neutral_input_converges_to_mid() {
        let mut m = StickModel::new(StickRange::new(60.0, 128.0, 200.0));
        m.update(0.1, AxisInput::clamped(1.0, 1.0, 1.0, 1.0));
        for _ in 0..10_000 {
            m.update(0.1, AxisInput::default());
        }
        let s = m.state();
        assert!((s.throttle - 128.0).abs() < 1e-6);
        assert!((s.pitch - 128.0).abs() < 1e-6);
    }

    #[test]
    fn one_shot_flag_clears_after_read() {
        let mut m = StickModel::new(StickRange::new(60.0, 128.0, 200.0));
        m.takeoff();
        assert!(m.flags.takeoff);
        m.clear_one_shots();
        assert!(!m.flags.takeoff);
    }

    #[test]
    fn headless_is_a_persistent_toggle() {
        let mut m = StickModel::new(StickRange::new(60.0, 128.0, 200.0));
        assert!(!m.headless());
        m.toggle_headless();
        assert!(m.headless());
        m.clear_one_shots();
        assert!(m.headless(), "headless must survive one-shot clearing");
    }
}
