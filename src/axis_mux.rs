use std::sync::Mutex;

use crate::stick::AxisInput;

/// The single entry point allowed to mutate stick direction inputs. Guarantees
/// readers never observe a partially-updated tuple: the four axes and the
/// source tag are replaced together under one lock.
#[derive(Debug)]
pub struct AxisMux {
    inner: Mutex<(String, AxisInput)>,
}

impl Default for AxisMux {
    fn default() -> AxisMux {
        AxisMux {
            inner: Mutex::new(("init".to_string(), AxisInput::default())),
        }
    }
}

impl AxisMux {
    pub fn new() -> AxisMux {
        AxisMux::default()
    }

    pub fn set_axes(&self, throttle: f64, yaw: f64, pitch: f64, roll: f64) {
        self.set_axes_from("unknown", throttle, yaw, pitch, roll);
    }

    pub fn set_axes_from(&self, source: &str, throttle: f64, yaw: f64, pitch: f64, roll: f64) {
        let axes = AxisInput::clamped(throttle, yaw, pitch, roll);
        let mut guard = self.inner.lock().expect("axis mux lock poisoned");
        *guard = (source.to_string(), axes);
        tracing::debug!(src = source, throttle = axes.throttle, yaw = axes.yaw, pitch = axes.pitch, roll = axes.roll, "axis update");
    }

    /// Atomic snapshot consumed by the control scheduler once per tick.
    pub fn snapshot(&self) -> (String, AxisInput) {
        self.inner.lock().expect("axis mux lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_writer_wins_and_tags_source() {
        let mux = AxisMux::new();
        mux.set_axes_from("plugin-follow", 0.5, 0.0, 0.0, 0.0);
        let (source, axes) = mux.snapshot();
        assert_eq!(source, "plugin-follow");
        assert_eq!(axes.throttle, 0.5);
    }

    #[test]
    fn clamps_out_of_range_axes() {
        let mux = AxisMux::new();
        mux.set_axes(2.0, -2.0, 0.0, 0.0);
        let (_, axes) = mux.snapshot();
        assert_eq!(axes.throttle, 1.0);
        assert_eq!(axes.yaw, -1.0);
    }
}
