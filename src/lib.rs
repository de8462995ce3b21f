//! # groundstation
//!
//! Consumer quadcopters built around a WiFi AP radio link do not agree on a
//! wire protocol. Depending on the vendor chipset, a drone speaks one of
//! three distinct "families": a 20-byte XOR-checksummed stick frame with a
//! headered UDP video feed (family A), a 124-byte frame sharing one duplex
//! socket with a pull-based, headerless video feed (family B), or a 9-byte
//! frame paired with an independent heartbeat and an RTSP video stream
//! (family C). This crate is the ground-station half of that conversation:
//! it turns stick/axis input into the family-appropriate control byte
//! stream at a fixed rate, and turns whatever video bytes the drone sends
//! back into JPEG frames a caller can display.
//!
//! It does not discover drones, parse a CLI, or decode RTSP/H264 streams;
//! those are the embedding binary's job (an `RtspBackend` implementation is
//! supplied by the caller for family C). This crate's job starts at
//! [`SessionConfig`] and ends at [`Supervisor`].
//!
//! ## Example
//!
//! ```no_run
//! use groundstation::{Family, SessionConfig, Supervisor};
//!
//! fn main() -> groundstation::Result<()> {
//!     let mut config = SessionConfig::for_family(Family::A);
//!     config.with_video = true;
//!
//!     let supervisor = Supervisor::new(config)?;
//!     supervisor.axis_mux.set_axes(0.0, 0.0, 0.3, 0.0);
//!     supervisor.model.lock().unwrap().takeoff();
//!
//!     if let Some(frame) = supervisor.frame_queue.get_timeout(std::time::Duration::from_secs(1)) {
//!         println!("frame {} ({} bytes)", frame.frame_id, frame.data.len());
//!     }
//!
//!     supervisor.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Control model
//!
//! Axis input (throttle/yaw/pitch/roll, each `-1.0..=1.0`) is written to an
//! [`AxisMux`] from whatever source the caller wires up (keyboard, gamepad,
//! a script). A [`StickModel`] turns the latest axis snapshot into absolute
//! stick positions using one of two [`Strategy`] implementations -
//! incremental (accel/decel, the default for hand controllers) or direct
//! (absolute mapping, closer to a simulator's feel). The control scheduler
//! samples the model at the family's native rate and hands the result to a
//! family-specific encoder.

mod axis_mux;
mod broker;
mod config;
mod error;
mod families;
mod jpeg;
mod queue;
mod scheduler;
mod stick;
mod supervisor;
mod transport;
mod video;

pub use axis_mux::AxisMux;
pub use config::{Family, SessionConfig};
pub use error::{GroundStationError, Result};
pub use queue::DroppingQueue;
pub use stick::{AxisInput, ControlProfile, ControlState, OneShotFlags, StickModel, StickRange, Strategy};
pub use supervisor::Supervisor;
pub use transport::{LinkHealth, Transport};
pub use video::VideoFrame;

pub use families::family_c::RtspBackend;
