//! # alt-tracker - head tracking from Antilatency Alt trackers
//!
//! Polls an Alt tracker on the Antilatency device network and turns its pose
//! into the six channels a head-tracking host consumes. Provides:
//! - Automatic session management: idle trackers are picked up when they
//!   appear, finished sessions are torn down on disconnect
//! - Pose extrapolation and optional placement correction
//! - Quaternion/Euler math matching the host's channel conventions
//! - C FFI for integration with C/C++ hosts
//! - An in-process simulated SDK for tests and demos
//!
//! ## Quick Start
//! ```no_run
//! use alt_tracker::sim::{SimControl, SimDevice};
//! use alt_tracker::{AltTracker, NodeHandle, Settings};
//!
//! let device = SimDevice::new();
//! device.send(SimControl::Store { key: "environment".into(), value: "grid".into() });
//! device.send(SimControl::Connect(NodeHandle(1)));
//!
//! let mut tracker = AltTracker::new(device.collaborators(), Settings::default());
//! tracker.start_tracker().unwrap();
//! for _ in 0..100 {
//!     let data = tracker.sample();
//!     println!("yaw={:.1} pitch={:.1} roll={:.1}", data.yaw, data.pitch, data.roll);
//! }
//! ```

pub mod error;
pub mod math;
pub mod types;
pub mod settings;
pub mod sdk;
pub mod session;
pub mod sampler;
pub mod tracker;
pub mod sim;
pub mod ffi;

pub use error::{SessionError, TrackerError};
pub use math::{EulerAngles, Quaternion, Vector3};
pub use types::*;
pub use settings::Settings;
pub use sdk::Collaborators;
pub use session::SessionManager;
pub use sampler::{PoseSampler, SamplerState, Transition};
pub use tracker::AltTracker;

/// Result type alias for alt-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
