use crate::error::TrackerError;
use crate::sampler::{PoseSampler, SamplerState};
use crate::sdk::Collaborators;
use crate::session::SessionManager;
use crate::settings::Settings;
use crate::types::{Libraries, TrackerData, AXIS_COUNT};
use crate::Result;

/// Head-tracking source backed by an Antilatency Alt tracker.
///
/// The host calls [`AltTracker::start_tracker`] once and then
/// [`AltTracker::data`] (or [`AltTracker::sample`]) every tick. Missing
/// libraries or devices never fail a poll; the tracker reports the identity
/// pose until a tracker is connected and configured.
pub struct AltTracker {
    sampler: PoseSampler,
}

impl AltTracker {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        log::info!(
            "Alt tracker: placement correction {}, extrapolation {:.3}s",
            if settings.use_placement_correction { "on" } else { "off" },
            settings.extrapolation_time
        );
        Self {
            sampler: PoseSampler::new(SessionManager::new(collaborators, settings)),
        }
    }

    /// Verify every collaborator, reporting the first one missing.
    pub fn start_tracker(&self) -> Result<()> {
        let sessions = self.sampler.sessions();
        let loaded = sessions.loaded_libraries();

        if !loaded.contains(Libraries::DEVICE_NETWORK) {
            return Err(TrackerError::DeviceNetworkLibraryMissing);
        }
        if !loaded.contains(Libraries::ALT_TRACKING) {
            return Err(TrackerError::TrackingLibraryMissing);
        }
        if !loaded.contains(Libraries::STORAGE_CLIENT) {
            return Err(TrackerError::StorageClientLibraryMissing);
        }
        if !loaded.contains(Libraries::ENVIRONMENT_SELECTOR) {
            return Err(TrackerError::EnvironmentSelectorLibraryMissing);
        }
        if sessions.network().is_none() {
            return Err(TrackerError::NetworkUnavailable);
        }
        if !sessions.has_cotask_constructor() {
            return Err(TrackerError::CotaskConstructorUnavailable);
        }

        Ok(())
    }

    /// Sample the tracker: Euler angles in degrees, translation in centimeters.
    pub fn sample(&mut self) -> TrackerData {
        let pose = self.sampler.sample();
        let euler = pose.rotation.to_euler_angles();

        TrackerData {
            yaw: euler.yaw,
            pitch: euler.pitch,
            roll: euler.roll,
            tx: pose.position.x as f64,
            ty: pose.position.y as f64,
            tz: pose.position.z as f64,
        }
    }

    /// Write one sample into the host's six-channel buffer.
    pub fn data(&mut self, out: &mut [f64; AXIS_COUNT]) {
        *out = self.sample().to_axes();
    }

    /// Alt tracking is absolute; there is nothing to recenter here.
    pub fn center(&mut self) -> bool {
        false
    }

    pub fn is_tracking(&self) -> bool {
        self.sampler.state() == SamplerState::SessionActive
    }

    pub fn settings(&self) -> &Settings {
        self.sampler.sessions().settings()
    }
}

impl Drop for AltTracker {
    fn drop(&mut self) {
        self.sampler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quaternion, Vector3};
    use crate::session::{ENVIRONMENT_KEY, PLACEMENT_KEY};
    use crate::sim::{SimControl, SimDevice};
    use crate::types::{NodeHandle, Pose, Stage, AXIS_ROLL, AXIS_TX, AXIS_YAW};

    fn ready_device() -> SimDevice {
        let device = SimDevice::new();
        device.send(SimControl::Store {
            key: ENVIRONMENT_KEY.into(),
            value: "grid".into(),
        });
        device.send(SimControl::Connect(NodeHandle(1)));
        device
    }

    fn tracker(device: &SimDevice) -> AltTracker {
        AltTracker::new(device.collaborators(), Settings::default())
    }

    #[test]
    fn test_start_tracker_ok() {
        let device = ready_device();
        assert!(tracker(&device).start_tracker().is_ok());
    }

    #[test]
    fn test_start_tracker_reports_first_missing_library() {
        let device = SimDevice::new()
            .with_libraries(Libraries::DEVICE_NETWORK | Libraries::STORAGE_CLIENT);
        let err = tracker(&device).start_tracker().unwrap_err();
        assert!(matches!(err, TrackerError::TrackingLibraryMissing));
        assert_eq!(err.to_string(), "Antilatency Alt Tracking library is null");

        let device = SimDevice::new().with_libraries(Libraries::empty());
        assert!(matches!(
            tracker(&device).start_tracker(),
            Err(TrackerError::DeviceNetworkLibraryMissing)
        ));

        let device = SimDevice::new().with_libraries(Libraries::all() - Libraries::ENVIRONMENT_SELECTOR);
        assert!(matches!(
            tracker(&device).start_tracker(),
            Err(TrackerError::EnvironmentSelectorLibraryMissing)
        ));
    }

    #[test]
    fn test_start_tracker_checks_network_then_constructor() {
        let device = SimDevice::new();
        device.send(SimControl::NetworkAvailable(false));
        device.send(SimControl::ConstructorAvailable(false));
        assert!(matches!(
            tracker(&device).start_tracker(),
            Err(TrackerError::NetworkUnavailable)
        ));

        let device = SimDevice::new();
        device.send(SimControl::ConstructorAvailable(false));
        assert!(matches!(
            tracker(&device).start_tracker(),
            Err(TrackerError::CotaskConstructorUnavailable)
        ));
    }

    #[test]
    fn test_inert_tracker_outputs_zero() {
        let device = SimDevice::new().with_libraries(Libraries::empty());
        let mut tracker = tracker(&device);
        assert!(tracker.start_tracker().is_err());
        assert_eq!(tracker.sample(), TrackerData::default());
    }

    #[test]
    fn test_identity_sample_without_device() {
        let device = SimDevice::new();
        let mut tracker = tracker(&device);
        let mut out = [f64::NAN; AXIS_COUNT];
        tracker.data(&mut out);
        assert_eq!(out, [0.0; AXIS_COUNT]);
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn test_sample_converts_pose() {
        let device = ready_device();
        let half = 15f32.to_radians();
        device.send(SimControl::SetState {
            pose: Pose::new(
                Vector3::new(1.0, 2.0, 3.0),
                Quaternion::new(0.0, half.sin(), 0.0, half.cos()),
            ),
            velocity: Vector3::ZERO,
            stage: Stage::Tracking6Dof,
        });
        let mut tracker = tracker(&device);
        let data = tracker.sample();
        assert!(tracker.is_tracking());
        assert_eq!((data.tx, data.ty, data.tz), (100.0, 200.0, 300.0));
        assert!((data.yaw - 30.0).abs() < 1e-4);
        assert!(data.pitch.abs() < 1e-4);
        assert!(data.roll.abs() < 1e-4);

        let mut out = [0.0; AXIS_COUNT];
        tracker.data(&mut out);
        assert_eq!(out[AXIS_TX], 100.0);
        assert!((out[AXIS_YAW] - 30.0).abs() < 1e-4);
        assert!(out[AXIS_ROLL].abs() < 1e-4);
    }

    #[test]
    fn test_gimbal_lock_output() {
        let device = ready_device();
        let half = 45f32.to_radians();
        device.send(SimControl::SetState {
            pose: Pose::new(
                Vector3::ZERO,
                Quaternion::new(0.0, 0.0, half.sin(), half.cos()),
            ),
            velocity: Vector3::ZERO,
            stage: Stage::Tracking6Dof,
        });
        let data = tracker(&device).sample();
        assert_eq!(data.roll, 90.0);
        assert_eq!(data.pitch, 0.0);
    }

    #[test]
    fn test_placement_disabled_ignores_stored_code() {
        let device = ready_device();
        device.send(SimControl::Store {
            key: PLACEMENT_KEY.into(),
            value: "head-strap".into(),
        });
        device.send(SimControl::DefinePlacement {
            code: "head-strap".into(),
            placement: Pose::new(Vector3::new(0.0, 0.0, 0.1), Quaternion::IDENTITY),
        });
        device.send(SimControl::SetState {
            pose: Pose::new(Vector3::new(0.0, 1.0, 0.0), Quaternion::IDENTITY),
            velocity: Vector3::ZERO,
            stage: Stage::Tracking6Dof,
        });

        let settings = Settings {
            use_placement_correction: false,
            ..Settings::default()
        };
        let mut tracker = AltTracker::new(device.collaborators(), settings);
        let data = tracker.sample();
        assert_eq!((data.tx, data.ty, data.tz), (0.0, 100.0, 0.0));
        assert_eq!(device.last_request().map(|(p, _)| p), Some(Pose::IDENTITY));
    }

    #[test]
    fn test_placement_enabled_applies_stored_code() {
        let device = ready_device();
        device.send(SimControl::Store {
            key: PLACEMENT_KEY.into(),
            value: "head-strap".into(),
        });
        device.send(SimControl::DefinePlacement {
            code: "head-strap".into(),
            placement: Pose::new(Vector3::new(0.0, 0.0, 0.25), Quaternion::IDENTITY),
        });
        let data = tracker(&device).sample();
        assert_eq!((data.tx, data.ty, data.tz), (0.0, 0.0, 25.0));
    }

    #[test]
    fn test_center_unsupported() {
        let device = ready_device();
        let mut tracker = tracker(&device);
        assert!(!tracker.center());
        tracker.sample();
        assert!(!tracker.center());
    }

    #[test]
    fn test_drop_releases_node() {
        let device = ready_device();
        let mut tracker = tracker(&device);
        tracker.sample();
        assert_eq!(device.running_task(), Some(NodeHandle(1)));
        drop(tracker);
        assert_eq!(device.running_task(), None);
    }
}
