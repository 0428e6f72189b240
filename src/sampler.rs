use crate::session::SessionManager;
use crate::types::{NodeHandle, NodeStatus, Pose, Stage};

/// Alt trackers report meters; the host expects centimeters.
pub const POSITION_SCALE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    NoSession,
    SessionActive,
}

/// What a topology check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Update id unchanged (or no network): nothing was queried.
    Unchanged,
    /// The network changed and was re-examined.
    Rescanned {
        /// A finished session was torn down.
        lost: bool,
        /// A session was started on this node.
        acquired: Option<NodeHandle>,
    },
}

/// Polls the session manager and produces one pose per host tick.
///
/// Node enumeration only happens when the network's update id changes, so the
/// steady-state cost of a poll is one update id read plus one extrapolation.
pub struct PoseSampler {
    sessions: SessionManager,
    last_update_id: Option<u32>,
}

impl PoseSampler {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            last_update_id: None,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn state(&self) -> SamplerState {
        if self.sessions.is_active() {
            SamplerState::SessionActive
        } else {
            SamplerState::NoSession
        }
    }

    /// Check the device network for changes and start or stop the session.
    pub fn update(&mut self) -> Transition {
        let Some(update_id) = self.sessions.network().map(|n| n.update_id()) else {
            return Transition::Unchanged;
        };
        if self.last_update_id == Some(update_id) {
            return Transition::Unchanged;
        }

        let mut lost = false;
        if self
            .sessions
            .session()
            .is_some_and(|session| session.is_task_finished())
        {
            log::info!("Tracking task finished, tracker seems to be disconnected");
            self.sessions.stop_session();
            lost = true;
        }

        let mut acquired = None;
        if !self.sessions.is_active() {
            match self.sessions.find_idle_node() {
                Some(node) if self.node_is_idle(node) => {
                    match self.sessions.start_session(node) {
                        Ok(()) => acquired = Some(node),
                        Err(e) => log::debug!("Tracking not started on node {}: {}", node.0, e),
                    }
                }
                Some(node) => log::debug!("Node {} is no longer idle", node.0),
                None => log::trace!("No idle tracking node"),
            }
        }

        self.last_update_id = Some(update_id);
        Transition::Rescanned { lost, acquired }
    }

    fn node_is_idle(&self, node: NodeHandle) -> bool {
        self.sessions
            .network()
            .is_some_and(|n| n.node_status(node) == NodeStatus::Idle)
    }

    /// Current pose: extrapolated and scaled to centimeters while a session
    /// runs, identity otherwise or while inertial data is initializing.
    pub fn sample(&mut self) -> Pose {
        self.update();

        let Some(session) = self.sessions.session() else {
            return Pose::IDENTITY;
        };

        let extrapolation_time = self.sessions.settings().extrapolation_time as f32;
        let state = session.extrapolated_state(extrapolation_time);
        if state.stability.stage == Stage::InertialDataInitialization {
            return Pose::IDENTITY;
        }

        Pose {
            position: state.pose.position * POSITION_SCALE,
            rotation: state.pose.rotation,
        }
    }

    pub fn stop(&mut self) {
        self.sessions.stop_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quaternion, Vector3};
    use crate::session::ENVIRONMENT_KEY;
    use crate::settings::Settings;
    use crate::sim::{SimControl, SimDevice};

    fn sampler(device: &SimDevice, settings: Settings) -> PoseSampler {
        PoseSampler::new(SessionManager::new(device.collaborators(), settings))
    }

    fn configure(device: &SimDevice) {
        device.send(SimControl::Store {
            key: ENVIRONMENT_KEY.into(),
            value: "grid".into(),
        });
    }

    fn set_pose(device: &SimDevice, position: Vector3, stage: Stage) {
        device.send(SimControl::SetState {
            pose: Pose::new(position, Quaternion::IDENTITY),
            velocity: Vector3::ZERO,
            stage,
        });
    }

    #[test]
    fn test_identity_without_session() {
        let device = SimDevice::new();
        let mut sampler = sampler(&device, Settings::default());
        for _ in 0..3 {
            assert_eq!(sampler.sample(), Pose::IDENTITY);
        }
        assert_eq!(sampler.state(), SamplerState::NoSession);
    }

    #[test]
    fn test_identity_without_network() {
        let device = SimDevice::new();
        device.send(SimControl::NetworkAvailable(false));
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        let mut sampler = sampler(&device, Settings::default());
        assert_eq!(sampler.update(), Transition::Unchanged);
        assert_eq!(sampler.sample(), Pose::IDENTITY);
        assert_eq!(device.scan_count(), 0);
    }

    #[test]
    fn test_acquires_idle_node() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(4)));
        let mut sampler = sampler(&device, Settings::default());
        assert_eq!(
            sampler.update(),
            Transition::Rescanned {
                lost: false,
                acquired: Some(NodeHandle(4))
            }
        );
        assert_eq!(sampler.state(), SamplerState::SessionActive);
    }

    #[test]
    fn test_unchanged_update_id_skips_scan() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        let mut sampler = sampler(&device, Settings::default());
        sampler.sample();
        // starting the task changes node status, which is picked up once
        sampler.sample();
        let scans = device.scan_count();
        let node = sampler.sessions().session().map(|s| s.node());

        for _ in 0..5 {
            assert_eq!(sampler.update(), Transition::Unchanged);
            sampler.sample();
        }
        assert_eq!(device.scan_count(), scans);
        assert_eq!(sampler.sessions().session().map(|s| s.node()), node);
    }

    #[test]
    fn test_no_scan_while_session_active() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        let mut sampler = sampler(&device, Settings::default());
        sampler.sample();
        let scans = device.scan_count();

        device.send(SimControl::Connect(NodeHandle(2)));
        assert_eq!(
            sampler.update(),
            Transition::Rescanned {
                lost: false,
                acquired: None
            }
        );
        assert_eq!(device.scan_count(), scans);
    }

    #[test]
    fn test_scales_position_to_centimeters() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        set_pose(&device, Vector3::new(1.0, 2.0, 3.0), Stage::Tracking6Dof);
        let mut sampler = sampler(&device, Settings::default());
        let pose = sampler.sample();
        assert_eq!(pose.position, Vector3::new(100.0, 200.0, 300.0));
        assert_eq!(pose.rotation, Quaternion::IDENTITY);
    }

    #[test]
    fn test_inertial_initialization_returns_identity() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        device.send(SimControl::SetState {
            pose: Pose::new(
                Vector3::new(0.4, 1.7, -2.0),
                Quaternion::new(0.3, 0.1, 0.0, 0.95),
            ),
            velocity: Vector3::new(1.0, 0.0, 0.0),
            stage: Stage::InertialDataInitialization,
        });
        let mut sampler = sampler(&device, Settings::default());
        assert_eq!(sampler.sample(), Pose::IDENTITY);
        assert_eq!(sampler.state(), SamplerState::SessionActive);

        set_pose(&device, Vector3::new(0.25, 0.0, 0.0), Stage::Tracking6Dof);
        assert_eq!(sampler.sample().position, Vector3::new(25.0, 0.0, 0.0));
    }

    #[test]
    fn test_extrapolation_time_forwarded() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        device.send(SimControl::SetState {
            pose: Pose::IDENTITY,
            velocity: Vector3::new(0.0, 0.0, 2.0),
            stage: Stage::Tracking6Dof,
        });
        let settings = Settings {
            extrapolation_time: 0.5,
            ..Settings::default()
        };
        let mut sampler = sampler(&device, settings);
        let pose = sampler.sample();
        assert_eq!(device.last_request().map(|(_, dt)| dt), Some(0.5));
        assert_eq!(pose.position, Vector3::new(0.0, 0.0, 100.0));
    }

    #[test]
    fn test_disconnect_tears_down_and_reacquires() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        set_pose(&device, Vector3::new(0.5, 0.0, 0.0), Stage::Tracking6Dof);
        let mut sampler = sampler(&device, Settings::default());
        assert_eq!(sampler.sample().position, Vector3::new(50.0, 0.0, 0.0));

        device.send(SimControl::Disconnect(NodeHandle(1)));
        assert_eq!(
            sampler.update(),
            Transition::Rescanned {
                lost: true,
                acquired: None
            }
        );
        assert_eq!(sampler.state(), SamplerState::NoSession);
        assert_eq!(sampler.sample(), Pose::IDENTITY);
        assert_eq!(device.running_task(), None);

        device.send(SimControl::Connect(NodeHandle(2)));
        assert_eq!(
            sampler.update(),
            Transition::Rescanned {
                lost: false,
                acquired: Some(NodeHandle(2))
            }
        );
        assert_eq!(sampler.sample().position, Vector3::new(50.0, 0.0, 0.0));
    }

    #[test]
    fn test_failed_start_retried_on_next_change() {
        let device = SimDevice::new();
        device.send(SimControl::Connect(NodeHandle(1)));
        let mut sampler = sampler(&device, Settings::default());
        assert_eq!(
            sampler.update(),
            Transition::Rescanned {
                lost: false,
                acquired: None
            }
        );

        // environment configured later; nothing happens until the network changes
        configure(&device);
        assert_eq!(sampler.update(), Transition::Unchanged);
        assert_eq!(sampler.state(), SamplerState::NoSession);

        device.send(SimControl::SetStatus(NodeHandle(1), NodeStatus::Busy));
        device.send(SimControl::SetStatus(NodeHandle(1), NodeStatus::Idle));
        assert_eq!(
            sampler.update(),
            Transition::Rescanned {
                lost: false,
                acquired: Some(NodeHandle(1))
            }
        );
    }

    #[test]
    fn test_busy_node_not_acquired() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        device.send(SimControl::SetStatus(NodeHandle(1), NodeStatus::Busy));
        let mut sampler = sampler(&device, Settings::default());
        assert_eq!(sampler.sample(), Pose::IDENTITY);
        assert_eq!(sampler.state(), SamplerState::NoSession);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let device = SimDevice::new();
        configure(&device);
        device.send(SimControl::Connect(NodeHandle(1)));
        let mut sampler = sampler(&device, Settings::default());
        sampler.sample();
        sampler.stop();
        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::NoSession);
        assert_eq!(device.running_task(), None);
    }
}
