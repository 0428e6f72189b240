//! In-process Antilatency SDK for tests and demos.
//!
//! A [`SimDevice`] owns the simulated network state. Every collaborator it
//! hands out shares that state, and control messages sent through
//! [`SimDevice::send`] (or a cloned [`Sender`] from another thread) are applied
//! the next time any simulated service is queried, so a scripted device can
//! connect, move and disconnect while the tracker polls it.

use crate::math::Vector3;
use crate::sdk::{
    Collaborators, Cotask, CotaskConstructor, DeviceFilter, DeviceNetworkLibrary, Environment,
    EnvironmentSelectorLibrary, LocalStorage, Network, StorageClientLibrary, TrackingLibrary,
};
use crate::session::DEFAULT_SUBKEY;
use crate::types::{
    Libraries, NodeHandle, NodeStatus, Placement, Pose, Stability, Stage, TrackingState,
};
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Commands that change the simulated device network.
#[derive(Debug, Clone)]
pub enum SimControl {
    /// Plug in an idle node.
    Connect(NodeHandle),
    /// Unplug a node; a task running on it reports finished.
    Disconnect(NodeHandle),
    SetStatus(NodeHandle, NodeStatus),
    /// Write a local storage value under the default subkey.
    Store { key: String, value: String },
    StorageAvailable(bool),
    /// Make environment and placement construction fail for this code.
    RejectCode(String),
    /// Placement returned for a stored code.
    DefinePlacement { code: String, placement: Placement },
    /// Raw tracker state reported by running tasks.
    SetState {
        pose: Pose,
        velocity: Vector3,
        stage: Stage,
    },
    NetworkAvailable(bool),
    ConstructorAvailable(bool),
}

struct SimState {
    control: Receiver<SimControl>,
    update_id: u32,
    nodes: Vec<(NodeHandle, NodeStatus)>,
    storage: HashMap<(String, String), String>,
    storage_available: bool,
    rejected_codes: HashSet<String>,
    placements: HashMap<String, Placement>,
    pose: Pose,
    velocity: Vector3,
    stage: Stage,
    network_available: bool,
    constructor_available: bool,
    running: Vec<NodeHandle>,
    scans: usize,
    last_environment: Option<String>,
    last_request: Option<(Pose, f32)>,
}

impl SimState {
    fn pump(&mut self) {
        while let Ok(msg) = self.control.try_recv() {
            self.handle_msg(msg);
        }
    }

    fn handle_msg(&mut self, msg: SimControl) {
        log::trace!("sim: {:?}", msg);
        match msg {
            SimControl::Connect(node) => {
                if self.status(node).is_none() {
                    self.nodes.push((node, NodeStatus::Idle));
                    self.bump();
                }
            }
            SimControl::Disconnect(node) => {
                let before = self.nodes.len();
                self.nodes.retain(|(n, _)| *n != node);
                if self.nodes.len() != before {
                    self.bump();
                }
            }
            SimControl::SetStatus(node, status) => self.set_status(node, status),
            SimControl::Store { key, value } => {
                self.storage.insert((key, DEFAULT_SUBKEY.to_string()), value);
            }
            SimControl::StorageAvailable(available) => self.storage_available = available,
            SimControl::RejectCode(code) => {
                self.rejected_codes.insert(code);
            }
            SimControl::DefinePlacement { code, placement } => {
                self.placements.insert(code, placement);
            }
            SimControl::SetState {
                pose,
                velocity,
                stage,
            } => {
                self.pose = pose;
                self.velocity = velocity;
                self.stage = stage;
            }
            SimControl::NetworkAvailable(available) => self.network_available = available,
            SimControl::ConstructorAvailable(available) => {
                self.constructor_available = available
            }
        }
    }

    fn bump(&mut self) {
        self.update_id = self.update_id.wrapping_add(1);
    }

    fn status(&self, node: NodeHandle) -> Option<NodeStatus> {
        self.nodes
            .iter()
            .find(|(n, _)| *n == node)
            .map(|(_, status)| *status)
    }

    fn set_status(&mut self, node: NodeHandle, status: NodeStatus) {
        if let Some(entry) = self.nodes.iter_mut().find(|(n, _)| *n == node) {
            if entry.1 != status {
                entry.1 = status;
                self.bump();
            }
        }
    }

    fn accepts(&self, code: &str) -> bool {
        !code.is_empty() && !self.rejected_codes.contains(code)
    }
}

type Shared = Arc<Mutex<SimState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SimState> {
    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    guard.pump();
    guard
}

/// Simulated device network with one scriptable Alt tracker per node.
pub struct SimDevice {
    state: Shared,
    sender: Sender<SimControl>,
    libraries: Libraries,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    pub fn new() -> Self {
        let (sender, control) = crossbeam_channel::unbounded();
        let state = SimState {
            control,
            update_id: 0,
            nodes: Vec::new(),
            storage: HashMap::new(),
            storage_available: true,
            rejected_codes: HashSet::new(),
            placements: HashMap::new(),
            pose: Pose::IDENTITY,
            velocity: Vector3::ZERO,
            stage: Stage::Tracking6Dof,
            network_available: true,
            constructor_available: true,
            running: Vec::new(),
            scans: 0,
            last_environment: None,
            last_request: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            sender,
            libraries: Libraries::all(),
        }
    }

    /// Only hand out the given libraries from [`SimDevice::collaborators`].
    pub fn with_libraries(mut self, libraries: Libraries) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn send(&self, msg: SimControl) {
        // The receiver lives in `state`, which we hold.
        let _ = self.sender.send(msg);
    }

    /// Control channel for scripting the device from another thread.
    pub fn sender(&self) -> Sender<SimControl> {
        self.sender.clone()
    }

    pub fn collaborators(&self) -> Collaborators {
        let shared = || SimLibrary {
            state: self.state.clone(),
        };
        Collaborators {
            device_network: self
                .libraries
                .contains(Libraries::DEVICE_NETWORK)
                .then(|| Box::new(shared()) as Box<dyn DeviceNetworkLibrary>),
            tracking: self
                .libraries
                .contains(Libraries::ALT_TRACKING)
                .then(|| Box::new(shared()) as Box<dyn TrackingLibrary>),
            storage_client: self
                .libraries
                .contains(Libraries::STORAGE_CLIENT)
                .then(|| Box::new(shared()) as Box<dyn StorageClientLibrary>),
            environment_selector: self
                .libraries
                .contains(Libraries::ENVIRONMENT_SELECTOR)
                .then(|| Box::new(shared()) as Box<dyn EnvironmentSelectorLibrary>),
        }
    }

    pub fn update_id(&self) -> u32 {
        lock(&self.state).update_id
    }

    /// Number of supported-node enumerations performed so far.
    pub fn scan_count(&self) -> usize {
        lock(&self.state).scans
    }

    pub fn running_task(&self) -> Option<NodeHandle> {
        lock(&self.state).running.first().copied()
    }

    /// Environment code the most recent task was started with.
    pub fn last_environment(&self) -> Option<String> {
        lock(&self.state).last_environment.clone()
    }

    /// Placement and look-ahead of the most recent extrapolation request.
    pub fn last_request(&self) -> Option<(Placement, f32)> {
        lock(&self.state).last_request
    }
}

/// Every simulated library is a view of the same shared state.
struct SimLibrary {
    state: Shared,
}

impl DeviceNetworkLibrary for SimLibrary {
    fn create_network(&self, filter: &DeviceFilter) -> Option<Box<dyn Network>> {
        log::debug!("sim: creating network with {:?}", filter);
        lock(&self.state).network_available.then(|| {
            Box::new(SimNetwork {
                state: self.state.clone(),
            }) as Box<dyn Network>
        })
    }
}

impl TrackingLibrary for SimLibrary {
    fn create_cotask_constructor(&self) -> Option<Box<dyn CotaskConstructor>> {
        lock(&self.state).constructor_available.then(|| {
            Box::new(SimCotaskConstructor {
                state: self.state.clone(),
            }) as Box<dyn CotaskConstructor>
        })
    }

    fn create_placement(&self, code: &str) -> Option<Placement> {
        let state = lock(&self.state);
        if !state.accepts(code) {
            return None;
        }
        state.placements.get(code).copied()
    }
}

impl StorageClientLibrary for SimLibrary {
    fn local_storage(&self) -> Option<Box<dyn LocalStorage>> {
        lock(&self.state).storage_available.then(|| {
            Box::new(SimStorage {
                state: self.state.clone(),
            }) as Box<dyn LocalStorage>
        })
    }
}

impl EnvironmentSelectorLibrary for SimLibrary {
    fn create_environment(&self, code: &str) -> Option<Box<dyn Environment>> {
        lock(&self.state).accepts(code).then(|| {
            Box::new(SimEnvironment {
                code: code.to_string(),
            }) as Box<dyn Environment>
        })
    }
}

struct SimNetwork {
    state: Shared,
}

impl Network for SimNetwork {
    fn update_id(&self) -> u32 {
        lock(&self.state).update_id
    }

    fn node_status(&self, node: NodeHandle) -> NodeStatus {
        lock(&self.state).status(node).unwrap_or(NodeStatus::Invalid)
    }
}

struct SimCotaskConstructor {
    state: Shared,
}

impl CotaskConstructor for SimCotaskConstructor {
    fn find_supported_nodes(&self, _network: &dyn Network) -> Vec<NodeHandle> {
        let mut state = lock(&self.state);
        state.scans += 1;
        state.nodes.iter().map(|(node, _)| *node).collect()
    }

    fn start_task(
        &self,
        _network: &dyn Network,
        node: NodeHandle,
        environment: &dyn Environment,
    ) -> Option<Box<dyn Cotask>> {
        let mut state = lock(&self.state);
        if state.status(node) != Some(NodeStatus::Idle) {
            return None;
        }

        state.last_environment = environment
            .as_any()
            .downcast_ref::<SimEnvironment>()
            .map(|env| env.code.clone());
        state.set_status(node, NodeStatus::TaskRunning);
        state.running.push(node);

        Some(Box::new(SimCotask {
            node,
            state: self.state.clone(),
        }))
    }
}

struct SimCotask {
    node: NodeHandle,
    state: Shared,
}

impl Cotask for SimCotask {
    fn is_task_finished(&self) -> bool {
        lock(&self.state).status(self.node).is_none()
    }

    fn extrapolated_state(&self, placement: &Pose, delta_time: f32) -> TrackingState {
        let mut state = lock(&self.state);
        state.last_request = Some((*placement, delta_time));

        let raw = Pose {
            position: state.pose.position + state.velocity * delta_time,
            rotation: state.pose.rotation,
        };

        TrackingState {
            pose: raw.compose(placement),
            velocity: state.velocity,
            local_angular_velocity: Vector3::ZERO,
            stability: Stability {
                stage: state.stage,
                value: 1.0,
            },
        }
    }
}

impl Drop for SimCotask {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(pos) = state.running.iter().position(|n| *n == self.node) {
            state.running.remove(pos);
        }
        state.set_status(self.node, NodeStatus::Idle);
    }
}

struct SimStorage {
    state: Shared,
}

impl LocalStorage for SimStorage {
    fn read(&self, key: &str, subkey: &str) -> String {
        lock(&self.state)
            .storage
            .get(&(key.to_string(), subkey.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

struct SimEnvironment {
    code: String,
}

impl Environment for SimEnvironment {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quaternion;

    #[test]
    fn test_topology_changes_bump_update_id() {
        let device = SimDevice::new();
        assert_eq!(device.update_id(), 0);
        device.send(SimControl::Connect(NodeHandle(3)));
        assert_eq!(device.update_id(), 1);
        // already connected
        device.send(SimControl::Connect(NodeHandle(3)));
        assert_eq!(device.update_id(), 1);
        device.send(SimControl::Disconnect(NodeHandle(3)));
        assert_eq!(device.update_id(), 2);
    }

    #[test]
    fn test_control_from_other_thread() {
        let device = SimDevice::new();
        let sender = device.sender();
        std::thread::spawn(move || {
            sender.send(SimControl::Connect(NodeHandle(9))).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(device.update_id(), 1);
    }

    #[test]
    fn test_task_lifecycle() {
        let device = SimDevice::new();
        device.send(SimControl::Connect(NodeHandle(1)));
        let collaborators = device.collaborators();
        let network = collaborators
            .device_network
            .as_ref()
            .and_then(|lib| lib.create_network(&DeviceFilter::all_usb_devices()))
            .unwrap();
        let constructor = collaborators
            .tracking
            .as_ref()
            .and_then(|lib| lib.create_cotask_constructor())
            .unwrap();
        let environment = collaborators
            .environment_selector
            .as_ref()
            .and_then(|lib| lib.create_environment("env"))
            .unwrap();

        let task = constructor
            .start_task(network.as_ref(), NodeHandle(1), environment.as_ref())
            .unwrap();
        assert_eq!(network.node_status(NodeHandle(1)), NodeStatus::TaskRunning);
        assert!(constructor
            .start_task(network.as_ref(), NodeHandle(1), environment.as_ref())
            .is_none());
        assert!(!task.is_task_finished());

        device.send(SimControl::Disconnect(NodeHandle(1)));
        assert!(task.is_task_finished());
        assert_eq!(network.node_status(NodeHandle(1)), NodeStatus::Invalid);
        drop(task);
        assert_eq!(device.running_task(), None);
    }

    #[test]
    fn test_extrapolation_uses_velocity_and_placement() {
        let device = SimDevice::new();
        device.send(SimControl::Connect(NodeHandle(1)));
        device.send(SimControl::SetState {
            pose: Pose::new(Vector3::new(1.0, 0.0, 0.0), Quaternion::IDENTITY),
            velocity: Vector3::new(0.0, 2.0, 0.0),
            stage: Stage::Tracking6Dof,
        });
        let task = SimCotask {
            node: NodeHandle(1),
            state: device.state.clone(),
        };
        let placement = Pose::new(Vector3::new(0.0, 0.0, 0.5), Quaternion::IDENTITY);
        let state = task.extrapolated_state(&placement, 0.25);
        assert_eq!(state.pose.position, Vector3::new(1.0, 0.5, 0.5));
        assert_eq!(device.last_request(), Some((placement, 0.25)));
    }

    #[test]
    fn test_library_subset() {
        let device = SimDevice::new().with_libraries(Libraries::DEVICE_NETWORK);
        let collaborators = device.collaborators();
        assert!(collaborators.device_network.is_some());
        assert!(collaborators.tracking.is_none());
        assert_eq!(collaborators.loaded(), Libraries::DEVICE_NETWORK);
    }
}
