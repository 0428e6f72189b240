//! Capability interface of the Antilatency SDK as seen by the tracker.
//!
//! Each library is an optional collaborator: the host loads what it can and
//! the tracker degrades to identity output when something is missing. The
//! real bindings live with the host (see [`crate::ffi`]); [`crate::sim`]
//! provides an in-process implementation.

use crate::types::{Libraries, NodeHandle, NodeStatus, Placement, Pose, TrackingState};
use std::any::Any;

/// Filter applied when creating a device network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Accept every Antilatency USB device.
    pub all_usb_devices: bool,
}

impl DeviceFilter {
    pub fn all_usb_devices() -> Self {
        Self {
            all_usb_devices: true,
        }
    }
}

pub trait DeviceNetworkLibrary {
    fn create_network(&self, filter: &DeviceFilter) -> Option<Box<dyn Network>>;
}

/// Live view of the device network.
pub trait Network {
    /// Token that changes whenever the network topology or a node status changes.
    fn update_id(&self) -> u32;

    fn node_status(&self, node: NodeHandle) -> NodeStatus;
}

pub trait TrackingLibrary {
    fn create_cotask_constructor(&self) -> Option<Box<dyn CotaskConstructor>>;

    /// Build a placement from a code stored by Antilatency Service.
    fn create_placement(&self, code: &str) -> Option<Placement>;
}

pub trait CotaskConstructor {
    /// Nodes able to run a tracking task, in enumeration order.
    fn find_supported_nodes(&self, network: &dyn Network) -> Vec<NodeHandle>;

    fn start_task(
        &self,
        network: &dyn Network,
        node: NodeHandle,
        environment: &dyn Environment,
    ) -> Option<Box<dyn Cotask>>;
}

/// A tracking task running on one node. Dropping it stops the task.
pub trait Cotask {
    /// True once the task ended on the device side, usually on disconnect.
    fn is_task_finished(&self) -> bool;

    /// Pose predicted `delta_time` seconds ahead with `placement` applied.
    fn extrapolated_state(&self, placement: &Pose, delta_time: f32) -> TrackingState;
}

/// Tracking-zone marker layout.
pub trait Environment {
    fn as_any(&self) -> &dyn Any;
}

pub trait StorageClientLibrary {
    fn local_storage(&self) -> Option<Box<dyn LocalStorage>>;
}

pub trait LocalStorage {
    /// Stored value, or an empty string when absent.
    fn read(&self, key: &str, subkey: &str) -> String;
}

pub trait EnvironmentSelectorLibrary {
    fn create_environment(&self, code: &str) -> Option<Box<dyn Environment>>;
}

/// The SDK libraries handed to the tracker.
#[derive(Default)]
pub struct Collaborators {
    pub device_network: Option<Box<dyn DeviceNetworkLibrary>>,
    pub tracking: Option<Box<dyn TrackingLibrary>>,
    pub storage_client: Option<Box<dyn StorageClientLibrary>>,
    pub environment_selector: Option<Box<dyn EnvironmentSelectorLibrary>>,
}

impl Collaborators {
    /// Libraries that are present.
    pub fn loaded(&self) -> Libraries {
        let mut libraries = Libraries::empty();
        libraries.set(Libraries::DEVICE_NETWORK, self.device_network.is_some());
        libraries.set(Libraries::ALT_TRACKING, self.tracking.is_some());
        libraries.set(Libraries::STORAGE_CLIENT, self.storage_client.is_some());
        libraries.set(
            Libraries::ENVIRONMENT_SELECTOR,
            self.environment_selector.is_some(),
        );
        libraries
    }
}
