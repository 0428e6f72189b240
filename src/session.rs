use crate::error::SessionError;
use crate::sdk::{
    Collaborators, CotaskConstructor, Cotask, DeviceFilter, Environment,
    EnvironmentSelectorLibrary, Network, StorageClientLibrary, TrackingLibrary,
};
use crate::settings::Settings;
use crate::types::{Libraries, NodeHandle, NodeStatus, Placement, Pose, TrackingState};

/// Local storage key of the active environment code.
pub const ENVIRONMENT_KEY: &str = "environment";
/// Local storage key of the placement code.
pub const PLACEMENT_KEY: &str = "placement";
/// Local storage subkey shared by both codes.
pub const DEFAULT_SUBKEY: &str = "default";

/// A tracking task bound to one node, with the environment and placement it
/// was started with.
pub struct TrackingSession {
    node: NodeHandle,
    // Declared before `_environment` so the task is stopped first on drop.
    cotask: Box<dyn Cotask>,
    _environment: Box<dyn Environment>,
    placement: Placement,
}

impl TrackingSession {
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Placement applied to every extrapolation request.
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn is_task_finished(&self) -> bool {
        self.cotask.is_task_finished()
    }

    pub fn extrapolated_state(&self, delta_time: f32) -> TrackingState {
        self.cotask.extrapolated_state(&self.placement, delta_time)
    }
}

/// Owns the SDK handles and the single tracking session slot.
pub struct SessionManager {
    loaded: Libraries,
    tracking: Option<Box<dyn TrackingLibrary>>,
    storage_client: Option<Box<dyn StorageClientLibrary>>,
    environment_selector: Option<Box<dyn EnvironmentSelectorLibrary>>,
    network: Option<Box<dyn Network>>,
    constructor: Option<Box<dyn CotaskConstructor>>,
    settings: Settings,
    session: Option<TrackingSession>,
}

impl SessionManager {
    /// Create the device network and cotask constructor from whatever
    /// libraries were loaded. Missing pieces are logged, not fatal.
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        let loaded = collaborators.loaded();
        let Collaborators {
            device_network,
            tracking,
            storage_client,
            environment_selector,
        } = collaborators;

        let network = device_network.as_ref().and_then(|library| {
            let network = library.create_network(&DeviceFilter::all_usb_devices());
            if network.is_none() {
                log::warn!("Failed to create device network");
            }
            network
        });

        let constructor = tracking.as_ref().and_then(|library| {
            let constructor = library.create_cotask_constructor();
            if constructor.is_none() {
                log::warn!("Failed to create tracking cotask constructor");
            }
            constructor
        });

        let missing = Libraries::all().difference(loaded);
        if !missing.is_empty() {
            log::warn!("Antilatency libraries not loaded: {:?}", missing);
        }

        Self {
            loaded,
            tracking,
            storage_client,
            environment_selector,
            network,
            constructor,
            settings,
            session: None,
        }
    }

    pub fn loaded_libraries(&self) -> Libraries {
        self.loaded
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn network(&self) -> Option<&dyn Network> {
        self.network.as_deref()
    }

    pub fn has_cotask_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// First supported node whose status is idle, in enumeration order.
    pub fn find_idle_node(&self) -> Option<NodeHandle> {
        let network = self.network.as_deref()?;
        let constructor = self.constructor.as_deref()?;

        constructor
            .find_supported_nodes(network)
            .into_iter()
            .find(|&node| network.node_status(node) == NodeStatus::Idle)
    }

    /// Start tracking on `node`, replacing whatever the slot held.
    ///
    /// Environment and placement are loaded fresh from local storage on every
    /// call. With placement correction disabled the placement is identity no
    /// matter what is stored.
    pub fn start_session(&mut self, node: NodeHandle) -> Result<(), SessionError> {
        if node.is_null() {
            return Err(SessionError::NullNode);
        }

        let tracking = self
            .tracking
            .as_deref()
            .ok_or(SessionError::LibraryUnavailable("Alt tracking library"))?;
        let network = self
            .network
            .as_deref()
            .ok_or(SessionError::LibraryUnavailable("device network"))?;
        let storage_client = self
            .storage_client
            .as_deref()
            .ok_or(SessionError::LibraryUnavailable("storage client library"))?;
        let environment_selector = self
            .environment_selector
            .as_deref()
            .ok_or(SessionError::LibraryUnavailable("environment selector library"))?;
        let constructor = self
            .constructor
            .as_deref()
            .ok_or(SessionError::LibraryUnavailable("tracking cotask constructor"))?;

        let storage = storage_client
            .local_storage()
            .ok_or(SessionError::LocalStorageUnavailable)?;

        let environment_code = storage.read(ENVIRONMENT_KEY, DEFAULT_SUBKEY);
        if environment_code.is_empty() {
            return Err(SessionError::EnvironmentNotConfigured);
        }

        let environment = environment_selector
            .create_environment(&environment_code)
            .ok_or(SessionError::EnvironmentRejected)?;

        let placement = if self.settings.use_placement_correction {
            let placement_code = storage.read(PLACEMENT_KEY, DEFAULT_SUBKEY);
            if placement_code.is_empty() {
                log::debug!("No placement stored, using identity");
                Pose::IDENTITY
            } else {
                tracking
                    .create_placement(&placement_code)
                    .ok_or(SessionError::PlacementRejected)?
            }
        } else {
            Pose::IDENTITY
        };

        let cotask = constructor
            .start_task(network, node, environment.as_ref())
            .ok_or(SessionError::TaskStartFailed(node.0))?;

        log::info!(
            "Tracking task started on node {} (placement {:?})",
            node.0,
            placement
        );

        self.session = Some(TrackingSession {
            node,
            cotask,
            _environment: environment,
            placement,
        });
        Ok(())
    }

    /// Release the current session, if any.
    pub fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!("Tracking task on node {} stopped", session.node.0);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_session();
    }
}
