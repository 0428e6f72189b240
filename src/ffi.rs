//! C FFI layer for alt-tracker.
//!
//! The host keeps its Antilatency SDK bindings and hands them over as an
//! [`AltSdk`] table of callbacks; the tracker logic runs on the Rust side.
//! The generated C header is written to `include/alt_tracker.h` by cbindgen.

use crate::error::{LastError, TrackerError};
use crate::math::Quaternion;
use crate::sdk::{
    Collaborators, Cotask, CotaskConstructor, DeviceFilter, DeviceNetworkLibrary, Environment,
    EnvironmentSelectorLibrary, LocalStorage, Network, StorageClientLibrary, TrackingLibrary,
};
use crate::settings::Settings;
use crate::tracker::AltTracker;
use crate::types::{
    Libraries, NodeHandle, NodeStatus, Placement, Pose, Stability, Stage, TrackingState,
    AXIS_COUNT,
};
use std::any::Any;
use std::ffi::{c_char, c_int, c_void, CString};

thread_local! {
    /// Thread-local last error message for C consumers.
    static LAST_ERROR: LastError = const { LastError::new() };
}

fn set_last_error(err: &TrackerError) {
    LAST_ERROR.with(|last| last.set(err));
}

/// Upper bound on supported nodes fetched per enumeration.
const MAX_NODES: usize = 64;

/// Initial buffer for local storage reads; grown when the host reports more.
const STORAGE_BUFFER: usize = 1024;

/// Opaque tracker handle for C consumers.
pub struct AltTrackerHandle(AltTracker);

/// Extrapolated state in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AltTrackingState {
    pub pose: Pose,
    pub velocity: [f32; 3],
    pub local_angular_velocity: [f32; 3],
    /// Stability stage, 0 = inertial data initialization.
    pub stage: c_int,
    pub stability_value: f32,
}

impl Default for AltTrackingState {
    fn default() -> Self {
        Self {
            pose: Pose::IDENTITY,
            velocity: [0.0; 3],
            local_angular_velocity: [0.0; 3],
            stage: Stage::InertialDataInitialization as c_int,
            stability_value: 0.0,
        }
    }
}

impl From<AltTrackingState> for TrackingState {
    fn from(raw: AltTrackingState) -> Self {
        let [vx, vy, vz] = raw.velocity;
        let [ax, ay, az] = raw.local_angular_velocity;
        TrackingState {
            pose: raw.pose,
            velocity: crate::math::Vector3::new(vx, vy, vz),
            local_angular_velocity: crate::math::Vector3::new(ax, ay, az),
            stability: Stability {
                stage: Stage::from(raw.stage),
                value: raw.stability_value,
            },
        }
    }
}

/// SDK bindings supplied by the host.
///
/// `libraries` is the [`Libraries`] bitmask of what the host managed to load.
/// A library only counts as loaded when its bit is set and all of its
/// callbacks are present. Handles returned by `start_task` and
/// `create_environment` are released through the matching release callback.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AltSdk {
    pub context: *mut c_void,
    pub libraries: u32,

    /// Create the device network; false on failure.
    pub create_network: Option<unsafe extern "C" fn(ctx: *mut c_void) -> bool>,
    pub network_update_id: Option<unsafe extern "C" fn(ctx: *mut c_void) -> u32>,
    pub node_status: Option<unsafe extern "C" fn(ctx: *mut c_void, node: u32) -> c_int>,

    /// Create the tracking cotask constructor; false on failure.
    pub create_cotask_constructor: Option<unsafe extern "C" fn(ctx: *mut c_void) -> bool>,
    /// Write up to `max` supported nodes into `out`; returns the count written.
    pub find_supported_nodes:
        Option<unsafe extern "C" fn(ctx: *mut c_void, out: *mut u32, max: usize) -> usize>,
    pub start_task: Option<
        unsafe extern "C" fn(ctx: *mut c_void, node: u32, environment: *mut c_void) -> *mut c_void,
    >,
    pub task_finished: Option<unsafe extern "C" fn(ctx: *mut c_void, task: *mut c_void) -> bool>,
    pub task_state: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            task: *mut c_void,
            placement: *const Pose,
            delta_time: f32,
            out: *mut AltTrackingState,
        ),
    >,
    pub release_task: Option<unsafe extern "C" fn(ctx: *mut c_void, task: *mut c_void)>,
    pub create_placement:
        Option<unsafe extern "C" fn(ctx: *mut c_void, code: *const c_char, out: *mut Pose) -> bool>,

    /// Returns false when local storage is unavailable.
    pub has_local_storage: Option<unsafe extern "C" fn(ctx: *mut c_void) -> bool>,
    /// Copy the value into `out` (null-terminated, at most `cap` bytes) and
    /// return its full length without the terminator, 0 when absent.
    pub storage_read: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            key: *const c_char,
            subkey: *const c_char,
            out: *mut c_char,
            cap: usize,
        ) -> usize,
    >,

    pub create_environment:
        Option<unsafe extern "C" fn(ctx: *mut c_void, code: *const c_char) -> *mut c_void>,
    pub release_environment: Option<unsafe extern "C" fn(ctx: *mut c_void, env: *mut c_void)>,
}

impl AltSdk {
    fn has(&self, library: Libraries) -> bool {
        Libraries::from_bits_truncate(self.libraries).contains(library)
    }

    /// Build the collaborator set from the callbacks that are present.
    fn collaborators(&self) -> Collaborators {
        let sdk = *self;
        let device_network = self.has(Libraries::DEVICE_NETWORK)
            && self.create_network.is_some()
            && self.network_update_id.is_some()
            && self.node_status.is_some();
        let tracking = self.has(Libraries::ALT_TRACKING)
            && self.create_cotask_constructor.is_some()
            && self.find_supported_nodes.is_some()
            && self.start_task.is_some()
            && self.task_finished.is_some()
            && self.task_state.is_some()
            && self.release_task.is_some()
            && self.create_placement.is_some();
        let storage_client = self.has(Libraries::STORAGE_CLIENT)
            && self.has_local_storage.is_some()
            && self.storage_read.is_some();
        let environment_selector = self.has(Libraries::ENVIRONMENT_SELECTOR)
            && self.create_environment.is_some()
            && self.release_environment.is_some();

        Collaborators {
            device_network: device_network
                .then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn DeviceNetworkLibrary>),
            tracking: tracking.then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn TrackingLibrary>),
            storage_client: storage_client
                .then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn StorageClientLibrary>),
            environment_selector: environment_selector
                .then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn EnvironmentSelectorLibrary>),
        }
    }
}

/// Host-side library reached through the callback table. Callback presence
/// is checked once in [`AltSdk::collaborators`].
struct ForeignLibrary(AltSdk);

impl DeviceNetworkLibrary for ForeignLibrary {
    fn create_network(&self, filter: &DeviceFilter) -> Option<Box<dyn Network>> {
        let sdk = self.0;
        log::debug!("Creating host device network ({:?})", filter);
        let create = sdk.create_network?;
        unsafe { create(sdk.context) }.then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn Network>)
    }
}

impl Network for ForeignLibrary {
    fn update_id(&self) -> u32 {
        match self.0.network_update_id {
            Some(f) => unsafe { f(self.0.context) },
            None => 0,
        }
    }

    fn node_status(&self, node: NodeHandle) -> NodeStatus {
        match self.0.node_status {
            Some(f) => NodeStatus::from(unsafe { f(self.0.context, node.0) }),
            None => NodeStatus::Invalid,
        }
    }
}

impl TrackingLibrary for ForeignLibrary {
    fn create_cotask_constructor(&self) -> Option<Box<dyn CotaskConstructor>> {
        let sdk = self.0;
        let create = sdk.create_cotask_constructor?;
        unsafe { create(sdk.context) }
            .then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn CotaskConstructor>)
    }

    fn create_placement(&self, code: &str) -> Option<Placement> {
        let create = self.0.create_placement?;
        let code = CString::new(code).ok()?;
        let mut placement = Pose::IDENTITY;
        unsafe { create(self.0.context, code.as_ptr(), &mut placement) }.then_some(placement)
    }
}

impl CotaskConstructor for ForeignLibrary {
    fn find_supported_nodes(&self, _network: &dyn Network) -> Vec<NodeHandle> {
        let Some(find) = self.0.find_supported_nodes else {
            return Vec::new();
        };
        let mut nodes = [0u32; MAX_NODES];
        let count = unsafe { find(self.0.context, nodes.as_mut_ptr(), MAX_NODES) };
        if count > MAX_NODES {
            log::warn!(
                "Host reported {} supported nodes, only the first {} are used",
                count,
                MAX_NODES
            );
        }
        nodes[..count.min(MAX_NODES)]
            .iter()
            .map(|&n| NodeHandle(n))
            .collect()
    }

    fn start_task(
        &self,
        _network: &dyn Network,
        node: NodeHandle,
        environment: &dyn Environment,
    ) -> Option<Box<dyn Cotask>> {
        let start = self.0.start_task?;
        let environment = environment.as_any().downcast_ref::<ForeignEnvironment>()?;
        let task = unsafe { start(self.0.context, node.0, environment.handle) };
        if task.is_null() {
            return None;
        }
        Some(Box::new(ForeignCotask { sdk: self.0, task }))
    }
}

struct ForeignCotask {
    sdk: AltSdk,
    task: *mut c_void,
}

impl Cotask for ForeignCotask {
    fn is_task_finished(&self) -> bool {
        match self.sdk.task_finished {
            Some(f) => unsafe { f(self.sdk.context, self.task) },
            None => true,
        }
    }

    fn extrapolated_state(&self, placement: &Pose, delta_time: f32) -> TrackingState {
        let mut raw = AltTrackingState::default();
        if let Some(f) = self.sdk.task_state {
            unsafe { f(self.sdk.context, self.task, placement, delta_time, &mut raw) };
        }
        raw.into()
    }
}

impl Drop for ForeignCotask {
    fn drop(&mut self) {
        if let Some(release) = self.sdk.release_task {
            unsafe { release(self.sdk.context, self.task) };
        }
    }
}

impl StorageClientLibrary for ForeignLibrary {
    fn local_storage(&self) -> Option<Box<dyn LocalStorage>> {
        let sdk = self.0;
        let available = sdk.has_local_storage?;
        unsafe { available(sdk.context) }
            .then(|| Box::new(ForeignLibrary(sdk)) as Box<dyn LocalStorage>)
    }
}

impl LocalStorage for ForeignLibrary {
    fn read(&self, key: &str, subkey: &str) -> String {
        let Some(read) = self.0.storage_read else {
            return String::new();
        };
        let (Ok(key), Ok(subkey)) = (CString::new(key), CString::new(subkey)) else {
            return String::new();
        };

        let mut buf = vec![0 as c_char; STORAGE_BUFFER];
        let mut len =
            unsafe { read(self.0.context, key.as_ptr(), subkey.as_ptr(), buf.as_mut_ptr(), buf.len()) };
        if len >= buf.len() {
            buf = vec![0 as c_char; len + 1];
            len = unsafe {
                read(self.0.context, key.as_ptr(), subkey.as_ptr(), buf.as_mut_ptr(), buf.len())
            };
        }
        c_char_to_string(&buf[..len.min(buf.len())])
    }
}

impl EnvironmentSelectorLibrary for ForeignLibrary {
    fn create_environment(&self, code: &str) -> Option<Box<dyn Environment>> {
        let create = self.0.create_environment?;
        let code = CString::new(code).ok()?;
        let handle = unsafe { create(self.0.context, code.as_ptr()) };
        if handle.is_null() {
            return None;
        }
        Some(Box::new(ForeignEnvironment {
            sdk: self.0,
            handle,
        }))
    }
}

struct ForeignEnvironment {
    sdk: AltSdk,
    handle: *mut c_void,
}

impl Environment for ForeignEnvironment {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for ForeignEnvironment {
    fn drop(&mut self) {
        if let Some(release) = self.sdk.release_environment {
            unsafe { release(self.sdk.context, self.handle) };
        }
    }
}

/// Default settings: placement correction on, no extrapolation.
#[no_mangle]
pub extern "C" fn alt_settings_default() -> Settings {
    Settings::default()
}

/// Defaults overridden by `ALT_USE_PLACEMENT_CORRECTION` / `ALT_EXTRAPOLATION_TIME`.
#[no_mangle]
pub extern "C" fn alt_settings_from_env() -> Settings {
    Settings::from_env()
}

/// Create a tracker from the host's SDK bindings.
/// Returns NULL on error (check alt_last_error()).
///
/// # Safety
/// `sdk` must point to a valid `AltSdk`, or be null. Its context and callbacks
/// must stay valid until the tracker is freed.
#[no_mangle]
pub unsafe extern "C" fn alt_tracker_new(
    sdk: *const AltSdk,
    settings: Settings,
) -> *mut AltTrackerHandle {
    if sdk.is_null() {
        set_last_error(&TrackerError::NullArgument("sdk"));
        return std::ptr::null_mut();
    }
    let sdk = &*sdk;
    let tracker = AltTracker::new(sdk.collaborators(), settings);
    Box::into_raw(Box::new(AltTrackerHandle(tracker)))
}

/// Check that every SDK collaborator is available.
/// Returns 0 on success, -1 on error (message in alt_last_error()).
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn alt_tracker_start(tracker: *const AltTrackerHandle) -> c_int {
    if tracker.is_null() {
        set_last_error(&TrackerError::NullArgument("tracker"));
        return -1;
    }
    match (*tracker).0.start_tracker() {
        Ok(()) => {
            LAST_ERROR.with(|last| last.clear());
            0
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Poll the tracker and write six doubles: TX, TY, TZ (cm), Yaw, Pitch, Roll (degrees).
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null. `out` must point to at
/// least six doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn alt_tracker_data(tracker: *mut AltTrackerHandle, out: *mut f64) {
    if tracker.is_null() || out.is_null() {
        return;
    }
    let tracker = &mut *tracker;
    let axes = tracker.0.sample().to_axes();
    std::ptr::copy_nonoverlapping(axes.as_ptr(), out, AXIS_COUNT);
}

/// Recentering is not supported; always returns false.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn alt_tracker_center(tracker: *mut AltTrackerHandle) -> bool {
    if tracker.is_null() {
        return false;
    }
    (*tracker).0.center()
}

/// Stop tracking and free the tracker.
///
/// # Safety
/// `tracker` must be a pointer returned by `alt_tracker_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn alt_tracker_free(tracker: *mut AltTrackerHandle) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Convert a quaternion to yaw, pitch, roll in degrees, written to `out[0..3]`.
///
/// # Safety
/// `out` must point to at least three doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn alt_quat_to_euler(x: f32, y: f32, z: f32, w: f32, out: *mut f64) {
    if out.is_null() {
        return;
    }
    let euler = Quaternion::new(x, y, z, w).to_euler_angles();
    let values = [euler.yaw, euler.pitch, euler.roll];
    std::ptr::copy_nonoverlapping(values.as_ptr(), out, values.len());
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next alt-tracker API call on the
/// same thread.
#[no_mangle]
pub extern "C" fn alt_last_error() -> *const c_char {
    LAST_ERROR.with(|last| last.as_ptr())
}

fn c_char_to_string(buf: &[c_char]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    let bytes: Vec<u8> = buf[..end].iter().map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).to_string()
}
