use crate::math::{Quaternion, Vector3};

/// Rigid transform snapshot: position plus orientation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Position in device units (meters from the SDK, centimeters once sampled).
    pub position: Vector3,
    /// Orientation quaternion [x, y, z, w].
    pub rotation: Quaternion,
}

/// Fixed correction transform for the tracker's mounting position on the head.
pub type Placement = Pose;

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vector3::ZERO,
        rotation: Quaternion::IDENTITY,
    };

    pub fn new(position: Vector3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    /// Apply `local` in this pose's frame.
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation.rotate(local.position),
            rotation: self.rotation * local.rotation,
        }
    }

    pub fn is_nan_any(&self) -> bool {
        self.position.is_nan_any() || self.rotation.is_nan_any()
    }
}

/// Opaque handle of a node on the device network.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u32);

impl NodeHandle {
    pub const NULL: NodeHandle = NodeHandle(0);

    pub fn is_null(&self) -> bool {
        *self == NodeHandle::NULL
    }
}

/// Node status reported by the device network.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Idle = 0,
    Busy = 1,
    TaskRunning = 2,
    Invalid = 3,
}

impl From<i32> for NodeStatus {
    fn from(value: i32) -> Self {
        match value {
            0 => NodeStatus::Idle,
            1 => NodeStatus::Busy,
            2 => NodeStatus::TaskRunning,
            _ => NodeStatus::Invalid,
        }
    }
}

/// Stability stage of the tracking algorithm.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Device just connected; pose data is not trustworthy yet.
    InertialDataInitialization = 0,
    Tracking6Dof = 1,
    Tracking3Dof = 2,
    Blind6Dof = 3,
}

impl From<i32> for Stage {
    fn from(value: i32) -> Self {
        match value {
            1 => Stage::Tracking6Dof,
            2 => Stage::Tracking3Dof,
            3 => Stage::Blind6Dof,
            _ => Stage::InertialDataInitialization,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stability {
    pub stage: Stage,
    /// Stage-specific confidence value.
    pub value: f32,
}

/// Extrapolated tracker state returned by a running cotask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingState {
    pub pose: Pose,
    /// Linear velocity in meters per second.
    pub velocity: Vector3,
    /// Angular velocity in the tracker frame, radians per second.
    pub local_angular_velocity: Vector3,
    pub stability: Stability,
}

// Host axis order for the flat six-channel form.
pub const AXIS_TX: usize = 0;
pub const AXIS_TY: usize = 1;
pub const AXIS_TZ: usize = 2;
pub const AXIS_YAW: usize = 3;
pub const AXIS_PITCH: usize = 4;
pub const AXIS_ROLL: usize = 5;
pub const AXIS_COUNT: usize = 6;

/// One sample for the host: Euler angles in degrees, translation in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackerData {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

impl TrackerData {
    pub fn to_axes(&self) -> [f64; AXIS_COUNT] {
        let mut axes = [0.0; AXIS_COUNT];
        axes[AXIS_TX] = self.tx;
        axes[AXIS_TY] = self.ty;
        axes[AXIS_TZ] = self.tz;
        axes[AXIS_YAW] = self.yaw;
        axes[AXIS_PITCH] = self.pitch;
        axes[AXIS_ROLL] = self.roll;
        axes
    }
}

bitflags::bitflags! {
    /// SDK libraries the tracker depends on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct Libraries: u32 {
        const DEVICE_NETWORK       = 1 << 0;
        const ALT_TRACKING         = 1 << 1;
        const STORAGE_CLIENT       = 1 << 2;
        const ENVIRONMENT_SELECTOR = 1 << 3;
    }
}
