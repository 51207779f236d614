use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{Error, Result};

// --- Enums ---

/// Lifecycle position of a compute instance, decoded from the provider's
/// integer status codes. Codes we do not recognize land in `Other`: the
/// control plane's internal states are opaque, so an unknown code means
/// "wait and re-poll", never success or failure.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Booting,
    Running,
    Stopping,
    Stopped,
    Other(i64),
}

impl InstanceStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            100 | 200 => InstanceStatus::Booting,
            300 => InstanceStatus::Running,
            400 => InstanceStatus::Stopping,
            800 => InstanceStatus::Stopped,
            other => InstanceStatus::Other(other),
        }
    }

    /// Running, or on its way up.
    pub fn is_active(&self) -> bool {
        matches!(self, InstanceStatus::Booting | InstanceStatus::Running)
    }

    /// Stopped, or on its way down.
    pub fn is_winding_down(&self) -> bool {
        matches!(self, InstanceStatus::Stopping | InstanceStatus::Stopped)
    }
}

// --- Compute control plane ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComputeImage {
    pub app_image_id: String,
}

/// One entry of the provider's instance list. Transitions are only ever
/// observed by listing again; nothing here is pushed to us.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComputeInstance {
    pub app_id: String,
    pub app_image_id: String,
    pub status: InstanceStatus,
    pub gpu_type: Option<String>,
    pub region_id: Option<String>,
}

/// Immutable capacity tuple from a resource query. Consumed once to
/// parameterize provisioning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResourceOffer {
    pub gpu_type: String,
    pub region_id: String,
    pub max_gpu_num: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateInstanceRequest {
    pub app_image_id: String,
    pub gpu_type: String,
    pub region_id: String,
    pub bill_type: i32,
    pub duration: i32,
    pub gpu_num: i32,
}

// --- Rendering backend control plane ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendRegistration {
    pub name: String,
    pub is_live: bool,
    pub is_down: bool,
    pub status: String,
}

impl BackendRegistration {
    /// A registration is usable only when all three health signals agree.
    /// Anything else gets deregistered and replaced, never repaired in place.
    pub fn is_usable(&self) -> bool {
        self.is_live && !self.is_down && self.status == "running"
    }
}

/// Raw task-status reply: top-level result code plus the task payload when
/// the call itself succeeded (`code == 0`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawTaskStatus {
    pub code: i64,
    pub msg: Option<String>,
    pub state: Option<TaskState>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskState {
    pub status: String,
    pub message: String,
    pub images: Vec<String>,
}

/// Outcome of a single task poll. `NotReady` is a normal outcome, not an
/// error; callers decide when to ask again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    Finished(Vec<String>),
    NotReady { status: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_decode_to_known_states() {
        assert_eq!(InstanceStatus::from_code(100), InstanceStatus::Booting);
        assert_eq!(InstanceStatus::from_code(200), InstanceStatus::Booting);
        assert_eq!(InstanceStatus::from_code(300), InstanceStatus::Running);
        assert_eq!(InstanceStatus::from_code(400), InstanceStatus::Stopping);
        assert_eq!(InstanceStatus::from_code(800), InstanceStatus::Stopped);
    }

    #[test]
    fn unknown_status_code_is_neither_active_nor_winding_down() {
        let status = InstanceStatus::from_code(550);
        assert_eq!(status, InstanceStatus::Other(550));
        assert!(!status.is_active());
        assert!(!status.is_winding_down());
    }

    #[test]
    fn registration_usability_requires_all_three_signals() {
        let healthy = BackendRegistration {
            name: "b1".into(),
            is_live: true,
            is_down: false,
            status: "running".into(),
        };
        assert!(healthy.is_usable());

        let mut not_live = healthy.clone();
        not_live.is_live = false;
        assert!(!not_live.is_usable());

        let mut down = healthy.clone();
        down.is_down = true;
        assert!(!down.is_usable());

        let mut idle = healthy.clone();
        idle.status = "starting".into();
        assert!(!idle.is_usable());
    }
}
