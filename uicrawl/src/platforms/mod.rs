use crate::{AutomationError, Node};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

pub mod memory;

/// Kind of an asynchronous tree change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeEventKind {
    WindowStateChanged,
    WindowContentChanged,
    Other,
}

/// Notification that the host's UI tree changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEvent {
    pub kind: TreeEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl TreeEvent {
    pub fn new(kind: TreeEventKind, package_name: impl Into<String>) -> Self {
        Self {
            kind,
            package_name: Some(package_name.into()),
            class_name: None,
        }
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }
}

/// Request to bring a window to the foreground, interpreted by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowIntent {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl WindowIntent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            package: None,
            data: None,
            flags: Vec::new(),
        }
    }

    /// Intent for the system's detail page of an installed app
    pub fn app_details(package_name: &str) -> Self {
        Self::new("android.settings.APPLICATION_DETAILS_SETTINGS")
            .with_data(format!("package:{package_name}"))
            .with_flags([
                "FLAG_ACTIVITY_NEW_TASK",
                "FLAG_ACTIVITY_CLEAR_TASK",
                "FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS",
                "FLAG_ACTIVITY_NO_ANIMATION",
            ])
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    Available,
    Unavailable,
}

impl ScreenState {
    pub fn is_available(&self) -> bool {
        matches!(self, ScreenState::Available)
    }
}

/// The provider of the live UI tree that all crawls run against
#[async_trait::async_trait]
pub trait Host: Send + Sync {
    /// Get the root of the currently visible window
    async fn current_root(&self) -> Result<Node, AutomationError>;

    /// Subscribe to tree change notifications.
    ///
    /// The returned receiver only sees events sent after this call.
    fn events(&self) -> broadcast::Receiver<TreeEvent>;

    /// Best-effort request to bring a window to the foreground
    async fn launch(&self, intent: &WindowIntent) -> Result<(), AutomationError>;

    /// Best-effort dismissal of transient system overlays (notification shade, dialogs)
    async fn clear_interference(&self, attempt: u32) -> Result<(), AutomationError>;

    /// Screen availability, if the host can observe it
    fn screen_state(&self) -> Option<watch::Receiver<ScreenState>> {
        None
    }
}
