//! Mounting of interactive tools.
//!
//! A tool is mounted against the current [`Session`]: its initialisation is
//! retried until it reports [`Readiness::Ready`], at most
//! [`ReadinessPolicy::max_attempts`] times. The returned [`MountedTool`] tears
//! the tool down exactly once, on [`MountedTool::unmount`] or on drop.

use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
}

/// A tool with explicit setup and teardown.
pub trait HostedTool {
    fn name(&self) -> &str;

    /// Attempt initialisation against the session.
    fn try_init(&mut self, session: &Session) -> Readiness;

    /// Release everything acquired by `try_init`.
    fn teardown(&mut self);
}

/// Bound on initialisation retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        ReadinessPolicy {
            max_attempts: 10,
            interval_ms: 16,
        }
    }
}

impl ReadinessPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountError {
    #[error("{tool} was not ready after {attempts} attempts")]
    NotReady { tool: String, attempts: u32 },
}

/// Mounts tools under one [`ReadinessPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolHost {
    policy: ReadinessPolicy,
}

impl ToolHost {
    pub fn new(policy: ReadinessPolicy) -> Self {
        ToolHost { policy }
    }

    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    pub fn mount<T: HostedTool>(&self, tool: T, session: &Session) -> Result<MountedTool<T>, MountError> {
        mount(tool, session, &self.policy)
    }
}

/// Mount `tool`, retrying its initialisation within `policy`.
///
/// On failure the tool has already been torn down.
pub fn mount<T: HostedTool>(
    mut tool: T,
    session: &Session,
    policy: &ReadinessPolicy,
) -> Result<MountedTool<T>, MountError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if tool.try_init(session) == Readiness::Ready {
            debug!(tool = tool.name(), attempt, "tool mounted");
            return Ok(MountedTool {
                tool,
                mounted: true,
            });
        }
        if attempt < attempts && !policy.interval().is_zero() {
            thread::sleep(policy.interval());
        }
    }

    let name = tool.name().to_string();
    warn!(tool = %name, attempts, "tool did not become ready");
    tool.teardown();
    Err(MountError::NotReady {
        tool: name,
        attempts,
    })
}

/// A mounted tool; tears down once when unmounted or dropped.
#[derive(Debug)]
pub struct MountedTool<T: HostedTool> {
    tool: T,
    mounted: bool,
}

impl<T: HostedTool> MountedTool<T> {
    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn tool_mut(&mut self) -> &mut T {
        &mut self.tool
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Tear the tool down now. Calling this more than once has no effect.
    pub fn unmount(&mut self) {
        if self.mounted {
            self.mounted = false;
            self.tool.teardown();
            debug!(tool = self.tool.name(), "tool unmounted");
        }
    }
}

impl<T: HostedTool> Drop for MountedTool<T> {
    fn drop(&mut self) {
        self.unmount();
    }
}
