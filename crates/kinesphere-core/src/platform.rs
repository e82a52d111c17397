//! Runtime platform detection.
//!
//! The host (native shell or web view) reports what it can see of its
//! environment as a [`RuntimeEnvironment`]. [`PlatformDetector`] classifies
//! it once and caches the resulting [`PlatformProfile`] until
//! [`PlatformDetector::clear_cache`] is called. Store selection reads only
//! [`PlatformProfile::is_native_embedded_capable`]; the description is for
//! diagnostics.

use serde::{Deserialize, Serialize};

/// Native bridge global as observed by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeBridge {
    /// Result of the bridge's platform-name accessor, if the accessor exists
    pub platform_name: Option<String>,
    /// Registered plugin names, if the plugin registry exists
    pub plugins: Option<Vec<String>>,
}

/// Snapshot of the execution environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeEnvironment {
    pub bridge: Option<NativeBridge>,
    /// Legacy native bridge marker, carrying its platform id when known
    pub legacy_bridge: Option<String>,
    pub user_agent: String,
}

/// Source of environment snapshots.
pub trait EnvironmentProbe: Send + Sync {
    fn snapshot(&self) -> RuntimeEnvironment;
}

/// Probe returning a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub RuntimeEnvironment);

impl EnvironmentProbe for StaticProbe {
    fn snapshot(&self) -> RuntimeEnvironment {
        self.0.clone()
    }
}

/// Where patient data lives for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStrategy {
    Embedded,
    BrowserStorage,
}

/// Immutable classification of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub is_native_embedded_capable: bool,
    /// `android`, `ios`, `web`, ...
    pub platform_name: String,
    pub description: String,
}

impl PlatformProfile {
    /// Profile for a native runtime with an embedded database.
    pub fn native(platform_name: impl Into<String>) -> Self {
        let platform_name = platform_name.into();
        let description = if platform_name == "android" {
            "Android native"
        } else {
            "iOS native"
        };
        Self {
            is_native_embedded_capable: true,
            platform_name,
            description: description.to_string(),
        }
    }

    /// Profile for a desktop browser.
    pub fn web() -> Self {
        Self {
            is_native_embedded_capable: false,
            platform_name: "web".to_string(),
            description: "Desktop browser".to_string(),
        }
    }

    pub fn data_strategy(&self) -> DataStrategy {
        if self.is_native_embedded_capable {
            DataStrategy::Embedded
        } else {
            DataStrategy::BrowserStorage
        }
    }
}

/// Diagnostic view of the detected platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub platform: String,
    pub description: String,
    pub strategy: DataStrategy,
    pub user_agent: String,
    pub is_native: bool,
    pub timestamp: String,
}

/// Detects and caches the platform profile.
pub struct PlatformDetector {
    probe: Box<dyn EnvironmentProbe>,
    force_browser_mode: bool,
    cached: Option<PlatformProfile>,
}

impl PlatformDetector {
    pub fn new(probe: impl EnvironmentProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            force_browser_mode: false,
            cached: None,
        }
    }

    /// Pin detection to the browser path regardless of the environment.
    pub fn with_force_browser_mode(mut self, force: bool) -> Self {
        self.force_browser_mode = force;
        self.cached = None;
        self
    }

    /// Classify the environment, reusing the cached profile when present.
    pub fn detect(&mut self) -> PlatformProfile {
        if let Some(profile) = &self.cached {
            return profile.clone();
        }

        let env = self.probe.snapshot();
        let profile = classify(&env, self.force_browser_mode);
        tracing::info!(
            platform = %profile.platform_name,
            native = profile.is_native_embedded_capable,
            "platform detected: {}",
            profile.description
        );
        self.cached = Some(profile.clone());
        profile
    }

    /// Drop the cached profile so the next call re-detects.
    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    pub fn debug_info(&mut self) -> DebugInfo {
        let profile = self.detect();
        DebugInfo {
            platform: profile.platform_name.clone(),
            description: profile.description.clone(),
            strategy: profile.data_strategy(),
            user_agent: self.probe.snapshot().user_agent,
            is_native: profile.is_native_embedded_capable,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A bridge only counts when it exposes both the platform accessor and the
/// plugin registry.
fn has_real_bridge(env: &RuntimeEnvironment) -> bool {
    env.bridge
        .as_ref()
        .is_some_and(|b| b.platform_name.is_some() && b.plugins.is_some())
}

fn classify(env: &RuntimeEnvironment, force_browser_mode: bool) -> PlatformProfile {
    let ua = env.user_agent.to_lowercase();
    let is_native =
        !force_browser_mode && (has_real_bridge(env) || env.legacy_bridge.is_some());

    let platform_name = if force_browser_mode {
        "web".to_string()
    } else {
        env.bridge
            .as_ref()
            .and_then(|b| b.platform_name.clone())
            .or_else(|| env.legacy_bridge.clone())
            .unwrap_or_else(|| "web".to_string())
    };

    let description = if is_native {
        if ua.contains("android") {
            "Android native"
        } else {
            "iOS native"
        }
    } else if is_mobile_user_agent(&ua) {
        "Mobile browser (simulated)"
    } else {
        "Desktop browser"
    };

    PlatformProfile {
        is_native_embedded_capable: is_native,
        platform_name,
        description: description.to_string(),
    }
}

fn is_mobile_user_agent(ua: &str) -> bool {
    ["android", "iphone", "ipad", "ipod"]
        .iter()
        .any(|marker| ua.contains(marker))
}
