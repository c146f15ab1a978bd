//! Configuration types for the engine.
//!
//! [`AppInfo`] describes the embedding application and is exposed to script
//! as `_appInfo`. [`EngineConfig`] carries the settings used when default
//! collaborators have to be constructed.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Information about the host application, visible to script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// Host-assigned identifier of this installation.
    pub id: String,
    /// Name of the filtering component, e.g. "adblockplus".
    pub name: String,
    pub version: String,
    /// Name of the embedding application, e.g. "android".
    pub application: String,
    pub application_version: String,
    /// BCP 47 locale, e.g. "en-US".
    pub locale: String,
    pub development_build: bool,
}

impl AppInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    pub fn application_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = version.into();
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn development_build(mut self, development_build: bool) -> Self {
        self.development_build = development_build;
        self
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub app_info: AppInfo,

    /// Base directory the default file system resolves relative paths
    /// against. `None` leaves paths untouched.
    pub base_path: Option<PathBuf>,

    /// Timeout applied by the default web request.
    /// Default: 30 seconds
    pub web_request_timeout: Duration,

    /// User agent sent by the default web request.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_info: AppInfo::default(),
            base_path: None,
            web_request_timeout: Duration::from_secs(30),
            user_agent: concat!("sieve/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new(app_info: AppInfo) -> Self {
        Self {
            app_info,
            ..Default::default()
        }
    }
}
