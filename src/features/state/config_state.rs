//! # Config State
//!
//! Process-wide configuration assembled from the host's setter calls. Every
//! setter is last-write-wins and infallible. Environment overrides captured
//! in [`Config`] are merged in by the getters, so an operator can pin a value
//! regardless of what the host sets.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::core::Config;
use crate::features::consent::{ConsentInputs, ConsentSignal, DEFAULT_REQUEST_PROMPT};
use crate::features::settings::{settings_key, SettingsKey};
use uuid::Uuid;

/// Values from the environment that win over setter calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Overrides {
    project_key: Option<String>,
    user_id: Option<String>,
    invocation_id: Option<String>,
    debug: Option<bool>,
    noninteractive: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigState {
    overrides: Overrides,
    debug: bool,
    version: String,
    project_key: String,
    project_slug: String,
    instance_id: String,
    ci_tracking_enabled: bool,
    is_ci: bool,
    /// `None` until the host says; then the environment default no longer applies
    is_noninteractive: Option<bool>,
    noninteractive_tracking_enabled: bool,
    request_permission_prompt: String,
    user_id: String,
    invocation_id: String,
    /// Used when neither the host nor the environment provides one
    fallback_invocation_id: String,
}

/// Identity captured into each event at enqueue time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub project_slug: String,
    pub version: String,
    pub is_ci: bool,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl ConfigState {
    pub fn new(config: &Config) -> Self {
        ConfigState {
            overrides: Overrides {
                project_key: config.project_key.clone(),
                user_id: config.user_id.clone(),
                invocation_id: config.invocation_id.clone(),
                debug: config.debug,
                noninteractive: config.noninteractive,
            },
            debug: false,
            version: String::new(),
            project_key: String::new(),
            project_slug: String::new(),
            instance_id: String::new(),
            ci_tracking_enabled: false,
            is_ci: false,
            is_noninteractive: None,
            noninteractive_tracking_enabled: false,
            request_permission_prompt: DEFAULT_REQUEST_PROMPT.to_string(),
            user_id: String::new(),
            invocation_id: String::new(),
            fallback_invocation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    pub fn set_project_key(&mut self, key: &str) {
        self.project_key = key.to_string();
    }

    pub fn set_project_slug(&mut self, slug: &str) {
        self.project_slug = slug.to_string();
    }

    pub fn set_instance_id(&mut self, id: &str) {
        self.instance_id = id.to_string();
    }

    pub fn set_request_permission_prompt(&mut self, text: &str) {
        self.request_permission_prompt = text.to_string();
    }

    pub fn set_user_id(&mut self, user_id: &str) {
        self.user_id = user_id.to_string();
    }

    pub fn set_invocation_id(&mut self, invocation_id: &str) {
        self.invocation_id = invocation_id.to_string();
    }

    /// Single entry point for every consent-affecting setter
    pub fn apply(&mut self, signal: ConsentSignal) {
        match signal {
            ConsentSignal::IsCi(is_ci) => self.is_ci = is_ci,
            ConsentSignal::CiTrackingEnabled(enabled) => self.ci_tracking_enabled = enabled,
            ConsentSignal::IsNoninteractive(flag) => self.is_noninteractive = Some(flag),
            ConsentSignal::NoninteractiveTrackingEnabled(enabled) => {
                self.noninteractive_tracking_enabled = enabled
            }
            ConsentSignal::Noninteractive {
                is_noninteractive,
                tracking_enabled,
            } => {
                self.is_noninteractive = Some(is_noninteractive);
                self.noninteractive_tracking_enabled = tracking_enabled;
            }
        }
    }

    pub fn debug(&self) -> bool {
        self.overrides.debug.unwrap_or(self.debug)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn project_key(&self) -> &str {
        self.overrides
            .project_key
            .as_deref()
            .unwrap_or(&self.project_key)
    }

    pub fn project_slug(&self) -> &str {
        &self.project_slug
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn request_permission_prompt(&self) -> &str {
        &self.request_permission_prompt
    }

    /// User id from the environment or the host; `None` means fall back to
    /// the id cached in the settings store
    pub fn user_id(&self) -> Option<&str> {
        self.overrides
            .user_id
            .as_deref()
            .or(Some(self.user_id.as_str()).filter(|id| !id.is_empty()))
    }

    /// Invocation id from the environment or the host, else one generated for
    /// this process
    pub fn invocation_id(&self) -> &str {
        if let Some(id) = self.overrides.invocation_id.as_deref() {
            return id;
        }
        if !self.invocation_id.is_empty() {
            return &self.invocation_id;
        }
        &self.fallback_invocation_id
    }

    pub fn is_noninteractive(&self) -> bool {
        self.is_noninteractive
            .or(self.overrides.noninteractive)
            .unwrap_or(false)
    }

    pub fn consent_inputs(&self) -> ConsentInputs {
        ConsentInputs {
            is_ci: self.is_ci,
            ci_tracking_enabled: self.ci_tracking_enabled,
            is_noninteractive: self.is_noninteractive(),
            noninteractive_tracking_enabled: self.noninteractive_tracking_enabled,
        }
    }

    /// Key of the persisted settings record for the configured project
    pub fn settings_key(&self) -> SettingsKey {
        settings_key(&self.project_slug, &self.instance_id)
    }

    /// Identity for an event tracked under `slug`; an empty slug means the
    /// configured project
    pub fn identity_for(&self, slug: &str) -> IdentitySnapshot {
        let project_slug = if slug.is_empty() {
            self.project_slug.clone()
        } else {
            slug.to_string()
        };
        IdentitySnapshot {
            project_slug,
            version: self.version.clone(),
            is_ci: self.is_ci,
        }
    }
}
