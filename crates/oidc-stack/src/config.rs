//! Stack configuration.
//!
//! Every field has a default, so an empty TOML file describes the stack this
//! crate was written for:
//!
//! ```toml
//! [app]
//! name = "ga-test-aws-deployment"
//! region = "us-east-1"
//! stage = "dev"
//!
//! [github]
//! repository = "rangle/cmap-availability"
//! branches = ["main"]
//! actors = ["smoogly"]
//! scope = "subject_and_actor"
//!
//! [function.parameter]
//! name = "VAL"
//! source = { from = "env", var = "MOCK_VALUE", fallback = "UNKNOWN" }
//! ```
use snafu::prelude::*;

use crate::{
    arn::{AccountId, BootstrapQualifier, GITHUB_OIDC_HOST},
    function::{Memory, Timeout, DEFAULT_CODE_KEY, DEFAULT_HANDLER, DEFAULT_RUNTIME},
    grant::PermissionScope,
    parameter::ParameterSource,
    trust::{GithubTrust, TrustScope},
    ParseConfigSnafu, ReadConfigSnafu, Result,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub region: String,
    pub stage: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "ga-test-aws-deployment".to_owned(),
            region: "us-east-1".to_owned(),
            stage: "dev".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    pub name: String,
    pub source: ParameterSource,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            name: "VAL".to_owned(),
            source: ParameterSource::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    pub id: String,
    pub handler: String,
    pub runtime: String,
    /// Object key of the code package in the bootstrap asset bucket.
    pub code_key: String,
    pub timeout: Timeout,
    pub memory: Memory,
    pub logging: bool,
    pub parameter: ParameterConfig,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            id: "mock-deployment".to_owned(),
            handler: DEFAULT_HANDLER.to_owned(),
            runtime: DEFAULT_RUNTIME.to_owned(),
            code_key: DEFAULT_CODE_KEY.to_owned(),
            timeout: Timeout::default(),
            memory: Memory::default(),
            logging: false,
            parameter: ParameterConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub app: AppConfig,
    /// Target account. When unset, ARNs are resolved at deploy time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountId>,
    pub bootstrap_qualifier: BootstrapQualifier,
    /// Host of the OIDC issuer, whose provider must already exist in the account.
    pub oidc_host: String,
    /// Construct id of the deployment role.
    pub role_id: String,
    pub github: GithubTrust,
    pub permissions: PermissionScope,
    /// Opt-in for [`PermissionScope::Administrator`].
    pub allow_administrator: bool,
    pub function: FunctionConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            account: None,
            bootstrap_qualifier: BootstrapQualifier::default(),
            oidc_host: GITHUB_OIDC_HOST.to_owned(),
            role_id: "github-action-access".to_owned(),
            github: GithubTrust {
                repository: "rangle/cmap-availability".to_owned(),
                branches: vec!["main".to_owned()],
                actors: vec!["smoogly".to_owned()],
                scope: TrustScope::SubjectAndActor,
            },
            permissions: PermissionScope::LeastPrivilege,
            allow_administrator: false,
            function: FunctionConfig::default(),
        }
    }
}

impl StackConfig {
    pub fn from_toml(contents: &str, path: impl AsRef<std::path::Path>) -> Result<Self> {
        toml::from_str(contents).context(ParseConfigSnafu {
            path: path.as_ref(),
        })
    }

    /// Reads the configuration at `path`.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("reading stack config from {path:?}");
        let contents = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        Self::from_toml(&contents, path)
    }

    /// Reads the configuration at `path`, or the default configuration if there
    /// is no file there.
    pub fn from_path_or_default(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_path(path)
        } else {
            log::info!("no config at {path:?}, using the default stack config");
            Ok(Self::default())
        }
    }
}
