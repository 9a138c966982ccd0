//! # oidc-stack
//!
//! A typed definition of a small AWS stack that lets GitHub Actions deploy
//! into an account without long-lived credentials.
//!
//! The stack contains:
//!
//! - a reference to a pre-existing GitHub OIDC identity provider,
//! - a role that GitHub Actions may assume with a web-identity token, whose
//!   trust policy is conditioned on the token's claims,
//! - a permission grant for that role (least privilege by default),
//! - an output carrying the role's ARN,
//! - a placeholder function bound to one configuration parameter, used only to
//!   prove that a deployment pipeline runs end to end.
//!
//! ## Usage
//!
//! Build a [`StackConfig`] (or read one from TOML with
//! [`StackConfig::from_path`]), assemble it into a [`Stack`] and either
//! synthesize a CloudFormation [`template::Template`] for an external tool to
//! deploy, or simulate the resulting policies with [`simulate::Simulator`].
//!
//! This crate does not deploy anything. There is no dependency graph, no diffing
//! against deployed state and no rollback here, those belong to whatever tool
//! deploys the synthesized template.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`] with the crate's [`Error`] enum.
//! Calls to AWS return `anyhow::Result` and convert into [`Error::Aws`].

pub mod arn;
pub mod aws;
pub mod config;
pub mod function;
pub mod grant;
pub mod parameter;
pub mod policy;
pub mod simulate;
mod stack;
pub mod template;
#[cfg(test)]
mod test;
pub mod trust;

pub use config::StackConfig;
pub use stack::{OidcProviderRef, Output, Role, Stack};

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}:\n{}",
                source.chain()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join("\n -> ")))]
    Aws { source: anyhow::Error },

    #[snafu(display("Could not read config file '{path:?}': {source}"))]
    ReadConfig {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse config file '{path:?}': {source}"))]
    ParseConfig {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display(
        "Bootstrap qualifier '{qualifier}' must be 1 to 10 characters of \
         letters, digits, '-' or '_'"
    ))]
    InvalidQualifier { qualifier: String },

    #[snafu(display("Account id '{account}' must be exactly 12 digits"))]
    InvalidAccount { account: String },

    #[snafu(display("Repository '{repository}' must have the form 'owner/name'"))]
    InvalidRepository { repository: String },

    #[snafu(display(
        "Claim value '{value}' for '{claim}' may not contain ':' or wildcards, \
         trust conditions are exact matches"
    ))]
    InvalidClaimValue { claim: String, value: String },

    #[snafu(display("Trust policy would accept no tokens: no {what} configured"))]
    EmptyTrust { what: String },

    #[snafu(display(
        "The administrator grant is disabled. Set `allow_administrator = true` \
         to grant AdministratorAccess to the deployment role"
    ))]
    AdministratorNotAllowed,

    #[snafu(display("Could not parse '{text}' as a timeout, expected e.g. '1 second'"))]
    ParseTimeout { text: String },

    #[snafu(display("Timeout of {seconds} seconds is outside of 1..=900"))]
    InvalidTimeout { seconds: u64 },

    #[snafu(display("Could not parse '{text}' as a memory size, expected e.g. '128 MB'"))]
    ParseMemory { text: String },

    #[snafu(display("Memory size of {megabytes} MB is outside of 128..=10240"))]
    InvalidMemory { megabytes: u32 },

    #[snafu(display("Parameter name '{name}' may only contain letters, digits and '_'"))]
    InvalidParameterName { name: String },

    #[snafu(display("Parameter '{name}' resolved to an empty value"))]
    EmptyParameter { name: String },

    #[snafu(display("Could not generate a random value for parameter '{name}'"))]
    Random { name: String },

    #[snafu(display("Could not serialize '{name}': {source}"))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not deserialize '{name}': {source}"))]
    Deserialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not read file {path:?}: {source}"))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not create file {path:?}: {source}"))]
    CreateFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write file {path:?}: {source}"))]
    WriteFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Construct id '{id}' has no letters or digits to name a resource with"))]
    InvalidLogicalId { id: String },

    #[snafu(display(
        "Construct id '{id}' names resource '{logical_id}', which another construct already names"
    ))]
    DuplicateLogicalId { id: String, logical_id: String },

    #[snafu(display("Simulating {what} requires a concrete account id"))]
    MissingAccount { what: String },
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::Aws { source }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
