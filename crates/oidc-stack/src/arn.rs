//! ARNs and the names they are built from.
//!
//! When the target account is not known up front the account segment of an
//! ARN is the CloudFormation pseudo parameter [`ACCOUNT_PLACEHOLDER`], which is
//! resolved at deploy time.
use snafu::prelude::*;

use crate::{InvalidAccountSnafu, InvalidQualifierSnafu, Result};

/// Pseudo parameter standing in for the deploying account.
pub const ACCOUNT_PLACEHOLDER: &str = "${AWS::AccountId}";

/// Host of the GitHub Actions token issuer.
pub const GITHUB_OIDC_HOST: &str = "token.actions.githubusercontent.com";

/// Bootstrap qualifier used when none is configured.
pub const DEFAULT_QUALIFIER: &str = "hnb659fds";

pub const ADMINISTRATOR_ACCESS_ARN: &str = "arn:aws:iam::aws:policy/AdministratorAccess";

pub const LAMBDA_BASIC_EXECUTION_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// A 12 digit AWS account id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(account: impl Into<String>) -> Result<Self> {
        let account = account.into();
        ensure!(
            account.len() == 12 && account.chars().all(|c| c.is_ascii_digit()),
            InvalidAccountSnafu { account }
        );
        Ok(Self(account))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for AccountId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Naming token the bootstrapped deployment tooling uses to namespace its own
/// roles and buckets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BootstrapQualifier(String);

impl BootstrapQualifier {
    pub fn new(qualifier: impl Into<String>) -> Result<Self> {
        let qualifier = qualifier.into();
        ensure!(
            (1..=10).contains(&qualifier.len())
                && qualifier
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            InvalidQualifierSnafu { qualifier }
        );
        Ok(Self(qualifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BootstrapQualifier {
    fn default() -> Self {
        Self(DEFAULT_QUALIFIER.to_owned())
    }
}

impl TryFrom<String> for BootstrapQualifier {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BootstrapQualifier> for String {
    fn from(value: BootstrapQualifier) -> Self {
        value.0
    }
}

impl core::fmt::Display for BootstrapQualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The account segment of an ARN.
pub fn account_segment(account: Option<&AccountId>) -> &str {
    account.map(AccountId::as_str).unwrap_or(ACCOUNT_PLACEHOLDER)
}

/// ARN of an OIDC identity provider registered in the account.
pub fn oidc_provider(account: Option<&AccountId>, host: &str) -> String {
    format!(
        "arn:aws:iam::{}:oidc-provider/{host}",
        account_segment(account)
    )
}

/// Pattern matching every CloudFormation execution role created by bootstrapping
/// with `qualifier`.
pub fn cfn_exec_role_pattern(account: Option<&AccountId>, qualifier: &BootstrapQualifier) -> String {
    format!(
        "arn:aws:iam::{}:role/cdk-{qualifier}-cfn-exec-role-*",
        account_segment(account)
    )
}

/// Name of the bootstrap asset bucket that holds function code.
pub fn asset_bucket(account: Option<&AccountId>, qualifier: &BootstrapQualifier, region: &str) -> String {
    format!("cdk-{qualifier}-assets-{}-{region}", account_segment(account))
}

pub fn ssm_parameter(region: &str, account: Option<&AccountId>, name: &str) -> String {
    let name = name.trim_start_matches('/');
    format!(
        "arn:aws:ssm:{region}:{}:parameter/{name}",
        account_segment(account)
    )
}

/// Replaces the account placeholder with a concrete account.
pub fn substitute_account(s: &str, account: &AccountId) -> String {
    s.replace(ACCOUNT_PLACEHOLDER, account.as_str())
}
