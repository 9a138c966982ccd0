//! The placeholder function.
//!
//! It exists to prove that a pipeline can deploy code, so it is kept as small
//! as the platform allows: a one second timeout, the minimum memory size and
//! no log output.
use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::{
    arn::{self, AccountId},
    grant::PermissionGrant,
    parameter::Parameter,
    policy::{PolicyDocument, Principal, Statement},
    InvalidMemorySnafu, InvalidTimeoutSnafu, ParseMemorySnafu, ParseTimeoutSnafu, Result,
};

pub const DEFAULT_HANDLER: &str = "mockdeploy/mockfn.handler";
pub const DEFAULT_RUNTIME: &str = "nodejs18.x";
pub const DEFAULT_CODE_KEY: &str = "mockdeploy.zip";

const LOG_ACTIONS: [&str; 3] = [
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

/// Splits "12 seconds" into (12, "seconds").
fn split_quantity(text: &str) -> Option<(u64, String)> {
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = text.split_at(split);
    let amount = amount.parse().ok()?;
    Some((amount, unit.trim().to_ascii_lowercase()))
}

/// Function timeout, 1 second to 15 minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeout {
    seconds: u64,
}

impl Timeout {
    pub fn from_secs(seconds: u64) -> Result<Self> {
        ensure!((1..=900).contains(&seconds), InvalidTimeoutSnafu { seconds });
        Ok(Self { seconds })
    }

    pub fn as_secs(&self) -> u64 {
        self.seconds
    }
}

impl core::str::FromStr for Timeout {
    type Err = crate::Error;

    fn from_str(text: &str) -> Result<Self> {
        let (amount, unit) = split_quantity(text).context(ParseTimeoutSnafu { text })?;
        let seconds = match unit.as_str() {
            "s" | "second" | "seconds" => amount,
            "m" | "minute" | "minutes" => amount.saturating_mul(60),
            _ => return ParseTimeoutSnafu { text }.fail(),
        };
        Self::from_secs(seconds)
    }
}

impl TryFrom<String> for Timeout {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeout> for String {
    fn from(value: Timeout) -> Self {
        value.to_string()
    }
}

impl core::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.seconds {
            1 => f.write_str("1 second"),
            n => write!(f, "{n} seconds"),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self { seconds: 1 }
    }
}

/// Function memory size, 128 MB to 10 GB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Memory {
    megabytes: u32,
}

impl Memory {
    pub fn from_megabytes(megabytes: u32) -> Result<Self> {
        ensure!(
            (128..=10240).contains(&megabytes),
            InvalidMemorySnafu { megabytes }
        );
        Ok(Self { megabytes })
    }

    pub fn as_megabytes(&self) -> u32 {
        self.megabytes
    }
}

impl core::str::FromStr for Memory {
    type Err = crate::Error;

    fn from_str(text: &str) -> Result<Self> {
        let (amount, unit) = split_quantity(text).context(ParseMemorySnafu { text })?;
        let megabytes = match unit.as_str() {
            "mb" => amount,
            "gb" => amount.saturating_mul(1024),
            _ => return ParseMemorySnafu { text }.fail(),
        };
        let megabytes = u32::try_from(megabytes).unwrap_or(u32::MAX);
        Self::from_megabytes(megabytes)
    }
}

impl TryFrom<String> for Memory {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Memory> for String {
    fn from(value: Memory) -> Self {
        value.to_string()
    }
}

impl core::fmt::Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} MB", self.megabytes)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self { megabytes: 128 }
    }
}

/// Location of the function's code package.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCode {
    pub bucket: String,
    pub key: String,
}

/// A compute unit bound to exactly one [`Parameter`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionStub {
    pub id: String,
    pub handler: String,
    pub runtime: String,
    pub code: FunctionCode,
    pub timeout: Timeout,
    pub memory: Memory,
    pub logging: bool,
    pub parameter: Parameter,
    /// Name of the SSM parameter backing `parameter`.
    pub parameter_path: String,
    /// ARN of the SSM parameter backing `parameter`.
    pub parameter_arn: String,
}

impl FunctionStub {
    /// Environment of the function, exposing its parameter.
    pub fn environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.parameter.env_var(), self.parameter.value.clone()),
            (self.parameter.env_var_path(), self.parameter_path.clone()),
        ])
    }

    /// Trust policy of the function's execution role.
    pub fn execution_trust() -> PolicyDocument {
        PolicyDocument::new([Statement::allow()
            .with_principal(Principal::Service("lambda.amazonaws.com".to_owned()))
            .with_actions(["sts:AssumeRole"])])
    }

    /// Grants of the function's execution role.
    ///
    /// With logging disabled the log actions of the basic execution policy are
    /// explicitly denied, so the function never creates a log group.
    pub fn execution_grants(&self) -> Vec<PermissionGrant> {
        let mut statements = vec![Statement::allow()
            .with_actions(["ssm:GetParameter"])
            .with_resources([self.parameter_arn.clone()])];
        if !self.logging {
            statements.push(
                Statement::deny()
                    .with_actions(LOG_ACTIONS)
                    .with_resources(["*"]),
            );
        }
        vec![
            PermissionGrant::Managed {
                arn: arn::LAMBDA_BASIC_EXECUTION_ARN.to_owned(),
            },
            PermissionGrant::Inline {
                name: format!("{}-parameter", self.id),
                document: PolicyDocument::new(statements),
            },
        ]
    }
}

/// Everything needed to place a [`FunctionStub`] in an account.
pub struct FunctionTarget<'a> {
    pub app: &'a str,
    pub stage: &'a str,
    pub region: &'a str,
    pub account: Option<&'a AccountId>,
}

impl FunctionTarget<'_> {
    pub fn parameter_location(&self, parameter: &Parameter) -> (String, String) {
        let path = parameter.ssm_name(self.app, self.stage);
        let arn = arn::ssm_parameter(self.region, self.account, &path);
        (path, arn)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_timeout() {
        assert_eq!(1, "1 second".parse::<Timeout>().unwrap().as_secs());
        assert_eq!(30, "30 seconds".parse::<Timeout>().unwrap().as_secs());
        assert_eq!(120, "2 minutes".parse::<Timeout>().unwrap().as_secs());
        assert_eq!(5, "5s".parse::<Timeout>().unwrap().as_secs());
        assert!(matches!(
            "0 seconds".parse::<Timeout>(),
            Err(crate::Error::InvalidTimeout { .. })
        ));
        assert!(matches!(
            "16 minutes".parse::<Timeout>(),
            Err(crate::Error::InvalidTimeout { .. })
        ));
        assert!(matches!(
            "one second".parse::<Timeout>(),
            Err(crate::Error::ParseTimeout { .. })
        ));
        assert_eq!("1 second", Timeout::default().to_string());
    }

    #[test]
    fn parse_memory() {
        assert_eq!(128, "128 MB".parse::<Memory>().unwrap().as_megabytes());
        assert_eq!(2048, "2 GB".parse::<Memory>().unwrap().as_megabytes());
        assert!(matches!(
            "64 MB".parse::<Memory>(),
            Err(crate::Error::InvalidMemory { .. })
        ));
        assert!(matches!(
            "128 KB".parse::<Memory>(),
            Err(crate::Error::ParseMemory { .. })
        ));
        let json = serde_json::to_value(Memory::default()).unwrap();
        assert_eq!(serde_json::json!("128 MB"), json);
    }
}
