//! The configuration parameter bound to the placeholder function.
//!
//! A parameter's value is resolved once, when the stack is assembled, and is
//! fixed for that deployment.
use ring::rand::SecureRandom;
use snafu::prelude::*;

use crate::{EmptyParameterSnafu, InvalidParameterNameSnafu, RandomSnafu, Result};

pub const MOCK_VALUE_VAR: &str = "MOCK_VALUE";
pub const MOCK_VALUE_FALLBACK: &str = "UNKNOWN";

/// Where a parameter's value comes from.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum ParameterSource {
    /// An environment variable of the synthesizing process, or `fallback` when
    /// the variable is unset. A variable set to the empty string is not unset.
    Env { var: String, fallback: String },
    Literal { value: String },
    /// `bytes` random bytes, hex encoded.
    Random { bytes: usize },
}

impl Default for ParameterSource {
    fn default() -> Self {
        ParameterSource::Env {
            var: MOCK_VALUE_VAR.to_owned(),
            fallback: MOCK_VALUE_FALLBACK.to_owned(),
        }
    }
}

/// Describes the source without its value, so it can be logged.
impl core::fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterSource::Env { var, .. } => write!(f, "env var {var}"),
            ParameterSource::Literal { .. } => f.write_str("a literal"),
            ParameterSource::Random { bytes } => write!(f, "{bytes} random bytes"),
        }
    }
}

impl ParameterSource {
    /// Resolves the value, looking environment variables up with `lookup`.
    pub fn resolve_with(
        &self,
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        match self {
            ParameterSource::Env { var, fallback } => Ok(lookup(var).unwrap_or_else(|| {
                log::debug!("{var} is unset, parameter '{name}' falls back to '{fallback}'");
                fallback.clone()
            })),
            ParameterSource::Literal { value } => Ok(value.clone()),
            ParameterSource::Random { bytes } => {
                let mut buffer = vec![0u8; *bytes];
                ring::rand::SystemRandom::new()
                    .fill(&mut buffer)
                    .ok()
                    .context(RandomSnafu { name })?;
                Ok(data_encoding::HEXLOWER.encode(&buffer))
            }
        }
    }

    /// Resolves the value from the process environment.
    pub fn resolve(&self, name: &str) -> Result<String> {
        self.resolve_with(name, |var| std::env::var(var).ok())
    }
}

/// A named value injected into a function when it is created.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        ensure!(
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            InvalidParameterNameSnafu { name }
        );
        ensure!(!value.is_empty(), EmptyParameterSnafu { name });
        Ok(Self { name, value })
    }

    pub fn resolve(name: impl Into<String>, source: &ParameterSource) -> Result<Self> {
        let name = name.into();
        let value = source.resolve(&name)?;
        Self::new(name, value)
    }

    /// Name of the SSM parameter holding the value.
    pub fn ssm_name(&self, app: &str, stage: &str) -> String {
        format!("/{app}/{stage}/Parameter/{}/value", self.name)
    }

    /// Environment variable exposing the value to the function.
    pub fn env_var(&self) -> String {
        format!("PARAMETER_{}", self.name)
    }

    /// Environment variable exposing the SSM parameter name to the function.
    pub fn env_var_path(&self) -> String {
        format!("PARAMETER_{}_PATH", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_source_falls_back_only_when_unset() {
        let source = ParameterSource::default();
        let set = source
            .resolve_with("VAL", |var| (var == MOCK_VALUE_VAR).then(|| "x".to_owned()))
            .unwrap();
        assert_eq!("x", set);
        let unset = source.resolve_with("VAL", |_| None).unwrap();
        assert_eq!("UNKNOWN", unset);
        let empty = source.resolve_with("VAL", |_| Some(String::new())).unwrap();
        assert_eq!("", empty);
    }

    #[test]
    fn random_source_is_hex() {
        let source = ParameterSource::Random { bytes: 8 };
        let a = source.resolve("VAL").unwrap();
        let b = source.resolve("VAL").unwrap();
        assert_eq!(16, a.len());
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn source_display_hides_values() {
        let literal = ParameterSource::Literal {
            value: "hunter2".to_owned(),
        };
        assert_eq!("a literal", literal.to_string());
        let env = ParameterSource::Env {
            var: "OTHER".to_owned(),
            fallback: "hunter2".to_owned(),
        };
        assert_eq!("env var OTHER", env.to_string());
        assert_eq!("8 random bytes", ParameterSource::Random { bytes: 8 }.to_string());
    }

    #[test]
    fn parameter_validation() {
        assert!(Parameter::new("VAL", "x").is_ok());
        assert!(matches!(
            Parameter::new("VAL", ""),
            Err(crate::Error::EmptyParameter { .. })
        ));
        assert!(matches!(
            Parameter::new("my-val", "x"),
            Err(crate::Error::InvalidParameterName { .. })
        ));
        let p = Parameter::new("VAL", "x").unwrap();
        assert_eq!(
            "/ga-test-aws-deployment/dev/Parameter/VAL/value",
            p.ssm_name("ga-test-aws-deployment", "dev")
        );
        assert_eq!("PARAMETER_VAL", p.env_var());
    }

    #[test]
    fn source_from_toml() {
        #[derive(serde::Deserialize)]
        struct Holder {
            source: ParameterSource,
        }
        let holder: Holder = toml::from_str(
            r#"
            source = { from = "env", var = "OTHER", fallback = "none" }
            "#,
        )
        .unwrap();
        assert_eq!(
            ParameterSource::Env {
                var: "OTHER".into(),
                fallback: "none".into()
            },
            holder.source
        );
        let holder: Holder = toml::from_str(r#"source = { from = "random", bytes = 4 }"#).unwrap();
        assert_eq!(ParameterSource::Random { bytes: 4 }, holder.source);
    }
}
