//! Stack assembly.
use crate::{
    arn::{self, AccountId, BootstrapQualifier},
    config::StackConfig,
    function::{FunctionCode, FunctionStub, FunctionTarget},
    grant::PermissionGrant,
    parameter::Parameter,
    policy::PolicyDocument,
    Result,
};

/// An OIDC identity provider that already exists in the account.
///
/// Only one provider per issuer URL may exist in an account, so the stack
/// references it rather than creating it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OidcProviderRef {
    pub host: String,
    pub arn: String,
}

impl OidcProviderRef {
    pub fn new(account: Option<&AccountId>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            arn: arn::oidc_provider(account, &host),
            host,
        }
    }
}

/// A permission principal and the grants it owns.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Role {
    /// Construct id, unique within the stack.
    pub id: String,
    pub trust: PolicyDocument,
    pub grants: Vec<PermissionGrant>,
}

impl Role {
    pub fn inline_grants(&self) -> impl Iterator<Item = (&str, &PolicyDocument)> {
        self.grants.iter().filter_map(|grant| match grant {
            PermissionGrant::Inline { name, document } => Some((name.as_str(), document)),
            PermissionGrant::Managed { .. } => None,
        })
    }

    pub fn managed_grants(&self) -> impl Iterator<Item = &str> {
        self.grants.iter().filter_map(|grant| match grant {
            PermissionGrant::Managed { arn } => Some(arn.as_str()),
            PermissionGrant::Inline { .. } => None,
        })
    }

    /// The documents making up this role's permissions, as far as they are known.
    pub fn permission_documents(&self) -> Vec<PolicyDocument> {
        self.grants
            .iter()
            .filter_map(PermissionGrant::effective_document)
            .collect()
    }

    pub fn is_administrator(&self) -> bool {
        self.grants.iter().any(PermissionGrant::is_administrator)
    }
}

/// A stack output.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Output {
    /// The ARN of the role with the given construct id.
    RoleArn { name: String, role_id: String },
}

impl Output {
    pub fn name(&self) -> &str {
        match self {
            Output::RoleArn { name, .. } => name,
        }
    }
}

/// The assembled stack.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stack {
    pub name: String,
    pub app: String,
    pub stage: String,
    pub region: String,
    pub account: Option<AccountId>,
    pub qualifier: BootstrapQualifier,
    pub provider: OidcProviderRef,
    /// The role assumed by CI.
    pub access_role: Role,
    pub function: FunctionStub,
    pub function_role: Role,
    pub outputs: Vec<Output>,
}

impl Stack {
    /// Assembles the stack described by `config`.
    ///
    /// The function's parameter is resolved here, from the process environment
    /// if so configured.
    pub fn new(config: &StackConfig) -> Result<Self> {
        let account = config.account.as_ref();
        let qualifier = config.bootstrap_qualifier.clone();
        log::debug!(
            "assembling stack '{}' for account {}",
            config.app.name,
            arn::account_segment(account)
        );

        let provider = OidcProviderRef::new(account, &config.oidc_host);
        let trust = config.github.policy(&provider.arn, &provider.host)?;
        let grant = PermissionGrant::for_scope(
            config.permissions,
            config.allow_administrator,
            account,
            &qualifier,
        )?;
        let access_role = Role {
            id: config.role_id.clone(),
            trust,
            grants: vec![grant],
        };

        let function_config = &config.function;
        let parameter = Parameter::resolve(
            &function_config.parameter.name,
            &function_config.parameter.source,
        )?;
        log::info!(
            "parameter '{}' of '{}' resolved from {}",
            parameter.name,
            function_config.id,
            function_config.parameter.source
        );
        log::debug!("parameter '{}' = '{}'", parameter.name, parameter.value);
        let target = FunctionTarget {
            app: &config.app.name,
            stage: &config.app.stage,
            region: &config.app.region,
            account,
        };
        let (parameter_path, parameter_arn) = target.parameter_location(&parameter);
        let function = FunctionStub {
            id: function_config.id.clone(),
            handler: function_config.handler.clone(),
            runtime: function_config.runtime.clone(),
            code: FunctionCode {
                bucket: arn::asset_bucket(account, &qualifier, &config.app.region),
                key: function_config.code_key.clone(),
            },
            timeout: function_config.timeout,
            memory: function_config.memory,
            logging: function_config.logging,
            parameter,
            parameter_path,
            parameter_arn,
        };
        let function_role = Role {
            id: format!("{}-service-role", function.id),
            trust: FunctionStub::execution_trust(),
            grants: function.execution_grants(),
        };

        let outputs = vec![Output::RoleArn {
            name: "githubAccessRoleArn".to_owned(),
            role_id: access_role.id.clone(),
        }];

        Ok(Stack {
            name: format!("{}-{}", config.app.stage, config.app.name),
            app: config.app.name.clone(),
            stage: config.app.stage.clone(),
            region: config.app.region.clone(),
            account: config.account.clone(),
            qualifier,
            provider,
            access_role,
            function,
            function_role,
            outputs,
        })
    }

    pub fn roles(&self) -> [&Role; 2] {
        [&self.access_role, &self.function_role]
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles().into_iter().find(|role| role.id == id)
    }
}
