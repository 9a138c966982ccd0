//! Permission grants attached to roles.
use crate::{
    arn::{self, AccountId, BootstrapQualifier},
    policy::{PolicyDocument, Statement},
    trust::ASSUME_ROLE_WITH_WEB_IDENTITY,
    AdministratorNotAllowedSnafu, Result,
};

/// Name of the inline policy of the deployment role.
pub const DEPLOY_POLICY_NAME: &str = "cdk";

/// How much the deployment role may do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    /// Only assume the bootstrapped CloudFormation execution roles.
    #[default]
    LeastPrivilege,
    /// `AdministratorAccess`. Anyone who can present a matching token owns the account.
    Administrator,
}

impl core::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PermissionScope::LeastPrivilege => "least_privilege",
            PermissionScope::Administrator => "administrator",
        })
    }
}

/// A permission grant owned by a role.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PermissionGrant {
    /// A policy authored directly on the role.
    Inline {
        name: String,
        document: PolicyDocument,
    },
    /// A reference to a managed policy.
    Managed { arn: String },
}

impl PermissionGrant {
    /// Allows assuming the CloudFormation execution roles created by bootstrapping
    /// with `qualifier`, and nothing else.
    pub fn least_privilege(account: Option<&AccountId>, qualifier: &BootstrapQualifier) -> Self {
        PermissionGrant::Inline {
            name: DEPLOY_POLICY_NAME.to_owned(),
            document: PolicyDocument::new([Statement::allow()
                .with_actions([ASSUME_ROLE_WITH_WEB_IDENTITY])
                .with_resources([arn::cfn_exec_role_pattern(account, qualifier)])]),
        }
    }

    pub fn administrator() -> Self {
        PermissionGrant::Managed {
            arn: arn::ADMINISTRATOR_ACCESS_ARN.to_owned(),
        }
    }

    /// The grant for `scope`.
    ///
    /// ## Errors
    /// Errs with [`crate::Error::AdministratorNotAllowed`] for
    /// [`PermissionScope::Administrator`] unless `allow_administrator` is set.
    pub fn for_scope(
        scope: PermissionScope,
        allow_administrator: bool,
        account: Option<&AccountId>,
        qualifier: &BootstrapQualifier,
    ) -> Result<Self> {
        match scope {
            PermissionScope::LeastPrivilege => Ok(Self::least_privilege(account, qualifier)),
            PermissionScope::Administrator => {
                snafu::ensure!(allow_administrator, AdministratorNotAllowedSnafu);
                log::warn!(
                    "granting AdministratorAccess to the deployment role: any token matching \
                     the trust policy has full control of the account"
                );
                Ok(Self::administrator())
            }
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, PermissionGrant::Managed { arn } if arn == arn::ADMINISTRATOR_ACCESS_ARN)
    }

    /// The document this grant contributes to a role's effective permissions,
    /// if its contents are known.
    pub fn effective_document(&self) -> Option<PolicyDocument> {
        match self {
            PermissionGrant::Inline { document, .. } => Some(document.clone()),
            PermissionGrant::Managed { arn } => managed_document(arn),
        }
    }
}

/// The contents of the managed policies used in this crate.
pub fn managed_document(managed_arn: &str) -> Option<PolicyDocument> {
    match managed_arn {
        arn::ADMINISTRATOR_ACCESS_ARN => Some(PolicyDocument::new([Statement::allow()
            .with_actions(["*"])
            .with_resources(["*"])])),
        arn::LAMBDA_BASIC_EXECUTION_ARN => Some(PolicyDocument::new([Statement::allow()
            .with_actions([
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
            ])
            .with_resources(["*"])])),
        other => {
            log::debug!("contents of managed policy {other} are unknown");
            None
        }
    }
}
