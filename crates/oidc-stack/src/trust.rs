//! Trust policy assembly for GitHub Actions web-identity tokens.
//!
//! GitHub signs a token per workflow run. Its `sub` claim identifies the
//! repository and git ref (and, when the repository customizes its subject
//! claim, the actor). The trust policy built here accepts a token only when
//! its claims match the configured values exactly.
use snafu::prelude::*;

use crate::{
    arn::GITHUB_OIDC_HOST,
    policy::{ConditionOperator, PolicyDocument, Principal, Statement},
    EmptyTrustSnafu, InvalidClaimValueSnafu, InvalidRepositorySnafu, Result,
};

/// Audience GitHub requests when a workflow uses `aws-actions/configure-aws-credentials`.
pub const STS_AUDIENCE: &str = "sts.amazonaws.com";

pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";

/// The condition key for a claim of tokens issued by `host`.
pub fn claim_key(host: &str, claim: &str) -> String {
    format!("{host}:{claim}")
}

/// How a token presenter is matched.
///
/// Each scope is a different authorization posture, pick one on purpose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustScope {
    /// Any workflow run on the configured branches.
    Subject,
    /// Runs on the configured branches triggered by one of the configured actors.
    /// Both the `sub` and `actor` claims must match.
    #[default]
    SubjectAndActor,
    /// Runs on the configured branches by one of the configured actors, with
    /// the actor embedded in the `sub` claim.
    ///
    /// The repository must customize its OIDC subject claim to include the
    /// `repo`, `ref` and `actor` keys, otherwise no token will ever match.
    EmbeddedActor,
}

impl core::fmt::Display for TrustScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrustScope::Subject => "subject",
            TrustScope::SubjectAndActor => "subject_and_actor",
            TrustScope::EmbeddedActor => "embedded_actor",
        })
    }
}

/// The `sub` claim GitHub issues for a run on `branch` of `repository`.
///
/// `actor` is only part of the subject when the repository has customized
/// its subject claim.
pub fn subject(repository: &str, branch: &str, actor: Option<&str>) -> String {
    let mut sub = format!("repo:{repository}:ref:refs/heads/{branch}");
    if let Some(actor) = actor {
        sub.push_str(":actor:");
        sub.push_str(actor);
    }
    sub
}

fn ensure_exact(claim: &str, value: &str) -> Result<()> {
    ensure!(
        !value.is_empty() && !value.contains([':', '*', '?']),
        InvalidClaimValueSnafu { claim, value }
    );
    Ok(())
}

fn dedup(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

/// Who may assume the deployment role.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GithubTrust {
    /// `owner/name`
    pub repository: String,
    pub branches: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub scope: TrustScope,
}

impl GithubTrust {
    fn validate(&self) -> Result<()> {
        let valid_repo = match self.repository.split_once('/') {
            Some((owner, name)) => {
                !owner.is_empty()
                    && !name.is_empty()
                    && !name.contains('/')
                    && !self.repository.contains([':', '*', '?'])
            }
            None => false,
        };
        ensure!(
            valid_repo,
            InvalidRepositorySnafu {
                repository: &self.repository
            }
        );

        ensure!(!self.branches.is_empty(), EmptyTrustSnafu { what: "branches" });
        for branch in self.branches.iter() {
            ensure_exact("branch", branch)?;
        }
        if self.scope != TrustScope::Subject {
            ensure!(!self.actors.is_empty(), EmptyTrustSnafu { what: "actors" });
        }
        for actor in self.actors.iter() {
            ensure_exact("actor", actor)?;
        }
        Ok(())
    }

    /// Every `sub` value the trust policy accepts.
    pub fn subjects(&self) -> Vec<String> {
        let branches = dedup(&self.branches);
        match self.scope {
            TrustScope::Subject | TrustScope::SubjectAndActor => branches
                .iter()
                .map(|branch| subject(&self.repository, branch, None))
                .collect(),
            TrustScope::EmbeddedActor => {
                let actors = dedup(&self.actors);
                branches
                    .iter()
                    .flat_map(|branch| {
                        actors
                            .iter()
                            .map(|actor| subject(&self.repository, branch, Some(actor)))
                    })
                    .collect()
            }
        }
    }

    /// Builds the trust policy for tokens issued by `host`, federated through
    /// the provider at `provider_arn`.
    pub fn policy(&self, provider_arn: &str, host: &str) -> Result<PolicyDocument> {
        self.validate()?;
        log::debug!(
            "assembling '{}' trust for {} on {:?}",
            self.scope,
            self.repository,
            self.branches
        );
        if self.scope == TrustScope::EmbeddedActor {
            log::info!(
                "trust scope 'embedded_actor' requires {} to customize its OIDC subject \
                 claim with the keys [repo, ref, actor]",
                self.repository
            );
        }

        let mut statement = Statement::allow()
            .with_principal(Principal::Federated(provider_arn.to_owned()))
            .with_actions([ASSUME_ROLE_WITH_WEB_IDENTITY])
            .with_condition(
                ConditionOperator::StringEquals,
                claim_key(host, "aud"),
                [STS_AUDIENCE],
            )
            .with_condition(
                ConditionOperator::StringEquals,
                claim_key(host, "sub"),
                self.subjects(),
            );
        if self.scope == TrustScope::SubjectAndActor {
            statement = statement.with_condition(
                ConditionOperator::StringEquals,
                claim_key(host, "actor"),
                dedup(&self.actors),
            );
        }
        Ok(PolicyDocument::new([statement]))
    }

    /// Trust policy for the GitHub Actions issuer.
    pub fn github_policy(&self, provider_arn: &str) -> Result<PolicyDocument> {
        self.policy(provider_arn, GITHUB_OIDC_HOST)
    }
}
