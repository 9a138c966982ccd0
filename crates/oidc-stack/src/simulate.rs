//! Local policy simulation.
//!
//! Evaluates requests against policy documents the way IAM does for a single
//! account: an explicit deny wins, then any allow, and everything else is
//! implicitly denied.
use std::collections::BTreeMap;

use snafu::OptionExt;

use crate::{
    arn::{self, AccountId},
    policy::{ConditionOperator, Effect, PolicyDocument, Principal, Statement},
    trust::{self, claim_key, TrustScope, ASSUME_ROLE_WITH_WEB_IDENTITY, STS_AUDIENCE},
    MissingAccountSnafu, Result, Role, Stack,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Decision {
    Allowed,
    ExplicitDeny,
    ImplicitDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        *self == Decision::Allowed
    }
}

impl core::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Decision::Allowed => "allowed",
            Decision::ExplicitDeny => "explicitly denied",
            Decision::ImplicitDeny => "implicitly denied",
        })
    }
}

/// Matches `text` against a pattern where `*` matches any run of characters
/// and `?` matches exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // position of the last `*` and the text index it was tried at
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// A request to evaluate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub principal: Option<Principal>,
    pub action: String,
    pub resource: String,
    /// Condition key -> value.
    pub context: BTreeMap<String, String>,
}

impl Request {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            ..Default::default()
        }
    }
}

/// Claims of a web-identity token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
    host: String,
    claims: BTreeMap<String, String>,
}

impl TokenClaims {
    /// Empty claims of a token issued by `host`.
    pub fn issued_by(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            claims: BTreeMap::new(),
        }
    }

    /// Claims of a GitHub Actions token requested for STS, for a run of
    /// `repository` on `branch` triggered by `actor`.
    ///
    /// `customized_subject` mirrors whether the repository includes the actor
    /// in its subject claim.
    pub fn github_run(
        host: impl Into<String>,
        repository: &str,
        branch: &str,
        actor: &str,
        customized_subject: bool,
    ) -> Self {
        let sub = trust::subject(repository, branch, customized_subject.then_some(actor));
        Self::issued_by(host)
            .with("aud", STS_AUDIENCE)
            .with("sub", sub)
            .with("actor", actor)
            .with("repository", repository)
            .with("ref", format!("refs/heads/{branch}"))
    }

    /// Like [`TokenClaims::github_run`], with the subject customization that
    /// `scope` expects.
    pub fn github_run_for_scope(
        host: impl Into<String>,
        repository: &str,
        branch: &str,
        actor: &str,
        scope: TrustScope,
    ) -> Self {
        Self::github_run(
            host,
            repository,
            branch,
            actor,
            scope == TrustScope::EmbeddedActor,
        )
    }

    pub fn with(mut self, claim: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(claim.into(), value.into());
        self
    }

    pub fn get(&self, claim: &str) -> Option<&str> {
        self.claims.get(claim).map(String::as_str)
    }

    /// Claims as condition keys, eg `token.actions.githubusercontent.com:sub`.
    pub fn context(&self) -> BTreeMap<String, String> {
        self.claims
            .iter()
            .map(|(claim, value)| (claim_key(&self.host, claim), value.clone()))
            .collect()
    }
}

fn condition_holds(operator: ConditionOperator, values: &[String], actual: Option<&String>) -> bool {
    match operator {
        ConditionOperator::StringEquals => {
            actual.is_some_and(|actual| values.iter().any(|v| v == actual))
        }
        ConditionOperator::StringLike => {
            actual.is_some_and(|actual| values.iter().any(|v| glob_match(v, actual)))
        }
        // negated operators hold when the key is absent
        ConditionOperator::StringNotEquals => {
            actual.map_or(true, |actual| values.iter().all(|v| v != actual))
        }
    }
}

fn statement_matches(statement: &Statement, request: &Request) -> bool {
    if let Some(principal) = &statement.principal {
        if request.principal.as_ref() != Some(principal) {
            return false;
        }
    }
    let action = request.action.to_ascii_lowercase();
    if !statement
        .action
        .iter()
        .any(|pattern| glob_match(&pattern.to_ascii_lowercase(), &action))
    {
        return false;
    }
    if let Some(resources) = &statement.resource {
        if !resources
            .iter()
            .any(|pattern| glob_match(pattern, &request.resource))
        {
            return false;
        }
    }
    statement.condition.iter().all(|(operator, keys)| {
        keys.iter()
            .all(|(key, values)| condition_holds(*operator, &values.0, request.context.get(key)))
    })
}

/// Substitutes the account placeholder in every string of a document.
fn resolve_document(document: &PolicyDocument, account: &AccountId) -> PolicyDocument {
    let mut document = document.clone();
    for statement in document.statement.iter_mut() {
        for s in statement
            .action
            .0
            .iter_mut()
            .chain(statement.resource.iter_mut().flat_map(|r| r.0.iter_mut()))
            .chain(
                statement
                    .condition
                    .values_mut()
                    .flat_map(|keys| keys.values_mut())
                    .flat_map(|values| values.0.iter_mut()),
            )
        {
            *s = arn::substitute_account(s, account);
        }
        if let Some(
            Principal::Federated(p) | Principal::Service(p) | Principal::Aws(p),
        ) = statement.principal.as_mut()
        {
            *p = arn::substitute_account(p, account);
        }
    }
    document
}

/// Evaluates requests against a set of policy documents in one account.
#[derive(Clone, Debug)]
pub struct Simulator {
    account: AccountId,
    documents: Vec<PolicyDocument>,
}

impl Simulator {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            documents: vec![],
        }
    }

    pub fn with_document(mut self, document: &PolicyDocument) -> Self {
        self.documents
            .push(resolve_document(document, &self.account));
        self
    }

    pub fn with_documents<'a>(self, documents: impl IntoIterator<Item = &'a PolicyDocument>) -> Self {
        documents
            .into_iter()
            .fold(self, |sim, document| sim.with_document(document))
    }

    /// A simulator over the permissions of `role`.
    pub fn for_role(account: AccountId, role: &Role) -> Self {
        Self::new(account).with_documents(role.permission_documents().iter())
    }

    /// A simulator over the trust policy of `role`.
    pub fn for_trust(account: AccountId, role: &Role) -> Self {
        Self::new(account).with_document(&role.trust)
    }

    pub fn evaluate(&self, request: &Request) -> Decision {
        let mut allowed = false;
        for statement in self.documents.iter().flat_map(|d| d.statement.iter()) {
            if !statement_matches(statement, request) {
                continue;
            }
            match statement.effect {
                Effect::Deny => {
                    log::trace!("{} on {} denied by {statement:?}", request.action, request.resource);
                    return Decision::ExplicitDeny;
                }
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Decision::Allowed
        } else {
            Decision::ImplicitDeny
        }
    }

    /// Whether a token with `claims` may assume a role trusting this simulator's
    /// documents, federated through `provider_arn`.
    pub fn assume_role_with_web_identity(&self, provider_arn: &str, claims: &TokenClaims) -> Decision {
        let request = Request {
            principal: Some(Principal::Federated(arn::substitute_account(
                provider_arn,
                &self.account,
            ))),
            action: ASSUME_ROLE_WITH_WEB_IDENTITY.to_owned(),
            resource: "*".to_owned(),
            context: claims.context(),
        };
        let decision = self.evaluate(&request);
        log::debug!(
            "token with sub '{}' is {decision}",
            claims.get("sub").unwrap_or("<none>")
        );
        decision
    }
}

impl Stack {
    fn simulation_account(&self, what: &str) -> Result<AccountId> {
        self.account.clone().context(MissingAccountSnafu { what })
    }

    /// Simulates a token with `claims` assuming the deployment role.
    pub fn simulate_assume(&self, claims: &TokenClaims) -> Result<Decision> {
        let account = self.simulation_account("role assumption")?;
        Ok(Simulator::for_trust(account, &self.access_role)
            .assume_role_with_web_identity(&self.provider.arn, claims))
    }

    /// Simulates the deployment role calling `action` on `resource`.
    pub fn simulate_access(&self, action: &str, resource: &str) -> Result<Decision> {
        let account = self.simulation_account("role permissions")?;
        Ok(Simulator::for_role(account, &self.access_role).evaluate(&Request::new(action, resource)))
    }
}
