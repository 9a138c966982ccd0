//! Policy simulation against IAM itself.
use anyhow::Context;
pub use aws_config::SdkConfig;
use aws_sdk_iam::types::PolicyEvaluationDecisionType;

use crate::{
    arn::{self, AccountId},
    policy::PolicyDocument,
    simulate::Decision,
    Role,
};

/// One result of a remote simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteDecision {
    pub action: String,
    pub resource: Option<String>,
    pub decision: Decision,
}

fn decision_from(value: &PolicyEvaluationDecisionType) -> Decision {
    match value {
        PolicyEvaluationDecisionType::Allowed => Decision::Allowed,
        PolicyEvaluationDecisionType::ExplicitDeny => Decision::ExplicitDeny,
        other => {
            log::trace!("treating decision {other:?} as an implicit deny");
            Decision::ImplicitDeny
        }
    }
}

/// Asks IAM's policy simulator whether `documents` allow each of `actions` on
/// each of `resources`.
pub async fn simulate_custom_policy(
    cfg: &SdkConfig,
    account: &AccountId,
    documents: &[PolicyDocument],
    actions: &[String],
    resources: &[String],
) -> anyhow::Result<Vec<RemoteDecision>> {
    let client = aws_sdk_iam::Client::new(cfg);
    let mut request = client.simulate_custom_policy();
    for document in documents {
        let json = serde_json::to_string(document).context("could not serialize policy")?;
        request = request.policy_input_list(arn::substitute_account(&json, account));
    }
    for action in actions {
        request = request.action_names(action);
    }
    for resource in resources {
        request = request.resource_arns(resource);
    }

    let mut results = vec![];
    let mut marker: Option<String> = None;
    loop {
        let out = request
            .clone()
            .set_marker(marker.take())
            .send()
            .await
            .context("could not simulate custom policy")?;
        for result in out.evaluation_results() {
            results.push(RemoteDecision {
                action: result.eval_action_name().to_owned(),
                resource: result.eval_resource_name().map(str::to_owned),
                decision: decision_from(result.eval_decision()),
            });
        }
        if out.is_truncated() {
            marker = Some(out.marker().context("truncated simulation without a marker")?.to_owned());
        } else {
            break;
        }
    }
    log::info!("...simulated {} request(s) with IAM", results.len());
    Ok(results)
}

/// Simulates `role`'s known permissions with IAM.
pub async fn simulate_role(
    cfg: &SdkConfig,
    account: &AccountId,
    role: &Role,
    actions: &[String],
    resources: &[String],
) -> anyhow::Result<Vec<RemoteDecision>> {
    let documents = role.permission_documents();
    anyhow::ensure!(
        !documents.is_empty(),
        "role '{}' has no permissions with known contents",
        role.id
    );
    simulate_custom_policy(cfg, account, &documents, actions, resources).await
}
