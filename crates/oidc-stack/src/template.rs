//! CloudFormation template synthesis.
//!
//! The synthesized template is handed to an external tool for deployment.
use std::collections::BTreeMap;

use snafu::prelude::*;
use tokio::io::AsyncWriteExt;

use crate::{
    arn::ACCOUNT_PLACEHOLDER, stack::Output, CreateFileSnafu, DuplicateLogicalIdSnafu,
    InvalidLogicalIdSnafu, ReadFileSnafu, Result, Role, SerializeSnafu, Stack, WriteFileSnafu,
};

pub const FORMAT_VERSION: &str = "2010-09-09";

/// Converts a construct id into a CloudFormation logical id,
/// eg `github-action-access` into `GithubActionAccess`.
pub fn logical_id(construct_id: &str) -> String {
    construct_id
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Wraps every string that references a pseudo parameter in `Fn::Sub`.
fn substitute_pseudo_parameters(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.contains("${AWS::") => {
            serde_json::json!({ "Fn::Sub": s })
        }
        serde_json::Value::Array(values) => values
            .into_iter()
            .map(substitute_pseudo_parameters)
            .collect(),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, substitute_pseudo_parameters(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        other => other,
    }
}

fn get_att_arn(logical_id: &str) -> serde_json::Value {
    serde_json::json!({ "Fn::GetAtt": [logical_id, "Arn"] })
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub ty: String,
    pub properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

/// Adds `resource` under the logical id of `construct_id`, returning that id.
fn insert_resource(
    resources: &mut BTreeMap<String, TemplateResource>,
    construct_id: &str,
    resource: TemplateResource,
) -> Result<String> {
    let id = logical_id(construct_id);
    ensure!(!id.is_empty(), InvalidLogicalIdSnafu { id: construct_id });
    ensure!(
        !resources.contains_key(&id),
        DuplicateLogicalIdSnafu {
            id: construct_id,
            logical_id: &id
        }
    );
    resources.insert(id.clone(), resource);
    Ok(id)
}

fn role_resource(role: &Role) -> Result<TemplateResource> {
    let mut properties = serde_json::Map::new();
    properties.insert("AssumeRolePolicyDocument".into(), role.trust.to_json()?);

    let mut policies = vec![];
    for (name, document) in role.inline_grants() {
        policies.push(serde_json::json!({
            "PolicyName": name,
            "PolicyDocument": document.to_json()?,
        }));
    }
    if !policies.is_empty() {
        properties.insert("Policies".into(), policies.into());
    }
    let managed: Vec<_> = role.managed_grants().collect();
    if !managed.is_empty() {
        properties.insert("ManagedPolicyArns".into(), managed.into());
    }

    Ok(TemplateResource {
        ty: "AWS::IAM::Role".to_owned(),
        properties: properties.into(),
        depends_on: vec![],
    })
}

impl Template {
    /// Synthesizes the template for `stack`.
    pub fn synth(stack: &Stack) -> Result<Self> {
        let mut resources = BTreeMap::new();

        insert_resource(
            &mut resources,
            &stack.access_role.id,
            role_resource(&stack.access_role)?,
        )?;

        let function = &stack.function;
        let function_role_id = insert_resource(
            &mut resources,
            &stack.function_role.id,
            role_resource(&stack.function_role)?,
        )?;

        let parameter_id = insert_resource(
            &mut resources,
            &format!("{}-parameter-{}", function.id, function.parameter.name),
            TemplateResource {
                ty: "AWS::SSM::Parameter".to_owned(),
                properties: serde_json::json!({
                    "Name": function.parameter_path,
                    "Type": "String",
                    "Value": function.parameter.value,
                }),
                depends_on: vec![],
            },
        )?;

        insert_resource(
            &mut resources,
            &function.id,
            TemplateResource {
                ty: "AWS::Lambda::Function".to_owned(),
                properties: serde_json::json!({
                    "Handler": function.handler,
                    "Runtime": function.runtime,
                    "Role": get_att_arn(&function_role_id),
                    "Timeout": function.timeout.as_secs(),
                    "MemorySize": function.memory.as_megabytes(),
                    "Code": {
                        "S3Bucket": function.code.bucket,
                        "S3Key": function.code.key,
                    },
                    "Environment": { "Variables": function.environment() },
                }),
                depends_on: vec![function_role_id, parameter_id],
            },
        )?;

        let mut outputs = BTreeMap::new();
        for output in stack.outputs.iter() {
            let value = match output {
                Output::RoleArn { role_id, .. } => get_att_arn(&logical_id(role_id)),
            };
            outputs.insert(
                output.name().to_owned(),
                TemplateOutput {
                    description: None,
                    value,
                },
            );
        }

        for resource in resources.values_mut() {
            let properties = std::mem::take(&mut resource.properties);
            resource.properties = substitute_pseudo_parameters(properties);
        }
        if stack.account.is_none() {
            log::debug!("account is unknown, ARNs will reference {ACCOUNT_PLACEHOLDER}");
        }

        Ok(Template {
            format_version: FORMAT_VERSION.to_owned(),
            description: format!(
                "{} ({}): GitHub OIDC deployment role and placeholder function",
                stack.app, stack.stage
            ),
            resources,
            outputs,
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context(SerializeSnafu { name: "template" })
    }

    /// Writes the template to `path`.
    ///
    /// Returns `false` without writing when the file at `path` already holds
    /// this template.
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            let contents = tokio::fs::read_to_string(path)
                .await
                .context(ReadFileSnafu { path })?;
            match serde_json::from_str::<Template>(&contents) {
                Ok(previous) if previous == *self => {
                    log::info!("template at {path:?} is up to date");
                    return Ok(false);
                }
                Ok(previous) => {
                    let cmp = pretty_assertions::Comparison::new(&previous, self);
                    let change_string = format!("{cmp}")
                        .lines()
                        .map(|line| format!("  {line}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    log::info!("updating template at {path:?}:\n{change_string}");
                }
                Err(e) => {
                    log::warn!("could not read the previous template at {path:?}, overwriting it: {e}");
                }
            }
        }

        let contents = self.to_json_string()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(CreateFileSnafu { path: parent })?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .context(CreateFileSnafu { path })?;
        file.write_all(contents.as_bytes())
            .await
            .context(WriteFileSnafu { path })?;
        log::info!("wrote template to {path:?}");
        Ok(true)
    }
}
