//! IAM policy documents.
//!
//! These types serialize to the JSON policy grammar AWS expects, so a document
//! can be embedded in a template or sent to IAM as-is.
use std::collections::BTreeMap;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl core::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        })
    }
}

/// Who a statement in a resource (or trust) policy applies to.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Principal {
    Federated(String),
    Service(String),
    #[serde(rename = "AWS")]
    Aws(String),
}

/// A list of strings that serializes as a bare string when it has one element,
/// which is how AWS writes single actions, resources and condition values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StringList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        StringList(iter.into_iter().map(Into::into).collect())
    }
}

impl serde::Serialize for StringList {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.0.as_slice() {
            [one] => one.serialize(serializer),
            many => many.serialize(serializer),
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum StringListProxy {
    One(String),
    Many(Vec<String>),
}

impl<'de> serde::Deserialize<'de> for StringList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match StringListProxy::deserialize(deserializer)? {
            StringListProxy::One(one) => StringList(vec![one]),
            StringListProxy::Many(many) => StringList(many),
        })
    }
}

/// The condition operators this crate writes and evaluates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ConditionOperator {
    StringEquals,
    StringNotEquals,
    StringLike,
}

/// Operator -> condition key -> accepted values.
///
/// Keys under one operator are AND-ed, values under one key are OR-ed.
pub type Conditions = BTreeMap<ConditionOperator, BTreeMap<String, StringList>>;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<StringList>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: Conditions,
}

impl Statement {
    fn new(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            principal: None,
            action: StringList::default(),
            resource: None,
            condition: Conditions::default(),
        }
    }

    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Effect::Deny)
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_actions<S: Into<String>>(mut self, actions: impl IntoIterator<Item = S>) -> Self {
        self.action.0.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_resources<S: Into<String>>(
        mut self,
        resources: impl IntoIterator<Item = S>,
    ) -> Self {
        self.resource
            .get_or_insert_with(StringList::default)
            .0
            .extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn with_condition<S: Into<String>>(
        mut self,
        operator: ConditionOperator,
        key: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.condition
            .entry(operator)
            .or_default()
            .entry(key.into())
            .or_default()
            .0
            .extend(values.into_iter().map(Into::into));
        self
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: impl IntoIterator<Item = Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_owned(),
            statement: statement.into_iter().collect(),
        }
    }

    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        use snafu::ResultExt;
        serde_json::to_value(self).context(crate::SerializeSnafu {
            name: "policy document",
        })
    }
}
