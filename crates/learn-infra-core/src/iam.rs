//! IAM policy statements and service roles

use serde::Serialize;
use serde_json::{json, Value};

use crate::template::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: Effect,

    #[serde(rename = "Action")]
    pub actions: Vec<String>,

    #[serde(rename = "Resource")]
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resources<I>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.resources.extend(resources);
        self
    }

    pub fn any_resource(self) -> Self {
        self.resources([json!("*")])
    }

    pub fn allows(&self, action: &str) -> bool {
        self.effect == Effect::Allow && self.actions.iter().any(|a| a == action)
    }
}

pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
}

/// Builder for an `AWS::IAM::Role` assumable by one service principal
#[derive(Debug, Clone)]
pub struct Role {
    service: String,
    managed_policies: Vec<String>,
    inline: Vec<(String, Vec<PolicyStatement>)>,
}

impl Role {
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            managed_policies: Vec::new(),
            inline: Vec::new(),
        }
    }

    /// Attach an AWS managed policy by name (e.g. `AdministratorAccess`, `service-role/...`)
    pub fn managed_policy(mut self, name: &str) -> Self {
        self.managed_policies.push(name.to_string());
        self
    }

    pub fn inline_policy(mut self, name: impl Into<String>, statements: Vec<PolicyStatement>) -> Self {
        self.inline.push((name.into(), statements));
        self
    }

    pub fn statements(&self) -> impl Iterator<Item = &PolicyStatement> {
        self.inline.iter().flat_map(|(_, s)| s.iter())
    }

    pub fn into_resource(self) -> Resource {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": self.service },
                    "Action": "sts:AssumeRole",
                }],
            },
        });

        if !self.managed_policies.is_empty() {
            let arns: Vec<Value> = self
                .managed_policies
                .iter()
                .map(|name| {
                    json!({ "Fn::Sub": format!("arn:${{AWS::Partition}}:iam::aws:policy/{}", name) })
                })
                .collect();
            properties["ManagedPolicyArns"] = Value::Array(arns);
        }

        if !self.inline.is_empty() {
            let policies: Vec<Value> = self
                .inline
                .iter()
                .map(|(name, statements)| {
                    json!({
                        "PolicyName": name,
                        "PolicyDocument": policy_document(statements),
                    })
                })
                .collect();
            properties["Policies"] = Value::Array(policies);
        }

        Resource::new("AWS::IAM::Role", properties)
    }
}
