// CloudFormation template model
//
// Resources and outputs are kept in BTreeMaps so the serialized template is
// byte-for-byte stable across runs. Properties are plain serde_json values;
// the constructs in `stacks` are responsible for their shape.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SynthError};

const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

/// A single resource declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties", skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let id = logical_id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    /// Set both the deletion and update-replace policy
    pub fn with_removal_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Value")]
    pub value: Value,

    #[serde(rename = "Export", skip_serializing_if = "Option::is_none")]
    pub export: Option<Value>,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            description: None,
            value,
            export: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn export_as(mut self, name: impl Into<String>) -> Self {
        self.export = Some(json!({ "Name": name.into() }));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,

    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Resource>,

    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a resource; the logical id must be unique within the template
    pub fn add_resource(&mut self, logical_id: impl Into<String>, resource: Resource) -> Result<()> {
        let id = logical_id.into();
        if self.resources.contains_key(&id) {
            return Err(SynthError::DuplicateLogicalId { id });
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<()> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(SynthError::DuplicateLogicalId { id: name });
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &Resource)> {
        self.resources.iter()
    }

    /// All resources of a given CloudFormation type
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&String, &Output)> {
        self.outputs.iter()
    }

    /// Check that every Ref, Fn::GetAtt, ${..} substitution, and DependsOn
    /// names a resource declared in this template. Pseudo parameters
    /// (`AWS::*`) are always allowed.
    pub fn validate(&self) -> Result<()> {
        for (id, resource) in &self.resources {
            for target in &resource.depends_on {
                self.check_target(id, target)?;
            }
            let mut targets = BTreeSet::new();
            collect_references(&resource.properties, &mut targets);
            for target in &targets {
                self.check_target(id, target)?;
            }
        }

        for (name, output) in &self.outputs {
            let mut targets = BTreeSet::new();
            collect_references(&output.value, &mut targets);
            for target in &targets {
                self.check_target(name, target)?;
            }
        }

        Ok(())
    }

    fn check_target(&self, from: &str, target: &str) -> Result<()> {
        if target.starts_with("AWS::") || self.resources.contains_key(target) {
            Ok(())
        } else {
            Err(SynthError::UnknownReference {
                resource: from.to_string(),
                target: target.to_string(),
            })
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    out.insert(target.clone());
                    return;
                }
                if let Some(att) = map.get("Fn::GetAtt") {
                    match att {
                        Value::Array(parts) => {
                            if let Some(Value::String(target)) = parts.first() {
                                out.insert(target.clone());
                            }
                        }
                        Value::String(dotted) => {
                            if let Some((target, _)) = dotted.split_once('.') {
                                out.insert(target.to_string());
                            }
                        }
                        _ => {}
                    }
                    return;
                }
                if let Some(sub) = map.get("Fn::Sub") {
                    match sub {
                        Value::String(body) => collect_sub_references(body, &BTreeSet::new(), out),
                        Value::Array(parts) => {
                            let locals: BTreeSet<String> = parts
                                .get(1)
                                .and_then(Value::as_object)
                                .map(|vars| vars.keys().cloned().collect())
                                .unwrap_or_default();
                            if let Some(Value::String(body)) = parts.first() {
                                collect_sub_references(body, &locals, out);
                            }
                            if let Some(vars) = parts.get(1) {
                                collect_references(vars, out);
                            }
                        }
                        _ => {}
                    }
                    return;
                }
            }
            for child in map.values() {
                collect_references(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

/// Pull `${Name}` / `${Name.Attr}` placeholders out of an Fn::Sub body.
/// `${!Literal}` escapes are skipped.
fn collect_sub_references(body: &str, locals: &BTreeSet<String>, out: &mut BTreeSet<String>) {
    let mut rest = body;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let placeholder = &after[..end];
        if !placeholder.starts_with('!') {
            let name = placeholder.split('.').next().unwrap_or(placeholder);
            if !locals.contains(name) {
                out.insert(name.to_string());
            }
        }
        rest = &after[end + 1..];
    }
}

/// Derive a CloudFormation logical id from a construct id:
/// `dev-tg-blue` becomes `DevTgBlue`.
pub fn logical_id(construct_id: &str) -> String {
    let mut id: String = construct_id
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    if id.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        id.insert(0, 'R');
    }
    id
}

/// Intrinsic function helpers
pub mod fns {
    use serde_json::{json, Value};

    pub fn reference(logical_id: &str) -> Value {
        json!({ "Ref": logical_id })
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id, attribute] })
    }

    pub fn sub(body: impl Into<String>) -> Value {
        json!({ "Fn::Sub": body.into() })
    }

    pub fn import_value(export_name: impl Into<String>) -> Value {
        json!({ "Fn::ImportValue": export_name.into() })
    }

    pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
        json!({ "Fn::Join": [delimiter, parts] })
    }

    /// The `index`th availability zone of the stack's region
    pub fn availability_zone(index: usize) -> Value {
        json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
    }

    /// ARN of an SSM parameter path (path starts with '/')
    pub fn ssm_parameter_arn(path: &str) -> Value {
        sub(format!(
            "arn:${{AWS::Partition}}:ssm:${{AWS::Region}}:${{AWS::AccountId}}:parameter{}",
            path
        ))
    }

    pub fn name_tag(name: impl Into<String>) -> Value {
        json!([{ "Key": "Name", "Value": name.into() }])
    }
}
