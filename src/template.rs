//! The CloudFormation template model every stack is built from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// anything that can be placed in a template's `Resources` section.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// a resource whose properties were written out by hand.
#[derive(Debug, Clone)]
pub struct Raw {
    pub ty: &'static str,
    pub properties: Value,
}

impl Raw {
    pub fn new(ty: &'static str, properties: Value) -> Self {
        Self { ty, properties }
    }
}

impl CfnResource for Raw {
    fn type_string(&self) -> &'static str {
        self.ty
    }
    fn properties(&self) -> Value {
        self.properties.clone()
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.properties.is_object() && !self.properties.is_null() {
            return Err(format!("Properties of a {} must be an object", self.ty));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

fn is_null(v: &Value) -> bool {
    v.is_null()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "is_null")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
    #[serde(rename = "UpdatePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<Value>,
}

impl SavedResource {
    pub fn depends_on(&mut self, logical_id: &str) -> &mut Self {
        if !self.depends_on.iter().any(|d| d == logical_id) {
            self.depends_on.push(logical_id.to_string());
        }
        self
    }

    /// applies to both deletion and replacement of the resource.
    pub fn removal_policy(&mut self, policy: DeletionPolicy) -> &mut Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn update_policy(&mut self, policy: Value) -> &mut Self {
        self.update_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Default", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Export", default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            parameters: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl Template {
    /// pretty so that it reads well in the cloudformation console.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn verify_resource_name(resource_name: &str) -> Result<()> {
    if resource_name.len() > 255 {
        return Err(Error::Validation(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name)));
    }
    if resource_name.is_empty() {
        return Err(Error::Validation(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name)));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name)));
    }
    Ok(())
}

pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    // A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
    // It must start with an alphabetical character and can't be longer than 128 characters.
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || Error::Validation(format!("Invalid stack name {}\n{}", stack_name, restriction));
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(())
}

/// a named template bound to the region it deploys into.
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub region: String,
    pub template: Template,
    /// names of stacks that must be deployed before this one.
    pub dependencies: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl Stack {
    pub fn new(name: &str, region: &str) -> Result<Self> {
        validate_stack_name(name)?;
        Ok(Self {
            name: name.to_string(),
            region: region.to_string(),
            template: Template::default(),
            dependencies: vec![],
            tags: BTreeMap::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.template.description = Some(description.into());
        self
    }

    pub fn add(&mut self, logical_id: &str, resource: impl CfnResource) -> Result<&mut SavedResource> {
        verify_resource_name(logical_id)?;
        if let Err(e) = resource.validate() {
            return Err(Error::Validation(format!("Validation failed on resource '{}'\n{e}", logical_id)));
        }
        if self.template.resources.contains_key(logical_id) {
            return Err(Error::Validation(format!("Resource '{}' is defined twice in stack {}", logical_id, self.name)));
        }
        let saved = SavedResource {
            ty: resource.type_string().to_string(),
            properties: resource.properties(),
            depends_on: vec![],
            deletion_policy: None,
            update_replace_policy: None,
            update_policy: None,
        };
        Ok(self.template.resources.entry(logical_id.to_string()).or_insert(saved))
    }

    /// shorthand for adding a [`Raw`] resource.
    pub fn resource(&mut self, logical_id: &str, ty: &'static str, properties: Value) -> Result<&mut SavedResource> {
        self.add(logical_id, Raw::new(ty, properties))
    }

    pub fn add_parameter(&mut self, name: &str, ty: &str, default: Option<&str>, description: &str) -> Result<()> {
        verify_resource_name(name)?;
        self.template.parameters.insert(name.to_string(), TemplateParameter {
            ty: ty.to_string(),
            default: default.map(|d| d.to_string()),
            description: Some(description.to_string()),
        });
        Ok(())
    }

    pub fn add_output(&mut self, name: &str, description: &str, value: Value) -> Result<()> {
        verify_resource_name(name)?;
        self.template.outputs.insert(name.to_string(), ResourceOutput {
            description: description.to_string(),
            value,
            export: None,
        });
        Ok(())
    }

    /// outputs `value` and exports it as `{stack name}{suffix}`.
    /// returns the export name so other stacks can import it.
    pub fn export(&mut self, suffix: &str, description: &str, value: Value) -> Result<String> {
        let export_name = export_name(&self.name, suffix);
        self.add_output(suffix, description, value)?;
        if let Some(output) = self.template.outputs.get_mut(suffix) {
            output.export = Some(Export { name: export_name.clone() });
        }
        Ok(export_name)
    }

    pub fn add_dependency(&mut self, stack_name: &str) {
        if !self.dependencies.iter().any(|d| d == stack_name) {
            self.dependencies.push(stack_name.to_string());
        }
    }

    pub fn logical_ids(&self) -> impl Iterator<Item = &String> {
        self.template.resources.keys()
    }

    pub fn get(&self, logical_id: &str) -> Option<&SavedResource> {
        self.template.resources.get(logical_id)
    }

    /// the final template, checked for things cloudformation would reject.
    pub fn validated_template(&self) -> Result<&Template> {
        if self.template.resources.is_empty() {
            return Err(Error::Validation(format!("Stack {} has no resources", self.name)));
        }
        for (id, resource) in self.template.resources.iter() {
            for dep in resource.depends_on.iter() {
                if !self.template.resources.contains_key(dep) {
                    return Err(Error::Validation(format!("Resource '{}' depends on '{}' which is not part of stack {}", id, dep, self.name)));
                }
            }
        }
        Ok(&self.template)
    }
}

pub fn export_name(stack_name: &str, suffix: &str) -> String {
    format!("{stack_name}{suffix}")
}
