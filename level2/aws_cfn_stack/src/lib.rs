use std::collections::{BTreeMap, HashMap};

use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, Stack, StackStatus, Tag};
use aws_sdk_cloudformation::Client;
use webtier::synth::SynthesizedStack;

pub type StackOutputs = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("AWS request for stack {stack} failed\n{message}")]
    Aws { stack: String, message: String },

    #[error("Stack {stack} failed: {reason}")]
    StackFailed { stack: String, reason: String },

    #[error("Stack {0} not found")]
    NotFound(String),

    #[error("Stack {stack} needs a value for parameter {parameter}")]
    MissingParameter { stack: String, parameter: String },
}

pub type Result<T> = std::result::Result<T, DeployError>;

fn aws_error(stack: &str, e: impl std::fmt::Debug) -> DeployError {
    DeployError::Aws { stack: stack.to_string(), message: format!("{:#?}", e) }
}

/// where a stack is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackProgress {
    Done,
    InProgress,
    /// the last update failed and was undone. The stack still works, but
    /// with its previous template.
    RolledBack,
    Failed,
}

/// what `create_or_update_stack` asked cloudformation to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackChange {
    Created,
    Updated,
    Unchanged,
}

pub fn classify_status(status: &StackStatus) -> StackProgress {
    match status {
        StackStatus::DeleteComplete |
        StackStatus::CreateComplete |
        StackStatus::UpdateComplete |
        StackStatus::ImportComplete |
        StackStatus::ImportRollbackComplete => StackProgress::Done,

        StackStatus::CreateInProgress |
        StackStatus::DeleteInProgress |
        StackStatus::ImportInProgress |
        StackStatus::ImportRollbackInProgress |
        StackStatus::ReviewInProgress |
        StackStatus::RollbackInProgress |
        StackStatus::UpdateCompleteCleanupInProgress |
        StackStatus::UpdateInProgress |
        StackStatus::UpdateRollbackCompleteCleanupInProgress |
        StackStatus::UpdateRollbackInProgress => StackProgress::InProgress,

        StackStatus::UpdateRollbackComplete => StackProgress::RolledBack,

        _ => StackProgress::Failed,
    }
}

pub async fn client_for_region(region: &str) -> Client {
    let shared_config = aws_config::from_env()
        .region(aws_sdk_cloudformation::config::Region::new(region.to_string()))
        .load()
        .await;
    Client::new(&shared_config)
}

pub async fn does_stack_exist(client: &Client, name: &str) -> Result<bool> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(d) => {
            let deleted = d.stacks().unwrap_or_default().first()
                .and_then(|s| s.stack_status())
                .map(|s| *s == StackStatus::DeleteComplete)
                .unwrap_or(true);
            Ok(!deleted)
        }
        Err(e) => {
            let e_str = format!("{:#?}", e);
            if e_str.contains("does not exist") {
                return Ok(false);
            }
            Err(DeployError::Aws { stack: name.to_string(), message: e_str })
        }
    }
}

/// whether a stack in `status` has settled after `change`. A rolled back
/// update only counts as settled when no update was started, as the
/// rollback is then left over from an earlier deploy.
pub fn settled(name: &str, status: &StackStatus, reason: Option<&str>, change: StackChange) -> Result<bool> {
    let failed = |fallback: &str| DeployError::StackFailed {
        stack: name.to_string(),
        reason: reason.filter(|r| !r.is_empty()).unwrap_or(fallback).to_string(),
    };
    match classify_status(status) {
        StackProgress::Done => Ok(true),
        StackProgress::InProgress => Ok(false),
        StackProgress::RolledBack if change != StackChange::Updated => Ok(true),
        StackProgress::RolledBack => Err(failed("Update failed and was rolled back")),
        StackProgress::Failed => Err(failed("Failed to get stack failure reason")),
    }
}

/// `None` while the stack is still in progress.
pub async fn describe_stack(client: &Client, name: &str, change: StackChange) -> Result<Option<Stack>> {
    let d = client.describe_stacks().stack_name(name).send().await
        .map_err(|e| aws_error(name, e))?;
    let first = d.stacks().unwrap_or_default().first()
        .ok_or_else(|| DeployError::NotFound(name.to_string()))?;
    let status = first.stack_status()
        .ok_or_else(|| DeployError::NotFound(name.to_string()))?;
    if settled(name, status, first.stack_status_reason(), change)? {
        Ok(Some(first.clone()))
    } else {
        Ok(None)
    }
}

pub async fn wait_for_output(client: &Client, name: &str, change: StackChange) -> Result<StackOutputs> {
    loop {
        let dur = tokio::time::Duration::from_millis(2000);
        tokio::time::sleep(dur).await;
        match describe_stack(client, name, change).await? {
            Some(stack) => {
                let mut out = HashMap::new();
                for output in stack.outputs().unwrap_or_default() {
                    if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
                        out.insert(key.to_string(), val.to_string());
                    }
                }
                return Ok(out);
            }
            None => {
                tracing::debug!(stack = name, "still waiting");
            }
        }
    }
}

/// the values for every template parameter `stack` declares. Parameters
/// with a default in the template may be left out of `values`.
pub fn parameters_for(stack: &SynthesizedStack, values: &BTreeMap<String, String>) -> Result<Vec<Parameter>> {
    let mut out = vec![];
    for (name, default) in stack.parameters.iter() {
        match (values.get(name), default) {
            (Some(value), _) => out.push(Parameter::builder().parameter_key(name).parameter_value(value).build()),
            (None, Some(_)) => {}
            (None, None) => return Err(DeployError::MissingParameter {
                stack: stack.stack_name.clone(),
                parameter: name.clone(),
            }),
        }
    }
    Ok(out)
}

fn tags_for(stack: &SynthesizedStack) -> Vec<Tag> {
    stack.tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

pub async fn create_or_update_stack(client: &Client, stack: &SynthesizedStack, parameters: Vec<Parameter>) -> Result<StackChange> {
    let name = stack.stack_name.as_str();
    let exists = does_stack_exist(client, name).await?;
    if exists {
        tracing::info!(stack = name, region = %stack.region, "Updating");
        let res = client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityAutoExpand)
            .stack_name(name)
            .template_body(&stack.template_body)
            .set_parameters(Some(parameters))
            .set_tags(Some(tags_for(stack)))
            .send()
            .await;
        if let Err(e) = res {
            let e_str = format!("{:#?}", e);
            if e_str.contains("No updates are to be performed") {
                tracing::info!(stack = name, "No updates are to be performed");
                return Ok(StackChange::Unchanged);
            }
            return Err(DeployError::Aws { stack: name.to_string(), message: e_str });
        }
        Ok(StackChange::Updated)
    } else {
        tracing::info!(stack = name, region = %stack.region, "Creating");
        client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityAutoExpand)
            .stack_name(name)
            .template_body(&stack.template_body)
            .set_parameters(Some(parameters))
            .set_tags(Some(tags_for(stack)))
            .send()
            .await
            .map_err(|e| aws_error(name, e))?;
        Ok(StackChange::Created)
    }
}

/// deletes `name` if it exists and waits until it is gone.
pub async fn delete_stack(client: &Client, name: &str) -> Result<bool> {
    if !does_stack_exist(client, name).await? {
        return Ok(false);
    }
    tracing::info!(stack = name, "Deleting");
    client.delete_stack().stack_name(name).send().await
        .map_err(|e| aws_error(name, e))?;
    loop {
        tokio::time::sleep(tokio::time::Duration::from_millis(2000)).await;
        if !does_stack_exist(client, name).await? {
            return Ok(true);
        }
        // surfaces DELETE_FAILED
        describe_stack(client, name, StackChange::Unchanged).await?;
    }
}

/// deploys `stacks` in order, one client per region. Returns every stack's outputs.
pub async fn deploy_all(stacks: &[SynthesizedStack], parameter_values: &BTreeMap<String, String>) -> Result<BTreeMap<String, StackOutputs>> {
    let mut clients: HashMap<String, Client> = HashMap::new();
    let mut outputs = BTreeMap::new();
    for stack in stacks {
        if !clients.contains_key(&stack.region) {
            clients.insert(stack.region.clone(), client_for_region(&stack.region).await);
        }
        let client = clients.get(&stack.region)
            .ok_or_else(|| DeployError::NotFound(stack.stack_name.clone()))?;
        let parameters = parameters_for(stack, parameter_values)?;
        let change = create_or_update_stack(client, stack, parameters).await?;
        let stack_outputs = wait_for_output(client, &stack.stack_name, change).await?;
        tracing::info!(stack = %stack.stack_name, outputs = stack_outputs.len(), "Deployed");
        outputs.insert(stack.stack_name.clone(), stack_outputs);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesized(parameters: &[(&str, Option<&str>)]) -> SynthesizedStack {
        SynthesizedStack {
            stack_name: "webapp-dev-compute-stack".into(),
            region: "eu-west-1".into(),
            dependencies: vec![],
            template_file: "webapp-dev-compute-stack.template.json".into(),
            tags: BTreeMap::new(),
            parameters: parameters.iter()
                .map(|(name, default)| (name.to_string(), default.map(|d| d.to_string())))
                .collect(),
            template_body: "{}".into(),
        }
    }

    #[test]
    fn statuses_are_classified() {
        assert_eq!(classify_status(&StackStatus::CreateComplete), StackProgress::Done);
        assert_eq!(classify_status(&StackStatus::UpdateRollbackComplete), StackProgress::RolledBack);
        assert_eq!(classify_status(&StackStatus::UpdateInProgress), StackProgress::InProgress);
        assert_eq!(classify_status(&StackStatus::RollbackComplete), StackProgress::Failed);
        assert_eq!(classify_status(&StackStatus::CreateFailed), StackProgress::Failed);
    }

    #[test]
    fn rolled_back_update_fails_the_deploy() {
        let name = "webapp-dev-compute-stack";
        let reason = Some("The following resource(s) failed to update: [WebappDevFleetASG].");
        let err = settled(name, &StackStatus::UpdateRollbackComplete, reason, StackChange::Updated).unwrap_err();
        match err {
            DeployError::StackFailed { stack, reason } => {
                assert_eq!(stack, name);
                assert!(reason.contains("WebappDevFleetASG"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = settled(name, &StackStatus::UpdateRollbackComplete, None, StackChange::Updated).unwrap_err();
        assert!(err.to_string().contains("rolled back"));
    }

    #[test]
    fn earlier_rollback_is_settled_when_nothing_changed() {
        let name = "webapp-dev-compute-stack";
        assert!(settled(name, &StackStatus::UpdateRollbackComplete, None, StackChange::Unchanged).unwrap());
        assert!(settled(name, &StackStatus::UpdateComplete, None, StackChange::Updated).unwrap());
        assert!(!settled(name, &StackStatus::UpdateRollbackInProgress, None, StackChange::Updated).unwrap());
        assert!(settled(name, &StackStatus::RollbackComplete, None, StackChange::Created).is_err());
    }

    #[test]
    fn parameters_with_defaults_may_be_omitted() {
        let stack = synthesized(&[("AmiId", Some("/aws/service/ami")), ("ArtifactBucket", None)]);
        let mut values = BTreeMap::new();
        values.insert("ArtifactBucket".to_string(), "bucket".to_string());
        let params = parameters_for(&stack, &values).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].parameter_key(), Some("ArtifactBucket"));
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let stack = synthesized(&[("ArtifactKey", None)]);
        let err = parameters_for(&stack, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, DeployError::MissingParameter { .. }));
    }
}
