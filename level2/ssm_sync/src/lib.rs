//! Handles the custom resource events of the compute stack: copies the
//! load balancer's hostname and the cloudfront secret's name into the
//! parameter store of the global region.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_REGION: &str = "us-east-1";
pub const WRITE_FAILED_REASON: &str =
    "An error occurred when attempting to update the parameter. See the CloudWatch logs for details";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to write parameter {parameter}\n{message}")]
    Write { parameter: String, message: String },

    #[error("Failed to send the response to cloudformation\n{0}")]
    Respond(String),

    #[error("Invalid custom resource event\n{0}")]
    Event(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

fn default_target_region() -> String {
    DEFAULT_TARGET_REGION.to_string()
}

/// the properties the compute stack gives its custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncProperties {
    #[serde(default)]
    pub alb_hostname: String,
    #[serde(default)]
    pub alb_parameter_name: String,
    #[serde(default)]
    pub cf_secret_value: String,
    #[serde(default)]
    pub cf_parameter_name: String,
    #[serde(default = "default_target_region")]
    pub target_region: String,
}

impl Default for SyncProperties {
    fn default() -> Self {
        Self {
            alb_hostname: String::new(),
            alb_parameter_name: String::new(),
            cf_secret_value: String::new(),
            cf_parameter_name: String::new(),
            target_region: default_target_region(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: SyncProperties,
    #[serde(default)]
    pub old_resource_properties: Option<SyncProperties>,
}

impl CustomResourceEvent {
    /// the same for every event of a resource, so an update never
    /// looks like a replacement to cloudformation.
    pub fn physical_id(&self) -> String {
        let props = &self.resource_properties;
        format!("{}|{}", props.alb_parameter_name, props.cf_parameter_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// the body put to the event's pre-signed response url.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl CfnResponse {
    pub fn to(event: &CustomResourceEvent, status: ResponseStatus, reason: &str) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            physical_resource_id: event.physical_id(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            no_echo: false,
            data: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Write,
    Skip,
}

pub fn plan(event: &CustomResourceEvent) -> SyncAction {
    match event.request_type {
        RequestType::Create => SyncAction::Write,
        RequestType::Delete => SyncAction::Skip,
        RequestType::Update => {
            let new = &event.resource_properties;
            let old = event.old_resource_properties.clone().unwrap_or_default();
            if new.alb_hostname != old.alb_hostname {
                tracing::info!("Alb details have changed, so doing an update");
                SyncAction::Write
            } else if new.cf_secret_value != old.cf_secret_value {
                tracing::info!("CF details have changed, so doing an update");
                SyncAction::Write
            } else {
                tracing::info!("data hasn't changed, so not doing an update");
                SyncAction::Skip
            }
        }
    }
}

pub trait ParameterWriter {
    /// writes a `String` parameter in `region`, overwriting any previous value.
    fn put_parameter(&self, region: &str, name: &str, value: &str, description: &str) -> Result<(), String>;
}

pub trait ResponseSender {
    fn send(&self, url: &str, response: &CfnResponse) -> Result<(), String>;
}

fn write_parameters(props: &SyncProperties, writer: &impl ParameterWriter) -> Result<(), SyncError> {
    for (name, value, description) in [
        (&props.alb_parameter_name, &props.alb_hostname, "ALB DNS name"),
        (&props.cf_parameter_name, &props.cf_secret_value, "CloudFront secret"),
    ] {
        writer.put_parameter(&props.target_region, name, value, description)
            .map_err(|message| SyncError::Write { parameter: name.clone(), message })?;
        tracing::info!(parameter = %name, region = %props.target_region, "updated parameter");
    }
    Ok(())
}

/// runs `event` and reports the outcome to cloudformation. Only a failure
/// to report is returned as an error, as cloudformation would otherwise
/// wait for a response until it times out.
pub fn handle(
    event: &CustomResourceEvent,
    writer: &impl ParameterWriter,
    sender: &impl ResponseSender,
) -> Result<CfnResponse, SyncError> {
    tracing::info!(request = ?event.request_type, resource = %event.logical_resource_id, "Got event");
    let result = match plan(event) {
        SyncAction::Write => write_parameters(&event.resource_properties, writer),
        SyncAction::Skip => Ok(()),
    };
    let response = match result {
        Ok(()) => CfnResponse::to(event, ResponseStatus::Success, ""),
        Err(e) => {
            tracing::error!("{e}");
            CfnResponse::to(event, ResponseStatus::Failed, WRITE_FAILED_REASON)
        }
    };
    sender.send(&event.response_url, &response).map_err(SyncError::Respond)?;
    Ok(response)
}

/// responds FAILED to an event that could not be parsed, using whatever
/// fields the raw payload has, so cloudformation does not wait for its
/// timeout. A failure to respond is only logged. Returns the parse error.
pub fn reject_malformed(raw: &serde_json::Value, error: serde_json::Error, sender: &impl ResponseSender) -> SyncError {
    let field = |key: &str| raw.get(key).and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
    let url = field("ResponseURL");
    if url.is_empty() {
        tracing::error!("Invalid event without a ResponseURL: {error}");
        return SyncError::Event(error);
    }
    // keep an existing physical id, a new one would look like a replacement
    let physical_resource_id = match field("PhysicalResourceId") {
        id if !id.is_empty() => id,
        _ => field("LogicalResourceId"),
    };
    let response = CfnResponse {
        status: ResponseStatus::Failed,
        reason: format!("Invalid custom resource event: {error}"),
        physical_resource_id,
        stack_id: field("StackId"),
        request_id: field("RequestId"),
        logical_resource_id: field("LogicalResourceId"),
        no_echo: false,
        data: serde_json::Map::new(),
    };
    if let Err(e) = sender.send(&url, &response) {
        tracing::error!("Failed to send the FAILED response\n{e}");
    }
    SyncError::Event(error)
}
