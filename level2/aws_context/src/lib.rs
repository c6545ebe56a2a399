//! Values that have to be read from the account before the stacks
//! can be defined.

use webtier::app::HandoffState;
use webtier::config::EnvironmentConfig;
use webtier::params::ContextLookups;
use webtier::regions::GLOBAL_REGION;

pub const CLOUDFRONT_PREFIX_LIST_NAME: &str = "com.amazonaws.global.cloudfront.origin-facing";
const HOSTED_ZONE_PREFIX: &str = "/hostedzone/";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Failed to look up {what}\n{message}")]
    Aws { what: String, message: String },

    #[error("No hosted zone named {0} found in this account")]
    HostedZoneNotFound(String),

    #[error("No prefix list named {name} found in {region}")]
    PrefixListNotFound { name: &'static str, region: String },
}

pub type Result<T> = std::result::Result<T, LookupError>;

fn aws_error(what: &str, e: impl std::fmt::Debug) -> LookupError {
    LookupError::Aws { what: what.to_string(), message: format!("{:#?}", e) }
}

pub async fn shared_config(region: &str) -> aws_config::SdkConfig {
    aws_config::from_env()
        .region(aws_sdk_ssm::config::Region::new(region.to_string()))
        .load()
        .await
}

/// `/hostedzone/Z123` -> `Z123`
pub fn strip_hosted_zone_prefix(id: &str) -> &str {
    id.strip_prefix(HOSTED_ZONE_PREFIX).unwrap_or(id)
}

/// route53 returns zone names fully qualified, with a trailing dot.
pub fn zone_name_matches(returned: &str, zone: &str) -> bool {
    returned.trim_end_matches('.').eq_ignore_ascii_case(zone.trim_end_matches('.'))
}

pub async fn lookup_hosted_zone_id(client: &aws_sdk_route53::Client, zone: &str) -> Result<String> {
    let resp = client.list_hosted_zones_by_name().dns_name(zone).send().await
        .map_err(|e| aws_error(&format!("hosted zone {zone}"), e))?;
    resp.hosted_zones().unwrap_or_default().iter()
        .find(|z| z.name().map(|n| zone_name_matches(n, zone)).unwrap_or(false))
        .and_then(|z| z.id())
        .map(|id| strip_hosted_zone_prefix(id).to_string())
        .ok_or_else(|| LookupError::HostedZoneNotFound(zone.to_string()))
}

pub async fn lookup_cloudfront_prefix_list(client: &aws_sdk_ec2::Client, region: &str) -> Result<String> {
    let filter = aws_sdk_ec2::types::Filter::builder()
        .name("prefix-list-name")
        .values(CLOUDFRONT_PREFIX_LIST_NAME)
        .build();
    let resp = client.describe_managed_prefix_lists().filters(filter).send().await
        .map_err(|e| aws_error(CLOUDFRONT_PREFIX_LIST_NAME, e))?;
    resp.prefix_lists().unwrap_or_default().first()
        .and_then(|p| p.prefix_list_id())
        .map(|id| id.to_string())
        .ok_or_else(|| LookupError::PrefixListNotFound {
            name: CLOUDFRONT_PREFIX_LIST_NAME,
            region: region.to_string(),
        })
}

/// looks up whatever `config` does not already give.
pub async fn lookup_context(config: &EnvironmentConfig) -> Result<ContextLookups> {
    let mut lookups = ContextLookups::default();
    if config.hosted_zone_id.is_none() {
        let shared = shared_config(GLOBAL_REGION).await;
        let client = aws_sdk_route53::Client::new(&shared);
        let id = lookup_hosted_zone_id(&client, &config.hosted_zone).await?;
        tracing::info!(zone = %config.hosted_zone, id = %id, "found hosted zone");
        lookups.hosted_zone_id = Some(id);
    }
    if config.cloudfront_prefix_list.is_none() {
        let shared = shared_config(&config.aws_region).await;
        let client = aws_sdk_ec2::Client::new(&shared);
        let id = lookup_cloudfront_prefix_list(&client, &config.aws_region).await?;
        tracing::info!(region = %config.aws_region, id = %id, "found cloudfront prefix list");
        lookups.cloudfront_prefix_list = Some(id);
    }
    Ok(lookups)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterLookup {
    Found(String),
    NotFound,
    Failed(String),
}

/// somewhere parameters can be read from.
pub trait ParameterSource {
    async fn lookup(&self, name: &str) -> ParameterLookup;
}

impl ParameterSource for aws_sdk_ssm::Client {
    async fn lookup(&self, name: &str) -> ParameterLookup {
        match self.get_parameter().name(name).send().await {
            Ok(resp) => match resp.parameter().and_then(|p| p.value()) {
                Some(value) => ParameterLookup::Found(value.to_string()),
                None => ParameterLookup::NotFound,
            },
            Err(e) => {
                let not_found = match &e {
                        aws_sdk_ssm::error::SdkError::ServiceError(se) => Some(se.err()),
                        _ => None,
                    }
                    .map(|se| se.is_parameter_not_found())
                    .unwrap_or(false);
                if not_found {
                    ParameterLookup::NotFound
                } else {
                    ParameterLookup::Failed(format!("{:#?}", e))
                }
            }
        }
    }
}

/// the hand-off state as published by the compute stack. A missing
/// secret parameter does not hold back the CDN stack.
pub async fn fetch_handoff<S: ParameterSource>(source: &S, alb_param: &str, secret_param: &str) -> HandoffState {
    let alb_hostname = match source.lookup(alb_param).await {
        ParameterLookup::Found(value) => value,
        ParameterLookup::NotFound => return HandoffState::NotPublished,
        ParameterLookup::Failed(message) => return HandoffState::LookupFailed(message),
    };
    let cloudfront_secret = match source.lookup(secret_param).await {
        ParameterLookup::Found(value) => Some(value),
        ParameterLookup::NotFound => None,
        ParameterLookup::Failed(message) => {
            tracing::warn!(parameter = secret_param, "Failed to read the cloudfront secret parameter, using the secret's name\n{message}");
            None
        }
    };
    HandoffState::Published { alb_hostname, cloudfront_secret }
}

/// a parameter store client for the global region.
pub async fn global_ssm_client() -> aws_sdk_ssm::Client {
    aws_sdk_ssm::Client::new(&shared_config(GLOBAL_REGION).await)
}
