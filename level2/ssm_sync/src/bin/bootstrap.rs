use aws_sdk_ssm::types::{ParameterTier, ParameterType};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use ssm_sync::{handle, reject_malformed, CfnResponse, CustomResourceEvent, ParameterWriter, ResponseSender};
use tracing_subscriber::EnvFilter;

struct SsmWriter;

impl ParameterWriter for SsmWriter {
    fn put_parameter(&self, region: &str, name: &str, value: &str, description: &str) -> Result<(), String> {
        let region = region.to_string();
        let name = name.to_string();
        let value = value.to_string();
        let description = description.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let shared_config = aws_config::from_env()
                    .region(aws_sdk_ssm::config::Region::new(region))
                    .load()
                    .await;
                aws_sdk_ssm::Client::new(&shared_config)
                    .put_parameter()
                    .name(name)
                    .value(value)
                    .description(description)
                    .r#type(ParameterType::String)
                    .overwrite(true)
                    .tier(ParameterTier::Standard)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("{:#?}", error))
            })
        })
    }
}

/// puts the response to the pre-signed s3 url cloudformation waits on.
struct PresignedUrlSender;

impl ResponseSender for PresignedUrlSender {
    fn send(&self, url: &str, response: &CfnResponse) -> Result<(), String> {
        let body = serde_json::to_string(response).map_err(|e| e.to_string())?;
        tokio::task::block_in_place(|| {
            ureq::put(url)
                .set("Content-Type", "")
                .send_string(&body)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}

async fn handle_request(event: LambdaEvent<serde_json::Value>) -> Result<CfnResponse, Error> {
    let raw = event.payload;
    let event: CustomResourceEvent = match serde_json::from_value(raw.clone()) {
        Ok(event) => event,
        Err(e) => return Err(reject_malformed(&raw, e, &PresignedUrlSender).into()),
    };
    let response = handle(&event, &SsmWriter, &PresignedUrlSender)?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // cloudwatch adds its own timestamps
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();
    lambda_runtime::run(service_fn(handle_request)).await
}
