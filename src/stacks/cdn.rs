//! The CDN stack, deployed in the global region once the compute stack
//! has published its load balancer's hostname there.

use crate::error::Result;
use crate::params::{AppParams, StackKind};
use crate::resources::*;
use crate::template::Stack;

use super::compute::{cloudfront_secret_value, CLOUDFRONT_HEADER, CLIENT_IP_HEADER};
use super::new_stack;

pub const ORIGIN_ID: &str = "alb";
pub const CACHE_MIN_TTL: u64 = 1;
pub const CACHE_MAX_TTL: u64 = 31536000;
pub const CACHE_DEFAULT_TTL: u64 = 86400;
const ORIGIN_KEEPALIVE_SECONDS: u32 = 60;

/// copies the viewer's address into a header the load balancer can match on.
const TRUE_CLIENT_IP_FUNCTION: &str = r#"function handler(event) {
    var request = event.request;
    var clientIP = event.viewer.ip;
    request.headers['true-client-ip'] = {value: clientIP};
    return request;
}
"#;

/// what the compute stack published to the global region.
#[derive(Debug, Clone, Copy)]
pub struct PublishedOrigin<'a> {
    pub alb_hostname: &'a str,
    /// name of the cloudfront secret including its random suffix.
    /// The secret is referenced by its plain name when `None`.
    pub cloudfront_secret: Option<&'a str>,
}

fn secret_reference(params: &AppParams, cloudfront_secret: Option<&str>) -> Value {
    match cloudfront_secret {
        Some(name) => sub(format!(
            "arn:${{{PARTITION}}}:secretsmanager:{}:${{{ACCOUNT_ID}}}:secret:{name}",
            params.global_region(),
        )),
        None => json!(params.resource_name("cloudfront-secret")),
    }
}

pub fn define(params: &AppParams, origin: PublishedOrigin) -> Result<Stack> {
    let config = &params.config;
    let mut stack = new_stack(params, StackKind::Cdn, params.global_region(), "cdn")?;
    stack.add_dependency(&params.stack_name(StackKind::Compute));

    stack.add("WebCertificate", Certificate {
        domain_name: params.site_hostname.clone(),
        hosted_zone_id: params.hosted_zone_id.clone(),
    })?;

    let permitted_ips: Vec<String> = config.allowed_ips.iter()
        .filter(|ip| ip.as_str() != "*")
        .cloned()
        .collect();
    let restricts_ips = config.allowed_ips.first().map(|ip| ip != "*").unwrap_or(false);
    let permitted_ip_set_arn = if restricts_ips {
        stack.add("IPSetv4", IpSet { addresses: permitted_ips })?;
        Some(get_att("IPSetv4", "Arn"))
    } else {
        None
    };
    stack.add("CloudFrontWebACL", WebAcl {
        managed_rules: config.managed_waf_rules.clone(),
        permitted_ip_set_arn,
    })?;

    stack.add("OriginReqPolicyHeaders", OriginRequestPolicy {
        name: params.resource_name("origin-headers"),
        headers: HeaderBehavior::AllowList(
            [
                "Host",
                "Origin",
                "Referer",
                "CloudFront-Is-Desktop-Viewer",
                "CloudFront-Is-Mobile-Viewer",
                "CloudFront-Is-Tablet-Viewer",
                CLIENT_IP_HEADER,
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        ),
        cookies: CookieBehavior::from_names(&config.forwarded_cookies),
    })?;
    stack.add("OriginReqPolicyHeadersNoCache", OriginRequestPolicy {
        name: params.resource_name("origin-nocache"),
        headers: HeaderBehavior::AllViewer,
        cookies: CookieBehavior::All,
    })?;
    stack.add("WpCachePolicy", CachePolicy {
        name: params.resource_name("cache-policy"),
        min_ttl: CACHE_MIN_TTL,
        max_ttl: CACHE_MAX_TTL,
        default_ttl: CACHE_DEFAULT_TTL,
        gzip: true,
        brotli: false,
    })?;

    stack.add("CloudFrontLogBucket", S3Bucket::for_cloudfront_logs())?;
    stack.add("CloudFrontLogBucketPolicy", EnforceSslPolicy {
        bucket_logical_id: "CloudFrontLogBucket".to_string(),
    })?;

    stack.add("IpFunction", CloudFrontFunction {
        name: params.resource_name("true-client-ip"),
        comment: "adds the viewer's ip as the true-client-ip header".to_string(),
        code: TRUE_CLIENT_IP_FUNCTION.to_string(),
    })?;

    let secret = cloudfront_secret_value(secret_reference(params, origin.cloudfront_secret));
    let alb_origin = HttpOrigin {
        id: ORIGIN_ID.to_string(),
        domain_name: json!(origin.alb_hostname),
        custom_headers: vec![(CLOUDFRONT_HEADER.to_string(), secret)],
        keepalive_timeout: ORIGIN_KEEPALIVE_SECONDS,
    };
    let ip_function = Some(get_att("IpFunction", "FunctionARN"));
    let default_behavior = Behavior {
        path_pattern: None,
        target_origin_id: ORIGIN_ID.to_string(),
        allowed_methods: AllowedMethods::All,
        cached_methods: AllowedMethods::GetHead,
        cache_policy_id: get_ref("WpCachePolicy"),
        origin_request_policy_id: get_ref("OriginReqPolicyHeaders"),
        viewer_request_function_arn: ip_function.clone(),
        compress: true,
    };
    let behaviors = config.uncached_paths.iter()
        .map(|path| Behavior {
            path_pattern: Some(path.clone()),
            allowed_methods: AllowedMethods::All,
            cached_methods: AllowedMethods::GetHeadOptions,
            origin_request_policy_id: get_ref("OriginReqPolicyHeadersNoCache"),
            ..default_behavior.clone()
        })
        .collect();
    stack.add("CloudFrontDistribution", Distribution {
        aliases: vec![params.site_hostname.clone()],
        certificate_arn: get_ref("WebCertificate"),
        web_acl_arn: Some(get_att("CloudFrontWebACL", "Arn")),
        log_bucket_domain: Some(get_att("CloudFrontLogBucket", "RegionalDomainName")),
        origins: vec![alb_origin],
        default_behavior,
        behaviors,
    })?;

    stack.add("MainRecordset", AliasRecord::to_cloudfront(
        &params.site_hostname,
        &params.hosted_zone_id,
        get_att("CloudFrontDistribution", "DomainName"),
    ))?;

    stack.add_output("SiteHostname", "hostname the site is served from", json!(params.site_hostname))?;
    stack.add_output("DistributionDomainName", "domain name of the distribution", get_att("CloudFrontDistribution", "DomainName"))?;
    Ok(stack)
}
