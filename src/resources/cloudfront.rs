use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBehavior {
    AllowList(Vec<String>),
    AllViewer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieBehavior {
    All,
    AllowList(Vec<String>),
}

impl CookieBehavior {
    /// `["*"]` forwards every cookie, anything else is an allow list.
    pub fn from_names(names: &[String]) -> Self {
        match names.first() {
            Some(first) if first == "*" => CookieBehavior::All,
            _ => CookieBehavior::AllowList(names.to_vec()),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            CookieBehavior::All => json!({ "CookieBehavior": "all" }),
            CookieBehavior::AllowList(names) => json!({
                "CookieBehavior": "whitelist",
                "Cookies": names,
            }),
        }
    }
}

/// what CloudFront forwards to the origin on a cache miss. Every
/// query string is always forwarded.
#[derive(Debug, Clone)]
pub struct OriginRequestPolicy {
    pub name: String,
    pub headers: HeaderBehavior,
    pub cookies: CookieBehavior,
}

impl CfnResource for OriginRequestPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::OriginRequestPolicy"
    }

    fn properties(&self) -> Value {
        let headers = match &self.headers {
            HeaderBehavior::AllowList(names) => json!({ "HeaderBehavior": "whitelist", "Headers": names }),
            HeaderBehavior::AllViewer => json!({ "HeaderBehavior": "allViewer" }),
        };
        json!({
            "OriginRequestPolicyConfig": {
                "Name": self.name,
                "HeadersConfig": headers,
                "CookiesConfig": self.cookies.to_value(),
                "QueryStringsConfig": { "QueryStringBehavior": "all" },
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        if let CookieBehavior::AllowList(names) = &self.cookies {
            if names.is_empty() {
                return Err(format!("Origin request policy {} has an empty cookie allow list", self.name));
            }
        }
        if let HeaderBehavior::AllowList(names) = &self.headers {
            if names.is_empty() {
                return Err(format!("Origin request policy {} has an empty header allow list", self.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub name: String,
    pub min_ttl: u64,
    pub max_ttl: u64,
    pub default_ttl: u64,
    pub gzip: bool,
    pub brotli: bool,
}

impl CfnResource for CachePolicy {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CachePolicy"
    }

    fn properties(&self) -> Value {
        json!({
            "CachePolicyConfig": {
                "Name": self.name,
                "MinTTL": self.min_ttl,
                "MaxTTL": self.max_ttl,
                "DefaultTTL": self.default_ttl,
                "ParametersInCacheKeyAndForwardedToOrigin": {
                    "EnableAcceptEncodingGzip": self.gzip,
                    "EnableAcceptEncodingBrotli": self.brotli,
                    "HeadersConfig": { "HeaderBehavior": "none" },
                    "CookiesConfig": { "CookieBehavior": "none" },
                    "QueryStringsConfig": { "QueryStringBehavior": "all" },
                },
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.min_ttl <= self.default_ttl && self.default_ttl <= self.max_ttl) {
            return Err(format!(
                "Invalid ttls for cache policy {}\nMust satisfy min ({}) <= default ({}) <= max ({})",
                self.name, self.min_ttl, self.default_ttl, self.max_ttl,
            ));
        }
        Ok(())
    }
}

/// a CloudFront function, published on deploy.
#[derive(Debug, Clone)]
pub struct CloudFrontFunction {
    pub name: String,
    pub comment: String,
    pub code: String,
}

impl CfnResource for CloudFrontFunction {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Function"
    }

    fn properties(&self) -> Value {
        json!({
            "Name": self.name,
            "AutoPublish": true,
            "FunctionConfig": {
                "Comment": self.comment,
                "Runtime": "cloudfront-js-1.0",
            },
            "FunctionCode": self.code,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.len() > 64 {
            return Err(format!("Invalid function name {:?}\nMust be between 1 and 64 characters", self.name));
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("Invalid function name {:?}\nMust only contain alphanumeric characters, hyphens, and underscores", self.name));
        }
        Ok(())
    }
}

/// an https-only custom origin.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    pub id: String,
    pub domain_name: Value,
    pub custom_headers: Vec<(String, Value)>,
    /// seconds.
    pub keepalive_timeout: u32,
}

impl HttpOrigin {
    fn to_value(&self) -> Value {
        let mut origin = json!({
            "Id": self.id,
            "DomainName": self.domain_name,
            "CustomOriginConfig": {
                "OriginProtocolPolicy": "https-only",
                "OriginSSLProtocols": ["TLSv1.2"],
                "OriginKeepaliveTimeout": self.keepalive_timeout,
                "HTTPSPort": 443,
            },
        });
        if !self.custom_headers.is_empty() {
            origin["OriginCustomHeaders"] = self.custom_headers.iter()
                .map(|(name, value)| json!({ "HeaderName": name, "HeaderValue": value }))
                .collect();
        }
        origin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedMethods {
    All,
    GetHead,
    GetHeadOptions,
}

impl AllowedMethods {
    fn methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::All => &["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"],
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Behavior {
    /// `None` for the default behavior.
    pub path_pattern: Option<String>,
    pub target_origin_id: String,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: AllowedMethods,
    pub cache_policy_id: Value,
    pub origin_request_policy_id: Value,
    pub viewer_request_function_arn: Option<Value>,
    pub compress: bool,
}

impl Behavior {
    fn to_value(&self) -> Value {
        let mut behavior = json!({
            "TargetOriginId": self.target_origin_id,
            "ViewerProtocolPolicy": "redirect-to-https",
            "AllowedMethods": self.allowed_methods.methods(),
            "CachedMethods": self.cached_methods.methods(),
            "CachePolicyId": self.cache_policy_id,
            "OriginRequestPolicyId": self.origin_request_policy_id,
            "Compress": self.compress,
        });
        if let Some(pattern) = &self.path_pattern {
            behavior["PathPattern"] = json!(pattern);
        }
        if let Some(arn) = &self.viewer_request_function_arn {
            behavior["FunctionAssociations"] = json!([{
                "EventType": "viewer-request",
                "FunctionARN": arn,
            }]);
        }
        behavior
    }
}

#[derive(Debug, Clone)]
pub struct Distribution {
    pub aliases: Vec<String>,
    pub certificate_arn: Value,
    pub web_acl_arn: Option<Value>,
    /// regional domain name of the log bucket. Logging is off when `None`.
    pub log_bucket_domain: Option<Value>,
    pub origins: Vec<HttpOrigin>,
    pub default_behavior: Behavior,
    pub behaviors: Vec<Behavior>,
}

impl CfnResource for Distribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }

    fn properties(&self) -> Value {
        let mut config = json!({
            "Enabled": true,
            "HttpVersion": "http2",
            "IPV6Enabled": true,
            "Aliases": self.aliases,
            "ViewerCertificate": {
                "AcmCertificateArn": self.certificate_arn,
                "MinimumProtocolVersion": "TLSv1.2_2021",
                "SslSupportMethod": "sni-only",
            },
            "Origins": self.origins.iter().map(HttpOrigin::to_value).collect::<Vec<_>>(),
            "DefaultCacheBehavior": self.default_behavior.to_value(),
        });
        if !self.behaviors.is_empty() {
            config["CacheBehaviors"] = self.behaviors.iter().map(Behavior::to_value).collect();
        }
        if let Some(arn) = &self.web_acl_arn {
            config["WebACLId"] = arn.clone();
        }
        if let Some(domain) = &self.log_bucket_domain {
            config["Logging"] = json!({ "Bucket": domain });
        }
        json!({ "DistributionConfig": config })
    }

    fn validate(&self) -> Result<(), String> {
        if self.origins.is_empty() {
            return Err("Must provide at least one origin to cloudfront distribution".to_string());
        }
        if self.default_behavior.path_pattern.is_some() {
            return Err("The default behavior of a cloudfront distribution cannot have a path pattern".to_string());
        }
        let mut seen = std::collections::BTreeSet::new();
        for behavior in std::iter::once(&self.default_behavior).chain(self.behaviors.iter()) {
            if !self.origins.iter().any(|o| o.id == behavior.target_origin_id) {
                return Err(format!("Behavior targets unknown origin {:?}", behavior.target_origin_id));
            }
            if let Some(pattern) = &behavior.path_pattern {
                if pattern.is_empty() {
                    return Err("Cache behavior path pattern must not be empty".to_string());
                }
                if !seen.insert(pattern.as_str()) {
                    return Err(format!("Cache behavior path pattern {:?} is used twice", pattern));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn behavior(path: Option<&str>) -> Behavior {
        Behavior {
            path_pattern: path.map(|p| p.to_string()),
            target_origin_id: "alb".into(),
            allowed_methods: AllowedMethods::All,
            cached_methods: AllowedMethods::GetHead,
            cache_policy_id: get_ref("CachePolicy"),
            origin_request_policy_id: get_ref("OriginPolicy"),
            viewer_request_function_arn: Some(get_att("IpFunction", "FunctionARN")),
            compress: true,
        }
    }

    fn distribution(behaviors: Vec<Behavior>) -> Distribution {
        Distribution {
            aliases: vec!["www.example.com".into()],
            certificate_arn: get_ref("Cert"),
            web_acl_arn: Some(get_att("Acl", "Arn")),
            log_bucket_domain: Some(get_att("Logs", "RegionalDomainName")),
            origins: vec![HttpOrigin {
                id: "alb".into(),
                domain_name: json!("alb.example.com"),
                custom_headers: vec![("cloudfront".into(), json!("s3cr3t"))],
                keepalive_timeout: 60,
            }],
            default_behavior: behavior(None),
            behaviors,
        }
    }

    #[test]
    fn renders_distribution_config() {
        let dist = distribution(vec![behavior(Some("/admin/*"))]);
        assert!(dist.validate().is_ok());
        let config = &dist.properties()["DistributionConfig"];
        assert_eq!(config["ViewerCertificate"]["MinimumProtocolVersion"], "TLSv1.2_2021");
        assert_eq!(config["Origins"][0]["OriginCustomHeaders"][0]["HeaderName"], "cloudfront");
        assert_eq!(config["Origins"][0]["CustomOriginConfig"]["OriginKeepaliveTimeout"], 60);
        assert_eq!(config["CacheBehaviors"][0]["PathPattern"], "/admin/*");
        assert_eq!(config["DefaultCacheBehavior"]["FunctionAssociations"][0]["EventType"], "viewer-request");
        assert!(config["DefaultCacheBehavior"].get("PathPattern").is_none());
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let dist = distribution(vec![behavior(Some("/api/*")), behavior(Some("/api/*"))]);
        assert!(dist.validate().is_err());
    }

    #[test]
    fn unknown_origin_is_rejected() {
        let mut b = behavior(Some("/x"));
        b.target_origin_id = "nope".into();
        assert!(distribution(vec![b]).validate().is_err());
    }

    #[test]
    fn cookie_wildcard_forwards_everything() {
        assert_eq!(CookieBehavior::from_names(&["*".to_string()]), CookieBehavior::All);
        assert_eq!(
            CookieBehavior::from_names(&["session".to_string()]),
            CookieBehavior::AllowList(vec!["session".to_string()]),
        );
    }

    #[test]
    fn cache_ttls_must_be_ordered() {
        let policy = CachePolicy { name: "p".into(), min_ttl: 10, max_ttl: 5, default_ttl: 7, gzip: true, brotli: false };
        assert!(policy.validate().is_err());
    }
}
