//! Values derived once from the configuration and shared by every stack.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::cidr::{self, Ipv4Cidr};
use crate::config::EnvironmentConfig;
use crate::error::{Error, Result};
use crate::regions::GLOBAL_REGION;

/// a leading dns label. Only the start of the subdomain has to match.
const DNS_LABEL_PATTERN: &str = r"^[a-zA-Z]+[a-zA-Z\d-]{0,62}";

/// values that are not in the parameters file and have to be
/// looked up from the account before stacks can be defined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextLookups {
    pub hosted_zone_id: Option<String>,
    pub cloudfront_prefix_list: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Network,
    Database,
    Compute,
    Cdn,
}

impl StackKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            StackKind::Network => "network",
            StackKind::Database => "database",
            StackKind::Compute => "compute",
            StackKind::Cdn => "cdn",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppParams {
    pub config: EnvironmentConfig,
    pub hosted_zone_id: String,
    pub cloudfront_prefix_list: String,
    pub vpc_cidr: Ipv4Cidr,
    pub site_hostname: String,
    /// parameter in the global region holding the load balancer's dns name.
    pub alb_hostname_param: String,
    /// parameter in the global region holding the cloudfront secret's name.
    pub cloudfront_secret_param: String,
    /// admin ips without their masks, as matched against `true-client-ip`.
    pub admin_ips: BTreeSet<String>,
    /// directory the parameters file lives in. User data scripts
    /// are read from its `userdata/` directory.
    pub base_dir: PathBuf,
}

impl AppParams {
    /// values given in `lookups` win over the ones in the config, the
    /// config ones are used when the lookup was skipped.
    pub fn derive(config: EnvironmentConfig, lookups: ContextLookups) -> Result<Self> {
        config.validate()?;
        let hosted_zone_id = lookups.hosted_zone_id
            .or_else(|| config.hosted_zone_id.clone())
            .ok_or_else(|| Error::invalid_config("hostedZoneId", format!("could not determine the id of {}", config.hosted_zone)))?;
        let cloudfront_prefix_list = lookups.cloudfront_prefix_list
            .or_else(|| config.cloudfront_prefix_list.clone())
            .ok_or_else(|| Error::invalid_config("cloudfrontPrefixList", format!("could not determine the cloudfront prefix list of {}", config.aws_region)))?;
        let vpc_cidr = config.vpc_cidr_block.parse()?;

        let site_hostname = site_hostname(&config.app_name, &config.environment, &config.subdomain, &config.hosted_zone);
        let prefix = format!("/{}/{}", config.app_name, config.environment);
        let admin_ips = config.admin_ips.iter()
            .map(|ip| cidr::strip_mask(ip.trim()).to_string())
            .filter(|ip| !ip.is_empty())
            .collect();

        Ok(Self {
            hosted_zone_id,
            cloudfront_prefix_list,
            vpc_cidr,
            site_hostname,
            alb_hostname_param: format!("{prefix}/alb-hostname"),
            cloudfront_secret_param: format!("{prefix}/cloudfront-secret"),
            admin_ips,
            base_dir: PathBuf::from("."),
            config,
        })
    }

    pub fn with_base_dir(mut self, base_dir: &Path) -> Self {
        self.base_dir = base_dir.to_path_buf();
        self
    }

    pub fn app_name(&self) -> &str {
        &self.config.app_name
    }

    pub fn environment(&self) -> &str {
        &self.config.environment
    }

    pub fn region(&self) -> &str {
        &self.config.aws_region
    }

    pub fn global_region(&self) -> &str {
        GLOBAL_REGION
    }

    pub fn stack_name(&self, kind: StackKind) -> String {
        format!("{}-{}-{}-stack", self.config.app_name, self.config.environment, kind.suffix())
    }

    /// eg: `WebappDev`, used to make logical ids unique per deployment.
    pub fn logical_prefix(&self) -> String {
        format!("{}{}", capitalize(&self.config.app_name), capitalize(&self.config.environment))
    }

    /// `/{app}/{env}/{name}`
    pub fn parameter_path(&self, name: &str) -> String {
        format!("/{}/{}/{}", self.config.app_name, self.config.environment, name)
    }

    /// `{app}-{env}-{name}`
    pub fn resource_name(&self, name: &str) -> String {
        format!("{}-{}-{}", self.config.app_name, self.config.environment, name)
    }
}

pub fn site_hostname(app: &str, env: &str, subdomain: &str, hosted_zone: &str) -> String {
    // the pattern is a constant, it can only fail to compile if edited badly
    let valid_label = Regex::new(DNS_LABEL_PATTERN)
        .map(|re| re.is_match(subdomain))
        .unwrap_or(false);
    if valid_label {
        format!("{subdomain}.{hosted_zone}")
    } else {
        format!("{app}-{env}.{hosted_zone}")
    }
}

/// first letter upper case, the rest lower case. Anything that
/// isn't alphanumeric is dropped so the result can be part of a logical id.
pub fn capitalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().filter(|c| c.is_ascii_alphanumeric()).enumerate() {
        if i == 0 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    pub fn sample_params() -> AppParams {
        AppParams::derive(sample_config(), ContextLookups::default()).unwrap()
    }

    #[test]
    fn derives_names() {
        let params = sample_params();
        assert_eq!(params.site_hostname, "www.example.com");
        assert_eq!(params.alb_hostname_param, "/webapp/dev/alb-hostname");
        assert_eq!(params.cloudfront_secret_param, "/webapp/dev/cloudfront-secret");
        assert_eq!(params.stack_name(StackKind::Network), "webapp-dev-network-stack");
        assert_eq!(params.stack_name(StackKind::Cdn), "webapp-dev-cdn-stack");
        assert_eq!(params.logical_prefix(), "WebappDev");
        assert_eq!(params.vpc_cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn admin_ips_lose_their_masks() {
        let params = sample_params();
        let ips: Vec<&str> = params.admin_ips.iter().map(String::as_str).collect();
        assert_eq!(ips, vec!["198.51.100.0", "203.0.113.10"]);
    }

    #[test]
    fn invalid_subdomain_falls_back_to_app_and_env() {
        assert_eq!(site_hostname("webapp", "dev", "", "example.com"), "webapp-dev.example.com");
        assert_eq!(site_hostname("webapp", "dev", "1abc", "example.com"), "webapp-dev.example.com");
        assert_eq!(site_hostname("webapp", "dev", "-x", "example.com"), "webapp-dev.example.com");
    }

    #[test]
    fn subdomain_only_has_to_start_like_a_label() {
        // the match is anchored at the start only
        assert_eq!(site_hostname("a", "b", "shop_1", "example.com"), "shop_1.example.com");
    }

    #[test]
    fn lookups_win_over_config() {
        let lookups = ContextLookups {
            hosted_zone_id: Some("ZLOOKEDUP".into()),
            cloudfront_prefix_list: None,
        };
        let params = AppParams::derive(sample_config(), lookups).unwrap();
        assert_eq!(params.hosted_zone_id, "ZLOOKEDUP");
        assert_eq!(params.cloudfront_prefix_list, "pl-4fa04526");
    }

    #[test]
    fn missing_zone_id_is_an_error() {
        let mut config = sample_config();
        config.hosted_zone_id = None;
        let err = AppParams::derive(config, ContextLookups::default()).unwrap_err();
        assert!(err.to_string().contains("hostedZoneId"));
    }

    #[test]
    fn capitalize_lowers_the_tail_and_drops_separators() {
        assert_eq!(capitalize("webAPP"), "Webapp");
        assert_eq!(capitalize("my-app"), "Myapp");
        assert_eq!(capitalize(""), "");
    }
}
