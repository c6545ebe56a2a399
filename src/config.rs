//! Loading of the `parameters.toml` file.
//!
//! The file contains a `[default]` table that names the environment and
//! application to deploy, and one table per `"<app>-<env>"` pair that holds
//! the settings for that deployment:
//!
//! ```toml
//! [default]
//! env = "dev"
//! app = "webapp"
//!
//! [webapp-dev]
//! awsRegion = "eu-west-1"
//! hostedZone = "example.com"
//! vpcCidrBlock = "10.0.0.0/16"
//! # ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::cidr::Ipv4Cidr;
use crate::error::{Error, Result};
use crate::regions;

pub const DEFAULT_SECTION: &str = "default";
pub const REGION_ENV_VAR: &str = "WEBTIER_REGION";
pub const ACCOUNT_ENV_VAR: &str = "WEBTIER_ACCOUNT";

/// values given on the command line take precedence over
/// the ones in the `[default]` table.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub env: Option<String>,
    pub app: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbConfig {
    /// a single (multi-az) rds instance.
    Instance,
    /// an aurora mysql cluster.
    Cluster,
    /// the database stack exists, but holds no database.
    None,
    /// the database stack is not defined, and is removed on deploy.
    Delete,
    /// no database stack at all.
    #[default]
    #[serde(rename = "")]
    Disabled,
}

impl DbConfig {
    /// whether a database stack gets defined for this setting.
    pub fn defines_stack(&self) -> bool {
        matches!(self, DbConfig::Instance | DbConfig::Cluster | DbConfig::None)
    }

    pub fn creates_database(&self) -> bool {
        matches!(self, DbConfig::Instance | DbConfig::Cluster)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    #[default]
    Mysql,
    Postgres,
}

impl DbEngine {
    pub fn port(&self) -> u16 {
        match self {
            DbEngine::Mysql => 3306,
            DbEngine::Postgres => 5432,
        }
    }

    pub fn engine_name(&self) -> &'static str {
        match self {
            DbEngine::Mysql => "mysql",
            DbEngine::Postgres => "postgres",
        }
    }

    pub fn master_username(&self) -> &'static str {
        match self {
            DbEngine::Mysql => "admin",
            DbEngine::Postgres => "postgres",
        }
    }

    /// log types rds should export to cloudwatch.
    pub fn log_exports(&self) -> &'static [&'static str] {
        match self {
            DbEngine::Mysql => &["audit", "error", "general", "slowquery"],
            DbEngine::Postgres => &[],
        }
    }
}

fn default_nat_gateway_count() -> u32 { 1 }
fn default_max_azs() -> u32 { 2 }
fn default_cluster_size() -> u32 { 1 }
fn default_build_time() -> u32 { 10 }
fn allow_all() -> Vec<String> { vec!["*".to_string()] }

/// settings of a single `"<app>-<env>"` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// filled from the `[default]` table or the command line.
    #[serde(skip)]
    pub app_name: String,
    /// filled from the `[default]` table or the command line.
    #[serde(skip)]
    pub environment: String,

    /// region of the network, database, and compute stacks.
    /// falls back to the `WEBTIER_REGION` environment variable.
    #[serde(default)]
    pub aws_region: String,
    /// falls back to the `WEBTIER_ACCOUNT` environment variable.
    /// may be left empty, in which case templates rely on `AWS::AccountId`.
    #[serde(default)]
    pub aws_account: String,

    /// the route53 zone the site lives in, eg: `example.com`
    pub hosted_zone: String,
    /// looked up from route53 by `hosted_zone` when not given.
    #[serde(default)]
    pub hosted_zone_id: Option<String>,
    /// id of the `com.amazonaws.global.cloudfront.origin-facing` managed prefix
    /// list in the deployment region. Looked up when not given.
    #[serde(default)]
    pub cloudfront_prefix_list: Option<String>,

    pub vpc_cidr_block: String,
    #[serde(default = "default_nat_gateway_count")]
    pub nat_gateway_count: u32,
    /// number of availability zones the vpc spans.
    #[serde(default = "default_max_azs")]
    pub max_azs: u32,
    /// if this is a valid dns label, the site is served from
    /// `{subdomain}.{hosted_zone}`. Otherwise `{app}-{env}.{hosted_zone}`.
    #[serde(default)]
    pub subdomain: String,

    #[serde(default)]
    pub db_config: DbConfig,
    /// restore from this snapshot when it contains the word "snapshot".
    #[serde(default)]
    pub db_snapshot: String,
    #[serde(default)]
    pub db_engine: DbEngine,
    #[serde(default)]
    pub db_major_version: String,
    #[serde(default)]
    pub db_full_version: String,
    #[serde(default)]
    pub db_instance_type: String,
    #[serde(default = "default_cluster_size")]
    pub db_cluster_size: u32,
    /// name of an existing secret to hand to the instances when
    /// this deployment does not create its own database.
    #[serde(default)]
    pub db_secret_name: String,
    #[serde(default)]
    pub prevent_deletion: bool,

    /// ssm parameter holding the ami id, eg:
    /// `/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-arm64`
    pub ami_parameter: String,
    /// cidrs allowed to reach the admin (write) instances.
    #[serde(default)]
    pub admin_ips: Vec<String>,
    /// cidrs allowed through the waf. `["*"]` allows everyone.
    #[serde(default = "allow_all")]
    pub allowed_ips: Vec<String>,

    pub efs_mount_dir: String,
    /// switches the file system to provisioned throughput.
    #[serde(default)]
    pub efs_provisioned_throughput_mb: Option<u32>,
    pub target_port: u16,

    #[serde(default)]
    pub admin_user_data: Vec<String>,
    #[serde(default)]
    pub fleet_user_data: Vec<String>,
    /// file name under `./userdata/`. Appended to the admin user data if it exists.
    #[serde(default)]
    pub admin_user_data_script: String,
    /// file name under `./userdata/`. Appended to the fleet user data if it exists.
    #[serde(default)]
    pub fleet_user_data_script: String,

    /// names of AWS managed rule groups, eg: `AWSManagedRulesCommonRuleSet`
    #[serde(default)]
    pub managed_waf_rules: Vec<String>,
    #[serde(default)]
    pub uncached_paths: Vec<String>,
    /// cookie names forwarded to the origin. `["*"]` forwards all of them.
    #[serde(default = "allow_all")]
    pub forwarded_cookies: Vec<String>,

    pub min_max_admin_instances: [u32; 2],
    pub min_max_fleet_instances: [u32; 2],
    pub admin_instance_type: String,
    pub fleet_instance_type: String,
    /// minutes an admin instance gets before its health checks count.
    #[serde(default = "default_build_time")]
    pub admin_build_time: u32,
    /// minutes a fleet instance gets before its health checks count.
    #[serde(default = "default_build_time")]
    pub fleet_build_time: u32,

    /// bucket that holds the sync function artifact.
    /// by default one is derived from the account and region.
    #[serde(default)]
    pub artifact_bucket: Option<String>,
    /// tags applied to every stack.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl EnvironmentConfig {
    /// `"<app>-<env>"`, the name of this configuration's table.
    pub fn section_name(&self) -> String {
        format!("{}-{}", self.app_name, self.environment)
    }

    /// fill empty region/account values from the environment.
    pub fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.aws_region.is_empty() {
            if let Some(region) = lookup(REGION_ENV_VAR) {
                self.aws_region = region;
            }
        }
        if self.aws_account.is_empty() {
            if let Some(account) = lookup(ACCOUNT_ENV_VAR) {
                self.aws_account = account;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.aws_region.is_empty() {
            return Err(Error::invalid_config(
                "awsRegion",
                format!("no region configured, set it in [{}] or via {REGION_ENV_VAR}", self.section_name()),
            ));
        }
        regions::verify_region(&self.aws_region)?;
        if !self.aws_account.is_empty() {
            regions::verify_account(&self.aws_account)?;
        }
        if self.hosted_zone.is_empty() {
            return Err(Error::invalid_config("hostedZone", "must not be empty"));
        }
        let cidr: Ipv4Cidr = self.vpc_cidr_block.parse()?;
        if cidr.prefix_len() > 24 {
            return Err(Error::invalid_config(
                "vpcCidrBlock",
                format!("{} is too small, use a /24 or larger", self.vpc_cidr_block),
            ));
        }
        if self.max_azs == 0 {
            return Err(Error::invalid_config("maxAzs", "must be at least 1"));
        }
        if self.nat_gateway_count == 0 {
            return Err(Error::invalid_config("natGatewayCount", "the private subnets need at least 1 NAT gateway"));
        }
        if self.nat_gateway_count > self.max_azs {
            return Err(Error::invalid_config(
                "natGatewayCount",
                format!("{} NAT gateways requested but the vpc only spans {} availability zones", self.nat_gateway_count, self.max_azs),
            ));
        }
        if self.target_port == 0 {
            return Err(Error::invalid_config("targetPort", "must be a valid port"));
        }
        if self.db_config.creates_database() {
            if self.db_instance_type.is_empty() {
                return Err(Error::invalid_config("dbInstanceType", "required when dbConfig creates a database"));
            }
            if self.db_config == DbConfig::Cluster && self.db_cluster_size == 0 {
                return Err(Error::invalid_config("dbClusterSize", "a cluster needs at least 1 instance"));
            }
        }
        for (key, [min, max]) in [
            ("minMaxAdminInstances", self.min_max_admin_instances),
            ("minMaxFleetInstances", self.min_max_fleet_instances),
        ] {
            if min > max {
                return Err(Error::invalid_config(key, format!("min {min} is greater than max {max}")));
            }
        }
        if self.allowed_ips.is_empty() {
            return Err(Error::invalid_config("allowedIps", "use [\"*\"] to allow everyone"));
        }
        if self.forwarded_cookies.is_empty() {
            return Err(Error::invalid_config("forwardedCookies", "use [\"*\"] to forward all cookies"));
        }
        Ok(())
    }
}

/// the parsed, but not yet resolved, parameters file.
#[derive(Debug, Clone)]
pub struct ParametersFile {
    table: toml::Table,
}

impl ParametersFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let table = toml::from_str::<toml::Table>(contents)?;
        Ok(Self { table })
    }

    fn default_value(&self, key: &str) -> Option<String> {
        self.table
            .get(DEFAULT_SECTION)
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// resolve which environment to deploy, and load its settings.
    pub fn environment(&self, overrides: &Overrides) -> Result<EnvironmentConfig> {
        let environment = overrides.env.clone()
            .or_else(|| self.default_value("env"))
            .ok_or_else(|| Error::invalid_config("env", format!("not given and missing from [{DEFAULT_SECTION}]")))?;
        let app_name = overrides.app.clone()
            .or_else(|| self.default_value("app"))
            .ok_or_else(|| Error::invalid_config("app", format!("not given and missing from [{DEFAULT_SECTION}]")))?;

        let section = format!("{app_name}-{environment}");
        let value = self.table.get(&section)
            .ok_or_else(|| Error::MissingSection(section.clone()))?;
        let mut config: EnvironmentConfig = value.clone().try_into()?;
        config.app_name = app_name;
        config.environment = environment;
        Ok(config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const SAMPLE: &str = r#"
[default]
env = "dev"
app = "webapp"

[webapp-dev]
awsRegion = "eu-west-1"
awsAccount = "123456789012"
hostedZone = "example.com"
hostedZoneId = "Z0123456789ABC"
cloudfrontPrefixList = "pl-4fa04526"
vpcCidrBlock = "10.0.0.0/16"
natGatewayCount = 1
subdomain = "www"
dbConfig = "instance"
dbEngine = "mysql"
dbMajorVersion = "8.0"
dbFullVersion = "8.0.35"
dbInstanceType = "t4g.medium"
preventDeletion = false
amiParameter = "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-arm64"
adminIps = ["203.0.113.10/32", "198.51.100.0/24"]
allowedIps = ["*"]
efsMountDir = "/mnt/efs"
targetPort = 1880
adminUserData = ["mkdir -p {efs_mount_dir}", "mount -t efs {efs_fs_id}:/ {efs_mount_dir}"]
fleetUserData = ["echo {site_hostname}"]
managedWafRules = ["AWSManagedRulesCommonRuleSet", "AWSManagedRulesAmazonIpReputationList"]
uncachedPaths = ["/admin/*", "/api/*"]
forwardedCookies = ["session"]
minMaxAdminInstances = [1, 1]
minMaxFleetInstances = [1, 4]
adminInstanceType = "t4g.small"
fleetInstanceType = "t4g.micro"

[webapp-dev.tags]
CreatedBy = "platform-team"

[webapp-prod]
hostedZone = "example.com"
vpcCidrBlock = "10.1.0.0/16"
dbConfig = "cluster"
dbInstanceType = "r6g.large"
dbClusterSize = 2
amiParameter = "/aws/service/ami"
efsMountDir = "/mnt/efs"
targetPort = 80
minMaxAdminInstances = [1, 1]
minMaxFleetInstances = [2, 8]
adminInstanceType = "m6g.large"
fleetInstanceType = "m6g.large"
"#;

    pub fn sample_config() -> EnvironmentConfig {
        ParametersFile::parse(SAMPLE).unwrap()
            .environment(&Overrides::default()).unwrap()
    }

    #[test]
    fn loads_default_environment() {
        let config = sample_config();
        assert_eq!(config.app_name, "webapp");
        assert_eq!(config.environment, "dev");
        assert_eq!(config.section_name(), "webapp-dev");
        assert_eq!(config.db_config, DbConfig::Instance);
        assert_eq!(config.min_max_fleet_instances, [1, 4]);
        assert_eq!(config.tags.get("CreatedBy").map(String::as_str), Some("platform-team"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_take_precedence() {
        let file = ParametersFile::parse(SAMPLE).unwrap();
        let overrides = Overrides { env: Some("prod".into()), app: None };
        let mut config = file.environment(&overrides).unwrap();
        assert_eq!(config.db_config, DbConfig::Cluster);
        assert_eq!(config.db_cluster_size, 2);
        assert_eq!(config.allowed_ips, vec!["*".to_string()]);
        assert!(config.aws_region.is_empty());

        config.apply_env_fallbacks(|key| match key {
            REGION_ENV_VAR => Some("us-west-2".to_string()),
            _ => None,
        });
        assert_eq!(config.aws_region, "us-west-2");
        assert!(config.aws_account.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_section_is_an_error() {
        let file = ParametersFile::parse(SAMPLE).unwrap();
        let overrides = Overrides { env: Some("staging".into()), app: None };
        match file.environment(&overrides) {
            Err(Error::MissingSection(s)) => assert_eq!(s, "webapp-staging"),
            other => panic!("expected missing section, got {:?}", other),
        }
    }

    #[test]
    fn unknown_db_config_fails_to_parse() {
        let contents = SAMPLE.replace("dbConfig = \"instance\"", "dbConfig = \"serverless\"");
        let file = ParametersFile::parse(&contents).unwrap();
        assert!(file.environment(&Overrides::default()).is_err());
    }

    #[test]
    fn empty_db_config_disables_the_database() {
        let contents = SAMPLE.replace("dbConfig = \"instance\"", "dbConfig = \"\"");
        let config = ParametersFile::parse(&contents).unwrap()
            .environment(&Overrides::default()).unwrap();
        assert_eq!(config.db_config, DbConfig::Disabled);
        assert!(!config.db_config.defines_stack());
    }

    #[test]
    fn validation_catches_inverted_capacity() {
        let mut config = sample_config();
        config.min_max_fleet_instances = [5, 2];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("minMaxFleetInstances"));
    }

    #[test]
    fn validation_catches_too_many_nat_gateways() {
        let mut config = sample_config();
        config.nat_gateway_count = 3;
        assert!(config.validate().is_err());
    }
}
