//! The database stack. What it holds depends on `dbConfig`:
//! a multi-az RDS instance, an Aurora MySQL cluster, or nothing at all.

use serde_json::{json, Value};

use crate::config::{DbConfig, DbEngine};
use crate::error::{Error, Result};
use crate::params::{AppParams, StackKind};
use crate::resources::*;
use crate::template::{DeletionPolicy, Stack};

use super::{db_instance_class, new_stack, NetworkImports};

pub const BACKUP_RETENTION_DAYS: u32 = 35;
/// 72 hours.
pub const BACKTRACK_WINDOW_SECONDS: u32 = 72 * 60 * 60;
pub const EXPORT_SECRET_NAME: &str = "DatabaseSecretName";
const PASSWORD_EXCLUDED_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

/// name of the credentials secret the database stack generates.
pub fn secret_name(params: &AppParams) -> String {
    format!("{}DatabaseSecret", params.logical_prefix())
}

/// only a snapshot id that actually looks like one is restored from.
pub fn restores_from_snapshot(snapshot: &str) -> bool {
    snapshot.contains("snapshot")
}

/// `None` when `dbConfig` does not define a database stack.
pub fn define(params: &AppParams) -> Result<Option<Stack>> {
    let config = &params.config;
    if !config.db_config.defines_stack() {
        return Ok(None);
    }
    let mut stack = new_stack(params, StackKind::Database, params.region(), "database")?;
    let network = NetworkImports::new(params);
    stack.add_dependency(network.stack_name());

    match config.db_config {
        DbConfig::Instance => define_instance(&mut stack, params, &network)?,
        DbConfig::Cluster => define_cluster(&mut stack, params, &network)?,
        _ => {
            // cloudformation does not accept a template without resources
            stack.resource("Placeholder", "AWS::CloudFormation::WaitConditionHandle", json!({}))?;
        }
    }
    Ok(Some(stack))
}

fn define_common(stack: &mut Stack, params: &AppParams, network: &NetworkImports) -> Result<()> {
    let config = &params.config;
    stack.resource("RdsSubnetGroup", "AWS::RDS::DBSubnetGroup", json!({
        "DBSubnetGroupDescription": format!("Subnet group for {} RDS instance", params.app_name()),
        "SubnetIds": network.isolated_subnet_ids(),
    }))?;

    let secret_name = secret_name(params);
    let username = match config.db_config {
        DbConfig::Cluster => DbEngine::Mysql.master_username(),
        _ => config.db_engine.master_username(),
    };
    stack.resource(&secret_name, "AWS::SecretsManager::Secret", json!({
        "Name": secret_name,
        "Description": format!("Credentials of the {} database", params.resource_name("database")),
        "GenerateSecretString": {
            "SecretStringTemplate": json!({ "username": username }).to_string(),
            "GenerateStringKey": "password",
            "PasswordLength": 30,
            "ExcludeCharacters": PASSWORD_EXCLUDED_CHARACTERS,
        },
    }))?;

    stack.resource("DbSecret", "AWS::SSM::Parameter", json!({
        "Type": "String",
        "Name": params.parameter_path("DatabaseSecret"),
        "Value": secret_name,
        "Description": "name of the secret holding the database credentials",
    }))?;
    stack.export(EXPORT_SECRET_NAME, "name of the database credentials secret", json!(secret_name))?;
    Ok(())
}

fn credentials(params: &AppParams, restoring: bool) -> Value {
    let secret = get_ref(&secret_name(params));
    let mut out = json!({
        "MasterUserPassword": resolve_secret_json_key(secret.clone(), "password"),
    });
    // a restored snapshot already carries its master user
    if !restoring {
        out["MasterUsername"] = resolve_secret_json_key(secret, "username");
    }
    out
}

fn merge(target: &mut Value, other: Value) {
    if let (Some(target), Value::Object(other)) = (target.as_object_mut(), other) {
        target.extend(other);
    }
}

/// only alphanumerics are allowed in a database name.
fn database_name(params: &AppParams) -> String {
    params.app_name().chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn attach_secret(stack: &mut Stack, params: &AppParams, target_id: &str, target_type: &str) -> Result<()> {
    stack.resource("DatabaseSecretAttachment", "AWS::SecretsManager::SecretTargetAttachment", json!({
        "SecretId": get_ref(&secret_name(params)),
        "TargetId": get_ref(target_id),
        "TargetType": target_type,
    }))?;
    Ok(())
}

fn define_instance(stack: &mut Stack, params: &AppParams, network: &NetworkImports) -> Result<()> {
    let config = &params.config;
    define_common(stack, params, network)?;
    let restoring = restores_from_snapshot(&config.db_snapshot);
    let db_id = format!("{}Database", params.logical_prefix());

    let mut props = json!({
        "Engine": config.db_engine.engine_name(),
        "DBInstanceClass": db_instance_class(&config.db_instance_type),
        "AllocatedStorage": "100",
        "MultiAZ": true,
        "StorageEncrypted": true,
        "PubliclyAccessible": false,
        "CopyTagsToSnapshot": true,
        "BackupRetentionPeriod": BACKUP_RETENTION_DAYS,
        "DeletionProtection": config.prevent_deletion,
        "DBSubnetGroupName": get_ref("RdsSubnetGroup"),
        "VPCSecurityGroups": [network.db_security_group_id()],
        "Port": config.db_engine.port().to_string(),
    });
    if !config.db_full_version.is_empty() {
        props["EngineVersion"] = json!(config.db_full_version);
    } else if !config.db_major_version.is_empty() {
        props["EngineVersion"] = json!(config.db_major_version);
    }
    let exports = config.db_engine.log_exports();
    if !exports.is_empty() {
        props["EnableCloudwatchLogsExports"] = json!(exports);
    }
    if restoring {
        props["DBSnapshotIdentifier"] = json!(config.db_snapshot);
    } else {
        props["DBName"] = json!(database_name(params));
    }
    merge(&mut props, credentials(params, restoring));

    stack.resource(&db_id, "AWS::RDS::DBInstance", props)?
        .removal_policy(DeletionPolicy::Snapshot);
    attach_secret(stack, params, &db_id, "AWS::RDS::DBInstance")?;
    stack.export("DatabaseEndpoint", "address of the database", get_att(&db_id, "Endpoint.Address"))?;
    Ok(())
}

fn define_cluster(stack: &mut Stack, params: &AppParams, network: &NetworkImports) -> Result<()> {
    let config = &params.config;
    if config.db_engine != DbEngine::Mysql {
        tracing::warn!(engine = config.db_engine.engine_name(), "clusters always run aurora mysql, ignoring dbEngine");
    }
    if config.db_cluster_size == 0 {
        return Err(Error::invalid_config("dbClusterSize", "a cluster needs at least 1 instance"));
    }
    define_common(stack, params, network)?;
    let restoring = restores_from_snapshot(&config.db_snapshot);
    let prefix = params.logical_prefix();
    let cluster_id = format!("{prefix}Database");
    let parameter_group_id = "DatabaseParamGroup";
    let major = if config.db_major_version.is_empty() { "8.0" } else { config.db_major_version.as_str() };

    stack.resource(parameter_group_id, "AWS::RDS::DBClusterParameterGroup", json!({
        "Description": format!("Cluster parameter group for {}", params.resource_name("database")),
        "Family": format!("aurora-mysql{major}"),
        "Parameters": {
            "aurora_parallel_query": "ON",
            "aurora_disable_hash_join": "OFF",
        },
    }))?;

    let mut props = json!({
        "Engine": "aurora-mysql",
        "BacktrackWindow": BACKTRACK_WINDOW_SECONDS,
        "DeletionProtection": config.prevent_deletion,
        "EnableCloudwatchLogsExports": DbEngine::Mysql.log_exports(),
        "DBClusterParameterGroupName": get_ref(parameter_group_id),
        "StorageEncrypted": true,
        "BackupRetentionPeriod": BACKUP_RETENTION_DAYS,
        "DBSubnetGroupName": get_ref("RdsSubnetGroup"),
        "VpcSecurityGroupIds": [network.db_security_group_id()],
        "CopyTagsToSnapshot": true,
    });
    if !config.db_full_version.is_empty() {
        props["EngineVersion"] = json!(config.db_full_version);
    }
    if restoring {
        props["SnapshotIdentifier"] = json!(config.db_snapshot);
    } else {
        props["DatabaseName"] = json!(database_name(params));
    }
    merge(&mut props, credentials(params, restoring));
    stack.resource(&cluster_id, "AWS::RDS::DBCluster", props)?
        .removal_policy(DeletionPolicy::Snapshot);

    for i in 0..config.db_cluster_size {
        stack.resource(&format!("{prefix}DatabaseInstance{}", i + 1), "AWS::RDS::DBInstance", json!({
            "Engine": "aurora-mysql",
            "DBClusterIdentifier": get_ref(&cluster_id),
            "DBInstanceClass": db_instance_class(&config.db_instance_type),
            "DBSubnetGroupName": get_ref("RdsSubnetGroup"),
            "PubliclyAccessible": false,
        }))?;
    }
    attach_secret(stack, params, &cluster_id, "AWS::RDS::DBCluster")?;
    stack.export("DatabaseEndpoint", "writer endpoint of the cluster", get_att(&cluster_id, "Endpoint.Address"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::sample_params;

    fn with_db_config(db_config: DbConfig) -> AppParams {
        let mut params = sample_params();
        params.config.db_config = db_config;
        params
    }

    #[test]
    fn no_stack_for_delete_or_empty() {
        assert!(define(&with_db_config(DbConfig::Delete)).unwrap().is_none());
        assert!(define(&with_db_config(DbConfig::Disabled)).unwrap().is_none());
    }

    #[test]
    fn none_is_a_placeholder() {
        let stack = define(&with_db_config(DbConfig::None)).unwrap().unwrap();
        assert_eq!(stack.logical_ids().count(), 1);
        assert!(stack.get("Placeholder").is_some());
        assert!(stack.validated_template().is_ok());
    }

    #[test]
    fn mysql_instance() {
        let stack = define(&sample_params()).unwrap().unwrap();
        assert_eq!(stack.name, "webapp-dev-database-stack");
        assert_eq!(stack.dependencies, vec!["webapp-dev-network-stack".to_string()]);
        let db = stack.get("WebappDevDatabase").unwrap();
        assert_eq!(db.ty, "AWS::RDS::DBInstance");
        assert_eq!(db.deletion_policy, Some(DeletionPolicy::Snapshot));
        assert_eq!(db.update_replace_policy, Some(DeletionPolicy::Snapshot));
        assert_eq!(db.properties["MultiAZ"], true);
        assert_eq!(db.properties["BackupRetentionPeriod"], 35);
        assert_eq!(db.properties["DBInstanceClass"], "db.t4g.medium");
        assert_eq!(db.properties["EngineVersion"], "8.0.35");
        assert_eq!(db.properties["DBName"], "webapp");
        assert_eq!(db.properties["EnableCloudwatchLogsExports"], json!(["audit", "error", "general", "slowquery"]));
        assert!(db.properties.get("DBSnapshotIdentifier").is_none());
        assert!(db.properties.get("MasterUsername").is_some());

        let param = stack.get("DbSecret").unwrap();
        assert_eq!(param.properties["Name"], "/webapp/dev/DatabaseSecret");
        assert_eq!(param.properties["Value"], "WebappDevDatabaseSecret");
        assert!(stack.get("WebappDevDatabaseSecret").is_some());
        assert!(stack.validated_template().is_ok());
    }

    #[test]
    fn postgres_exports_no_logs() {
        let mut params = sample_params();
        params.config.db_engine = DbEngine::Postgres;
        let stack = define(&params).unwrap().unwrap();
        let db = stack.get("WebappDevDatabase").unwrap();
        assert_eq!(db.properties["Engine"], "postgres");
        assert_eq!(db.properties["Port"], "5432");
        assert!(db.properties.get("EnableCloudwatchLogsExports").is_none());
    }

    #[test]
    fn snapshot_restore_only_when_it_looks_like_one() {
        let mut params = sample_params();
        params.config.db_snapshot = "arn:aws:rds:eu-west-1:123456789012:snapshot:nightly".into();
        let stack = define(&params).unwrap().unwrap();
        let db = stack.get("WebappDevDatabase").unwrap();
        assert!(db.properties.get("DBSnapshotIdentifier").is_some());
        assert!(db.properties.get("DBName").is_none());
        assert!(db.properties.get("MasterUsername").is_none());

        params.config.db_snapshot = "nightly-backup".into();
        let stack = define(&params).unwrap().unwrap();
        assert!(stack.get("WebappDevDatabase").unwrap().properties.get("DBSnapshotIdentifier").is_none());
    }

    #[test]
    fn aurora_cluster() {
        let mut params = with_db_config(DbConfig::Cluster);
        params.config.db_cluster_size = 3;
        params.config.db_major_version = "8.0".into();
        let stack = define(&params).unwrap().unwrap();
        let cluster = stack.get("WebappDevDatabase").unwrap();
        assert_eq!(cluster.ty, "AWS::RDS::DBCluster");
        assert_eq!(cluster.properties["BacktrackWindow"], 259200);
        assert_eq!(cluster.deletion_policy, Some(DeletionPolicy::Snapshot));
        let group = stack.get("DatabaseParamGroup").unwrap();
        assert_eq!(group.properties["Family"], "aurora-mysql8.0");
        assert_eq!(group.properties["Parameters"]["aurora_parallel_query"], "ON");
        assert_eq!(group.properties["Parameters"]["aurora_disable_hash_join"], "OFF");
        assert!(stack.get("WebappDevDatabaseInstance3").is_some());
        assert!(stack.get("WebappDevDatabaseInstance4").is_none());
        assert_eq!(
            stack.get("DatabaseSecretAttachment").unwrap().properties["TargetType"],
            "AWS::RDS::DBCluster",
        );
    }
}
