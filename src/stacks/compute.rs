//! The compute stack: a shared file system, an admin (write) and a fleet
//! (read) auto scaling group behind one load balancer, and the custom
//! resource that hands the load balancer's hostname to the global region.

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::params::{AppParams, StackKind};
use crate::regions::GLOBAL_REGION;
use crate::resources::*;
use crate::template::{DeletionPolicy, Stack};
use crate::userdata::{UserData, Variables};

use super::{new_stack, NetworkImports};

pub const AMI_PARAMETER: &str = "AmiId";
pub const ARTIFACT_BUCKET_PARAMETER: &str = "ArtifactBucket";
pub const ARTIFACT_KEY_PARAMETER: &str = "ArtifactKey";
pub const SYNC_RESOURCE_TYPE: &str = "Custom::SsmParameterSync";
pub const CLOUDFRONT_SECRET_KEY: &str = "cloudfront_secret";
pub const CLOUDFRONT_HEADER: &str = "cloudfront";
pub const CLIENT_IP_HEADER: &str = "true-client-ip";
pub const NOT_VIA_CLOUDFRONT_MESSAGE: &str = "This app can only be accessed via CloudFront.";
pub const WRITE_RULE_PRIORITY: u32 = 5;
pub const READ_RULE_PRIORITY: u32 = 10;
/// an ALB rule takes at most 5 condition values, one goes to the secret header.
pub const MAX_ADMIN_IPS: usize = 4;
const EFS_PORT: u16 = 2049;
const SYNC_LOG_RETENTION_DAYS: u32 = 7;

const SCALING_NOTIFICATIONS: &[&str] = &[
    "autoscaling:EC2_INSTANCE_LAUNCH",
    "autoscaling:EC2_INSTANCE_LAUNCH_ERROR",
    "autoscaling:EC2_INSTANCE_TERMINATE",
    "autoscaling:EC2_INSTANCE_TERMINATE_ERROR",
];

/// `db_secret_name` is empty when the instances get no database secret.
pub fn define(params: &AppParams, db_secret_name: &str) -> Result<Stack> {
    let config = &params.config;
    if params.admin_ips.len() > MAX_ADMIN_IPS {
        return Err(Error::invalid_config(
            "adminIps",
            format!("at most {MAX_ADMIN_IPS} admin ips can be matched by the load balancer, got {}", params.admin_ips.len()),
        ));
    }
    let mut stack = new_stack(params, StackKind::Compute, params.region(), "compute")?;
    let network = NetworkImports::new(params);
    stack.add_dependency(network.stack_name());

    stack.add_parameter(AMI_PARAMETER, "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>", Some(&config.ami_parameter), "ssm parameter holding the instances' ami")?;
    stack.add_parameter(ARTIFACT_BUCKET_PARAMETER, "String", None, "bucket holding the parameter sync function")?;
    stack.add_parameter(ARTIFACT_KEY_PARAMETER, "String", None, "key of the parameter sync function's zip")?;

    define_file_system(&mut stack, params, &network)?;
    define_roles(&mut stack, params, db_secret_name)?;
    define_notifications(&mut stack)?;
    define_instances(&mut stack, params, &network, db_secret_name)?;
    define_load_balancer(&mut stack, params, &network)?;
    define_cloudfront_secret(&mut stack, params)?;
    define_parameter_sync(&mut stack, params)?;
    Ok(stack)
}

fn define_file_system(stack: &mut Stack, params: &AppParams, network: &NetworkImports) -> Result<()> {
    let config = &params.config;
    let mut props = json!({
        "Encrypted": true,
        "PerformanceMode": "generalPurpose",
        "ThroughputMode": "elastic",
        "BackupPolicy": { "Status": "ENABLED" },
        "LifecyclePolicies": [
            { "TransitionToIA": "AFTER_14_DAYS" },
            { "TransitionToPrimaryStorageClass": "AFTER_1_ACCESS" },
        ],
        "FileSystemTags": [{ "Key": "Name", "Value": params.resource_name("filesystem") }],
    });
    if let Some(mb) = config.efs_provisioned_throughput_mb {
        props["ThroughputMode"] = json!("provisioned");
        props["ProvisionedThroughputInMibps"] = json!(mb);
    }
    stack.resource("EfsFileSystem", "AWS::EFS::FileSystem", props)?
        .removal_policy(DeletionPolicy::Retain);

    let instance_sg = network.instance_security_group_id();
    for az in 0..config.max_azs as usize {
        stack.resource(&format!("EfsMountTarget{}", az + 1), "AWS::EFS::MountTarget", json!({
            "FileSystemId": get_ref("EfsFileSystem"),
            "SubnetId": select(az, network.private_subnet_ids()),
            "SecurityGroups": [instance_sg],
        }))?;
    }
    stack.add("EfsFromInstances", SecurityGroupRule::ingress(
        instance_sg.clone(), Peer::SecurityGroup(instance_sg.clone()), EFS_PORT, "Instances to EFS"))?;
    stack.add("InstancesToEfs", SecurityGroupRule::egress(
        instance_sg.clone(), Peer::SecurityGroup(instance_sg), EFS_PORT, "Instances to EFS"))?;
    Ok(())
}

fn efs_access_condition() -> Value {
    json!({ "Bool": { "elasticfilesystem:AccessedViaMountTarget": "true" } })
}

fn define_roles(stack: &mut Stack, params: &AppParams, db_secret_name: &str) -> Result<()> {
    let ssm_core = managed_policy_arn("AmazonSSMManagedInstanceCore");
    let efs_arn = get_att("EfsFileSystem", "Arn");

    stack.add("InstanceRole", Role::for_service("ec2.amazonaws.com").with_managed_policy(ssm_core.clone()))?;
    stack.add("EfsRwPolicy", ManagedPolicy {
        statements: vec![
            Statement::allow(
                &["elasticfilesystem:ClientMount", "elasticfilesystem:ClientWrite", "elasticfilesystem:ClientRootAccess"],
                vec![efs_arn.clone()],
            ).with_condition(efs_access_condition()),
        ],
        roles: vec![get_ref("InstanceRole")],
    })?;
    if !db_secret_name.is_empty() {
        let secret_arn = sub(format!("arn:${{{PARTITION}}}:secretsmanager:${{{REGION}}}:${{{ACCOUNT_ID}}}:secret:{db_secret_name}*"));
        stack.add("SecretsPolicy", ManagedPolicy {
            statements: vec![
                Statement::allow(
                    &[
                        "secretsmanager:GetResourcePolicy",
                        "secretsmanager:GetSecretValue",
                        "secretsmanager:DescribeSecret",
                        "secretsmanager:ListSecretVersionIds",
                    ],
                    vec![secret_arn],
                ),
                Statement::allow(&["secretsmanager:ListSecrets"], vec![json!("*")]),
            ],
            roles: vec![get_ref("InstanceRole")],
        })?;
    }
    stack.add("InstanceProfile", InstanceProfile { role: get_ref("InstanceRole") })?;

    stack.add("FleetInstanceRole", Role::for_service("ec2.amazonaws.com").with_managed_policy(ssm_core))?;
    stack.add("EfsRoPolicy", ManagedPolicy {
        statements: vec![
            Statement::allow(&["elasticfilesystem:ClientMount"], vec![efs_arn.clone()])
                .with_condition(efs_access_condition()),
            Statement::deny(&["elasticfilesystem:ClientWrite", "elasticfilesystem:ClientRootAccess"], vec![efs_arn])
                .with_condition(efs_access_condition()),
        ],
        roles: vec![get_ref("FleetInstanceRole")],
    })?;
    stack.add("FleetInstanceProfile", InstanceProfile { role: get_ref("FleetInstanceRole") })?;
    Ok(())
}

fn define_notifications(stack: &mut Stack) -> Result<()> {
    let root = sub(format!("arn:${{{PARTITION}}}:iam::${{{ACCOUNT_ID}}}:root"));
    let autoscaling = sub(format!(
        "arn:${{{PARTITION}}}:iam::${{{ACCOUNT_ID}}}:role/aws-service-role/autoscaling.amazonaws.com/AWSServiceRoleForAutoScaling"
    ));
    stack.resource("SnsKey", "AWS::KMS::Key", json!({
        "EnableKeyRotation": true,
        "KeyPolicy": {
            "Version": "2012-10-17",
            "Statement": [
                {
                    "Effect": "Allow",
                    "Principal": { "AWS": root },
                    "Action": "kms:*",
                    "Resource": "*",
                },
                {
                    "Effect": "Allow",
                    "Principal": { "AWS": autoscaling },
                    "Action": ["kms:Decrypt", "kms:GenerateDataKey*"],
                    "Resource": "*",
                },
            ],
        },
    }))?.removal_policy(DeletionPolicy::Retain);
    stack.resource("SnsScalingEvents", "AWS::SNS::Topic", json!({
        "KmsMasterKeyId": get_ref("SnsKey"),
    }))?;
    Ok(())
}

fn user_data(params: &AppParams, db_secret_name: &str, lines: &[String], script: &str) -> Result<Value> {
    let config = &params.config;
    let db_secret_command = if db_secret_name.is_empty() {
        json!("")
    } else {
        sub(format!(
            "aws secretsmanager get-secret-value --secret-id {db_secret_name} --region ${{{REGION}}} --query SecretString --output text"
        ))
    };
    let variables = Variables::new()
        .set("efs_fs_id", get_ref("EfsFileSystem"))
        .set("efs_mount_dir", config.efs_mount_dir.as_str())
        .set("site_hostname", params.site_hostname.as_str())
        .set("db_secret_command", db_secret_command);
    let mut userdata = UserData::for_linux(variables);
    userdata.add_commands(lines)?;
    userdata.add_script_file(&params.base_dir, script)?;
    Ok(userdata.render())
}

struct Tier<'a> {
    name: &'static str,
    launch_template_id: String,
    instance_profile_id: &'static str,
    instance_type: &'a str,
    min_max: [u32; 2],
    build_time_minutes: u32,
    target_group_id: &'static str,
    user_data: Value,
}

fn define_instances(stack: &mut Stack, params: &AppParams, network: &NetworkImports, db_secret_name: &str) -> Result<()> {
    let config = &params.config;
    let prefix = params.logical_prefix();
    let tiers = [
        Tier {
            name: "Admin",
            launch_template_id: format!("{prefix}AdminLaunchTemplate"),
            instance_profile_id: "InstanceProfile",
            instance_type: &config.admin_instance_type,
            min_max: config.min_max_admin_instances,
            build_time_minutes: config.admin_build_time,
            target_group_id: "WriteTarget",
            user_data: user_data(params, db_secret_name, &config.admin_user_data, &config.admin_user_data_script)?,
        },
        Tier {
            name: "Fleet",
            launch_template_id: format!("{prefix}FleetLaunchTemplate"),
            instance_profile_id: "FleetInstanceProfile",
            instance_type: &config.fleet_instance_type,
            min_max: config.min_max_fleet_instances,
            build_time_minutes: config.fleet_build_time,
            target_group_id: "FleetTarget",
            user_data: user_data(params, db_secret_name, &config.fleet_user_data, &config.fleet_user_data_script)?,
        },
    ];

    for tier in tiers {
        stack.resource(&tier.launch_template_id, "AWS::EC2::LaunchTemplate", json!({
            "LaunchTemplateData": {
                "ImageId": get_ref(AMI_PARAMETER),
                "InstanceType": tier.instance_type,
                "IamInstanceProfile": { "Arn": get_att(tier.instance_profile_id, "Arn") },
                "SecurityGroupIds": [network.instance_security_group_id()],
                "UserData": tier.user_data,
                "EbsOptimized": true,
                "MetadataOptions": { "HttpTokens": "required" },
            },
        }))?;

        let [min, max] = tier.min_max;
        stack.resource(&format!("{}ASG", tier.name), "AWS::AutoScaling::AutoScalingGroup", json!({
            "MinSize": min.to_string(),
            "MaxSize": max.to_string(),
            "VPCZoneIdentifier": network.private_subnet_ids(),
            "LaunchTemplate": {
                "LaunchTemplateId": get_ref(&tier.launch_template_id),
                "Version": get_att(&tier.launch_template_id, "LatestVersionNumber"),
            },
            "HealthCheckType": "ELB",
            "HealthCheckGracePeriod": tier.build_time_minutes * 60,
            "TargetGroupARNs": [get_ref(tier.target_group_id)],
            "NotificationConfigurations": [{
                "TopicARN": get_ref("SnsScalingEvents"),
                "NotificationTypes": SCALING_NOTIFICATIONS,
            }],
        }))?.update_policy(json!({
            "AutoScalingReplacingUpdate": { "WillReplace": true },
        }));
    }
    Ok(())
}

fn target_group(params: &AppParams, network: &NetworkImports, healthy_codes: &str) -> Value {
    let port = params.config.target_port;
    json!({
        "Protocol": "HTTP",
        "ProtocolVersion": "HTTP1",
        "Port": port,
        "VpcId": network.vpc_id(),
        "TargetType": "instance",
        "HealthCheckEnabled": true,
        "HealthCheckPath": "/",
        "HealthCheckPort": port.to_string(),
        "HealthCheckIntervalSeconds": 30,
        "HealthCheckTimeoutSeconds": 10,
        "HealthyThresholdCount": 2,
        "UnhealthyThresholdCount": 5,
        "Matcher": { "HttpCode": healthy_codes },
    })
}

/// the header value only CloudFront knows, resolved from the secret at deploy time.
pub fn cloudfront_secret_value(secret: Value) -> Value {
    resolve_secret_json_key(secret, CLOUDFRONT_SECRET_KEY)
}

fn header_condition(name: &str, values: Vec<Value>) -> Value {
    json!({
        "Field": "http-header",
        "HttpHeaderConfig": { "HttpHeaderName": name, "Values": values },
    })
}

fn define_load_balancer(stack: &mut Stack, params: &AppParams, network: &NetworkImports) -> Result<()> {
    stack.resource("WriteTarget", "AWS::ElasticLoadBalancingV2::TargetGroup", target_group(params, network, "200-302"))?;
    stack.resource("FleetTarget", "AWS::ElasticLoadBalancingV2::TargetGroup", target_group(params, network, "200,302"))?;

    stack.resource("ALB", "AWS::ElasticLoadBalancingV2::LoadBalancer", json!({
        "Type": "application",
        "Scheme": "internet-facing",
        "Subnets": network.public_subnet_ids(),
        "SecurityGroups": [network.alb_security_group_id()],
    }))?;
    stack.add("AlbSiteCertificate", Certificate {
        domain_name: params.site_hostname.clone(),
        hosted_zone_id: params.hosted_zone_id.clone(),
    })?;
    stack.resource("Listener", "AWS::ElasticLoadBalancingV2::Listener", json!({
        "LoadBalancerArn": get_ref("ALB"),
        "Port": 443,
        "Protocol": "HTTPS",
        "Certificates": [{ "CertificateArn": get_ref("AlbSiteCertificate") }],
        "DefaultActions": [{
            "Type": "fixed-response",
            "FixedResponseConfig": {
                "StatusCode": "404",
                "ContentType": "text/plain",
                "MessageBody": NOT_VIA_CLOUDFRONT_MESSAGE,
            },
        }],
    }))?;

    let secret_value = cloudfront_secret_value(get_ref("CloudfrontSecret"));
    stack.resource("ReadAction", "AWS::ElasticLoadBalancingV2::ListenerRule", json!({
        "ListenerArn": get_ref("Listener"),
        "Priority": READ_RULE_PRIORITY,
        "Conditions": [header_condition(CLOUDFRONT_HEADER, vec![secret_value.clone()])],
        "Actions": [{ "Type": "forward", "TargetGroupArn": get_ref("FleetTarget") }],
    }))?;
    if params.admin_ips.is_empty() {
        tracing::warn!("no adminIps configured, the admin instances will not receive any traffic");
    } else {
        let ips = params.admin_ips.iter().map(|ip| json!(ip)).collect();
        stack.resource("WriteAction", "AWS::ElasticLoadBalancingV2::ListenerRule", json!({
            "ListenerArn": get_ref("Listener"),
            "Priority": WRITE_RULE_PRIORITY,
            "Conditions": [
                header_condition(CLOUDFRONT_HEADER, vec![secret_value]),
                header_condition(CLIENT_IP_HEADER, ips),
            ],
            "Actions": [{ "Type": "forward", "TargetGroupArn": get_ref("WriteTarget") }],
        }))?;
    }
    stack.add_output("AlbDnsName", "dns name of the load balancer", get_att("ALB", "DNSName"))?;
    Ok(())
}

fn define_cloudfront_secret(stack: &mut Stack, params: &AppParams) -> Result<()> {
    let mut props = json!({
        "Name": params.resource_name("cloudfront-secret"),
        "Description": "shared between CloudFront and the load balancer",
        "GenerateSecretString": {
            "SecretStringTemplate": "{}",
            "GenerateStringKey": CLOUDFRONT_SECRET_KEY,
            "ExcludePunctuation": true,
        },
    });
    // the CDN stack reads the replica, there is nothing to replicate to
    // when the deployment already is in the global region
    if params.region() != GLOBAL_REGION {
        props["ReplicaRegions"] = json!([{ "Region": GLOBAL_REGION }]);
    }
    stack.resource("CloudfrontSecret", "AWS::SecretsManager::Secret", props)?;
    Ok(())
}

/// ARN of a parameter in the global region's parameter store.
fn global_parameter_arn(parameter_name: &str) -> Value {
    sub(format!("arn:${{{PARTITION}}}:ssm:{GLOBAL_REGION}:${{{ACCOUNT_ID}}}:parameter{parameter_name}"))
}

fn define_parameter_sync(stack: &mut Stack, params: &AppParams) -> Result<()> {
    let role = Role::for_service("lambda.amazonaws.com")
        .with_managed_policy(managed_policy_arn("service-role/AWSLambdaBasicExecutionRole"))
        .with_policy("sync-parameters", vec![
            Statement::allow(
                &["ssm:PutParameter", "ssm:DeleteParameter"],
                vec![
                    global_parameter_arn(&params.alb_hostname_param),
                    global_parameter_arn(&params.cloudfront_secret_param),
                ],
            ),
        ]);
    stack.add("SsmSyncRole", role)?;

    let mut function = Function::new(
        get_ref(ARTIFACT_BUCKET_PARAMETER),
        get_ref(ARTIFACT_KEY_PARAMETER),
        get_att("SsmSyncRole", "Arn"),
    );
    function.description = format!("copies {} parameters to {GLOBAL_REGION}", params.resource_name("compute"));
    function.timeout = 60;
    stack.add("SyncSsmParamsEventHandler", function)?;
    stack.add("SyncSsmParamsLogGroup", LogGroup {
        name: Some(sub("/aws/lambda/${SyncSsmParamsEventHandler}")),
        retention_days: Some(SYNC_LOG_RETENTION_DAYS),
    })?;

    stack.resource("SsmSyncCustomResource1", SYNC_RESOURCE_TYPE, json!({
        "ServiceToken": get_att("SyncSsmParamsEventHandler", "Arn"),
        "alb_hostname": get_att("ALB", "DNSName"),
        "alb_parameter_name": params.alb_hostname_param,
        // the 7th field of the arn is the secret's name with its random suffix
        "cf_secret_value": select(6, split(":", get_ref("CloudfrontSecret"))),
        "cf_parameter_name": params.cloudfront_secret_param,
        "target_region": GLOBAL_REGION,
    }))?.depends_on("SyncSsmParamsLogGroup");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::sample_params;

    fn compute() -> Stack {
        define(&sample_params(), "WebappDevDatabaseSecret").unwrap()
    }

    #[test]
    fn template_is_valid() {
        let stack = compute();
        assert_eq!(stack.name, "webapp-dev-compute-stack");
        assert!(stack.validated_template().is_ok());
        let ami = stack.template.parameters.get(AMI_PARAMETER).unwrap();
        assert_eq!(ami.ty, "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>");
        assert_eq!(ami.default.as_deref(), Some("/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-arm64"));
    }

    #[test]
    fn listener_rules() {
        let stack = compute();
        let write = stack.get("WriteAction").unwrap();
        assert_eq!(write.properties["Priority"], 5);
        let conditions = &write.properties["Conditions"];
        assert_eq!(conditions[0]["HttpHeaderConfig"]["HttpHeaderName"], "cloudfront");
        assert_eq!(conditions[1]["HttpHeaderConfig"]["HttpHeaderName"], "true-client-ip");
        assert_eq!(conditions[1]["HttpHeaderConfig"]["Values"], json!(["198.51.100.0", "203.0.113.10"]));

        let read = stack.get("ReadAction").unwrap();
        assert_eq!(read.properties["Priority"], 10);
        assert_eq!(read.properties["Conditions"].as_array().map(|c| c.len()), Some(1));

        let listener = stack.get("Listener").unwrap();
        let response = &listener.properties["DefaultActions"][0]["FixedResponseConfig"];
        assert_eq!(response["StatusCode"], "404");
        assert_eq!(response["MessageBody"], "This app can only be accessed via CloudFront.");
    }

    #[test]
    fn no_write_rule_without_admin_ips() {
        let mut params = sample_params();
        params.admin_ips.clear();
        let stack = define(&params, "").unwrap();
        assert!(stack.get("WriteAction").is_none());
        assert!(stack.get("ReadAction").is_some());
    }

    #[test]
    fn too_many_admin_ips() {
        let mut params = sample_params();
        for i in 0..4 {
            params.admin_ips.insert(format!("192.0.2.{i}"));
        }
        assert!(define(&params, "").is_err());
    }

    #[test]
    fn target_groups_match_different_codes() {
        let stack = compute();
        assert_eq!(stack.get("WriteTarget").unwrap().properties["Matcher"]["HttpCode"], "200-302");
        assert_eq!(stack.get("FleetTarget").unwrap().properties["Matcher"]["HttpCode"], "200,302");
        assert_eq!(stack.get("FleetTarget").unwrap().properties["Port"], 1880);
    }

    #[test]
    fn fleet_uses_its_own_instance_type() {
        let stack = compute();
        let fleet = stack.get("WebappDevFleetLaunchTemplate").unwrap();
        assert_eq!(fleet.properties["LaunchTemplateData"]["InstanceType"], "t4g.micro");
        let admin = stack.get("WebappDevAdminLaunchTemplate").unwrap();
        assert_eq!(admin.properties["LaunchTemplateData"]["InstanceType"], "t4g.small");
    }

    #[test]
    fn scaling_groups() {
        let stack = compute();
        let fleet = stack.get("FleetASG").unwrap();
        assert_eq!(fleet.properties["MinSize"], "1");
        assert_eq!(fleet.properties["MaxSize"], "4");
        assert_eq!(fleet.properties["HealthCheckGracePeriod"], 600);
        assert_eq!(fleet.properties["HealthCheckType"], "ELB");
        assert_eq!(fleet.update_policy, Some(json!({ "AutoScalingReplacingUpdate": { "WillReplace": true } })));
    }

    #[test]
    fn user_data_keeps_the_file_system_token() {
        let stack = compute();
        let admin = stack.get("WebappDevAdminLaunchTemplate").unwrap();
        let user_data = &admin.properties["LaunchTemplateData"]["UserData"]["Fn::Base64"]["Fn::Join"][1];
        let parts = user_data.as_array().unwrap();
        assert!(parts.contains(&json!({ "Ref": "EfsFileSystem" })));
        assert!(parts[0].as_str().unwrap().starts_with("#!/bin/bash\nmkdir -p /mnt/efs\n"));
    }

    #[test]
    fn file_system_throughput() {
        let stack = compute();
        let efs = stack.get("EfsFileSystem").unwrap();
        assert_eq!(efs.properties["ThroughputMode"], "elastic");
        assert_eq!(efs.deletion_policy, Some(DeletionPolicy::Retain));
        assert!(stack.get("EfsMountTarget2").is_some());

        let mut params = sample_params();
        params.config.efs_provisioned_throughput_mb = Some(64);
        let stack = define(&params, "").unwrap();
        let efs = stack.get("EfsFileSystem").unwrap();
        assert_eq!(efs.properties["ThroughputMode"], "provisioned");
        assert_eq!(efs.properties["ProvisionedThroughputInMibps"], 64);
    }

    #[test]
    fn secrets_policy_only_with_a_database() {
        assert!(compute().get("SecretsPolicy").is_some());
        assert!(define(&sample_params(), "").unwrap().get("SecretsPolicy").is_none());
    }

    #[test]
    fn secret_is_replicated_to_the_global_region() {
        let stack = compute();
        let secret = stack.get("CloudfrontSecret").unwrap();
        assert_eq!(secret.properties["Name"], "webapp-dev-cloudfront-secret");
        assert_eq!(secret.properties["ReplicaRegions"][0]["Region"], "us-east-1");
        assert_eq!(secret.properties["GenerateSecretString"]["GenerateStringKey"], "cloudfront_secret");
    }

    #[test]
    fn sync_custom_resource() {
        let stack = compute();
        let sync = stack.get("SsmSyncCustomResource1").unwrap();
        assert_eq!(sync.ty, "Custom::SsmParameterSync");
        assert_eq!(sync.properties["alb_parameter_name"], "/webapp/dev/alb-hostname");
        assert_eq!(sync.properties["cf_parameter_name"], "/webapp/dev/cloudfront-secret");
        assert_eq!(sync.properties["target_region"], "us-east-1");
        assert_eq!(
            sync.properties["cf_secret_value"],
            json!({ "Fn::Select": ["6", { "Fn::Split": [":", { "Ref": "CloudfrontSecret" }] }] }),
        );
        let role = stack.get("SsmSyncRole").unwrap();
        let statement = &role.properties["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], json!(["ssm:PutParameter", "ssm:DeleteParameter"]));
        assert_eq!(
            statement["Resource"][0],
            json!({ "Fn::Sub": "arn:${AWS::Partition}:ssm:us-east-1:${AWS::AccountId}:parameter/webapp/dev/alb-hostname" }),
        );
        let logs = stack.get("SyncSsmParamsLogGroup").unwrap();
        assert_eq!(logs.properties["RetentionInDays"], 7);
    }
}
