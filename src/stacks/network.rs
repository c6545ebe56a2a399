//! VPC, subnets, routing, security groups and the interface endpoints
//! instances need to reach Systems Manager without a public ip.

use serde_json::{json, Value};

use crate::error::Result;
use crate::params::{capitalize, AppParams, StackKind};
use crate::resources::*;
use crate::template::Stack;

use super::new_stack;

pub const EXPORT_VPC_ID: &str = "VpcId";
pub const EXPORT_VPC_CIDR: &str = "VpcCidr";
pub const EXPORT_ISOLATED_SUBNETS: &str = "IsolatedSubnetIds";
pub const EXPORT_PRIVATE_SUBNETS: &str = "PrivateSubnetIds";
pub const EXPORT_PUBLIC_SUBNETS: &str = "PublicSubnetIds";
pub const EXPORT_DB_SECURITY_GROUP: &str = "RdsSecGroupId";
pub const EXPORT_INSTANCE_SECURITY_GROUP: &str = "InstanceSecGroupId";
pub const EXPORT_ALB_SECURITY_GROUP: &str = "AlbSecGroupId";

pub const INTERFACE_ENDPOINTS: &[(&str, &str)] = &[
    ("SecretsManagerVpcEndpoint", "secretsmanager"),
    ("SsmVpcEndpoint", "ssm"),
    ("Ec2MessagesVpcEndpoint", "ec2messages"),
    ("SsmMessagesVpcEndpoint", "ssmmessages"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetGroup {
    /// no route out of the vpc. Holds the database.
    Isolated,
    /// egress through a NAT gateway. Holds the instances and file system.
    Private,
    /// routed to the internet gateway. Holds the load balancer and NAT gateways.
    Public,
}

impl SubnetGroup {
    pub const ALL: [SubnetGroup; 3] = [SubnetGroup::Isolated, SubnetGroup::Private, SubnetGroup::Public];

    pub fn name(&self) -> &'static str {
        match self {
            SubnetGroup::Isolated => "Isolated",
            SubnetGroup::Private => "Private",
            SubnetGroup::Public => "Public",
        }
    }

    pub fn subnet_id(&self, az: usize) -> String {
        format!("{}Subnet{}", self.name(), az + 1)
    }

    fn route_table_id(&self, az: usize) -> String {
        format!("{}RouteTable{}", self.name(), az + 1)
    }
}

pub fn nat_gateway_id(index: usize) -> String {
    format!("NatGateway{}", index + 1)
}

/// the NAT gateway the private subnet of `az` routes through. AZs past
/// the last gateway share the first one.
pub fn nat_for_az(az: usize, nat_gateway_count: usize) -> usize {
    if az < nat_gateway_count { az } else { 0 }
}

pub fn define(params: &AppParams) -> Result<Stack> {
    let config = &params.config;
    let mut stack = new_stack(params, StackKind::Network, params.region(), "network")?;
    let prefix = params.logical_prefix();
    let vpc_id = format!("{prefix}Vpc");
    let azs = config.max_azs as usize;
    let nat_count = config.nat_gateway_count as usize;
    let vpc = get_ref(&vpc_id);
    let stack_name = stack.name.clone();

    // the tag lets the vpc be found by the name of the stack that created it
    stack.resource(&vpc_id, "AWS::EC2::VPC", json!({
        "CidrBlock": params.vpc_cidr.to_string(),
        "EnableDnsHostnames": true,
        "EnableDnsSupport": true,
        "InstanceTenancy": "default",
        "Tags": tags(&[
            ("Name", json!(stack_name)),
            (stack_name.as_str(), json!("vpc")),
        ]),
    }))?;

    stack.resource("InternetGateway", "AWS::EC2::InternetGateway", json!({}))?;
    stack.resource("VpcGatewayAttachment", "AWS::EC2::VPCGatewayAttachment", json!({
        "VpcId": vpc,
        "InternetGatewayId": get_ref("InternetGateway"),
    }))?;

    let cidrs = params.vpc_cidr.split(SubnetGroup::ALL.len() * azs)?;
    for (group_index, group) in SubnetGroup::ALL.iter().enumerate() {
        for az_index in 0..azs {
            let cidr = cidrs[group_index * azs + az_index];
            let subnet_id = group.subnet_id(az_index);
            let route_table_id = group.route_table_id(az_index);
            stack.resource(&subnet_id, "AWS::EC2::Subnet", json!({
                "VpcId": vpc,
                "AvailabilityZone": az(az_index),
                "CidrBlock": cidr.to_string(),
                "MapPublicIpOnLaunch": *group == SubnetGroup::Public,
                "Tags": tags(&[
                    ("Name", json!(format!("{stack_name}/{subnet_id}"))),
                    ("subnet-type", json!(group.name())),
                ]),
            }))?;
            stack.resource(&route_table_id, "AWS::EC2::RouteTable", json!({ "VpcId": vpc }))?;
            stack.resource(&format!("{subnet_id}RouteTableAssociation"), "AWS::EC2::SubnetRouteTableAssociation", json!({
                "SubnetId": get_ref(&subnet_id),
                "RouteTableId": get_ref(&route_table_id),
            }))?;

            match group {
                SubnetGroup::Isolated => {}
                SubnetGroup::Public => {
                    stack.resource(&format!("{subnet_id}DefaultRoute"), "AWS::EC2::Route", json!({
                        "RouteTableId": get_ref(&route_table_id),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": get_ref("InternetGateway"),
                    }))?.depends_on("VpcGatewayAttachment");
                }
                SubnetGroup::Private => {
                    stack.resource(&format!("{subnet_id}DefaultRoute"), "AWS::EC2::Route", json!({
                        "RouteTableId": get_ref(&route_table_id),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "NatGatewayId": get_ref(&nat_gateway_id(nat_for_az(az_index, nat_count))),
                    }))?;
                }
            }
        }
    }

    for nat_index in 0..nat_count {
        let eip_id = format!("NatEip{}", nat_index + 1);
        stack.resource(&eip_id, "AWS::EC2::EIP", json!({ "Domain": "vpc" }))?
            .depends_on("VpcGatewayAttachment");
        stack.resource(&nat_gateway_id(nat_index), "AWS::EC2::NatGateway", json!({
            "AllocationId": get_att(&eip_id, "AllocationId"),
            "SubnetId": get_ref(&SubnetGroup::Public.subnet_id(nat_index)),
        }))?;
    }

    define_flow_logs(&mut stack, params, &vpc)?;
    define_security_groups(&mut stack, params, &vpc_id)?;

    for (logical_id, service) in INTERFACE_ENDPOINTS {
        stack.resource(logical_id, "AWS::EC2::VPCEndpoint", json!({
            "VpcId": vpc,
            "VpcEndpointType": "Interface",
            "ServiceName": sub(format!("com.amazonaws.${{{REGION}}}.{service}")),
            "PrivateDnsEnabled": true,
            "SubnetIds": subnet_refs(SubnetGroup::Private, azs),
            "SecurityGroupIds": [get_att("SsmSecurityGroup", "GroupId")],
        }))?;
    }

    stack.export(EXPORT_VPC_ID, "id of the vpc", vpc.clone())?;
    stack.export(EXPORT_VPC_CIDR, "cidr block of the vpc", get_att(&vpc_id, "CidrBlock"))?;
    for (suffix, group) in [
        (EXPORT_ISOLATED_SUBNETS, SubnetGroup::Isolated),
        (EXPORT_PRIVATE_SUBNETS, SubnetGroup::Private),
        (EXPORT_PUBLIC_SUBNETS, SubnetGroup::Public),
    ] {
        let description = format!("comma separated ids of the {} subnets", group.name().to_lowercase());
        stack.export(suffix, &description, join(",", subnet_refs(group, azs)))?;
    }
    stack.export(EXPORT_DB_SECURITY_GROUP, "security group of the database", get_att("RdsSecurityGroup", "GroupId"))?;
    stack.export(EXPORT_INSTANCE_SECURITY_GROUP, "security group of the instances", get_att("InstanceSecurityGroup", "GroupId"))?;
    stack.export(EXPORT_ALB_SECURITY_GROUP, "security group of the load balancer", get_att("AlbSecurityGroup", "GroupId"))?;
    Ok(stack)
}

fn subnet_refs(group: SubnetGroup, azs: usize) -> Vec<Value> {
    (0..azs).map(|i| get_ref(&group.subnet_id(i))).collect()
}

fn define_flow_logs(stack: &mut Stack, params: &AppParams, vpc: &Value) -> Result<()> {
    let env = capitalize(params.environment());
    let log_group_id = format!("VpcFlowLogsLogGroup{env}");
    stack.add(&log_group_id, LogGroup { name: None, retention_days: Some(731) })?;
    let role = Role::for_service("vpc-flow-logs.amazonaws.com")
        .with_policy("flow-logs", vec![
            Statement::allow(
                &["logs:CreateLogStream", "logs:PutLogEvents", "logs:DescribeLogStreams"],
                vec![get_att(&log_group_id, "Arn")],
            ),
        ]);
    stack.add("VpcFlowLogsRole", role)?;
    stack.resource(&format!("VpcFlowLogs{env}"), "AWS::EC2::FlowLog", json!({
        "ResourceId": vpc,
        "ResourceType": "VPC",
        "TrafficType": "ALL",
        "LogDestinationType": "cloud-watch-logs",
        "LogGroupName": get_ref(&log_group_id),
        "DeliverLogsPermissionArn": get_att("VpcFlowLogsRole", "Arn"),
    }))?;
    Ok(())
}

fn define_security_groups(stack: &mut Stack, params: &AppParams, vpc_id: &str) -> Result<()> {
    let config = &params.config;
    let vpc = get_ref(vpc_id);
    for (logical_id, description, allow_all_outbound) in [
        ("RdsSecurityGroup", "RDS SG", false),
        ("InstanceSecurityGroup", "Instance SG", false),
        ("AlbSecurityGroup", "ALB SG", true),
        ("SsmSecurityGroup", "SSM SG", true),
    ] {
        stack.add(logical_id, SecurityGroup {
            description: description.to_string(),
            vpc_id: vpc.clone(),
            allow_all_outbound,
        })?;
    }
    let group = |id: &str| get_att(id, "GroupId");
    let db_port = config.db_engine.port();

    let rules = [
        ("RdsFromInstances", SecurityGroupRule::ingress(
            group("RdsSecurityGroup"), Peer::SecurityGroup(group("InstanceSecurityGroup")), db_port, "Instances to database")),
        ("InstancesToRds", SecurityGroupRule::egress(
            group("InstanceSecurityGroup"), Peer::SecurityGroup(group("RdsSecurityGroup")), db_port, "Instances to database")),
        ("InstancesFromAlb", SecurityGroupRule::ingress(
            group("InstanceSecurityGroup"), Peer::SecurityGroup(group("AlbSecurityGroup")), config.target_port, "ALB to Instances")),
        ("AlbFromCloudFront", SecurityGroupRule::ingress(
            group("AlbSecurityGroup"), Peer::PrefixList(json!(params.cloudfront_prefix_list)), 443, "CloudFront on port 443")),
        ("SsmFromVpc", SecurityGroupRule::ingress(
            group("SsmSecurityGroup"), Peer::Cidr(get_att(vpc_id, "CidrBlock")), 443, "VPC CIDR on port 443")),
        ("InstancesFromSsm", SecurityGroupRule::ingress(
            group("InstanceSecurityGroup"), Peer::SecurityGroup(group("SsmSecurityGroup")), 443, "Allow SSM to Instances")),
        ("InstancesOutbound443", SecurityGroupRule::egress(
            group("InstanceSecurityGroup"), Peer::any_ipv4(), 443, "Allow any outbound 443")),
        ("InstancesOutbound80", SecurityGroupRule::egress(
            group("InstanceSecurityGroup"), Peer::any_ipv4(), 80, "Allow any outbound 80")),
    ];
    for (logical_id, rule) in rules {
        stack.add(logical_id, rule)?;
    }
    Ok(())
}
