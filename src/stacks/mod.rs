//! The four stacks of a deployment. Network, database and compute live
//! in the deployment region, the CDN stack lives in the global region.

use serde_json::Value;

use crate::params::{AppParams, StackKind};
use crate::template::{export_name, Stack};
use crate::error::Result;
use crate::intrinsics::{import, import_list};

pub mod cdn;
pub mod compute;
pub mod database;
pub mod network;

/// a new stack for `kind`, already carrying the deployment's tags.
pub(crate) fn new_stack(params: &AppParams, kind: StackKind, region: &str, description: &str) -> Result<Stack> {
    let mut stack = Stack::new(&params.stack_name(kind), region)?
        .with_description(format!("{} ({} {})", description, params.app_name(), params.environment()));
    stack.tags = params.config.tags.clone();
    Ok(stack)
}

/// how other stacks refer to what the network stack exports.
#[derive(Debug, Clone)]
pub struct NetworkImports {
    stack_name: String,
}

impl NetworkImports {
    pub fn new(params: &AppParams) -> Self {
        Self { stack_name: params.stack_name(StackKind::Network) }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn value(&self, suffix: &str) -> Value {
        import(&export_name(&self.stack_name, suffix))
    }

    fn list(&self, suffix: &str) -> Value {
        import_list(&export_name(&self.stack_name, suffix))
    }

    pub fn vpc_id(&self) -> Value {
        self.value(network::EXPORT_VPC_ID)
    }

    pub fn isolated_subnet_ids(&self) -> Value {
        self.list(network::EXPORT_ISOLATED_SUBNETS)
    }

    pub fn private_subnet_ids(&self) -> Value {
        self.list(network::EXPORT_PRIVATE_SUBNETS)
    }

    pub fn public_subnet_ids(&self) -> Value {
        self.list(network::EXPORT_PUBLIC_SUBNETS)
    }

    pub fn db_security_group_id(&self) -> Value {
        self.value(network::EXPORT_DB_SECURITY_GROUP)
    }

    pub fn instance_security_group_id(&self) -> Value {
        self.value(network::EXPORT_INSTANCE_SECURITY_GROUP)
    }

    pub fn alb_security_group_id(&self) -> Value {
        self.value(network::EXPORT_ALB_SECURITY_GROUP)
    }
}

/// `t4g.medium` -> `db.t4g.medium`
pub(crate) fn db_instance_class(instance_type: &str) -> String {
    if instance_type.starts_with("db.") {
        instance_type.to_string()
    } else {
        format!("db.{instance_type}")
    }
}
