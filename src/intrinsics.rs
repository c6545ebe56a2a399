//! CloudFormation intrinsic functions, pseudo parameters, and
//! dynamic references, expressed as json values that can be
//! dropped into resource properties.

use serde_json::{json, Value};

pub const ACCOUNT_ID: &str = "AWS::AccountId";
pub const REGION: &str = "AWS::Region";
pub const PARTITION: &str = "AWS::Partition";

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Sub": "arn:aws:s3:::${Bucket}/*" }`
pub fn sub(template: impl Into<String>) -> Value {
    json!({ "Fn::Sub": template.into() })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index.to_string(), list] })
}

pub fn split(delimiter: &str, source: Value) -> Value {
    json!({ "Fn::Split": [delimiter, source] })
}

pub fn import_value(export_name: Value) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// import an export of another stack by its literal name.
pub fn import(export_name: &str) -> Value {
    import_value(Value::String(export_name.to_string()))
}

/// import a comma joined list that another stack exported.
pub fn import_list(export_name: &str) -> Value {
    split(",", import(export_name))
}

pub fn base64(value: Value) -> Value {
    json!({ "Fn::Base64": value })
}

/// the availability zones of the stack's region.
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// the nth availability zone of the stack's region.
pub fn az(index: usize) -> Value {
    select(index, get_azs())
}

/// `{{resolve:secretsmanager:<secret>:SecretString:<key>}}`, with
/// `secret` being a literal arn/name or an intrinsic that evaluates to one.
pub fn resolve_secret_json_key(secret: Value, key: &str) -> Value {
    join("", vec![
        Value::String("{{resolve:secretsmanager:".to_string()),
        secret,
        Value::String(format!(":SecretString:{key}}}}}")),
    ])
}

pub fn tags(tags: &[(&str, Value)]) -> Value {
    Value::Array(tags.iter().map(|(k, v)| json!({ "Key": k, "Value": v })).collect())
}

/// a single IAM policy statement.
#[derive(Debug, Clone)]
pub struct Statement {
    pub effect: &'static str,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub condition: Option<Value>,
}

impl Statement {
    pub fn allow<S: AsRef<str>>(actions: &[S], resources: Vec<Value>) -> Self {
        Self {
            effect: "Allow",
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resources,
            condition: None,
        }
    }

    pub fn deny<S: AsRef<str>>(actions: &[S], resources: Vec<Value>) -> Self {
        Self { effect: "Deny", ..Self::allow(actions, resources) }
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut out = json!({
            "Effect": self.effect,
            "Action": self.actions,
            "Resource": self.resources,
        });
        if let (Some(condition), Some(map)) = (&self.condition, out.as_object_mut()) {
            map.insert("Condition".to_string(), condition.clone());
        }
        out
    }
}

pub fn create_policy_doc(statements: &[Statement]) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": statements.iter().map(Statement::to_value).collect::<Vec<_>>(),
    })
}

/// trust policy letting `service` (eg: `lambda.amazonaws.com`) assume a role.
pub fn create_assume_role_policy_doc(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

pub fn managed_policy_arn(name: &str) -> Value {
    sub(format!("arn:${{{PARTITION}}}:iam::aws:policy/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_reference_wraps_the_arn() {
        let v = resolve_secret_json_key(get_ref("Secret"), "cloudfront_secret");
        assert_eq!(v, json!({ "Fn::Join": ["", [
            "{{resolve:secretsmanager:",
            { "Ref": "Secret" },
            ":SecretString:cloudfront_secret}}",
        ]]}));
    }

    #[test]
    fn statement_with_condition() {
        let s = Statement::deny(&["elasticfilesystem:ClientWrite"], vec![json!("*")])
            .with_condition(json!({ "Bool": { "elasticfilesystem:AccessedViaMountTarget": "true" } }));
        let v = s.to_value();
        assert_eq!(v["Effect"], "Deny");
        assert_eq!(v["Condition"]["Bool"]["elasticfilesystem:AccessedViaMountTarget"], "true");
    }

    #[test]
    fn managed_policies_are_partition_aware() {
        assert_eq!(
            managed_policy_arn("AmazonSSMManagedInstanceCore"),
            json!({ "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/AmazonSSMManagedInstanceCore" }),
        );
    }
}
