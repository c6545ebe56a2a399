use super::*;

#[derive(Debug, Clone, Default)]
pub struct Role {
    /// eg: `ec2.amazonaws.com`
    pub assumed_by: String,
    pub managed_policy_arns: Vec<Value>,
    /// inline policies, by name.
    pub policies: Vec<(String, Vec<Statement>)>,
}

impl Role {
    pub fn for_service(service: &str) -> Self {
        Self { assumed_by: service.to_string(), ..Default::default() }
    }

    pub fn with_managed_policy(mut self, arn: Value) -> Self {
        self.managed_policy_arns.push(arn);
        self
    }

    pub fn with_policy(mut self, name: &str, statements: Vec<Statement>) -> Self {
        self.policies.push((name.to_string(), statements));
        self
    }
}

impl CfnResource for Role {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "AssumeRolePolicyDocument": create_assume_role_policy_doc(&self.assumed_by),
        });
        if !self.managed_policy_arns.is_empty() {
            props["ManagedPolicyArns"] = Value::Array(self.managed_policy_arns.clone());
        }
        if !self.policies.is_empty() {
            props["Policies"] = self.policies.iter()
                .map(|(name, statements)| json!({
                    "PolicyName": name,
                    "PolicyDocument": create_policy_doc(statements),
                }))
                .collect();
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        if !self.assumed_by.ends_with(".amazonaws.com") {
            return Err(format!("Invalid service principal {:?}\nMust be a service, eg: lambda.amazonaws.com", self.assumed_by));
        }
        for (name, statements) in self.policies.iter() {
            if statements.is_empty() {
                return Err(format!("Inline policy {name} must have at least 1 statement"));
            }
        }
        Ok(())
    }
}

/// a customer managed policy attached to `roles`.
#[derive(Debug, Clone, Default)]
pub struct ManagedPolicy {
    pub statements: Vec<Statement>,
    pub roles: Vec<Value>,
}

impl CfnResource for ManagedPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::ManagedPolicy"
    }

    fn properties(&self) -> Value {
        json!({
            "PolicyDocument": create_policy_doc(&self.statements),
            "Roles": self.roles,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.statements.is_empty() {
            return Err("Managed policy must have at least 1 statement".to_string());
        }
        if self.roles.is_empty() {
            return Err("Managed policy must be attached to at least 1 role".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InstanceProfile {
    pub role: Value,
}

impl CfnResource for InstanceProfile {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::InstanceProfile"
    }

    fn properties(&self) -> Value {
        json!({ "Roles": [self.role] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_with_inline_policy() {
        let role = Role::for_service("lambda.amazonaws.com")
            .with_managed_policy(managed_policy_arn("service-role/AWSLambdaBasicExecutionRole"))
            .with_policy("sync", vec![Statement::allow(&["ssm:PutParameter"], vec![json!("*")])]);
        assert!(role.validate().is_ok());
        let props = role.properties();
        assert_eq!(props["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"], "lambda.amazonaws.com");
        assert_eq!(props["Policies"][0]["PolicyName"], "sync");
        assert_eq!(props["Policies"][0]["PolicyDocument"]["Statement"][0]["Action"][0], "ssm:PutParameter");
    }

    #[test]
    fn principal_must_be_a_service() {
        assert!(Role::for_service("lambda").validate().is_err());
    }

    #[test]
    fn managed_policy_needs_statements() {
        let policy = ManagedPolicy { statements: vec![], roles: vec![get_ref("Role")] };
        assert!(policy.validate().is_err());
    }
}
