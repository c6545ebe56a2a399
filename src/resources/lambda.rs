use std::collections::BTreeMap;

use super::*;

/// a lambda function running a `bootstrap` binary built for arm64.
/// the code is read from an S3 object that was uploaded before the
/// stack is deployed.
#[derive(Debug, Clone)]
pub struct Function {
    pub description: String,
    pub code_bucket: Value,
    pub code_key: Value,
    pub role_arn: Value,
    /// memory to give your function (in MB). Defaults to 128.
    /// Must be between 128 and 10240.
    pub memory_size: u64,
    /// timeout of your function (in seconds). Defaults to 30.
    /// Must be between 1 and 900.
    pub timeout: u32,
    pub environment: BTreeMap<String, Value>,
}

impl Function {
    pub fn new(code_bucket: Value, code_key: Value, role_arn: Value) -> Self {
        Self {
            description: String::new(),
            code_bucket,
            code_key,
            role_arn,
            memory_size: 128,
            timeout: 30,
            environment: BTreeMap::new(),
        }
    }
}

impl CfnResource for Function {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "Runtime": "provided.al2023",
            "Handler": "bootstrap",
            "Architectures": ["arm64"],
            "Code": {
                "S3Bucket": self.code_bucket,
                "S3Key": self.code_key,
            },
            "MemorySize": self.memory_size,
            "Timeout": self.timeout,
            "Role": self.role_arn,
        });
        if !self.description.is_empty() {
            props["Description"] = json!(self.description);
        }
        if !self.environment.is_empty() {
            props["Environment"] = json!({ "Variables": self.environment });
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        if self.memory_size < 128 || self.memory_size > 10240 {
            return Err(format!("Invalid memory size {:?}\nMust be between 128 and 10240", self.memory_size));
        }
        if self.timeout < 1 || self.timeout > 900 {
            return Err(format!("Invalid timeout {:?}\nMust be between 1 and 900", self.timeout));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function() -> Function {
        Function::new(get_ref("ArtifactBucket"), get_ref("ArtifactKey"), get_att("Role", "Arn"))
    }

    #[test]
    fn defaults_are_valid() {
        let f = function();
        assert!(f.validate().is_ok());
        let props = f.properties();
        assert_eq!(props["Handler"], "bootstrap");
        assert_eq!(props["Code"]["S3Key"]["Ref"], "ArtifactKey");
        assert!(props.get("Environment").is_none());
    }

    #[test]
    fn limits_are_enforced() {
        let mut f = function();
        f.memory_size = 64;
        assert!(f.validate().is_err());
        let mut f = function();
        f.timeout = 901;
        assert!(f.validate().is_err());
    }
}
