use super::*;

/// retention values cloudwatch accepts, in days.
pub const VALID_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922, 3288, 3653,
];

#[derive(Debug, Clone, Default)]
pub struct LogGroup {
    /// left to cloudformation when not set.
    pub name: Option<Value>,
    /// `None` keeps the logs forever.
    pub retention_days: Option<u32>,
}

impl CfnResource for LogGroup {
    fn type_string(&self) -> &'static str {
        "AWS::Logs::LogGroup"
    }

    fn properties(&self) -> Value {
        let mut props = json!({});
        if let Some(name) = &self.name {
            props["LogGroupName"] = name.clone();
        }
        if let Some(days) = self.retention_days {
            props["RetentionInDays"] = json!(days);
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        match self.retention_days {
            Some(days) if !VALID_RETENTION_DAYS.contains(&days) => {
                Err(format!("Invalid log retention {days}\nMust be one of {:?}", VALID_RETENTION_DAYS))
            }
            _ => Ok(()),
        }
    }
}
