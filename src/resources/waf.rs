use super::*;

fn visibility(metric_name: &str) -> Value {
    json!({
        "SampledRequestsEnabled": true,
        "CloudWatchMetricsEnabled": true,
        "MetricName": metric_name,
    })
}

/// a web ACL that can be attached to a CloudFront distribution.
/// Must be deployed in us-east-1.
#[derive(Debug, Clone, Default)]
pub struct WebAcl {
    /// names of AWS managed rule groups, eg: `AWSManagedRulesCommonRuleSet`.
    /// each becomes a rule named `AWS-<name>`, in order, starting at priority 1.
    pub managed_rules: Vec<String>,
    /// when set, requests from the ip set are allowed and everything
    /// else is blocked. Otherwise requests that no rule blocks are allowed.
    pub permitted_ip_set_arn: Option<Value>,
}

impl WebAcl {
    pub fn rules(&self) -> Vec<Value> {
        let mut rules: Vec<Value> = self.managed_rules.iter().enumerate()
            .map(|(i, rule)| {
                let name = format!("AWS-{rule}");
                json!({
                    "Name": name,
                    "Priority": i + 1,
                    "Statement": {
                        "ManagedRuleGroupStatement": { "VendorName": "AWS", "Name": rule },
                    },
                    "OverrideAction": { "None": {} },
                    "VisibilityConfig": visibility(&name),
                })
            })
            .collect();
        if let Some(arn) = &self.permitted_ip_set_arn {
            rules.push(json!({
                "Name": "Permitted-IPs",
                "Priority": self.managed_rules.len() + 1,
                "Action": { "Allow": {} },
                "Statement": { "IPSetReferenceStatement": { "Arn": arn } },
                "VisibilityConfig": visibility("allow-permitted-ips"),
            }));
        }
        rules
    }
}

impl CfnResource for WebAcl {
    fn type_string(&self) -> &'static str {
        "AWS::WAFv2::WebACL"
    }

    fn properties(&self) -> Value {
        let default_action = if self.permitted_ip_set_arn.is_some() {
            json!({ "Block": {} })
        } else {
            json!({ "Allow": {} })
        };
        json!({
            "Scope": "CLOUDFRONT",
            "DefaultAction": default_action,
            "VisibilityConfig": visibility("WAF"),
            "Rules": self.rules(),
        })
    }

    fn validate(&self) -> Result<(), String> {
        for rule in self.managed_rules.iter() {
            if rule.is_empty() || !rule.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(format!("Invalid managed rule group name {:?}", rule));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpSet {
    /// ipv4 cidrs, eg: `192.0.2.0/24`
    pub addresses: Vec<String>,
}

impl CfnResource for IpSet {
    fn type_string(&self) -> &'static str {
        "AWS::WAFv2::IPSet"
    }

    fn properties(&self) -> Value {
        json!({
            "Addresses": self.addresses,
            "IPAddressVersion": "IPV4",
            "Scope": "CLOUDFRONT",
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.addresses.is_empty() {
            return Err("IP set must contain at least 1 address".to_string());
        }
        for address in self.addresses.iter() {
            if !address.contains('/') {
                return Err(format!("Invalid IP set address {:?}\nMust be in CIDR notation, eg: 192.0.2.44/32", address));
            }
        }
        Ok(())
    }
}
