use super::*;

/// the zone id every CloudFront distribution's alias target lives in.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

#[derive(Debug, Clone)]
pub struct AliasRecord {
    /// fully qualified, eg: mysubdomain.mywebsite.com
    pub name: String,
    pub hosted_zone_id: String,
    pub record_type: &'static str,
    pub alias_target_dns_name: Value,
    pub alias_target_hosted_zone_id: String,
}

impl AliasRecord {
    /// an `A` record pointing `name` at a CloudFront distribution.
    pub fn to_cloudfront(name: &str, hosted_zone_id: &str, distribution_domain: Value) -> Self {
        Self {
            name: name.to_string(),
            hosted_zone_id: hosted_zone_id.to_string(),
            record_type: "A",
            alias_target_dns_name: distribution_domain,
            alias_target_hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.to_string(),
        }
    }
}

impl CfnResource for AliasRecord {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }

    fn properties(&self) -> Value {
        json!({
            "Name": self.name,
            "Type": self.record_type,
            "HostedZoneId": self.hosted_zone_id,
            "AliasTarget": {
                "DNSName": self.alias_target_dns_name,
                "HostedZoneId": self.alias_target_hosted_zone_id,
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Route53 record must have a name. Example mysubdomain.mywebsite.com".to_string());
        }
        if !self.name.contains('.') {
            return Err(format!("Invalid name {:?} for route53 record set. Must be a domain", self.name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloudfront_alias() {
        let record = AliasRecord::to_cloudfront("www.example.com", "Z123", get_att("Dist", "DomainName"));
        assert!(record.validate().is_ok());
        let props = record.properties();
        assert_eq!(props["Type"], "A");
        assert_eq!(props["AliasTarget"]["HostedZoneId"], "Z2FDTNDATAQYW2");
        assert_eq!(props["AliasTarget"]["DNSName"]["Fn::GetAtt"][0], "Dist");
    }

    #[test]
    fn name_must_be_a_domain() {
        let record = AliasRecord::to_cloudfront("localhost", "Z123", json!("d.cloudfront.net"));
        assert!(record.validate().is_err());
    }
}
