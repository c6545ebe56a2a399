use super::*;

/// An ACM certificate validated through DNS. This only works if the
/// domain is hosted in a Route 53 zone of the deploying account, as the
/// validation records are created in `hosted_zone_id`.
#[derive(Debug, Clone, Default)]
pub struct Certificate {
    /// the domain you're requesting a certificate for. Must be fully qualified. Can have 1 optional wildcard.
    /// Examples of valid values:
    /// - www.mysite.com
    /// - multiple.sub.domains.mysite.com
    /// - mysite.com
    /// - *.mysite.com
    /// Examples of invalid values:
    /// - *.something.*.mysite.com
    /// - cannotendwithdot.com.
    pub domain_name: String,

    /// The hosted zone ID of where your domain is hosted in Route53.
    /// Must be provided as the actual ID without the `/hostedzone/` prefix.
    pub hosted_zone_id: String,
}

impl CfnResource for Certificate {
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }

    fn properties(&self) -> Value {
        json!({
            "DomainName": self.domain_name,
            "ValidationMethod": "DNS",
            "DomainValidationOptions": [{
                "DomainName": self.domain_name,
                "HostedZoneId": self.hosted_zone_id,
            }],
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.domain_name.is_empty() {
            return Err("Must provide a domain name".to_string());
        }
        if self.hosted_zone_id.is_empty() {
            return Err("Must provide the hosted zone ID of where your domain resides".to_string());
        }
        if self.hosted_zone_id.starts_with("/hostedzone/") {
            return Err(format!("Hosted zone ID {} must not include the /hostedzone/ prefix", self.hosted_zone_id));
        }
        if self.domain_name.ends_with('.') {
            return Err(format!("Domain name must not end with a dot. {} is invalid.", self.domain_name));
        }
        if self.domain_name.contains('*') {
            if self.domain_name.matches('*').count() > 1 {
                return Err(format!("Must only provide 1 wildcard. {} is invalid.", self.domain_name));
            }
            if !self.domain_name.starts_with('*') {
                return Err(format!("If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\". {} is invalid.", self.domain_name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(domain: &str) -> Certificate {
        Certificate { domain_name: domain.into(), hosted_zone_id: "Z123".into() }
    }

    #[test]
    fn wildcards_must_lead() {
        assert!(cert("*.example.com").validate().is_ok());
        assert!(cert("www.*.example.com").validate().is_err());
        assert!(cert("*.something.*.example.com").validate().is_err());
    }

    #[test]
    fn trailing_dot_is_invalid() {
        assert!(cert("cannotendwithdot.com.").validate().is_err());
    }

    #[test]
    fn validation_records_go_in_the_zone() {
        let props = cert("www.example.com").properties();
        assert_eq!(props["ValidationMethod"], "DNS");
        assert_eq!(props["DomainValidationOptions"][0]["HostedZoneId"], "Z123");
    }
}
