use crate::error::{Error, Result};

/// CloudFront, its certificates, and WAF web ACLs with CLOUDFRONT scope
/// can only be managed from this region. The CDN stack is always
/// deployed here, and the compute stack hands its values off to the
/// parameter store of this region.
pub const GLOBAL_REGION: &str = "us-east-1";

pub const VALID_AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "ca-west-1",
    "eu-north-1",
    "eu-west-3",
    "eu-west-2",
    "eu-west-1",
    "eu-central-1",
    "eu-central-2",
    "eu-south-1",
    "eu-south-2",
    "ap-south-1",
    "ap-south-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-east-1",
    "sa-east-1",
    "me-south-1",
    "me-central-1",
    "il-central-1",
    "af-south-1",
];

pub fn is_valid_region(r: &str) -> bool {
    VALID_AWS_REGIONS.contains(&r)
}

pub fn verify_region(r: &str) -> Result<()> {
    if !is_valid_region(r) {
        return Err(Error::invalid_config(
            "awsRegion",
            format!("Invalid region code {:?}\nMust be one of {:?}", r, VALID_AWS_REGIONS),
        ));
    }
    Ok(())
}

/// a 12 digit numeric string.
pub fn verify_account(account: &str) -> Result<()> {
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::invalid_config(
            "awsAccount",
            format!("Invalid account id {:?}\nMust be a 12 digit number", account),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_region_is_valid() {
        assert!(is_valid_region(GLOBAL_REGION));
    }

    #[test]
    fn rejects_unknown_region() {
        let err = verify_region("mars-north-1").unwrap_err();
        assert!(err.to_string().contains("Invalid region code"));
    }

    #[test]
    fn account_must_be_twelve_digits() {
        assert!(verify_account("123456789012").is_ok());
        assert!(verify_account("12345678901").is_err());
        assert!(verify_account("12345678901a").is_err());
    }
}
