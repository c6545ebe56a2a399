use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOwnership {
    BucketOwnerEnforced,
    /// required for buckets that receive CloudFront standard logs,
    /// as those are delivered with ACLs.
    BucketOwnerPreferred,
    ObjectWriter,
}

impl ObjectOwnership {
    fn as_str(&self) -> &'static str {
        match self {
            ObjectOwnership::BucketOwnerEnforced => "BucketOwnerEnforced",
            ObjectOwnership::BucketOwnerPreferred => "BucketOwnerPreferred",
            ObjectOwnership::ObjectWriter => "ObjectWriter",
        }
    }
}

/// a private, encrypted bucket. We make no customization of the name,
/// cloudformation creates it based on the logical resource name.
#[derive(Debug, Clone)]
pub struct S3Bucket {
    pub object_ownership: ObjectOwnership,
    /// server side encryption with S3 managed keys.
    pub sse_s3: bool,
    pub block_public_access: bool,
}

impl Default for S3Bucket {
    fn default() -> Self {
        Self {
            object_ownership: ObjectOwnership::BucketOwnerEnforced,
            sse_s3: true,
            block_public_access: true,
        }
    }
}

impl S3Bucket {
    pub fn for_cloudfront_logs() -> Self {
        Self { object_ownership: ObjectOwnership::BucketOwnerPreferred, ..Default::default() }
    }
}

impl CfnResource for S3Bucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "OwnershipControls": {
                "Rules": [{ "ObjectOwnership": self.object_ownership.as_str() }],
            },
        });
        if self.object_ownership == ObjectOwnership::BucketOwnerPreferred {
            props["AccessControl"] = json!("BucketOwnerFullControl");
        }
        if self.sse_s3 {
            props["BucketEncryption"] = json!({
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" },
                }],
            });
        }
        if self.block_public_access {
            props["PublicAccessBlockConfiguration"] = json!({
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            });
        }
        props
    }
}

/// denies every request to the bucket that isn't made over TLS.
#[derive(Debug, Clone)]
pub struct EnforceSslPolicy {
    pub bucket_logical_id: String,
}

impl CfnResource for EnforceSslPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    fn properties(&self) -> Value {
        let bucket_arn = get_att(&self.bucket_logical_id, "Arn");
        let objects = join("", vec![bucket_arn.clone(), json!("/*")]);
        let statement = json!({
            "Effect": "Deny",
            "Principal": { "AWS": "*" },
            "Action": "s3:*",
            "Resource": [bucket_arn, objects],
            "Condition": { "Bool": { "aws:SecureTransport": "false" } },
        });
        json!({
            "Bucket": get_ref(&self.bucket_logical_id),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [statement],
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.bucket_logical_id.is_empty() {
            return Err("Bucket policy must reference a bucket".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_bucket_accepts_acls() {
        let props = S3Bucket::for_cloudfront_logs().properties();
        assert_eq!(props["OwnershipControls"]["Rules"][0]["ObjectOwnership"], "BucketOwnerPreferred");
        assert_eq!(props["AccessControl"], "BucketOwnerFullControl");
        assert_eq!(props["PublicAccessBlockConfiguration"]["BlockPublicPolicy"], true);
        assert_eq!(props["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"]["SSEAlgorithm"], "AES256");
    }

    #[test]
    fn ssl_policy_covers_bucket_and_objects() {
        let policy = EnforceSslPolicy { bucket_logical_id: "LogBucket".into() };
        let props = policy.properties();
        let statement = &props["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Effect"], "Deny");
        assert_eq!(statement["Resource"].as_array().map(|r| r.len()), Some(2));
        assert_eq!(statement["Condition"]["Bool"]["aws:SecureTransport"], "false");
    }
}
