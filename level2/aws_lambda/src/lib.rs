//! Packaging of the parameter sync function. The `bootstrap` binary is
//! zipped, named after its checksum, and uploaded to the artifact bucket
//! so the compute stack can point its function at it.

use std::io::Write;
use std::path::{Path, PathBuf};

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use webtier::config::EnvironmentConfig;

pub const BOOTSTRAP: &str = "bootstrap";
pub const ARTIFACT_PREFIX: &str = "ssm-sync";

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to read {path:?}\n{source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to zip the bootstrap binary\n{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write zip\n{0}")]
    Write(#[from] std::io::Error),

    #[error("Cannot name an artifact bucket without an account, set awsAccount or artifactBucket")]
    NoAccount,

    #[error("S3 request for {what} failed\n{message}")]
    Aws { what: String, message: String },
}

pub type Result<T> = std::result::Result<T, PackageError>;

/// a zipped function, ready to upload.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: String,
    pub zip: Vec<u8>,
}

/// `ssm-sync_<adler32 of the binary>.zip`
pub fn artifact_key(binary: &[u8]) -> String {
    format!("{ARTIFACT_PREFIX}_{:08x}.zip", adler::adler32_slice(binary))
}

pub fn zip_bootstrap(binary: &[u8]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o755);
    writer.start_file(BOOTSTRAP, options)?;
    writer.write_all(binary)?;
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

pub fn package(bootstrap_path: &Path) -> Result<Artifact> {
    let binary = std::fs::read(bootstrap_path)
        .map_err(|source| PackageError::Io { path: bootstrap_path.to_path_buf(), source })?;
    let key = artifact_key(&binary);
    let zip = zip_bootstrap(&binary)?;
    tracing::debug!(key = %key, bytes = zip.len(), "packaged sync function");
    Ok(Artifact { key, zip })
}

/// the configured bucket, or one named after the account and region.
pub fn artifact_bucket_name(config: &EnvironmentConfig) -> Result<String> {
    if let Some(bucket) = &config.artifact_bucket {
        return Ok(bucket.clone());
    }
    if config.aws_account.is_empty() {
        return Err(PackageError::NoAccount);
    }
    Ok(format!("{}-artifacts-{}-{}", config.app_name, config.aws_account, config.aws_region))
}

fn aws_error(what: &str, e: impl std::fmt::Debug) -> PackageError {
    PackageError::Aws { what: what.to_string(), message: format!("{:#?}", e) }
}

pub async fn s3_client(region: &str) -> aws_sdk_s3::Client {
    let shared_config = aws_config::from_env()
        .region(aws_sdk_s3::config::Region::new(region.to_string()))
        .load()
        .await;
    aws_sdk_s3::Client::new(&shared_config)
}

pub async fn ensure_bucket(client: &aws_sdk_s3::Client, bucket: &str, region: &str) -> Result<()> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }
    tracing::info!(bucket, region, "Creating artifact bucket");
    let mut req = client.create_bucket().bucket(bucket);
    // us-east-1 is the default location and must not be given as a constraint
    if region != webtier::regions::GLOBAL_REGION {
        let conf = CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(region))
            .build();
        req = req.create_bucket_configuration(conf);
    }
    req.send().await.map_err(|e| aws_error(bucket, e))?;
    Ok(())
}

/// uploads `artifact` unless an object with its key already exists.
/// Returns whether it was uploaded.
pub async fn upload(client: &aws_sdk_s3::Client, bucket: &str, artifact: &Artifact) -> Result<bool> {
    let exists = client.head_object().bucket(bucket).key(&artifact.key).send().await.is_ok();
    if exists {
        tracing::info!(key = %artifact.key, "Artifact already uploaded");
        return Ok(false);
    }
    client.put_object()
        .bucket(bucket)
        .key(&artifact.key)
        .body(ByteStream::from(artifact.zip.clone()))
        .send()
        .await
        .map_err(|e| aws_error(&artifact.key, e))?;
    tracing::info!(bucket, key = %artifact.key, "Uploaded artifact");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn key_is_content_addressed() {
        let a = artifact_key(b"binary one");
        assert!(a.starts_with("ssm-sync_"));
        assert!(a.ends_with(".zip"));
        assert_eq!(a.len(), "ssm-sync_".len() + 8 + ".zip".len());
        assert_eq!(a, artifact_key(b"binary one"));
        assert_ne!(a, artifact_key(b"binary two"));
    }

    #[test]
    fn zip_holds_an_executable_bootstrap() {
        let zipped = zip_bootstrap(b"#!/bin/sh\necho hi\n").unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut file = archive.by_name(BOOTSTRAP).unwrap();
        assert_eq!(file.unix_mode().map(|m| m & 0o777), Some(0o755));
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "#!/bin/sh\necho hi\n");
    }

    #[test]
    fn package_reads_the_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BOOTSTRAP);
        std::fs::write(&path, b"elf").unwrap();
        let artifact = package(&path).unwrap();
        assert_eq!(artifact.key, artifact_key(b"elf"));

        let err = package(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, PackageError::Io { .. }));
    }

    #[test]
    fn bucket_name_needs_an_account() {
        let mut config = webtier_config();
        assert_eq!(artifact_bucket_name(&config).unwrap(), "webapp-artifacts-123456789012-eu-west-1");
        config.artifact_bucket = Some("my-bucket".into());
        assert_eq!(artifact_bucket_name(&config).unwrap(), "my-bucket");
        config.artifact_bucket = None;
        config.aws_account.clear();
        assert!(matches!(artifact_bucket_name(&config), Err(PackageError::NoAccount)));
    }

    fn webtier_config() -> EnvironmentConfig {
        let contents = r#"
[default]
env = "dev"
app = "webapp"

[webapp-dev]
awsRegion = "eu-west-1"
awsAccount = "123456789012"
hostedZone = "example.com"
vpcCidrBlock = "10.0.0.0/16"
amiParameter = "/aws/service/ami"
efsMountDir = "/mnt/efs"
targetPort = 80
minMaxAdminInstances = [1, 1]
minMaxFleetInstances = [1, 2]
adminInstanceType = "t4g.small"
fleetInstanceType = "t4g.small"
"#;
        webtier::config::ParametersFile::parse(contents).unwrap()
            .environment(&Default::default()).unwrap()
    }
}
