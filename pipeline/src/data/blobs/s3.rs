//! S3 blob storage
//!
//! Stores document text in AWS S3 or an S3-compatible service (MinIO).
//! Keys are `{prefix}/{doc-id}.{ext}`; locations are `s3://bucket/key`.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use super::error::BlobError;
use super::BlobStorage;

/// S3-backed blob storage.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage with the given configuration.
    pub async fn new(
        bucket: String,
        prefix: String,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self, BlobError> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            config_loader = config_loader.region(aws_sdk_s3::config::Region::new(region));
        }

        let config = config_loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint_url) = endpoint {
            // Path style is required for most S3-compatible services
            s3_config = s3_config.endpoint_url(endpoint_url).force_path_style(true);
        }

        let client = Client::from_conf(s3_config.build());

        tracing::debug!(
            bucket = %bucket,
            prefix = %prefix,
            "S3 blob storage initialized"
        );

        Ok(Self {
            client,
            bucket,
            prefix,
        })
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }

    fn parse_location<'a>(&self, location: &'a str) -> Result<(&'a str, &'a str), BlobError> {
        let rest = location
            .strip_prefix("s3://")
            .ok_or_else(|| BlobError::InvalidLocation(location.to_string()))?;
        rest.split_once('/')
            .ok_or_else(|| BlobError::InvalidLocation(location.to_string()))
    }
}

#[async_trait]
impl BlobStorage for S3Storage {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError> {
        let object_key = self.object_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| BlobError::Backend(format!("S3 put_object error: {}", e)))?;

        tracing::debug!(
            key = %object_key,
            size = data.len(),
            "Blob stored in S3"
        );

        Ok(format!("s3://{}/{}", self.bucket, object_key))
    }

    async fn get(&self, location: &str) -> Result<Vec<u8>, BlobError> {
        let (bucket, key) = self.parse_location(location)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    BlobError::NotFound {
                        location: location.to_string(),
                    }
                } else {
                    BlobError::Backend(format!("S3 get_object error: {}", service_err))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| BlobError::Backend(format!("S3 body read error: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_for_key_tests(prefix: &str) -> S3Storage {
        // Client construction needs the async config loader; key/location
        // parsing is pure, so build a minimal client from an empty config.
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        S3Storage {
            client: Client::from_conf(conf),
            bucket: "dtc-blobs".to_string(),
            prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_object_key_with_prefix() {
        let storage = storage_for_key_tests("documents/");
        assert_eq!(storage.object_key("abc.txt"), "documents/abc.txt");
    }

    #[test]
    fn test_object_key_without_prefix() {
        let storage = storage_for_key_tests("");
        assert_eq!(storage.object_key("abc.txt"), "abc.txt");
    }

    #[test]
    fn test_parse_location() {
        let storage = storage_for_key_tests("documents");
        let (bucket, key) = storage
            .parse_location("s3://dtc-blobs/documents/abc.txt")
            .unwrap();
        assert_eq!(bucket, "dtc-blobs");
        assert_eq!(key, "documents/abc.txt");
    }

    #[test]
    fn test_parse_location_rejects_other_schemes() {
        let storage = storage_for_key_tests("documents");
        assert!(storage.parse_location("file:///tmp/abc.txt").is_err());
        assert!(storage.parse_location("s3://nokey").is_err());
    }
}
