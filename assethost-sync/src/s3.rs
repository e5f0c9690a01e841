//! S3 (and S3-compatible) storage backend.
//!
//! The engine is synchronous; this backend owns a current-thread tokio
//! runtime and blocks on each SDK call.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use assethost_core::Config;

use crate::error::{BoxError, StorageError};
use crate::storage::{Acl, ObjectHeaders, Storage};

pub struct S3Storage {
    runtime: Runtime,
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Build a client from `config`.
    ///
    /// Static credentials are used when configured; otherwise the default
    /// AWS provider chain (env, profile, instance metadata) applies. A
    /// custom endpoint switches to path-style addressing.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Setup(Box::new(e)))?;

        let client = runtime.block_on(async {
            let mut loader =
                aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
            if let Some(creds) = config.credentials() {
                loader = loader.credentials_provider(Credentials::new(
                    creds.access_key_id,
                    creds.secret_access_key,
                    None,
                    None,
                    "assethost-config",
                ));
            }
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            let shared = loader.load().await;

            let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(config.endpoint.is_some())
                .build();
            Client::from_conf(s3_config)
        });

        tracing::info!(
            "S3 storage: bucket {} in {}{}",
            config.bucket,
            config.region,
            config
                .endpoint
                .as_deref()
                .map(|e| format!(" via {e}"))
                .unwrap_or_default()
        );

        Ok(Self {
            runtime,
            client,
            bucket: config.bucket.clone(),
        })
    }
}

impl Storage for S3Storage {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let list_err = |e: BoxError| StorageError::List {
            prefix: prefix.to_owned(),
            source: e,
        };

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(prefix)
                        .set_continuation_token(token.take())
                        .send(),
                )
                .map_err(|e| list_err(Box::new(e)))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_owned)),
            );

            match page.next_continuation_token() {
                Some(next) if page.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_owned());
                }
                _ => break,
            }
        }
        tracing::debug!("listed {} keys under '{prefix}'", keys.len());
        Ok(keys)
    }

    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        headers: &ObjectHeaders,
        acl: Acl,
    ) -> Result<(), StorageError> {
        let acl = match acl {
            Acl::PublicRead => ObjectCannedAcl::PublicRead,
        };
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(bytes))
                    .content_type(&headers.content_type)
                    .cache_control(&headers.cache_control)
                    .expires(S3DateTime::from_secs(headers.expires.timestamp()))
                    .set_content_encoding(headers.content_encoding.clone())
                    .acl(acl)
                    .send(),
            )
            .map_err(|e| StorageError::Put {
                key: key.to_owned(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.runtime
            .block_on(
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|e| StorageError::Delete {
                key: key.to_owned(),
                source: Box::new(e),
            })?;
        Ok(())
    }
}
