//! Object storage client: put/delete against an S3-compatible endpoint,
//! keyed `"{uuid}.{ext}"`. Upload happens after PS commit on image create;
//! delete happens after PS commit on image delete and is best-effort.

use secrecy::{ExposeSecret, SecretString};

use super::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: SecretString,
    pub path_style: bool,
}

#[derive(Clone)]
pub struct ObjectStoreClient {
    client: reqwest::Client,
    config: ObjectStoreConfig,
}

impl ObjectStoreClient {
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    fn object_url(&self, key: &str) -> String {
        if self.config.path_style {
            format!("{}/{}/{}", self.config.endpoint, self.config.bucket, key)
        } else {
            format!("{}/{}", self.config.endpoint, key)
        }
    }

    pub async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .basic_auth(&self.config.access_key, Some(self.config.secret_key.expose_secret()))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                backend: "object storage",
                status,
                body,
            });
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .basic_auth(&self.config.access_key, Some(self.config.secret_key.expose_secret()))
            .send()
            .await?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                backend: "object storage",
                status,
                body,
            });
        }
        Ok(())
    }
}

/// Builds the object storage key for an image: `"{uuid}.{ext}"`.
pub fn image_key(uuid: uuid::Uuid, extension: &str) -> String {
    format!("{uuid}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_key_joins_uuid_and_extension() {
        let uuid = uuid::Uuid::nil();
        assert_eq!(
            image_key(uuid, "jpg"),
            "00000000-0000-0000-0000-000000000000.jpg"
        );
    }

    #[test]
    fn path_style_url_nests_the_bucket() {
        let config = ObjectStoreConfig {
            endpoint: "https://objects.example.com".to_string(),
            bucket: "curator-images".to_string(),
            access_key: "key".to_string(),
            secret_key: SecretString::new("secret".to_string()),
            path_style: true,
        };
        let client = ObjectStoreClient {
            client: reqwest::Client::new(),
            config,
        };
        assert_eq!(
            client.object_url("abc.jpg"),
            "https://objects.example.com/curator-images/abc.jpg"
        );
    }
}
