use aws_config::SdkConfig;
use aws_sdk_ecr::error::ProvideErrorMetadata;
use aws_sdk_ecr::types::ImageIdentifier;
use base64::Engine;
use eyre::{Context, ContextCompat};

/// Container registry for the project image
///
/// One repository per project, holding a single image tagged latest.
pub struct Registry {
    client: aws_sdk_ecr::Client,
}

impl Registry {
    pub fn new(config: &SdkConfig) -> Self {
        Registry {
            client: aws_sdk_ecr::Client::new(config),
        }
    }

    /// Create the repository if absent and return its URI
    ///
    /// An existing repository of the same name is reused as is. A fresh
    /// repository gets a lifecycle policy keeping only the latest image,
    /// older pushes expire automatically.
    pub async fn ensure(&self, name: &str) -> eyre::Result<String> {
        let existing = self
            .client
            .describe_repositories()
            .repository_names(name)
            .send()
            .await;

        match existing {
            Ok(described) => {
                log::info!("ECR repository already exists: {name}");

                described
                    .repositories()
                    .first()
                    .and_then(|r| r.repository_uri())
                    .map(|uri| uri.to_string())
                    .wrap_err("Repository exists but has no URI")
            }
            Err(e) if e.code() == Some("RepositoryNotFoundException") => {
                log::info!("Creating ECR repository: {name}");

                let created = self
                    .client
                    .create_repository()
                    .repository_name(name)
                    .send()
                    .await
                    .wrap_err("Failed to create ECR repository")?;

                let lifecycle_policy = serde_json::json!({
                    "rules": [{
                        "rulePriority": 1,
                        "description": "Keep only the latest image",
                        "selection": {
                            "tagStatus": "any",
                            "countType": "imageCountMoreThan",
                            "countNumber": 1,
                        },
                        "action": {"type": "expire"},
                    }]
                });

                self.client
                    .put_lifecycle_policy()
                    .repository_name(name)
                    .lifecycle_policy_text(lifecycle_policy.to_string())
                    .send()
                    .await
                    .wrap_err("Failed to put repository lifecycle policy")?;

                created
                    .repository()
                    .and_then(|r| r.repository_uri())
                    .map(|uri| uri.to_string())
                    .wrap_err("Created repository has no URI")
            }
            Err(e) => Err(e).wrap_err("Failed to describe ECR repositories"),
        }
    }

    /// Registry login credentials for docker
    ///
    /// The authorization token decodes to "AWS:<password>".
    pub async fn credentials(&self) -> eyre::Result<(String, String)> {
        let auth = self
            .client
            .get_authorization_token()
            .send()
            .await
            .wrap_err("Failed to get ECR authorization token")?;

        let data = auth
            .authorization_data()
            .first()
            .wrap_err("No ECR authorization data returned")?;

        let token = data
            .authorization_token()
            .wrap_err("ECR authorization data has no token")?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token)
            .wrap_err("ECR authorization token is not valid base64")?;

        let decoded = String::from_utf8(decoded).wrap_err("ECR token is not UTF-8")?;

        let password = decoded
            .strip_prefix("AWS:")
            .wrap_err("Unexpected ECR token format")?;

        let endpoint = data
            .proxy_endpoint()
            .wrap_err("ECR authorization data has no endpoint")?
            .trim_start_matches("https://");

        Ok((endpoint.to_string(), password.to_string()))
    }

    /// Delete the repository with all its images
    ///
    /// A missing repository is fine, teardown tolerates resources that
    /// were never created.
    pub async fn delete(&self, name: &str) -> eyre::Result<()> {
        let images = self.client.describe_images().repository_name(name).send().await;

        let images = match images {
            Ok(images) => images,
            Err(e) if e.code() == Some("RepositoryNotFoundException") => {
                log::info!("ECR repository not found: {name}");
                return Ok(());
            }
            Err(e) => return Err(e).wrap_err("Failed to describe ECR images"),
        };

        let image_ids = images
            .image_details()
            .iter()
            .filter_map(|image| image.image_digest())
            .map(|digest| ImageIdentifier::builder().image_digest(digest).build())
            .collect::<Vec<_>>();

        if !image_ids.is_empty() {
            self.client
                .batch_delete_image()
                .repository_name(name)
                .set_image_ids(Some(image_ids))
                .send()
                .await
                .wrap_err("Failed to delete ECR images")?;
        }

        log::info!("Deleting ECR repository: {name}");

        self.client
            .delete_repository()
            .repository_name(name)
            .send()
            .await
            .wrap_err("Failed to delete ECR repository")?;

        Ok(())
    }
}
