// Settings validation
//
// Required fields must be present and values well formed. An empty account
// is allowed (environment-agnostic synthesis); an empty repository is allowed
// but warned about since the pipeline source would be unusable.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_aws(&settings.aws)?;
    validate_source(&settings.source)?;
    validate_pipeline(&settings.pipeline)?;
    validate_assets(&settings.assets)?;

    if settings.logging.level.is_empty() {
        bail!("logging.level must not be empty");
    }

    Ok(())
}

fn validate_aws(aws: &AwsSettings) -> Result<()> {
    if !aws.account.is_empty()
        && (aws.account.len() != 12 || !aws.account.chars().all(|c| c.is_ascii_digit()))
    {
        bail!("aws.account must be a 12-digit account id, got '{}'", aws.account);
    }

    if aws.region.is_empty() {
        bail!("aws.region must not be empty");
    }

    Ok(())
}

fn validate_source(source: &SourceSettings) -> Result<()> {
    if source.branch.is_empty() {
        bail!("source.branch must not be empty");
    }

    if source.repository.is_empty() {
        warn!("source.repository is not set; pipeline source action will be unusable");
    } else {
        match source.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {}
            _ => bail!(
                "source.repository must be in 'owner/name' form, got '{}'",
                source.repository
            ),
        }
    }

    if !source.connection_arn.is_empty()
        && !source.connection_arn.starts_with("arn:aws:codestar-connections:")
        && !source.connection_arn.starts_with("arn:aws:codeconnections:")
    {
        bail!(
            "source.connection_arn must be a CodeConnections ARN, got '{}'",
            source.connection_arn
        );
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineSettings) -> Result<()> {
    if pipeline.name.is_empty() {
        bail!("pipeline.name must not be empty");
    }

    // CodePipeline names: letters, digits, and . @ - _
    if !pipeline
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '-' | '_'))
    {
        bail!("pipeline.name contains invalid characters: '{}'", pipeline.name);
    }

    if let Some(bucket) = pipeline.assembly_bucket.as_deref() {
        validate_bucket_name(bucket, "pipeline.assembly_bucket")?;
    }

    Ok(())
}

fn validate_assets(assets: &AssetSettings) -> Result<()> {
    validate_bucket_name(&assets.bucket, "assets.bucket")
}

fn validate_bucket_name(name: &str, field: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        bail!("{} must be 3-63 characters", field);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        bail!(
            "{} must contain only lowercase letters, numbers, dots, and hyphens",
            field
        );
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("{} cannot start or end with a hyphen", field);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_aws() {
        let valid = AwsSettings {
            account: "111111111111".to_string(),
            region: "us-east-1".to_string(),
        };
        assert!(validate_aws(&valid).is_ok());

        let agnostic = AwsSettings::default();
        assert!(validate_aws(&agnostic).is_ok());

        let short = AwsSettings {
            account: "1234".to_string(),
            region: "us-east-1".to_string(),
        };
        assert!(validate_aws(&short).is_err());
    }

    #[test]
    fn test_validate_source() {
        let mut source = SourceSettings {
            repository: "acme/learn".to_string(),
            branch: "main".to_string(),
            connection_arn: "arn:aws:codestar-connections:us-east-1:111111111111:connection/x"
                .to_string(),
        };
        assert!(validate_source(&source).is_ok());

        source.repository = "learn".to_string();
        assert!(validate_source(&source).is_err());

        source.repository = "acme/learn".to_string();
        source.connection_arn = "arn:aws:iam::111111111111:role/x".to_string();
        assert!(validate_source(&source).is_err());
    }

    #[test]
    fn test_validate_pipeline() {
        let mut pipeline = PipelineSettings::default();
        assert!(validate_pipeline(&pipeline).is_ok());

        pipeline.name = "learn pipeline".to_string();
        assert!(validate_pipeline(&pipeline).is_err());

        pipeline.name = "learn-code-pipeline".to_string();
        pipeline.assembly_bucket = Some("Bad_Bucket".to_string());
        assert!(validate_pipeline(&pipeline).is_err());
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }
}
