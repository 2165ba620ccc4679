//! Construction of runtime components from a validated [`Config`](crate::Config).

use std::{path::PathBuf, sync::Arc};

use tracing::info;

use crate::{
    ConfigError, Dispatcher, PublisherConfig, RecordCodec, RecordPublisher, SpoolPublisher,
    ValidationPipeline, Validator, ValidatorConfig,
};

/// Builds the validators listed in the configuration, in order.
pub fn build_validators(
    configs: &[ValidatorConfig],
) -> Result<Vec<Box<dyn Validator>>, ConfigError> {
    let mut validators: Vec<Box<dyn Validator>> = Vec::with_capacity(configs.len());
    for config in configs {
        match config {
            #[cfg(feature = "email-auth")]
            ValidatorConfig::Dkim { resolver } => {
                let engine = crate::MailAuthEngine::new(*resolver)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                validators.push(Box::new(crate::DkimValidator::new(Arc::new(engine))));
            }
            #[cfg(not(feature = "email-auth"))]
            ValidatorConfig::Dkim { .. } => {
                return Err(ConfigError::Invalid(
                    "dkim validator requires the email-auth feature".to_string(),
                ));
            }
        }
    }
    info!(count = validators.len(), "Validators built");
    Ok(validators)
}

/// Builds the publisher that validated records are forwarded to.
pub fn build_publisher(
    config: &PublisherConfig,
) -> Result<Arc<dyn RecordPublisher>, ConfigError> {
    match config {
        #[cfg(feature = "redis")]
        PublisherConfig::Redis { url, topic, .. } => {
            let publisher = crate::RedisPublisher::new(url, topic.clone())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Arc::new(publisher))
        }
        #[cfg(not(feature = "redis"))]
        PublisherConfig::Redis { .. } => Err(ConfigError::Invalid(
            "redis publisher requires the redis feature".to_string(),
        )),
        PublisherConfig::Spool { path, .. } => {
            Ok(Arc::new(SpoolPublisher::new(PathBuf::from(path))))
        }
    }
}

/// Builds a [`Dispatcher`] from the validator and publisher configuration.
pub fn build_dispatcher(
    validators: &[ValidatorConfig],
    publisher: &PublisherConfig,
) -> Result<Dispatcher, ConfigError> {
    let codec = RecordCodec::new().map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let pipeline = ValidationPipeline::new(build_validators(validators)?);
    Ok(Dispatcher::new(
        codec,
        pipeline,
        build_publisher(publisher)?,
        publisher.ordering_key().to_string(),
    ))
}
