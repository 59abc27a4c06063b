use chrono::NaiveDate;
use clearme::config::AppConfig;
use clearme::error::AppError;
use clearme::integrations::{BlueinkClient, HttpExternalSystem};
use clearme::workflows::clearance::signature::upload::encode_data_uri;
use clearme::workflows::clearance::{Integrations, SignatureError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SIGNING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// HTTP clients for whichever collaborators are configured.
pub(crate) fn build_integrations(config: &AppConfig) -> Result<Integrations, AppError> {
    let mut integrations = Integrations::default();

    if let Some(sync) = &config.sync {
        info!(base_url = %sync.base_url, retries = sync.retry_attempts, "student records sync enabled");
        integrations.records = Some(Arc::new(HttpExternalSystem::new(sync.clone())?));
    }
    if let Some(signing) = &config.signing {
        info!(base_url = %signing.base_url, "external signing enabled");
        integrations.signing = Some(Arc::new(BlueinkClient::new(
            signing.clone(),
            SIGNING_TIMEOUT,
        )?));
    }
    Ok(integrations)
}

/// Read an image from disk into a data URI; the media type comes from the extension.
pub(crate) fn load_signature_image(path: &Path) -> Result<String, AppError> {
    let media_type = mime_guess::from_path(path)
        .first()
        .ok_or_else(|| {
            SignatureError::Validation(format!(
                "cannot infer an image type for '{}'",
                path.display()
            ))
        })?;
    let bytes = std::fs::read(path)?;
    let data_uri = encode_data_uri(&media_type, &bytes).map_err(SignatureError::from)?;
    Ok(data_uri)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearme::config::{
        AppEnvironment, LogFormat, PortalConfig, ServerConfig, SigningConfig, TelemetryConfig,
        WebhookConfig,
    };

    fn config() -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                format: LogFormat::Compact,
            },
            portal: PortalConfig::default(),
            sync: None,
            signing: None,
            webhooks: WebhookConfig::default(),
        }
    }

    #[test]
    fn unconfigured_collaborators_stay_absent() {
        let integrations = build_integrations(&config()).expect("integrations build");
        assert!(integrations.records.is_none());
        assert!(integrations.signing.is_none());
    }

    #[test]
    fn signing_client_is_built_from_config() {
        let mut config = config();
        config.signing = Some(SigningConfig {
            base_url: "https://api.blueink.com/api/v2".to_string(),
            api_key: "test-key".to_string(),
            webhook_url: "http://localhost:3000/api/v1/external-signing/webhook".to_string(),
        });
        let integrations = build_integrations(&config).expect("integrations build");
        assert!(integrations.signing.is_some());
    }

    #[test]
    fn unknown_image_extensions_are_rejected() {
        let err = load_signature_image(Path::new("signature.unknownext")).expect_err("no type");
        assert!(matches!(
            err,
            AppError::Signature(SignatureError::Validation(_))
        ));
    }

    #[test]
    fn dates_use_iso_format() {
        assert_eq!(
            parse_date("2025-03-14"),
            Ok(NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date"))
        );
        assert!(parse_date("14/03/2025").is_err());
    }
}
