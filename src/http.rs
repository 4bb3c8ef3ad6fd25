//! HTTP client construction for provider requests.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};

/// Build the shared client for all requests to the provider, appending the
/// configured CA PEM to the trust roots when one is present.
pub(crate) fn new_client(config: &Config) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(config.http_timeout_secs));
    if let Some(pem) = &config.provider_ca {
        let cert = reqwest::Certificate::from_pem(pem.as_bytes())
            .map_err(|e| Error::InvalidCaCert(e.to_string()))?;
        builder = builder.add_root_certificate(cert);
    }
    builder.build().map_err(Error::from)
}

/// Run a future unless the provider's cancellation handle fires first.
///
/// Cancellation aborts the in-flight I/O and surfaces as
/// [`Error::Canceled`] tagged with the operation name.
pub(crate) async fn or_cancel<T>(
    cancel: &CancellationToken,
    op: &'static str,
    fut: impl Future<Output = T>,
) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(Error::Canceled(op));
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Canceled(op)),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::Alg;

    fn base_config() -> Config {
        Config::new(
            "https://idp.test",
            "id",
            "secret",
            vec![Alg::ES256],
            vec!["https://test-redirect".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn builds_default_client() {
        assert!(new_client(&base_config()).is_ok());
    }

    #[test]
    fn rejects_bad_ca_pem() {
        let config = base_config().with_provider_ca("not a pem");
        assert!(matches!(
            new_client(&config),
            Err(Error::InvalidCaCert(_))
        ));
    }

    #[tokio::test]
    async fn or_cancel_returns_future_output() {
        let token = CancellationToken::new();
        let got = or_cancel(&token, "test", async { 7 }).await.unwrap();
        assert_eq!(got, 7);
    }

    #[tokio::test]
    async fn or_cancel_short_circuits_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let got = or_cancel(&token, "test", std::future::pending::<()>()).await;
        assert!(matches!(got, Err(Error::Canceled("test"))));
    }
}
