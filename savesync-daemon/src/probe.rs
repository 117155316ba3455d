//! Startup reachability check.

use std::time::Duration;

use savesync_core::Config;

use crate::error::DaemonError;

pub trait Probe: Send + Sync {
    /// `Ok(())` if the network is usable for pushing.
    fn check(&self) -> Result<(), DaemonError>;
}

/// HTTPS GET against a well-known host. Any HTTP response, even an error
/// status, proves the network is up; only transport failures count.
#[derive(Debug, Clone)]
pub struct HttpsProbe {
    url: String,
    timeout: Duration,
}

impl HttpsProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.probe_url.clone(), config.probe_timeout())
    }
}

impl Probe for HttpsProbe {
    fn check(&self) -> Result<(), DaemonError> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        match agent.get(&self.url).call() {
            Ok(_) | Err(ureq::Error::Status(..)) => Ok(()),
            Err(ureq::Error::Transport(transport)) => Err(DaemonError::Unreachable {
                url: self.url.clone(),
                reason: transport.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_host_is_unreachable() {
        let probe = HttpsProbe::new("https://savesync.invalid", Duration::from_secs(2));
        let err = probe.check().unwrap_err();
        assert!(matches!(err, DaemonError::Unreachable { ref url, .. } if url == "https://savesync.invalid"));
    }

    #[test]
    fn probe_settings_follow_config() {
        let mut config = Config::new("/saves");
        config.probe_url = "https://example.com".to_string();
        config.probe_timeout_ms = 1_500;
        let probe = HttpsProbe::from_config(&config);
        assert_eq!(probe.url, "https://example.com");
        assert_eq!(probe.timeout, Duration::from_millis(1_500));
    }
}
