//! Probe configuration
//!
//! Timing and server-command settings for a probe run, shared by every
//! scenario. Defaults mirror the fixed argument vector and wait periods the
//! probe was designed around.

use std::time::Duration;

use crate::probe::error::ProbeError;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default grace period after `initialize` (500 ms)
///
/// Upper bound on the wait for the server's initialize reply. The probe
/// proceeds as soon as a reply with the matching id arrives, so this only
/// gates servers that never answer.
pub const DEFAULT_INIT_GRACE_MS: u64 = 500;

/// Default grace period after `textDocument/didOpen` (1 second)
///
/// The probe observes root-resolution side effects in the server's logs, and
/// those appear some time after the document is opened. There is no reply to
/// wait for here since `didOpen` is a notification.
pub const DEFAULT_SETTLE_GRACE_MS: u64 = 1000;

/// Default bound on the final drain after stdin is closed (5 seconds)
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 5;

/// Synthetic Go source opened during each probe
///
/// The relative import only resolves when the server has located the real
/// project root, which is what makes its log output discriminating.
pub const DEFAULT_DOCUMENT_TEXT: &str = "package main\n\nimport \"./calculator\"\n\nfunc main() {\n\tcalc := calculator.NewCalculator()\n\tresult := calc.Add(1, 2)\n\tprintln(result)\n}";

/// Complete configuration for a probe run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Server executable to launch
    pub server_command: String,

    /// Arguments passed to the server executable
    pub server_args: Vec<String>,

    /// Bounded wait for the initialize reply
    pub init_grace: Duration,

    /// Fixed wait after didOpen before closing stdin
    pub settle_grace: Duration,

    /// Bound on the final drain
    pub drain_timeout: Duration,

    /// Source text of the synthetic document sent via didOpen
    pub document_text: String,

    /// Language identifier of the synthetic document
    pub document_language: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            server_command: "gopls".to_string(),
            server_args: vec!["serve".to_string()],
            init_grace: Duration::from_millis(DEFAULT_INIT_GRACE_MS),
            settle_grace: Duration::from_millis(DEFAULT_SETTLE_GRACE_MS),
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            document_text: DEFAULT_DOCUMENT_TEXT.to_string(),
            document_language: "go".to_string(),
        }
    }
}

impl ProbeConfig {
    /// Override settings supplied on the command line
    pub fn with_overrides(
        mut self,
        server_command: Option<String>,
        init_grace_ms: Option<u64>,
        settle_grace_ms: Option<u64>,
        drain_timeout_secs: Option<u64>,
    ) -> Self {
        if let Some(command) = server_command {
            self.server_command = command;
        }
        if let Some(ms) = init_grace_ms {
            self.init_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = settle_grace_ms {
            self.settle_grace = Duration::from_millis(ms);
        }
        if let Some(secs) = drain_timeout_secs {
            self.drain_timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Validate the configuration before any scenario runs
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.server_command.trim().is_empty() {
            return Err(ProbeError::InvalidConfig {
                reason: "server command must not be empty".to_string(),
            });
        }
        if self.drain_timeout.is_zero() {
            return Err(ProbeError::InvalidConfig {
                reason: "drain timeout must be non-zero".to_string(),
            });
        }
        if self.document_language.trim().is_empty() {
            return Err(ProbeError::InvalidConfig {
                reason: "document language must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_command, "gopls");
        assert_eq!(config.server_args, vec!["serve"]);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let config = ProbeConfig::default().with_overrides(
            Some("/usr/local/bin/gopls".to_string()),
            Some(100),
            Some(200),
            Some(10),
        );

        assert_eq!(config.server_command, "/usr/local/bin/gopls");
        assert_eq!(config.init_grace, Duration::from_millis(100));
        assert_eq!(config.settle_grace, Duration::from_millis(200));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_empty_command() {
        let config = ProbeConfig {
            server_command: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ProbeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_drain_timeout() {
        let config = ProbeConfig {
            drain_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ProbeError::InvalidConfig { .. })
        ));
    }
}
