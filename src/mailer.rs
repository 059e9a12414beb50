//! Outbound verification code delivery.

use async_trait::async_trait;

use crate::error::AuthError;

/// Capability to deliver a verification code to an email address
#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), AuthError>;
}

/// Mailer that only writes to the log
///
/// Stands in until an SMTP transport is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), AuthError> {
        tracing::info!(email = %email, "Dispatching verification code");
        tracing::debug!(email = %email, code = %code, "Verification code body");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_ok, block_on};

    #[test]
    fn test_log_mailer_always_delivers() {
        let mailer: Box<dyn OtpMailer> = Box::new(LogMailer);
        assert_ok!(block_on(mailer.send_otp("a@x.com", "123456")));
    }
}
