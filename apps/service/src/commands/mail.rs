use anyhow::{Result, bail};
use pollwatch::SmtpNotifier;
use tracing::{error, info};

use crate::config::Config;

pub async fn test_email(config: &Config) -> Result<()> {
    if !config.notify_enabled() {
        bail!("incomplete mail settings, fill in every [smtp] field first");
    }

    info!(server = %config.smtp.server, receiver = %config.smtp.receiver, "Sending test mail");
    let notifier = SmtpNotifier::new(config.smtp.clone(), config.query.stage.clone())?;

    match notifier.send_test().await {
        Ok(()) => {
            println!("Test mail sent");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Test mail failed");
            Err(e.into())
        }
    }
}
