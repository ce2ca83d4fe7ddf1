//! Collaborators invoked by the request pipeline

use super::error::ApiError;

/// Sends the user back to the login entry point once the session is gone.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, reason: &str);
}

/// Surfaces request failures to the user.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, error: &ApiError);
}

/// CLI navigator: there is no login screen, so tell the user what to run.
#[derive(Debug, Default)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn redirect_to_login(&self, reason: &str) {
        tracing::warn!("Session ended: {}", reason);
        eprintln!("Session expired. Run 'shop-admin login' to sign in again.");
    }
}

/// CLI notifier: failures are logged; the command's own error is printed
/// by `main`.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify_error(&self, error: &ApiError) {
        match error.status() {
            Some(status) => tracing::warn!(status, "{}", error),
            None => tracing::warn!("{}", error),
        }
    }
}
