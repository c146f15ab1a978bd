use tracing::error;

/// Sink for diagnostics the host should hear about, such as script errors
/// raised outside a host call.
pub trait ErrorCallback: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> ErrorCallback for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Logs reports at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorCallback;

impl ErrorCallback for DefaultErrorCallback {
    fn report(&self, message: &str) {
        error!(target: "sieve", "{}", message);
    }
}
