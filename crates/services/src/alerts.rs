/// Receiver for countdown warnings (audible or visual).
///
/// Injected into the session runner; implementations must not block.
pub trait AlertSink: Send + Sync {
    fn time_warning(&self, remaining_seconds: u32);
}

/// Alert sink that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAlerts;

impl AlertSink for SilentAlerts {
    fn time_warning(&self, _remaining_seconds: u32) {}
}
