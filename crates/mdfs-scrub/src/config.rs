//! Configuration for the scrub scheduler.

/// Configuration for [`crate::ScrubStack`].
#[derive(Debug, Clone)]
pub struct ScrubConfig {
    /// Maximum dispatch steps per drive-loop activation. When exhausted the
    /// activation reschedules itself instead of monopolizing the driver.
    pub drive_batch_limit: usize,

    /// Queue depth at which a warning is logged.
    pub warn_queue_depth: usize,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            drive_batch_limit: 64,
            warn_queue_depth: 8192,
        }
    }
}
