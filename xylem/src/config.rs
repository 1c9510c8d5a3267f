/// Configuration for change tracking.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Verify the change set's internal indexes after every registration
    /// and panic on the first inconsistency.
    pub check_invariants: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            check_invariants: cfg!(debug_assertions),
        }
    }
}
