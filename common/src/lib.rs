//! Shared models for sweepr: the IPv4 sweep order, scan configuration and
//! the status-line logging macro used across the workspace.

pub mod address;
pub mod config;

/// Target used for status lines that mark a finished step.
pub const SUCCESS_TARGET: &str = "sweepr::success";

/// Target used for unadorned lines (banners, per-address results).
pub const PRINT_TARGET: &str = "sweepr::print";

#[doc(hidden)]
pub use tracing;

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        $crate::tracing::info!(target: $crate::SUCCESS_TARGET, $($arg)*)
    };
}
