//! FILENAME: core/bom-pivot/src/logging.rs
// PURPOSE: Category-tagged logging macros for the pivot engine.
// CONTEXT: Lines are routed through the `log` facade with the category as the
//          target, so the host application decides where they end up. The
//          engine never installs a logger itself.

pub(crate) const CAT_HIERARCHY: &str = "HIERARCHY";
pub(crate) const CAT_VISIBILITY: &str = "VISIBILITY";
pub(crate) const CAT_LAYOUT: &str = "LAYOUT";
pub(crate) const CAT_COMBINE: &str = "COMBINE";
pub(crate) const CAT_AGGREGATE: &str = "AGGREGATE";
pub(crate) const CAT_FILTER: &str = "FILTER";
pub(crate) const CAT_PIVOT: &str = "PIVOT";
pub(crate) const CAT_SESSION: &str = "SESSION";

// ============================================================================
// MACRO DEFINITIONS
// ============================================================================

macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        ::log::debug!(target: $cat, $($arg)*)
    };
}

macro_rules! log_info {
    ($cat:expr, $($arg:tt)*) => {
        ::log::info!(target: $cat, $($arg)*)
    };
}

macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        ::log::warn!(target: $cat, $($arg)*)
    };
}

// ENTER/EXIT macros for function tracing

macro_rules! log_enter {
    ($cat:expr, $func:expr) => {
        ::log::debug!(target: $cat, "ENTER {}", $func)
    };
    ($cat:expr, $func:expr, $($arg:tt)*) => {
        ::log::debug!(target: $cat, "ENTER {} {}", $func, format_args!($($arg)*))
    };
}

macro_rules! log_exit {
    ($cat:expr, $func:expr) => {
        ::log::debug!(target: $cat, "EXIT {}", $func)
    };
    ($cat:expr, $func:expr, $($arg:tt)*) => {
        ::log::debug!(target: $cat, "EXIT {} {}", $func, format_args!($($arg)*))
    };
}

pub(crate) use log_debug;
pub(crate) use log_enter;
pub(crate) use log_exit;
pub(crate) use log_info;
pub(crate) use log_warn;
