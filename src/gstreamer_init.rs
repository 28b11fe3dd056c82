//! GStreamer initialization
//!
//! Initializes GStreamer once per process and checks that the element
//! factories a conversion needs are installed.

use std::sync::Once;

static GSTREAMER_INIT: Once = Once::new();

/// Initialize GStreamer
///
/// Safe to call repeatedly; only the first call does any work. Returns
/// whether GStreamer is usable.
pub fn init_gstreamer() -> bool {
    GSTREAMER_INIT.call_once(|| {
        match gstreamer::init() {
            Ok(_) => {
                log::info!("GStreamer initialized successfully");
                log_gstreamer_version();
            }
            Err(e) => {
                log::error!("Failed to initialize GStreamer: {}", e);
                log::error!("Video discovery and conversion will not be available");
            }
        }
    });
    is_gstreamer_available()
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gstreamer::version();
    let nano_str = match nano {
        0 => String::new(),
        1 => " (CVS)".to_string(),
        2 => " (prerelease)".to_string(),
        _ => format!(" (nano: {})", nano),
    };
    log::info!("GStreamer version: {}.{}.{}{}", major, minor, micro, nano_str);
}

/// Check if GStreamer is available and properly configured
pub fn is_gstreamer_available() -> bool {
    gstreamer::init().is_ok()
}

/// Element factories from `wanted` that are not installed
pub fn missing_elements(wanted: &[&str]) -> Vec<String> {
    if !is_gstreamer_available() {
        return wanted.iter().map(|name| name.to_string()).collect();
    }
    let missing: Vec<String> = wanted
        .iter()
        .filter(|name| gstreamer::ElementFactory::find(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        log::warn!("Missing GStreamer elements: {}", missing.join(", "));
    }
    missing
}
