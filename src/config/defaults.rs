//! Default values for configuration

/// Default backend API URL
pub fn default_backend_url() -> String {
    std::env::var("DOCPILOT_BACKEND_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
}

/// Default status poll interval in milliseconds
pub fn default_poll_interval_ms() -> u64 {
    750
}

/// Default request timeout in seconds
pub fn default_request_timeout_secs() -> u64 {
    30
}

/// Default upload timeout in seconds (10 minutes; mirrors the backend's
/// processing timeout)
pub fn default_upload_timeout_secs() -> u64 {
    600
}

/// Default vision model for chart/figure analysis
pub fn default_vision_model() -> String {
    "Moondream2".to_string()
}

/// Default cap on consecutive failed polls before a monitor gives up
pub fn default_max_poll_transport_failures() -> u32 {
    8
}
