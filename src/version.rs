const fn unwrap_or_cargo_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

pub const VERSION: &str = unwrap_or_cargo_version(option_env!("WATCHDOG_VERSION"));

/// Value of the `User-Agent` header sent with every HTTP probe.
pub fn probe_user_agent() -> String {
    format!("Watchdog-Uptime-Monitor/{VERSION}")
}
