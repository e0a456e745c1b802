//! Tracing initialization, called once from `mallku-cli`'s `main`, never
//! from a library crate — same convention as the teacher's
//! `agenticlaw-gateway/src/main.rs`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}
