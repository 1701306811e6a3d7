use std::time::Duration;

use crate::models::settings::AdvancedSettings;

const USER_AGENT: &str = concat!("flacdl/", env!("CARGO_PKG_VERSION"));

pub fn build_client(advanced: &AdvancedSettings) -> anyhow::Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(advanced.http_timeout_secs.max(1)));
    let builder = apply_proxy(builder, advanced.proxy_url.as_deref());
    Ok(builder.build()?)
}

pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy_url: Option<&str>,
) -> reqwest::ClientBuilder {
    let Some(url) = proxy_url.map(str::trim).filter(|u| !u.is_empty()) else {
        return builder;
    };
    match reqwest::Proxy::all(url) {
        Ok(p) => builder.proxy(p),
        Err(e) => {
            tracing::warn!("Invalid proxy URL: {}", e);
            builder
        }
    }
}
