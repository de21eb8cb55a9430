use std::net::{IpAddr, Ipv4Addr};

const REMEDIATION_PORT: &str = "REMEDIATION_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(REMEDIATION_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const REMEDIATION_ADDR: &str = "REMEDIATION_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(REMEDIATION_ADDR);
    addr_from_env.map_or(IpAddr::V4(DEFAULT_ADDR), |res| {
        res.parse().unwrap_or(IpAddr::V4(DEFAULT_ADDR))
    })
}

const REMEDIATION_SECRET: &str = "REMEDIATION_SECRET";

pub fn get_secret() -> Option<String> {
    let secret_from_env = std::env::var(REMEDIATION_SECRET);
    secret_from_env.ok()
}

const SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Chat webhook from the environment, if set and non-empty
pub fn get_chat_webhook() -> Option<String> {
    std::env::var(SLACK_WEBHOOK_URL)
        .ok()
        .filter(|url| !url.trim().is_empty())
}
