use std::net::ToSocketAddrs;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

pub const ZENODO_HOST: &str = "zenodo.org";
pub const ZENODO_URL: &str = "https://zenodo.org/";
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Forces [`zenodo_online`] to report `false`, for runners without egress.
pub const OFFLINE_ENV: &str = "RAT_FETCH_OFFLINE";

/// `true` when `zenodo.org` resolves and answers `HEAD /` with 200.
pub fn zenodo_online() -> bool {
    if offline_forced() {
        debug!("network probe disabled by {OFFLINE_ENV}");
        return false;
    }
    host_online(ZENODO_HOST, ZENODO_URL, PROBE_TIMEOUT)
}

/// Name resolution followed by an HTTP HEAD. Never fails: any error reads as offline.
pub fn host_online(host: &str, url: &str, timeout: Duration) -> bool {
    let resolved = (host, 443)
        .to_socket_addrs()
        .map(|mut addrs| addrs.next().is_some())
        .unwrap_or(false);
    if !resolved {
        debug!(host, "name resolution failed");
        return false;
    }

    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            debug!(error = %err, "probe client build failed");
            return false;
        }
    };
    match client.head(url).send() {
        Ok(response) => response.status() == StatusCode::OK,
        Err(err) => {
            debug!(url, error = %err, "probe request failed");
            false
        }
    }
}

fn offline_forced() -> bool {
    std::env::var(OFFLINE_ENV)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_host_is_offline() {
        assert!(!host_online(
            "rat-fetch.invalid",
            "https://rat-fetch.invalid/",
            Duration::from_millis(200)
        ));
    }

    #[test]
    fn probe_is_stable_across_calls() {
        let first = host_online(
            "rat-fetch.invalid",
            "https://rat-fetch.invalid/",
            Duration::from_millis(200),
        );
        let second = host_online(
            "rat-fetch.invalid",
            "https://rat-fetch.invalid/",
            Duration::from_millis(200),
        );
        assert_eq!(first, second);
    }
}
