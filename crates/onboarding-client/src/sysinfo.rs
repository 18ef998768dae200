//! Local system identity for auto-detection

use crate::error::OnboardingError;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

const DMIDECODE: &str = "/usr/sbin/dmidecode";

async fn dmidecode(keyword: &str) -> Result<String, OnboardingError> {
    let output = Command::new(DMIDECODE).args(["-s", keyword]).output().await?;
    if !output.status.success() {
        return Err(OnboardingError::InvalidConfig(format!(
            "dmidecode -s {keyword} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub async fn serial_number() -> Result<String, OnboardingError> {
    dmidecode("system-serial-number").await
}

pub async fn system_uuid() -> Result<String, OnboardingError> {
    dmidecode("system-uuid").await
}

fn format_mac(bytes: [u8; 6]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

/// MAC of the first non-loopback interface that is up
pub fn primary_mac() -> Result<String, OnboardingError> {
    let addrs = getifaddrs().map_err(|e| OnboardingError::Io(e.into()))?;
    addrs
        .filter(|ifa| ifa.flags.contains(InterfaceFlags::IFF_UP) && !ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK))
        .find_map(|ifa| {
            ifa.address
                .as_ref()?
                .as_link_addr()?
                .addr()
                .filter(|mac| mac.iter().any(|b| *b != 0))
        })
        .map(format_mac)
        .ok_or_else(|| OnboardingError::InvalidConfig("no network interface with a MAC address found".to_string()))
}

/// First non-loopback IPv4 address on the interface with `mac`
pub fn ip_for_mac(mac: &str) -> Result<Ipv4Addr, OnboardingError> {
    let mac = mac.to_ascii_lowercase();
    let addrs: Vec<_> = getifaddrs().map_err(|e| OnboardingError::Io(e.into()))?.collect();

    let names: Vec<&str> = addrs
        .iter()
        .filter(|ifa| {
            ifa.address
                .as_ref()
                .and_then(|a| a.as_link_addr())
                .and_then(|l| l.addr())
                .is_some_and(|bytes| format_mac(bytes) == mac)
        })
        .map(|ifa| ifa.interface_name.as_str())
        .collect();

    addrs
        .iter()
        .filter(|ifa| names.contains(&ifa.interface_name.as_str()))
        .filter_map(|ifa| ifa.address.as_ref()?.as_sockaddr_in().map(|sin| *SocketAddrV4::from(*sin).ip()))
        .find(|ip| !ip.is_loopback())
        .ok_or_else(|| OnboardingError::InvalidConfig(format!("no IP address found for MAC address {mac}")))
}

/// [`ip_for_mac`], waiting for DHCP to assign an address
pub async fn ip_for_mac_with_retry(mac: &str, attempts: u32, delay: Duration) -> Result<Ipv4Addr, OnboardingError> {
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match ip_for_mac(mac) {
            Ok(ip) => return Ok(ip),
            Err(e) => {
                debug!("Attempt {}/{}: {}", attempt, attempts, e);
                last_error = Some(e);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    Err(last_error.unwrap_or(OnboardingError::MaxRetriesReached))
}

/// Render `host:ip,host:ip` as hosts-file lines
pub fn extra_host_lines(extra_hosts: &str) -> String {
    extra_hosts
        .split(',')
        .map(|entry| entry.trim().replace('"', ""))
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((host, ip)) => format!("{} {}\n", ip.trim(), host.trim()),
            None => format!("{entry}\n"),
        })
        .collect()
}

/// Append extra host mappings to `hosts_file`
pub async fn append_extra_hosts(hosts_file: &Path, extra_hosts: &str) -> Result<(), OnboardingError> {
    let lines = extra_host_lines(extra_hosts);
    if lines.is_empty() {
        return Ok(());
    }
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(hosts_file)
        .await?;
    file.write_all(lines.as_bytes()).await?;
    info!("Adding extra host mappings completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac([0xaa, 0x0b, 0, 1, 2, 0xff]), "aa:0b:00:01:02:ff");
    }

    #[test]
    fn test_extra_host_lines() {
        assert_eq!(
            extra_host_lines("\"registry.local:10.0.0.1, api.local:10.0.0.2\""),
            "10.0.0.1 registry.local\n10.0.0.2 api.local\n"
        );
        assert_eq!(extra_host_lines(""), "");
    }

    #[tokio::test]
    async fn test_append_extra_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();

        append_extra_hosts(&hosts, "registry.local:10.0.0.1").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&hosts).unwrap(),
            "127.0.0.1 localhost\n10.0.0.1 registry.local\n"
        );
    }

    #[test]
    fn test_unknown_mac_has_no_ip() {
        assert!(ip_for_mac("00:00:5e:00:53:ff").is_err());
    }
}
