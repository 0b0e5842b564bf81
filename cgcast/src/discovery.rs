//! Chromecast device discovery via mDNS.
//!
//! Chromecast devices advertise themselves on the `_googlecast._tcp.local`
//! service. Browsing runs on the async-std executor the `mdns` crate is
//! built on; the public functions block the calling thread.

use std::collections::HashMap;
use std::net::IpAddr;
use std::thread;
use std::time::{Duration, Instant};

use futures_util::{StreamExt, pin_mut};
use tracing::{debug, info, warn};

use crate::errors::{CastError, CastResult};
use crate::model::{DEFAULT_CAST_PORT, DeviceInfo, DeviceSelector};

/// mDNS service advertised by cast receivers.
pub const SERVICE_NAME: &str = "_googlecast._tcp.local";

/// Interval between mDNS queries while browsing.
const QUERY_INTERVAL: Duration = Duration::from_secs(1);

/// The records of one mDNS response that matter for a cast device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceRecords {
    /// Service instance name from the PTR record.
    pub instance: Option<String>,
    pub addresses: Vec<IpAddr>,
    pub port: Option<u16>,
    /// Raw `key=value` TXT strings.
    pub txt: Vec<String>,
}

impl ServiceRecords {
    pub fn from_response(response: &mdns::Response) -> Self {
        let mut records = ServiceRecords::default();

        for record in response.records() {
            match &record.kind {
                mdns::RecordKind::PTR(name) if records.instance.is_none() => {
                    records.instance = Some(name.clone());
                }
                mdns::RecordKind::A(addr) => records.addresses.push(IpAddr::V4(*addr)),
                mdns::RecordKind::AAAA(addr) => records.addresses.push(IpAddr::V6(*addr)),
                mdns::RecordKind::SRV { port, .. } if records.port.is_none() => {
                    records.port = Some(*port);
                }
                mdns::RecordKind::TXT(data) => records.txt.extend(data.iter().cloned()),
                _ => {}
            }
        }

        records
    }

    fn txt_map(&self) -> HashMap<&str, &str> {
        self.txt
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .collect()
    }
}

/// Friendly name derived from a service instance such as
/// `Living-Room-TV-0123456789abcdef0123456789abcdef._googlecast._tcp.local`.
fn name_from_instance(instance: &str) -> String {
    let base = instance
        .split(&format!(".{}", SERVICE_NAME))
        .next()
        .unwrap_or(instance);

    let name = base
        .split('-')
        .take_while(|part| part.len() != 32)
        .collect::<Vec<_>>()
        .join("-");

    match name.trim() {
        "" => "Unknown Chromecast".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Builds a [`DeviceInfo`] from the records of one response.
///
/// Returns `None` when no address is advertised. IPv4 is preferred, the
/// port defaults to 8009 and the friendly name comes from the `fn` TXT key
/// or, failing that, from the service instance name.
pub fn device_info_from_records(records: &ServiceRecords) -> Option<DeviceInfo> {
    let host = records
        .addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| records.addresses.first())?
        .to_string();

    let port = records.port.unwrap_or(DEFAULT_CAST_PORT);
    let txt = records.txt_map();

    let friendly_name = match txt.get("fn") {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => records
            .instance
            .as_deref()
            .map(name_from_instance)
            .unwrap_or_else(|| "Unknown Chromecast".to_string()),
    };

    let id = txt
        .get("id")
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("chromecast-{}-{}", host, port));

    Some(DeviceInfo {
        id,
        friendly_name,
        model_name: txt.get("md").unwrap_or(&"Chromecast").to_string(),
        manufacturer: "Google Inc.".to_string(),
        host,
        port,
    })
}

async fn browse(timeout: Duration) -> CastResult<Vec<DeviceInfo>> {
    let stream = mdns::discover::all(SERVICE_NAME, QUERY_INTERVAL)
        .map_err(|e| CastError::Discovery(e.to_string()))?
        .listen();
    pin_mut!(stream);

    let deadline = Instant::now() + timeout;
    let mut devices: Vec<DeviceInfo> = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match async_std::future::timeout(remaining, stream.next()).await {
            Ok(Some(Ok(response))) => {
                let records = ServiceRecords::from_response(&response);
                match device_info_from_records(&records) {
                    Some(device) if devices.iter().all(|d| d.id != device.id) => {
                        debug!(
                            "Discovered Chromecast: {} at {}:{} (id: {}, model: {})",
                            device.friendly_name, device.host, device.port, device.id, device.model_name
                        );
                        devices.push(device);
                    }
                    Some(_) => {}
                    None => debug!("Ignoring mDNS response without address: {:?}", records.instance),
                }
            }
            Ok(Some(Err(e))) => warn!("mDNS error: {}", e),
            Ok(None) | Err(_) => break,
        }
    }

    Ok(devices)
}

/// Browses the network for `timeout` and returns the devices found,
/// deduplicated by device id.
pub fn discover_devices(timeout: Duration) -> CastResult<Vec<DeviceInfo>> {
    info!("Searching for Chromecast devices ({}s)...", timeout.as_secs());
    async_std::task::block_on(browse(timeout))
}

/// Picks the device matching `selector` among `devices`.
pub fn select_device(devices: &[DeviceInfo], selector: &DeviceSelector) -> Option<DeviceInfo> {
    devices.iter().find(|d| selector.matches(d)).cloned()
}

/// Finds the device to monitor.
///
/// With `selector.host` set, no discovery happens. Otherwise discovery is
/// repeated every `retry_delay` until a matching device shows up.
pub fn find_device(
    selector: &DeviceSelector,
    timeout: Duration,
    retry_delay: Duration,
) -> CastResult<DeviceInfo> {
    if let Some(host) = &selector.host {
        let device = DeviceInfo::manual(host, selector.port.unwrap_or(DEFAULT_CAST_PORT));
        info!("Using configured device at {}", device.location());
        return Ok(device);
    }

    loop {
        let devices = discover_devices(timeout)?;

        if let Some(device) = select_device(&devices, selector) {
            info!(
                "Found Chromecast: {} ({}) at {}",
                device.friendly_name,
                device.model_name,
                device.location()
            );
            return Ok(device);
        }

        match &selector.friendly_name {
            Some(name) if !devices.is_empty() => warn!(
                "No Chromecast named '{}' among {} device(s), retrying in {}s",
                name,
                devices.len(),
                retry_delay.as_secs()
            ),
            _ => warn!(
                "No Chromecast devices found, retrying in {}s",
                retry_delay.as_secs()
            ),
        }

        thread::sleep(retry_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn records() -> ServiceRecords {
        ServiceRecords {
            instance: Some(
                "Chromecast-Ultra-0123456789abcdef0123456789abcdef._googlecast._tcp.local"
                    .to_string(),
            ),
            addresses: vec![
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)),
            ],
            port: Some(8009),
            txt: vec![
                "id=0123456789abcdef0123456789abcdef".to_string(),
                "md=Chromecast Ultra".to_string(),
                "fn=Salon".to_string(),
                "broken".to_string(),
            ],
        }
    }

    #[test]
    fn test_device_info_prefers_ipv4_and_txt_name() {
        let info = device_info_from_records(&records()).unwrap();
        assert_eq!(info.host, "192.168.1.42");
        assert_eq!(info.port, 8009);
        assert_eq!(info.friendly_name, "Salon");
        assert_eq!(info.model_name, "Chromecast Ultra");
        assert_eq!(info.id, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_device_info_falls_back_to_instance_name() {
        let mut records = records();
        records.txt.clear();
        records.port = None;

        let info = device_info_from_records(&records).unwrap();
        assert_eq!(info.friendly_name, "Chromecast-Ultra");
        assert_eq!(info.port, 8009);
        assert_eq!(info.model_name, "Chromecast");
        assert_eq!(info.id, "chromecast-192.168.1.42-8009");
    }

    #[test]
    fn test_device_info_requires_an_address() {
        let mut records = records();
        records.addresses.clear();
        assert!(device_info_from_records(&records).is_none());
    }

    #[test]
    fn test_select_device() {
        let salon = DeviceInfo {
            friendly_name: "Salon".to_string(),
            ..DeviceInfo::manual("10.0.0.1", 8009)
        };
        let bureau = DeviceInfo {
            friendly_name: "Bureau".to_string(),
            ..DeviceInfo::manual("10.0.0.2", 8009)
        };
        let devices = vec![salon.clone(), bureau.clone()];

        assert_eq!(select_device(&devices, &DeviceSelector::default()), Some(salon));
        let selector = DeviceSelector {
            friendly_name: Some("BUREAU".to_string()),
            ..Default::default()
        };
        assert_eq!(select_device(&devices, &selector), Some(bureau));
        assert_eq!(select_device(&[], &selector), None);
    }

    #[test]
    fn test_find_device_with_host_skips_discovery() {
        let selector = DeviceSelector {
            host: Some("10.0.0.9".to_string()),
            port: Some(8010),
            ..Default::default()
        };
        let info = find_device(&selector, Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        assert_eq!(info.location(), "chromecast://10.0.0.9:8010");
    }
}
