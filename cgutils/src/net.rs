use get_if_addrs::get_if_addrs;
use std::net::{IpAddr, UdpSocket};

const LOOPBACK: &str = "127.0.0.1";

/// Devine l'adresse IP locale utilisée pour joindre le réseau.
///
/// Un socket UDP est "connecté" vers une adresse publique : aucun paquet
/// n'est émis, mais le système choisit l'interface de sortie, dont on lit
/// l'adresse. Retourne `127.0.0.1` si rien n'est exploitable.
///
/// C'est l'adresse qu'un téléphone sur le même Wi-Fi utilisera pour ouvrir
/// le panneau de contrôle.
pub fn guess_local_ip() -> String {
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return LOOPBACK.to_string();
    };

    if socket.connect("8.8.8.8:80").is_err() {
        return LOOPBACK.to_string();
    }

    match socket.local_addr() {
        Ok(addr) if !addr.ip().is_unspecified() => addr.ip().to_string(),
        _ => LOOPBACK.to_string(),
    }
}

/// Liste les adresses IPv4 non-loopback des interfaces locales,
/// sous la forme `(interface, adresse)`, triées et sans doublon.
pub fn list_local_ipv4() -> Vec<(String, IpAddr)> {
    let mut result: Vec<(String, IpAddr)> = match get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .map(|iface| {
                let ip = iface.ip();
                (iface.name, ip)
            })
            .filter(|(_, ip)| ip.is_ipv4())
            .collect(),
        Err(_) => Vec::new(),
    };

    result.sort();
    result.dedup();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_local_ip_is_parsable() {
        let ip = guess_local_ip();
        assert!(ip.parse::<IpAddr>().is_ok(), "not an IP address: {}", ip);
    }

    #[test]
    fn test_list_local_ipv4_filters_loopback_and_v6() {
        for (name, ip) in list_local_ipv4() {
            assert!(!name.is_empty());
            assert!(ip.is_ipv4());
            assert!(!ip.is_loopback());
        }
    }

    #[test]
    fn test_list_local_ipv4_has_no_duplicates() {
        let ips = list_local_ipv4();
        let mut deduped = ips.clone();
        deduped.dedup();
        assert_eq!(ips.len(), deduped.len());
    }
}
