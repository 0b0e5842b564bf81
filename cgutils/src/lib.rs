//! Petits utilitaires système partagés par les crates CastGuard.
//!
//! - [`guess_local_ip`] : adresse IP locale utilisée pour les connexions sortantes
//! - [`list_local_ipv4`] : adresses IPv4 de toutes les interfaces
//! - [`get_os_string`] : description courte de l'OS, exposée par `/api/info`

mod net;

pub use net::{guess_local_ip, list_local_ipv4};

/// Retourne une chaîne `"<OS>/<version>"`, par exemple `"Raspbian/11"`.
///
/// La version vaut `Unknown` quand `os_info` ne sait pas la déterminer.
pub fn get_os_string() -> String {
    let info = os_info::get();
    let version = info.version();

    if version == &os_info::Version::Unknown {
        format!("{}/Unknown", info.os_type())
    } else {
        format!("{}/{}", info.os_type(), version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_string_has_separator() {
        let os = get_os_string();
        assert!(os.contains('/'), "unexpected os string: {}", os);
        assert!(!os.starts_with('/'));
    }
}
