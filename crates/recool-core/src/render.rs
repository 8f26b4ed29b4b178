//! Human-readable device summaries.

use std::fmt;

use console::style;

use crate::types::{Device, ServiceInfo};

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = self.ip().to_string();
        let title = self.name().unwrap_or(&ip);
        writeln!(f, "==={}===", style(title).cyan().bold())?;
        writeln!(f, "{} {}", style("IP:").cyan().bold(), ip)?;

        if !self.has_open_services() {
            return Ok(());
        }

        writeln!(f, "Open {}-Ports:", style("TCP").cyan().bold())?;
        for (port, info) in self.services().iter().filter(|(_, s)| s.is_open()) {
            writeln!(f, " - {}{}", style(port).cyan().bold(), annotation(info))?;
        }
        Ok(())
    }
}

/// The parenthesised service description after a port number.
fn annotation(info: &ServiceInfo) -> String {
    match (
        info.name.as_str(),
        info.product.as_str(),
        info.version.as_str(),
    ) {
        ("", _, _) => String::new(),
        (name, "", _) => format!(" ({name})"),
        (name, product, "") => format!(" ({name} - {product})"),
        (name, product, version) => format!(" ({name} - {product}, {version})"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn service(state: &str, name: &str, product: &str, version: &str) -> ServiceInfo {
        ServiceInfo {
            state: state.to_string(),
            name: name.to_string(),
            product: product.to_string(),
            version: version.to_string(),
        }
    }

    fn device_with(services: Vec<(u16, ServiceInfo)>) -> Device {
        Device::restore(
            "192.168.1.20".parse().unwrap(),
            None,
            true,
            true,
            true,
            services.into_iter().collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_annotation_combinations() {
        assert_eq!(annotation(&service("open", "", "x", "y")), "");
        assert_eq!(annotation(&service("open", "http", "", "")), " (http)");
        assert_eq!(
            annotation(&service("open", "http", "nginx", "")),
            " (http - nginx)"
        );
        assert_eq!(
            annotation(&service("open", "http", "nginx", "1.24.0")),
            " (http - nginx, 1.24.0)"
        );
    }

    #[test]
    fn test_render_name_only_service() {
        let device = device_with(vec![(80, service("open", "http", "", ""))]);
        let text = console::strip_ansi_codes(&device.to_string()).to_string();

        assert!(text.contains("===192.168.1.20==="));
        assert!(text.contains("IP: 192.168.1.20"));
        assert!(text.contains(" - 80 (http)\n"));
        assert!(!text.contains("http -"));
    }

    #[test]
    fn test_render_without_open_ports_has_no_port_section() {
        let device = device_with(vec![(3306, service("filtered", "mysql", "", ""))]);
        let text = console::strip_ansi_codes(&device.to_string()).to_string();

        assert!(!text.contains("Open TCP-Ports"));
        assert!(!text.contains("3306"));
    }

    #[test]
    fn test_render_sorted_by_port_and_prefers_name() {
        let device = Device::restore(
            "10.0.0.5".parse().unwrap(),
            Some("nas.lan".to_string()),
            true,
            true,
            true,
            [
                (8080, service("open", "http-proxy", "", "")),
                (22, service("open", "ssh", "OpenSSH", "9.6")),
                (443, service("closed", "https", "", "")),
            ]
            .into_iter()
            .collect(),
        );
        let text = console::strip_ansi_codes(&device.to_string()).to_string();

        assert!(text.starts_with("===nas.lan===\n"));
        let ssh = text.find(" - 22 (ssh - OpenSSH, 9.6)").unwrap();
        let proxy = text.find(" - 8080 (http-proxy)").unwrap();
        assert!(ssh < proxy);
        assert!(!text.contains("443"));
    }
}
