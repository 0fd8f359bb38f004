use std::collections::BTreeMap;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub gateway: String,
    pub interface: String,
}

/// Route -> (gateway, interface) mapping observed from the live system at
/// the start of a pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingSnapshot {
    entries: BTreeMap<String, SnapshotEntry>,
}

impl RoutingSnapshot {
    /// Scrapes `ip route show` output. Only lines of the shape
    /// `<destination> via <gateway> dev <interface> ...` are kept; directly
    /// connected and blackhole routes carry no gateway and are skipped.
    pub fn parse(route_list: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in route_list.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let destination = tokens[0];
            let mut gateway = None;
            let mut interface = None;
            for (idx, token) in tokens.iter().enumerate() {
                if *token == "via" && idx + 1 < tokens.len() {
                    gateway = Some(tokens[idx + 1]);
                } else if *token == "dev" && idx + 1 < tokens.len() {
                    interface = Some(tokens[idx + 1]);
                }
            }
            if let (Some(gateway), Some(interface)) = (gateway, interface) {
                entries.insert(
                    destination.to_string(),
                    SnapshotEntry {
                        gateway: gateway.to_string(),
                        interface: interface.to_string(),
                    },
                );
            }
        }
        Self { entries }
    }

    pub fn insert(&mut self, route: &str, gateway: &str, interface: &str) {
        self.entries.insert(
            route.to_string(),
            SnapshotEntry {
                gateway: gateway.to_string(),
                interface: interface.to_string(),
            },
        );
    }

    pub fn get(&self, route: &str) -> Option<&SnapshotEntry> {
        self.entries.get(route)
    }

    pub fn current_interfaces(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(route, entry)| (route.clone(), entry.interface.clone()))
            .collect()
    }
}

pub trait RouteControl: Send {
    fn snapshot(&self) -> Result<RoutingSnapshot>;
    fn set_route(&self, destination: &str, gateway: &str) -> Result<()>;
    fn delete_route(&self, destination: &str, gateway: &str) -> Result<()>;
}

/// Drives the kernel routing table through the `ip` binary. In dry-run mode
/// mutations are logged and skipped while reads still hit the real table.
pub struct LinuxIpRouteControl {
    dry_run: bool,
}

impl LinuxIpRouteControl {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn run_ip(&self, args: &[&str], mutating: bool) -> Result<String> {
        if self.dry_run && mutating {
            info!("route dry-run: ip {}", args.join(" "));
            return Ok(String::new());
        }
        let output = Command::new("ip")
            .args(args)
            .output()
            .with_context(|| format!("failed to execute ip {}", args.join(" ")))?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            return Ok(stdout);
        }
        anyhow::bail!("ip {} failed: {}", args.join(" "), stderr.trim())
    }
}

impl RouteControl for LinuxIpRouteControl {
    fn snapshot(&self) -> Result<RoutingSnapshot> {
        let text = self.run_ip(&["route", "show"], false)?;
        Ok(RoutingSnapshot::parse(&text))
    }

    fn set_route(&self, destination: &str, gateway: &str) -> Result<()> {
        let _ = self.run_ip(&["route", "replace", destination, "via", gateway], true)?;
        Ok(())
    }

    fn delete_route(&self, destination: &str, gateway: &str) -> Result<()> {
        let _ = self.run_ip(&["route", "del", destination, "via", gateway], true)?;
        Ok(())
    }
}

/// Moves a route from the old gateway to the new one. Both steps must
/// succeed; when the add fails after a successful delete, the old route is
/// restored so the destination never stays unset.
pub fn apply_switch(
    control: &dyn RouteControl,
    route: &str,
    old_gateway: &str,
    new_gateway: &str,
) -> Result<()> {
    control
        .delete_route(route, old_gateway)
        .with_context(|| format!("failed to remove route {route} via {old_gateway}"))?;

    if let Err(add_err) = control.set_route(route, new_gateway) {
        match control.set_route(route, old_gateway) {
            Ok(()) => warn!("route {route}: restored via {old_gateway} after failed switch"),
            Err(restore_err) => error!(
                "route {route} left unset: add via {new_gateway} failed ({add_err}), \
restore via {old_gateway} failed ({restore_err})"
            ),
        }
        return Err(add_err.context(format!("failed to add route {route} via {new_gateway}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn parse_keeps_only_gatewayed_routes() {
        let text = "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n\
8.8.8.8 via 10.64.0.1 dev wwan0\n\
10.0.0.0/24 dev eth1 proto kernel scope link src 10.0.0.5\n\
blackhole 192.0.2.0/24\n";
        let snapshot = RoutingSnapshot::parse(text);

        let default = snapshot.get("default").expect("default route parsed");
        assert_eq!(default.gateway, "192.168.1.1");
        assert_eq!(default.interface, "eth0");

        let host = snapshot.get("8.8.8.8").expect("host route parsed");
        assert_eq!(host.interface, "wwan0");

        assert!(snapshot.get("10.0.0.0/24").is_none());
        assert!(snapshot.get("blackhole").is_none());
        assert_eq!(snapshot.current_interfaces().len(), 2);
    }

    #[derive(Default)]
    struct ControlCalls {
        set: Vec<(String, String)>,
        deleted: Vec<(String, String)>,
    }

    struct FakeRouteControl {
        calls: Arc<Mutex<ControlCalls>>,
        fail_delete: bool,
        fail_set_via: Option<String>,
    }

    impl FakeRouteControl {
        fn new(calls: Arc<Mutex<ControlCalls>>) -> Self {
            Self {
                calls,
                fail_delete: false,
                fail_set_via: None,
            }
        }
    }

    impl RouteControl for FakeRouteControl {
        fn snapshot(&self) -> Result<RoutingSnapshot> {
            Ok(RoutingSnapshot::default())
        }

        fn set_route(&self, destination: &str, gateway: &str) -> Result<()> {
            if self.fail_set_via.as_deref() == Some(gateway) {
                anyhow::bail!("set refused for {destination} via {gateway}");
            }
            self.calls
                .lock()
                .expect("control lock poisoned")
                .set
                .push((destination.to_string(), gateway.to_string()));
            Ok(())
        }

        fn delete_route(&self, destination: &str, gateway: &str) -> Result<()> {
            if self.fail_delete {
                anyhow::bail!("delete refused for {destination} via {gateway}");
            }
            self.calls
                .lock()
                .expect("control lock poisoned")
                .deleted
                .push((destination.to_string(), gateway.to_string()));
            Ok(())
        }
    }

    #[test]
    fn apply_switch_deletes_old_then_adds_new() {
        let calls = Arc::new(Mutex::new(ControlCalls::default()));
        let control = FakeRouteControl::new(Arc::clone(&calls));

        apply_switch(&control, "default", "192.168.1.1", "10.64.0.1")
            .expect("switch should apply");

        let calls = calls.lock().expect("control lock poisoned");
        assert_eq!(
            calls.deleted,
            vec![("default".to_string(), "192.168.1.1".to_string())]
        );
        assert_eq!(
            calls.set,
            vec![("default".to_string(), "10.64.0.1".to_string())]
        );
    }

    #[test]
    fn apply_switch_stops_when_delete_fails() {
        let calls = Arc::new(Mutex::new(ControlCalls::default()));
        let mut control = FakeRouteControl::new(Arc::clone(&calls));
        control.fail_delete = true;

        assert!(apply_switch(&control, "default", "192.168.1.1", "10.64.0.1").is_err());

        let calls = calls.lock().expect("control lock poisoned");
        assert!(calls.set.is_empty());
    }

    #[test]
    fn apply_switch_restores_old_route_when_add_fails() {
        let calls = Arc::new(Mutex::new(ControlCalls::default()));
        let mut control = FakeRouteControl::new(Arc::clone(&calls));
        control.fail_set_via = Some("10.64.0.1".to_string());

        assert!(apply_switch(&control, "default", "192.168.1.1", "10.64.0.1").is_err());

        let calls = calls.lock().expect("control lock poisoned");
        assert_eq!(
            calls.deleted,
            vec![("default".to_string(), "192.168.1.1".to_string())]
        );
        // the only successful set is the compensating restore
        assert_eq!(
            calls.set,
            vec![("default".to_string(), "192.168.1.1".to_string())]
        );
    }
}
