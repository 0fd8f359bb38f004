use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub gateway: String,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub weight: f64,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub loss_mult: f64,
    pub lag_mult: f64,
    pub switch_cost: f64,
    pub targets: BTreeMap<String, TargetConfig>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub interfaces: BTreeMap<String, InterfaceConfig>,
    pub routes: BTreeMap<String, RouteConfig>,
    pub pass_interval: f64,
    pub probe_timeout: f64,
}

impl DaemonConfig {
    pub fn switch_costs(&self) -> BTreeMap<String, f64> {
        self.routes
            .iter()
            .map(|(name, route)| (name.clone(), route.switch_cost))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    gateway: String,
    #[serde(default)]
    routes: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTarget {
    weight: Option<f64>,
    count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    loss_mult: Option<f64>,
    lag_mult: Option<f64>,
    switch_cost: Option<f64>,
    #[serde(default)]
    targets: BTreeMap<String, Option<RawTarget>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTimers {
    pass_interval: Option<f64>,
    probe_timeout: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawDaemonConfig {
    #[serde(default)]
    interfaces: BTreeMap<String, RawInterface>,
    #[serde(default)]
    routes: BTreeMap<String, RawRoute>,
    timers: Option<RawTimers>,
}

/// Reads and validates the chooser configuration. All optional fields are
/// defaulted here, once; the rest of the daemon never falls back silently.
pub fn load_daemon_config(path: &Path) -> Result<DaemonConfig> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let raw_cfg: RawDaemonConfig =
        serde_yaml::from_str(&raw_text).context("failed to parse chooser config yaml")?;

    let timers = raw_cfg.timers.unwrap_or_default();

    let mut routes = BTreeMap::new();
    for (name, raw_route) in raw_cfg.routes {
        let mut targets = BTreeMap::new();
        for (address, raw_target) in raw_route.targets {
            let address = address.trim().to_string();
            if address.is_empty() {
                bail!("route {name}: target with empty address");
            }
            let raw_target = raw_target.unwrap_or_default();
            let weight = raw_target.weight.unwrap_or(1.0);
            if !weight.is_finite() || weight < 0.0 {
                bail!("route {name}: target {address} has invalid weight {weight}");
            }
            let count = raw_target.count.unwrap_or(10);
            if count == 0 {
                bail!("route {name}: target {address} has probe count 0");
            }
            targets.insert(address, TargetConfig { weight, count });
        }
        if targets.is_empty() {
            bail!("route {name}: no probe targets configured");
        }
        routes.insert(
            name,
            RouteConfig {
                loss_mult: raw_route.loss_mult.unwrap_or(10.0),
                lag_mult: raw_route.lag_mult.unwrap_or(1.0),
                switch_cost: raw_route.switch_cost.unwrap_or(100.0),
                targets,
            },
        );
    }

    let mut interfaces = BTreeMap::new();
    for (name, raw_iface) in raw_cfg.interfaces {
        let gateway = raw_iface.gateway.trim().to_string();
        if gateway.is_empty() {
            bail!("interface {name}: empty gateway");
        }
        for route in &raw_iface.routes {
            if !routes.contains_key(route) {
                bail!("interface {name}: references undefined route {route}");
            }
        }
        interfaces.insert(
            name,
            InterfaceConfig {
                gateway,
                routes: raw_iface.routes,
            },
        );
    }

    if interfaces.is_empty() {
        bail!("no interfaces configured");
    }

    Ok(DaemonConfig {
        interfaces,
        routes,
        pass_interval: timers.pass_interval.unwrap_or(60.0).max(1.0),
        probe_timeout: timers.probe_timeout.unwrap_or(2.0).max(1.0),
    })
}
