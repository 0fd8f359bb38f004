use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::model::report::{DecisionOutcome, DecisionRecord, PassReport};
use crate::runtime::config::{DaemonConfig, RouteConfig, TargetConfig};
use crate::runtime::probe::Prober;
use crate::runtime::routing::{apply_switch, RouteControl};
use crate::selector::best::best_interfaces;
use crate::selector::decision::{plan_switches, SwitchDecision};
use crate::selector::scoring::{target_score, RouteAggregate, ScoreTable};

pub struct ChooserDaemon {
    cfg: DaemonConfig,
    prober: Box<dyn Prober>,
    route_control: Box<dyn RouteControl>,
    dry_run: bool,
    running: Arc<AtomicBool>,
}

impl ChooserDaemon {
    pub fn new(
        cfg: DaemonConfig,
        prober: Box<dyn Prober>,
        route_control: Box<dyn RouteControl>,
        dry_run: bool,
    ) -> Self {
        Self {
            cfg,
            prober,
            route_control,
            dry_run,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn run_forever(&mut self) -> Result<()> {
        self.install_signal_handlers()?;

        info!(
            "abccd start: {} interface(s), {} route(s), pass every {:.0}s{}",
            self.cfg.interfaces.len(),
            self.cfg.routes.len(),
            self.cfg.pass_interval,
            if self.dry_run { " (dry-run)" } else { "" }
        );

        while self.running.load(Ordering::Relaxed) {
            let started = Instant::now();
            match self.run_pass() {
                Ok(report) => {
                    debug!(
                        "pass done: {} interface score(s), {} decision(s)",
                        report.scores.iter().count(),
                        report.decisions.len()
                    );
                }
                Err(err) => {
                    error!("pass failed: {err:#}");
                }
            }

            // sleep in short slices so ctrl-c stays responsive
            let interval = Duration::from_secs_f64(self.cfg.pass_interval);
            while self.running.load(Ordering::Relaxed) {
                let remaining = interval.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    break;
                }
                std::thread::sleep(remaining.min(Duration::from_millis(250)));
            }
        }

        info!("abccd stopped");
        Ok(())
    }

    fn install_signal_handlers(&self) -> Result<()> {
        let running = Arc::clone(&self.running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })?;
        Ok(())
    }

    /// One full evaluation cycle: score every (interface, route) pair, read
    /// the live routing snapshot, pick winners, and apply whatever beats the
    /// switch cost.
    pub fn run_pass(&mut self) -> Result<PassReport> {
        let scores = self.collect_scores();
        let snapshot = self.route_control.snapshot()?;
        let current = snapshot.current_interfaces();
        let best = best_interfaces(&scores);
        let decisions = plan_switches(&scores, &current, &best, &self.cfg.switch_costs());

        let mut records = Vec::with_capacity(decisions.len());
        for decision in &decisions {
            let outcome = self.apply_decision(decision);
            records.push(DecisionRecord::from_decision(decision, outcome));
        }

        Ok(PassReport {
            scores,
            current,
            best,
            decisions: records,
        })
    }

    fn collect_scores(&self) -> ScoreTable {
        let mut scores = ScoreTable::default();
        for (iface_name, iface) in &self.cfg.interfaces {
            for route_name in &iface.routes {
                // references were validated at config load
                let Some(route) = self.cfg.routes.get(route_name) else {
                    continue;
                };
                let score = self.score_route_via(iface_name, &iface.gateway, route_name, route);
                scores.insert(iface_name, route_name, score);
            }
        }
        scores
    }

    fn score_route_via(
        &self,
        iface_name: &str,
        gateway: &str,
        route_name: &str,
        route: &RouteConfig,
    ) -> f64 {
        let mut aggregate = RouteAggregate::default();
        for (address, target) in &route.targets {
            match self.measure_target(iface_name, gateway, route, address, target) {
                Some(score) => aggregate.add_measured(score, target.weight),
                None => aggregate.add_unmeasured(),
            }
        }
        let score = aggregate.finish();
        debug!("route {route_name} via {iface_name}: score {score:.1}");
        score
    }

    /// Probe-via-candidate-interface: force traffic to the target through
    /// the candidate gateway with a temporary host route, probe, then drop
    /// the route again. Returns None when the target could not be measured.
    fn measure_target(
        &self,
        iface_name: &str,
        gateway: &str,
        route: &RouteConfig,
        address: &str,
        target: &TargetConfig,
    ) -> Option<f64> {
        if let Err(err) = self.route_control.set_route(address, gateway) {
            warn!("target {address}: probe route via {iface_name} not installed, penalizing: {err:#}");
            return None;
        }

        let timeout = Duration::from_secs_f64(self.cfg.probe_timeout);
        let result = self.prober.probe(address, timeout, target.count);

        if let Err(err) = self.route_control.delete_route(address, gateway) {
            // the stale host route persists until the next pass overwrites it
            error!("target {address}: failed to remove probe route via {iface_name}: {err:#}");
        }

        Some(target_score(route.loss_mult, route.lag_mult, &result))
    }

    fn apply_decision(&self, decision: &SwitchDecision) -> DecisionOutcome {
        info!(
            "route {}: switching {} -> {} (current={:.1} best={:.1} cost={:.1})",
            decision.route,
            decision.from_interface,
            decision.to_interface,
            decision.current_score,
            decision.best_score,
            decision.switch_cost
        );

        if self.dry_run {
            info!("route {}: dry-run, routing table untouched", decision.route);
            return DecisionOutcome::DryRun;
        }

        let (Some(old_iface), Some(new_iface)) = (
            self.cfg.interfaces.get(&decision.from_interface),
            self.cfg.interfaces.get(&decision.to_interface),
        ) else {
            error!(
                "route {}: decision references an unconfigured interface",
                decision.route
            );
            return DecisionOutcome::Failed;
        };

        match apply_switch(
            self.route_control.as_ref(),
            &decision.route,
            &old_iface.gateway,
            &new_iface.gateway,
        ) {
            Ok(()) => DecisionOutcome::Applied,
            Err(err) => {
                error!("route {}: switch failed: {err:#}", decision.route);
                DecisionOutcome::Failed
            }
        }
    }
}
