//! High-level simulation assembly.

use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use crate::core::cluster::Cluster;
use crate::core::config::SimulationConfig;
use crate::core::energy::{energy_model_resolver, EnergyCostModel};
use crate::core::job::JobRef;
use crate::core::reporter::Reporter;
use crate::core::scheduler::{scheduler_resolver, Scheduler};
use crate::core::simulator::{SimulationStats, Simulator};

/// Wires cluster, scheduler, energy model and simulator together from a
/// [`SimulationConfig`] and runs job sets through them.
pub struct BatchSimulation {
    cluster: Rc<RefCell<Cluster>>,
    scheduler: Box<dyn Scheduler>,
    energy_model: Rc<RefCell<dyn EnergyCostModel>>,
    simulator: Simulator,
    config: SimulationConfig,
}

impl BatchSimulation {
    pub fn new(config: SimulationConfig) -> Self {
        let cluster = rc!(refcell!(Cluster::new(config.cluster.clone())));
        let scheduler = scheduler_resolver(&config.scheduler);
        let energy_model = energy_model_resolver(&config.energy_model);
        Self {
            cluster,
            scheduler,
            energy_model,
            simulator: Simulator::new(config.seed),
            config,
        }
    }

    /// Runs the configured simulation over the given jobs, notifying the
    /// reporter of every state transition.
    pub fn run(&mut self, jobs: &[JobRef], reporter: &mut dyn Reporter) -> SimulationStats {
        self.simulator.simulate(
            self.cluster.clone(),
            jobs,
            self.scheduler.as_mut(),
            self.energy_model.clone(),
            reporter,
            self.config.error_model,
        )
    }

    pub fn cluster(&self) -> Rc<RefCell<Cluster>> {
        self.cluster.clone()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}
