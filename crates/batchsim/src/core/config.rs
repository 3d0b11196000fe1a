//! Simulation configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Holds raw cluster parameters parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawClusterConfig {
    pub nodes: Option<u32>,
    pub cpus_per_processor: Option<u32>,
    pub processors_per_node: Option<u32>,
    pub node_mtbf: Option<f64>,
    pub node_mttr: Option<f64>,
    pub node_mttr_deviation: Option<f64>,
    pub node_min_repair_time: Option<f64>,
    pub cpu_frequency_power: Option<Vec<f64>>,
    pub node_power_consumption: Option<f64>,
    pub infrastructure_power_consumption: Option<f64>,
    pub max_job_time_min: Option<f64>,
    pub costs_system: Option<f64>,
    pub costs_infrastructure_annually: Option<f64>,
    pub system_life_duration: Option<f64>,
}

/// Static hardware and economic parameters of the simulated cluster.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Total number of compute nodes.
    pub nodes: u32,
    /// CPU cores per processor.
    pub cpus_per_processor: u32,
    /// Processors (sockets) per node.
    pub processors_per_node: u32,
    /// Mean time between failures of a single node in seconds.
    pub node_mtbf: f64,
    /// Mean time to repair a failed node in seconds.
    pub node_mttr: f64,
    /// Standard deviation of the repair time in seconds.
    pub node_mttr_deviation: f64,
    /// Lower bound on the repair time in seconds.
    pub node_min_repair_time: f64,
    /// Power draw in watts of one processor per selectable P-state.
    pub cpu_frequency_power: Vec<f64>,
    /// Baseline power draw in watts of one node outside the processors.
    pub node_power_consumption: f64,
    /// Power draw in watts of the surrounding infrastructure.
    pub infrastructure_power_consumption: f64,
    /// Longest allowed job runtime in minutes.
    pub max_job_time_min: f64,
    /// Acquisition cost of the system.
    pub costs_system: f64,
    /// Annual infrastructure cost.
    pub costs_infrastructure_annually: f64,
    /// Expected system lifetime in seconds.
    pub system_life_duration: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 1529,
            cpus_per_processor: 12,
            processors_per_node: 2,
            node_mtbf: 20. * 365. * 24. * 3600.,
            node_mttr: 2. * 24. * 3600.,
            node_mttr_deviation: 24. * 3600.,
            node_min_repair_time: 120.,
            cpu_frequency_power: vec![95., 95., 95., 95., 95.],
            node_power_consumption: 70.,
            infrastructure_power_consumption: 130_000.,
            max_job_time_min: 8. * 60.,
            costs_system: 33. * 1000. * 1000. / 2.,
            costs_infrastructure_annually: 4. * 1000. * 1000.,
            system_life_duration: 5. * 365. * 24. * 3600.,
        }
    }
}

impl ClusterConfig {
    fn from_raw(raw: RawClusterConfig) -> Self {
        let default = ClusterConfig::default();
        Self {
            nodes: raw.nodes.unwrap_or(default.nodes),
            cpus_per_processor: raw.cpus_per_processor.unwrap_or(default.cpus_per_processor),
            processors_per_node: raw.processors_per_node.unwrap_or(default.processors_per_node),
            node_mtbf: raw.node_mtbf.unwrap_or(default.node_mtbf),
            node_mttr: raw.node_mttr.unwrap_or(default.node_mttr),
            node_mttr_deviation: raw.node_mttr_deviation.unwrap_or(default.node_mttr_deviation),
            node_min_repair_time: raw.node_min_repair_time.unwrap_or(default.node_min_repair_time),
            cpu_frequency_power: raw.cpu_frequency_power.unwrap_or(default.cpu_frequency_power),
            node_power_consumption: raw.node_power_consumption.unwrap_or(default.node_power_consumption),
            infrastructure_power_consumption: raw
                .infrastructure_power_consumption
                .unwrap_or(default.infrastructure_power_consumption),
            max_job_time_min: raw.max_job_time_min.unwrap_or(default.max_job_time_min),
            costs_system: raw.costs_system.unwrap_or(default.costs_system),
            costs_infrastructure_annually: raw
                .costs_infrastructure_annually
                .unwrap_or(default.costs_infrastructure_annually),
            system_life_duration: raw.system_life_duration.unwrap_or(default.system_life_duration),
        }
    }
}

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub seed: Option<u64>,
    pub error_model: Option<bool>,
    pub scheduler: Option<String>,
    pub energy_model: Option<String>,
    pub cluster: Option<RawClusterConfig>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Seed of the random generators used for failures and workloads.
    pub seed: u64,
    /// Whether node failures are injected during the run.
    pub error_model: bool,
    /// Scheduling policy used to admit jobs, e.g. `FIFOBackfill` or
    /// `EnforcePriceAwareShutdown[hours_ahead=48]`.
    pub scheduler: String,
    /// Electricity price model, e.g. `FixedPrice` or
    /// `HourlyStockPrice[file=prices.csv]`.
    pub energy_model: String,
    /// Parameters of the simulated cluster.
    pub cluster: ClusterConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            error_model: true,
            scheduler: "FIFO".to_string(),
            energy_model: "FixedPrice".to_string(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: RawSimulationConfig = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));
        let default = SimulationConfig::default();

        Self {
            seed: raw.seed.unwrap_or(default.seed),
            error_model: raw.error_model.unwrap_or(default.error_model),
            scheduler: raw.scheduler.unwrap_or(default.scheduler),
            energy_model: raw.energy_model.unwrap_or(default.energy_model),
            cluster: raw.cluster.map(ClusterConfig::from_raw).unwrap_or(default.cluster),
        }
    }
}

/// Parses config value string, which consists of two parts - name and options.
/// Example: `EnforcePriceAwareShutdown[hours_ahead=48]` parts are name
/// `EnforcePriceAwareShutdown` and options string `hours_ahead=48`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.to_string(), value.to_string());
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_value() {
        assert_eq!(parse_config_value("FIFO"), ("FIFO".to_string(), None));
        assert_eq!(
            parse_config_value("PriceAwareShutdown[hours_ahead=48]"),
            ("PriceAwareShutdown".to_string(), Some("hours_ahead=48".to_string()))
        );
    }

    #[test]
    fn test_parse_options() {
        let options = parse_options("hours_ahead=48,backfill_length=100");
        assert_eq!(options.get("hours_ahead").unwrap(), "48");
        assert_eq!(options.get("backfill_length").unwrap(), "100");
        assert_eq!(options.get("unknown"), None);
    }
}
