use batchsim::core::config::ClusterConfig;
use batchsim::core::failure::FailureModel;

fn failure_config() -> ClusterConfig {
    ClusterConfig {
        node_mtbf: 100_000.,
        node_mttr: 500.,
        node_mttr_deviation: 200.,
        node_min_repair_time: 120.,
        ..ClusterConfig::default()
    }
}

#[test]
// A fixed seed reproduces the exact same failure and repair sequences.
fn test_failure_sequences_are_reproducible() {
    let config = failure_config();
    let mut first = FailureModel::new(&config, 42);
    let mut second = FailureModel::new(&config, 42);

    for _ in 0..50 {
        assert_eq!(
            first.check_when_job_fails(10, 50_000.),
            second.check_when_job_fails(10, 50_000.)
        );
        assert_eq!(first.time_until_node_is_back(), second.time_until_node_is_back());
    }
}

#[test]
fn test_different_seeds_produce_different_draws() {
    let config = failure_config();
    let mut first = FailureModel::new(&config, 1);
    let mut second = FailureModel::new(&config, 2);

    let differs = (0..20).any(|_| first.time_until_node_is_back() != second.time_until_node_is_back());
    assert!(differs);
}

#[test]
fn test_repair_time_respects_floor() {
    let config = ClusterConfig {
        node_mttr: 100.,
        node_mttr_deviation: 500.,
        node_min_repair_time: 120.,
        ..ClusterConfig::default()
    };
    let mut model = FailureModel::new(&config, 9);
    for _ in 0..200 {
        assert!(model.time_until_node_is_back() >= 120.);
    }
}

#[test]
// With a one-second MTBF a long exposure practically always fails, and the
// returned failure time lies inside the exposure window.
fn test_failure_lands_inside_exposure() {
    let config = ClusterConfig {
        node_mtbf: 1.,
        ..failure_config()
    };
    let mut model = FailureModel::new(&config, 5);
    for _ in 0..100 {
        let failure = model.check_when_job_fails(10, 1e9);
        let time = failure.expect("failure draw missed a huge exposure window");
        assert!(time > 0.);
        assert!(time < 1e9);
    }
}

#[test]
// With the default 20-year MTBF a microsecond exposure never fails.
fn test_no_failure_for_tiny_exposure() {
    let config = ClusterConfig::default();
    let mut model = FailureModel::new(&config, 5);
    for _ in 0..100 {
        assert_eq!(model.check_when_job_fails(100, 1e-6), None);
    }
}
