//! End-to-end planning scenarios over grid and sampling environments.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use nalgebra::{Point3, Vector3};

use skyplan_core::geom::AxisBox;
use skyplan_core::{
    AircraftCapabilities, AircraftLink, CostInterval, CostPolicy, Environment, Globe, LocalFrame,
    Obstacle, ObstacleShape, PlanningGrid, Position, RiskPolicy, SamplingEnvironment, Trajectory,
};
use skyplan_link::SimulatedLink;
use skyplan_planners::{
    AnytimePlanner, AraStar, BasicPrm, Faprm, FaprmConfig, ForwardAStar, LazyPrm, Ofadprm,
    OnlinePlanner, Planner, PrmConfig, Rrt, RrtConfig, ThetaStar,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn frame() -> LocalFrame {
    LocalFrame::new(Position::new(0.0, 0.0, 0.0), Globe::default())
}

fn local(frame: &LocalFrame, x: f64, y: f64, z: f64) -> Position {
    frame.from_local(&Point3::new(x, y, z))
}

/// 10x10x10 unit grid over a 10 m cube.
fn unit_grid() -> Environment {
    Environment::Grid(PlanningGrid::new(
        frame(),
        Vector3::new(10.0, 10.0, 10.0),
        (10, 10, 10),
        now(),
    ))
}

/// Continuous box `[0, 1000]^3`.
fn big_box() -> Environment {
    Environment::Sampling(SamplingEnvironment::new(
        frame(),
        AxisBox::from_extent(Vector3::new(1000.0, 1000.0, 1000.0)),
        now(),
    ))
}

fn aircraft() -> AircraftCapabilities {
    AircraftCapabilities::default()
}

fn assert_trajectory_invariants(trajectory: &Trajectory) {
    let mut previous_eto: Option<DateTime<Utc>> = None;
    for w in &trajectory.waypoints {
        assert!(w.cost >= 0.0, "costs are non-negative");
        assert!(w.dtg >= 0.0);
        if let (Some(prev), Some(eto)) = (previous_eto, w.eto) {
            assert!(eto >= prev, "arrival times never run backwards");
        }
        if w.eto.is_some() {
            previous_eto = w.eto;
        }
    }
}

// ---- S1: uniform grid --------------------------------------------------

#[test]
fn s1_forward_astar_crosses_uniform_grid_at_manhattan_cost() {
    let mut env = unit_grid();
    let f = frame();
    let origin = local(&f, 0.0, 0.0, 0.0);
    let destination = local(&f, 9.0, 9.0, 9.0);

    let mut planner = ForwardAStar::new(aircraft())
        .with_policies(CostPolicy::Average, RiskPolicy::Ignorance);
    assert!(planner.supports_environment(&env));

    let trajectory = planner.plan(&mut env, &origin, &destination, now());
    assert!(!trajectory.is_empty());
    // 27 unit axis moves at uniform cost 1
    assert!((trajectory.total_cost() - 27.0).abs() < 1e-6);
    assert_eq!(trajectory.len(), 28);
    assert_trajectory_invariants(&trajectory);
}

#[test]
fn s1_round_trip_is_symmetric() {
    let mut env = unit_grid();
    let f = frame();
    let a = local(&f, 0.0, 0.0, 0.0);
    let b = local(&f, 9.0, 9.0, 9.0);

    let mut planner = ForwardAStar::new(aircraft());
    let forward = planner.plan(&mut env, &a, &b, now());
    let reverse = planner.plan(&mut env, &b, &a, now());
    assert!((forward.total_cost() - reverse.total_cost()).abs() < 1e-6);
    assert_eq!(forward.len(), reverse.len());
}

// ---- S2: hazard plane --------------------------------------------------

fn embed_hazard_plane(env: &mut Environment, cost: f64) {
    let f = frame();
    env.embed(Obstacle::new(
        ObstacleShape::Box {
            min: local(&f, 0.0, 0.0, 4.6),
            max: local(&f, 10.0, 10.0, 5.4),
        },
        CostInterval::new(
            "hazard-plane",
            now() - chrono::Duration::hours(1),
            now() + chrono::Duration::hours(1),
            cost,
        ),
    ));
}

#[test]
fn s2_hazard_plane_raises_average_cost() {
    let f = frame();
    let origin = local(&f, 0.0, 0.0, 0.0);
    let destination = local(&f, 9.0, 9.0, 9.0);

    let mut clean = unit_grid();
    let mut hazardous = unit_grid();
    embed_hazard_plane(&mut hazardous, 100.0);

    let mut planner = ForwardAStar::new(aircraft())
        .with_policies(CostPolicy::Average, RiskPolicy::Ignorance);
    let baseline = planner.plan(&mut clean, &origin, &destination, now());
    let raised = planner.plan(&mut hazardous, &origin, &destination, now());

    assert!(!raised.is_empty());
    assert!(raised.total_cost() > baseline.total_cost());
    // under ignorance the plan still climbs through the hazard layer
    assert!(raised.waypoints.iter().any(|w| (w.position.altitude_m - 5.0).abs() < 0.5));
}

#[test]
fn s2_avoidance_policy_rejects_the_hazard_layer() {
    let f = frame();
    let origin = local(&f, 0.0, 0.0, 0.0);
    let destination = local(&f, 9.0, 9.0, 9.0);

    let mut env = unit_grid();
    embed_hazard_plane(&mut env, 100.0);

    // 100 exceeds the avoidance threshold of 50; the layer spans the whole
    // grid, so no admissible crossing exists
    let mut planner = ForwardAStar::new(aircraft())
        .with_policies(CostPolicy::Average, RiskPolicy::Avoidance);
    let trajectory = planner.plan(&mut env, &origin, &destination, now());
    assert!(trajectory.is_empty());
}

#[test]
fn s2_duplicate_observations_do_not_double_count() {
    let f = frame();
    let origin = local(&f, 0.0, 0.0, 0.0);
    let destination = local(&f, 9.0, 9.0, 9.0);

    let mut once = unit_grid();
    embed_hazard_plane(&mut once, 100.0);

    // the same phenomenon received twice under one id
    let mut twice = unit_grid();
    embed_hazard_plane(&mut twice, 100.0);
    twice.add_cost_interval(CostInterval::new(
        "hazard-plane",
        now() - chrono::Duration::minutes(30),
        now() + chrono::Duration::minutes(30),
        100.0,
    ));

    let mut planner = ForwardAStar::new(aircraft())
        .with_policies(CostPolicy::Average, RiskPolicy::Ignorance);
    let single = planner.plan(&mut once, &origin, &destination, now());
    let duplicated = planner.plan(&mut twice, &origin, &destination, now());
    assert!((single.total_cost() - duplicated.total_cost()).abs() < 1e-6);
}

// ---- Theta* ------------------------------------------------------------

#[test]
fn theta_star_never_beats_grid_astar_on_cost() {
    let mut env = unit_grid();
    let f = frame();
    let origin = local(&f, 0.0, 0.0, 0.0);
    let destination = local(&f, 9.0, 9.0, 9.0);

    let mut astar = ForwardAStar::new(aircraft());
    let mut theta = ThetaStar::new(aircraft());
    let grid_plan = astar.plan(&mut env, &origin, &destination, now());
    let any_angle = theta.plan(&mut env, &origin, &destination, now());

    assert!(!any_angle.is_empty());
    assert!(any_angle.total_cost() <= grid_plan.total_cost() + 1e-6);
    assert_trajectory_invariants(&any_angle);
}

// ---- ARA* --------------------------------------------------------------

#[test]
fn arastar_emits_monotonically_improving_passes() {
    let mut env = unit_grid();
    let f = frame();
    let origin = local(&f, 0.0, 0.0, 0.0);
    let destination = local(&f, 9.0, 9.0, 9.0);

    let costs = Arc::new(Mutex::new(Vec::new()));
    let sink = costs.clone();

    let mut planner = AraStar::new(aircraft());
    planner.set_minimum_quality(0.0).unwrap();
    planner.set_maximum_quality(1.0).unwrap();
    planner.set_quality_improvement(0.25).unwrap();
    planner.add_revision_listener(Box::new(move |t: &Trajectory| {
        if !t.is_empty() {
            sink.lock().unwrap().push(t.total_cost());
        }
    }));

    let final_plan = planner.plan(&mut env, &origin, &destination, now());
    assert!(!final_plan.is_empty());

    let costs = costs.lock().unwrap();
    assert!(!costs.is_empty());
    for pair in costs.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-9, "anytime passes never regress");
    }
}

#[test]
fn anytime_setters_reject_invalid_inflation() {
    let mut planner = AraStar::new(aircraft());
    assert!(planner.set_minimum_quality(-0.1).is_err());
    assert!(planner.set_maximum_quality(1.5).is_err());
    assert!(planner.set_quality_improvement(0.0).is_err());
    assert!(planner.set_minimum_quality(0.5).is_ok());
    assert!(planner.set_maximum_quality(0.25).is_err());
}

// ---- S3: BasicPRM ------------------------------------------------------

#[test]
fn s3_basic_prm_stays_near_the_straight_line() {
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    // with 500 samples, a start this close to a corner occasionally has no
    // sample within the 200 m connection radius; a handful of seeds
    // separates the quality property from that connectivity lottery
    let mut successes = 0u32;
    for seed in 40..46u64 {
        let mut env = big_box();
        let config = PrmConfig {
            max_iter: 500,
            max_neighbors: 10,
            max_distance_m: 200.0,
            lambda: 0.5,
            seed: Some(seed),
        };
        let mut planner = BasicPrm::new(aircraft(), config);
        assert!(planner.supports_environment(&env));

        let trajectory = planner.plan(&mut env, &origin, &destination, now());
        if trajectory.is_empty() {
            continue;
        }
        successes += 1;

        let straight = env.normalized_distance(&origin, &destination);
        assert!(
            trajectory.total_cost() <= 1.3 * straight,
            "seed {seed}: cost {} exceeds 1.3x straight line {}",
            trajectory.total_cost(),
            straight
        );
        assert_trajectory_invariants(&trajectory);
    }
    assert!(successes >= 3, "only {successes}/6 roadmaps connected");
}

// ---- LazyPRM -----------------------------------------------------------

#[test]
fn lazy_prm_never_returns_a_blocked_path() {
    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let config = PrmConfig {
        max_iter: 600,
        max_neighbors: 10,
        max_distance_m: 300.0,
        lambda: 0.5,
        seed: Some(7),
    };
    let mut planner = LazyPrm::new(aircraft(), config);
    let first = planner.plan(&mut env, &origin, &destination, now());
    assert!(!first.is_empty());

    // block the middle of the found path after construction
    let mid = &first.waypoints[first.len() / 2];
    env.embed(Obstacle::new(
        ObstacleShape::Sphere {
            center: mid.position,
            radius_m: 60.0,
        },
        CostInterval::new(
            "popup",
            now() - chrono::Duration::minutes(5),
            now() + chrono::Duration::hours(1),
            100.0,
        ),
    ));

    let second = planner.plan(&mut env, &origin, &destination, now());
    if !second.is_empty() {
        for pair in second.waypoints.windows(2) {
            assert!(
                !env.check_conflict_segment(&pair[0].position, &pair[1].position, 0.0),
                "returned path crosses the popup obstacle"
            );
        }
    }
}

// ---- S4: seeded RRT success rate ---------------------------------------

#[test]
fn s4_seeded_rrt_succeeds_on_nearly_every_run() {
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let mut successes = 0u32;
    for seed in 0..100u64 {
        let mut env = big_box();
        let config = RrtConfig {
            max_iter: 2000,
            bias_pct: 5,
            epsilon_m: 50.0,
            goal_threshold_m: 50.0,
            seed: Some(seed),
            ..RrtConfig::default()
        };
        let mut planner = Rrt::new(aircraft(), config);
        let trajectory = planner.plan(&mut env, &origin, &destination, now());
        if !trajectory.is_empty() {
            successes += 1;
            assert_trajectory_invariants(&trajectory);
        }
    }
    assert!(successes >= 95, "only {successes}/100 runs found a plan");
}

// ---- S5: FAPRM anytime monotonicity ------------------------------------

#[test]
fn s5_faprm_inflation_passes_never_regress() {
    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let config = FaprmConfig {
        max_iter: 1500,
        max_neighbors: 10,
        max_distance_m: 200.0,
        bias_pct: 15,
        initial_beta: 0.0,
        final_beta: 1.0,
        step_beta: 0.1,
        lambda: 0.5,
        seed: Some(11),
    };

    let costs = Arc::new(Mutex::new(Vec::new()));
    let sink = costs.clone();
    let mut planner = Faprm::new(aircraft(), config);
    planner.add_revision_listener(Box::new(move |t: &Trajectory| {
        if !t.is_empty() {
            sink.lock().unwrap().push(t.total_cost());
        }
    }));

    let final_plan = planner.plan(&mut env, &origin, &destination, now());
    assert!(!final_plan.is_empty(), "inflation cycle never found a plan");

    let costs = costs.lock().unwrap();
    assert!(!costs.is_empty());
    for pair in costs.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-9, "emitted trajectory regressed");
    }
    assert!((final_plan.total_cost() - costs.last().unwrap()).abs() < 1e-9);
}

#[test]
fn faprm_density_counts_match_the_roadmap() {
    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let config = FaprmConfig {
        max_iter: 800,
        max_neighbors: 10,
        max_distance_m: 200.0,
        bias_pct: 15,
        initial_beta: 1.0,
        final_beta: 1.0,
        step_beta: 0.1,
        lambda: 0.5,
        seed: Some(3),
    };
    let mut planner = Faprm::new(aircraft(), config);
    let trajectory = planner.plan(&mut env, &origin, &destination, now());
    assert!(!trajectory.is_empty());

    let roadmap = planner.roadmap();
    for (id, w) in roadmap.pool.iter() {
        let expected = roadmap.count_within(&env, &w.position, 200.0);
        assert_eq!(
            w.density, expected,
            "density mismatch at waypoint {:?}",
            id
        );
    }
}

// ---- S6: online start shift --------------------------------------------

#[test]
fn s6_online_planner_shifts_its_start_ahead_of_the_vehicle() {
    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let link = Arc::new(SimulatedLink::new());
    link.connect();

    let config = FaprmConfig {
        max_iter: 1500,
        max_neighbors: 10,
        max_distance_m: 200.0,
        bias_pct: 15,
        initial_beta: 0.5,
        final_beta: 1.0,
        step_beta: 0.25,
        lambda: 0.5,
        seed: Some(21),
    };
    let mut planner = Ofadprm::new(aircraft(), config)
        .with_link(link.clone() as Arc<dyn AircraftLink>)
        .with_lookahead_offset(3)
        .with_max_online_rounds(2);
    planner.set_online(true);

    let trajectory = planner.plan(&mut env, &origin, &destination, now());
    assert!(!trajectory.is_empty());
    assert!(link.upload_count() >= 1, "improved plans upload over the link");

    // the vehicle made progress, so the search start moved off the origin
    let start = planner.start_position().expect("start exists");
    assert_ne!(start.precision(), origin.precision());
    // and the remaining plan begins at the shifted start
    assert_eq!(
        trajectory.first().unwrap().position.precision(),
        start.precision()
    );
}

#[test]
fn s6_update_start_resets_the_search_origin() {
    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let config = FaprmConfig {
        max_iter: 1500,
        max_neighbors: 10,
        max_distance_m: 200.0,
        bias_pct: 15,
        initial_beta: 1.0,
        final_beta: 1.0,
        step_beta: 0.25,
        lambda: 0.5,
        seed: Some(5),
    };
    let mut planner = Ofadprm::new(aircraft(), config);
    let first = planner.plan(&mut env, &origin, &destination, now());
    assert!(first.len() > 5, "need a plan long enough to shift into");

    let shifted_to = first.waypoints[5].position;
    planner.update_start(&mut env, &shifted_to);
    assert_eq!(
        planner.start_position().unwrap().precision(),
        shifted_to.precision()
    );
}

// ---- dynamic repair ----------------------------------------------------

fn popup_obstacle(at: Position) -> Obstacle {
    Obstacle::new(
        ObstacleShape::Sphere {
            center: at,
            radius_m: 80.0,
        },
        CostInterval::new(
            "popup-cell",
            now() - chrono::Duration::minutes(5),
            now() + chrono::Duration::hours(1),
            100.0,
        ),
    )
}

#[test]
fn drrt_repairs_around_a_popup_obstacle() {
    use skyplan_planners::{Drrt, DynamicPlanner};

    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let config = RrtConfig {
        max_iter: 3000,
        bias_pct: 10,
        epsilon_m: 60.0,
        goal_threshold_m: 60.0,
        seed: Some(17),
        ..RrtConfig::default()
    };
    let mut planner = Drrt::new(aircraft(), config);
    let first = planner.plan(&mut env, &origin, &destination, now());
    assert!(!first.is_empty());

    let mid = first.waypoints[first.len() / 2].position;
    env.embed(popup_obstacle(mid));

    let repaired = planner.world_changed(&mut env);
    if !repaired.is_empty() {
        for pair in repaired.waypoints.windows(2) {
            assert!(
                !env.check_conflict_segment(&pair[0].position, &pair[1].position, 0.0),
                "repaired path still crosses the popup obstacle"
            );
        }
        assert_trajectory_invariants(&repaired);
    }
}

#[test]
fn fadprm_repairs_incrementally_after_a_world_change() {
    use skyplan_planners::{DynamicPlanner, Fadprm};

    let mut env = big_box();
    let f = frame();
    let origin = local(&f, 10.0, 10.0, 10.0);
    let destination = local(&f, 990.0, 990.0, 990.0);

    let config = FaprmConfig {
        max_iter: 1500,
        max_neighbors: 10,
        max_distance_m: 200.0,
        bias_pct: 15,
        initial_beta: 1.0,
        final_beta: 1.0,
        step_beta: 0.25,
        lambda: 0.5,
        seed: Some(9),
    };
    let mut planner = Fadprm::new(aircraft(), config);
    let first = planner.plan(&mut env, &origin, &destination, now());
    assert!(!first.is_empty());
    let search_before = planner.search_id();

    let mid = first.waypoints[first.len() / 2].position;
    env.embed(popup_obstacle(mid));

    let repaired = planner.world_changed(&mut env);
    assert_eq!(planner.search_id(), search_before + 1);
    if !repaired.is_empty() {
        for pair in repaired.waypoints.windows(2) {
            assert!(
                !env.check_conflict_segment(&pair[0].position, &pair[1].position, 0.0),
                "repaired path still crosses the popup obstacle"
            );
        }
    }
}
