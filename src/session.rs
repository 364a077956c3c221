//! Session glue: build a planner from a named specification and a
//! populated scenario.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use skyplan_core::{AircraftCapabilities, AircraftLink, DesirabilityZone, Environment};
use skyplan_planners::{
    ADrrt, ARrt, AraStar, BasicPrm, Drrt, Fadprm, Faprm, FaprmConfig, ForwardAStar, HRrt, LazyPrm,
    Ofadprm, Planner, PrmConfig, Radprm, RigidPrm, Rrt, RrtConfig, RrtStar, ThetaStar,
};

use crate::config::PlannerDefaults;

/// The planner families the session layer can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerKind {
    ForwardAStar,
    ThetaStar,
    AraStar,
    BasicPrm,
    LazyPrm,
    RigidPrm,
    Rrt,
    HRrt,
    ARrt,
    RrtStar,
    Drrt,
    ADrrt,
    Faprm,
    Fadprm,
    Ofadprm,
    Radprm,
}

impl FromStr for PlannerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fas" | "astar" | "forward-astar" => Ok(Self::ForwardAStar),
            "ts" | "thetastar" | "theta-star" => Ok(Self::ThetaStar),
            "ara" | "arastar" => Ok(Self::AraStar),
            "prm" | "basicprm" => Ok(Self::BasicPrm),
            "lazyprm" => Ok(Self::LazyPrm),
            "rigidprm" => Ok(Self::RigidPrm),
            "rrt" => Ok(Self::Rrt),
            "hrrt" => Ok(Self::HRrt),
            "arrt" => Ok(Self::ARrt),
            "rrtstar" | "rrt*" => Ok(Self::RrtStar),
            "drrt" => Ok(Self::Drrt),
            "adrrt" => Ok(Self::ADrrt),
            "faprm" => Ok(Self::Faprm),
            "fadprm" => Ok(Self::Fadprm),
            "ofadprm" => Ok(Self::Ofadprm),
            "radprm" => Ok(Self::Radprm),
            other => Err(format!("unknown planner: {other}")),
        }
    }
}

/// A named planner specification with its property defaults.
#[derive(Debug, Clone)]
pub struct PlannerSpec {
    pub kind: PlannerKind,
    pub defaults: PlannerDefaults,
}

impl PlannerSpec {
    pub fn new(kind: PlannerKind) -> Self {
        Self {
            kind,
            defaults: PlannerDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: PlannerDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

/// A populated planning scenario: aircraft, desirability zones and an
/// optional datalink. The environment travels separately into `plan`.
pub struct Scenario {
    pub aircraft: AircraftCapabilities,
    pub zones: Vec<DesirabilityZone>,
    pub link: Option<Arc<dyn AircraftLink>>,
    pub online: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            aircraft: AircraftCapabilities::default(),
            zones: Vec::new(),
            link: None,
            online: false,
        }
    }
}

impl Scenario {
    pub fn new(aircraft: AircraftCapabilities) -> Self {
        Self {
            aircraft,
            ..Self::default()
        }
    }
}

fn rrt_config(d: &PlannerDefaults) -> RrtConfig {
    RrtConfig {
        max_iter: d.max_iter,
        bias_pct: d.bias_pct,
        epsilon_m: d.epsilon_m,
        goal_threshold_m: d.goal_threshold_m,
        seed: d.seed,
        ..RrtConfig::default()
    }
}

fn prm_config(d: &PlannerDefaults) -> PrmConfig {
    PrmConfig {
        max_iter: d.max_iter,
        max_neighbors: d.max_neighbors,
        max_distance_m: d.max_distance_m,
        lambda: d.lambda,
        seed: d.seed,
    }
}

fn faprm_config(d: &PlannerDefaults) -> FaprmConfig {
    FaprmConfig {
        max_iter: d.max_iter,
        max_neighbors: d.max_neighbors,
        max_distance_m: d.max_distance_m,
        bias_pct: d.bias_pct,
        initial_beta: d.minimum_quality,
        final_beta: d.maximum_quality,
        step_beta: d.quality_improvement,
        lambda: d.lambda,
        seed: d.seed,
    }
}

/// Construct a planner for a scenario.
///
/// The returned planner still has to `supports_environment` the
/// environment it is asked to search.
pub fn build_planner(spec: &PlannerSpec, scenario: &Scenario) -> Box<dyn Planner> {
    let aircraft = scenario.aircraft;
    let d = &spec.defaults;

    match spec.kind {
        PlannerKind::ForwardAStar => Box::new(ForwardAStar::new(aircraft)),
        PlannerKind::ThetaStar => Box::new(ThetaStar::new(aircraft)),
        PlannerKind::AraStar => Box::new(AraStar::new(aircraft)),
        PlannerKind::BasicPrm => {
            Box::new(BasicPrm::new(aircraft, prm_config(d)).with_zones(scenario.zones.clone()))
        }
        PlannerKind::LazyPrm => {
            Box::new(LazyPrm::new(aircraft, prm_config(d)).with_zones(scenario.zones.clone()))
        }
        PlannerKind::RigidPrm => {
            Box::new(RigidPrm::new(aircraft, prm_config(d)).with_zones(scenario.zones.clone()))
        }
        PlannerKind::Rrt => Box::new(Rrt::new(aircraft, rrt_config(d))),
        PlannerKind::HRrt => Box::new(HRrt::new(aircraft, rrt_config(d))),
        PlannerKind::ARrt => Box::new(ARrt::new(aircraft, rrt_config(d))),
        PlannerKind::RrtStar => Box::new(RrtStar::new(aircraft, rrt_config(d))),
        PlannerKind::Drrt => Box::new(Drrt::new(aircraft, rrt_config(d))),
        PlannerKind::ADrrt => Box::new(ADrrt::new(aircraft, rrt_config(d))),
        PlannerKind::Faprm => {
            Box::new(Faprm::new(aircraft, faprm_config(d)).with_zones(scenario.zones.clone()))
        }
        PlannerKind::Fadprm => {
            Box::new(Fadprm::new(aircraft, faprm_config(d)).with_zones(scenario.zones.clone()))
        }
        PlannerKind::Ofadprm => {
            let mut planner = Ofadprm::new(aircraft, faprm_config(d))
                .with_zones(scenario.zones.clone())
                .with_lookahead_offset(d.lookahead_offset);
            if let Some(link) = &scenario.link {
                planner = planner.with_link(Arc::clone(link));
            }
            use skyplan_planners::OnlinePlanner;
            planner.set_online(scenario.online);
            let _ = planner.set_position_threshold(d.position_threshold_m);
            Box::new(planner)
        }
        PlannerKind::Radprm => {
            Box::new(Radprm::new(aircraft, faprm_config(d)).with_zones(scenario.zones.clone()))
        }
    }
}

/// Whether a planner kind fits an environment variant without building it.
pub fn kind_supports(kind: PlannerKind, env: &Environment) -> bool {
    match kind {
        PlannerKind::ForwardAStar | PlannerKind::ThetaStar | PlannerKind::AraStar => env.is_grid(),
        _ => env.is_sampling(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nalgebra::Vector3;
    use skyplan_core::geom::AxisBox;
    use skyplan_core::{Globe, LocalFrame, PlanningGrid, Position, SamplingEnvironment};

    fn frame() -> LocalFrame {
        LocalFrame::new(Position::new(0.0, 0.0, 0.0), Globe::default())
    }

    #[test]
    fn planner_names_parse() {
        assert_eq!("faprm".parse::<PlannerKind>().unwrap(), PlannerKind::Faprm);
        assert_eq!("ts".parse::<PlannerKind>().unwrap(), PlannerKind::ThetaStar);
        assert!("warp-drive".parse::<PlannerKind>().is_err());
    }

    #[test]
    fn built_planners_respect_environment_variants() {
        let grid = Environment::Grid(PlanningGrid::new(
            frame(),
            Vector3::new(10.0, 10.0, 10.0),
            (10, 10, 10),
            Utc::now(),
        ));
        let sampling = Environment::Sampling(SamplingEnvironment::new(
            frame(),
            AxisBox::from_extent(Vector3::new(100.0, 100.0, 100.0)),
            Utc::now(),
        ));
        let scenario = Scenario::default();

        let astar = build_planner(&PlannerSpec::new(PlannerKind::ForwardAStar), &scenario);
        assert!(astar.supports_environment(&grid));
        assert!(!astar.supports_environment(&sampling));

        let faprm = build_planner(&PlannerSpec::new(PlannerKind::Faprm), &scenario);
        assert!(faprm.supports_environment(&sampling));
        assert!(!faprm.supports_environment(&grid));
    }
}
