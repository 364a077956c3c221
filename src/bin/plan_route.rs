//! Plan a route through a demo airspace and print the trajectory as JSON.

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use nalgebra::Vector3;

use skyplan::core::geom::AxisBox;
use skyplan::core::{
    CostInterval, Environment, Globe, LocalFrame, Obstacle, ObstacleShape, PlanningGrid, Position,
    SamplingEnvironment,
};
use skyplan::{build_planner, session::kind_supports, PlannerDefaults, PlannerKind, PlannerSpec, Scenario};

#[derive(Debug, Parser)]
#[command(name = "plan-route", about = "Plan a flight trajectory through a demo airspace")]
struct Args {
    /// Planner to run (astar, thetastar, ara, prm, lazyprm, rigidprm, rrt,
    /// hrrt, arrt, rrtstar, drrt, adrrt, faprm, fadprm, ofadprm, radprm)
    #[arg(long, default_value = "faprm")]
    planner: String,

    /// Edge length of the cubic airspace, meters
    #[arg(long, default_value_t = 1000.0)]
    extent: f64,

    /// Place a weather cell in the middle of the airspace
    #[arg(long)]
    weather: bool,

    /// RNG seed for the sampling planners
    #[arg(long)]
    seed: Option<u64>,

    /// Defaults file (flat JSON key/value)
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let kind: PlannerKind = args
        .planner
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let mut defaults = match &args.config {
        Some(path) => PlannerDefaults::from_file(path)?,
        None => PlannerDefaults::default(),
    }
    .apply_env();
    if args.seed.is_some() {
        defaults.seed = args.seed;
    }

    let frame = LocalFrame::new(Position::new(48.463, -123.312, 0.0), Globe::default());
    let now = Utc::now();
    let extent = Vector3::new(args.extent, args.extent, args.extent);

    let grid_based = matches!(
        kind,
        PlannerKind::ForwardAStar | PlannerKind::ThetaStar | PlannerKind::AraStar
    );
    let mut env = if grid_based {
        Environment::Grid(PlanningGrid::new(frame, extent, (10, 10, 10), now))
    } else {
        Environment::Sampling(SamplingEnvironment::new(
            frame,
            AxisBox::from_extent(extent),
            now,
        ))
    };
    debug_assert!(kind_supports(kind, &env));

    if args.weather {
        let center = frame.from_local(&nalgebra::Point3::new(
            args.extent / 2.0,
            args.extent / 2.0,
            args.extent / 2.0,
        ));
        env.embed(Obstacle::new(
            ObstacleShape::Cylinder {
                center,
                radius_m: args.extent / 8.0,
                base_m: 0.0,
                top_m: args.extent,
            },
            CostInterval::new("wx-demo", now - chrono::Duration::hours(1), now + chrono::Duration::hours(2), 60.0),
        ));
        tracing::info!("embedded demo weather cell");
    }

    let scenario = Scenario::default();
    let spec = PlannerSpec::new(kind).with_defaults(defaults);
    let mut planner = build_planner(&spec, &scenario);
    if !planner.supports_environment(&env) {
        bail!("planner {:?} does not support this environment", kind);
    }

    let margin = args.extent / 100.0;
    let origin = frame.from_local(&nalgebra::Point3::new(margin, margin, margin));
    let destination = frame.from_local(&nalgebra::Point3::new(
        args.extent - margin,
        args.extent - margin,
        args.extent - margin,
    ));

    let trajectory = planner.plan(&mut env, &origin, &destination, now);
    if trajectory.is_empty() {
        tracing::warn!("no plan found");
    } else {
        tracing::info!(
            waypoints = trajectory.len(),
            cost = trajectory.total_cost(),
            "plan complete"
        );
    }
    println!("{}", serde_json::to_string_pretty(&trajectory)?);
    Ok(())
}
