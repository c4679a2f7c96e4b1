//! Rectification channel: a closed pipe split by a conical funnel.
//!
//! Builds the geometry, writes the boundary as a VTK file, then releases
//! self-propelled particles in the pipe and reports how they distribute on
//! either side of the funnel.
//!
//! Run with: cargo run --release --example rectification [output_dir]

use std::f64::consts::FRAC_PI_4;
use std::path::PathBuf;
use std::time::Instant;

use lbm3d::export::{save_classification, save_vtk_boundary, save_vtk_velocity};
use lbm3d::{
    Cylinder, DVec3, FluidConfig, HollowCone, Particles, Shape, Simulation, SimulationConfig,
    ThermostatConfig, Wall,
};

const LENGTH: f64 = 100.0;
const DIAMETER: f64 = 20.0;
const PADDING: f64 = 2.0;
const TIME_STEP: f64 = 0.01;

const SWIMMERS: usize = 200;
const SWIM_SPEED: f64 = 1.0;
const STEPS: u64 = 2000;
const REPORT_EVERY: u64 = 250;

fn geometry(box_l: DVec3) -> Vec<Shape> {
    let centre = box_l / 2.0;

    // Funnel: opening angle 45 degrees, narrow end facing +x
    let irad = 4.0;
    let orad = (DIAMETER - irad) / FRAC_PI_4.sin();
    let shift = 0.25 * orad * FRAC_PI_4.cos();

    vec![
        Cylinder::pipe(centre, DVec3::X, DIAMETER / 2.0, LENGTH).into(),
        Wall::new(DVec3::X, PADDING).into(),
        Wall::new(DVec3::NEG_X, -(LENGTH + PADDING)).into(),
        HollowCone::new(
            centre + DVec3::new(shift, 0.0, 0.0),
            DVec3::NEG_X,
            irad,
            orad,
            2.0,
            FRAC_PI_4,
        )
        .into(),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let outdir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("RESULTS_RECTIFICATION"));
    std::fs::create_dir_all(&outdir)?;

    let box_l = DVec3::new(
        LENGTH + 2.0 * PADDING,
        DIAMETER + 2.0 * PADDING,
        DIAMETER + 2.0 * PADDING,
    );
    let grid = [box_l.x as usize, box_l.y as usize, box_l.z as usize];
    let config = SimulationConfig::new(
        grid,
        FluidConfig::new(1.0, TIME_STEP, 1.0, 1.0),
        ThermostatConfig::new(0.01, 5.0, 42),
    );

    println!("=== Rectification geometry ===");
    println!("Box: {:?}, grid: {:?}", box_l, grid);

    let mut sim = Simulation::cpu(config, geometry(box_l))?;
    println!(
        "Mask: {} fluid / {} solid sites",
        sim.mask().fluid_count(),
        sim.mask().solid_count()
    );

    save_vtk_boundary(&outdir.join("boundary.vtk"), sim.lattice(), sim.mask())?;
    save_classification(&outdir.join("boundary.dat"), sim.lattice(), sim.mask())?;
    println!("Wrote boundary to {}", outdir.display());

    // Swimmers spread along the pipe axis, alternating heading
    let mut particles = Particles::new().with_box(box_l, [true; 3]);
    let centre = box_l / 2.0;
    for i in 0..SWIMMERS {
        let t = i as f64;
        let x = PADDING + 5.0 + (LENGTH - 10.0) * (t + 0.5) / SWIMMERS as f64;
        let phi = t * 2.399_963;
        let r = 3.0 * ((t * 0.618_034) % 1.0).sqrt();
        let pos = DVec3::new(x, centre.y + r * phi.cos(), centre.z + r * phi.sin());
        let lattice = sim.lattice();
        let blocked = lattice
            .resolve(lattice.world_to_cell(pos))
            .map_or(true, |idx| sim.mask().is_solid(idx));
        if blocked {
            continue;
        }
        particles.spawn(pos, DVec3::ZERO, 1.0);
        let heading = if i % 2 == 0 { DVec3::X } else { DVec3::NEG_X };
        if let Some(p) = particles.list.last_mut() {
            p.swim_velocity = heading * SWIM_SPEED;
            p.velocity = p.swim_velocity;
        }
    }
    println!("Spawned {} swimmers", particles.len());

    let funnel_x = centre.x;
    let start = Instant::now();
    for step in 1..=STEPS {
        let report = sim.advance(&mut particles, TIME_STEP)?;
        if step % REPORT_EVERY == 0 {
            let left = particles.list.iter().filter(|p| p.position.x < funnel_x).count();
            let right = particles.len() - left;
            println!(
                "step {:5}: left {:4} right {:4}  funnel force {:?}",
                step, left, right, report.boundary.shape_forces[3]
            );
        }
    }
    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "{} steps in {:.2}s ({:.1} steps/s)",
        STEPS,
        elapsed,
        STEPS as f64 / elapsed
    );

    let health = sim.health();
    if !health.is_stable() {
        eprintln!("  WARNING: fluid unstable: {:?}", health);
    }
    save_vtk_velocity(&outdir.join("velocity.vtk"), sim.lattice())?;
    Ok(())
}
