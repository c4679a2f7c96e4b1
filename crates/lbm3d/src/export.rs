//! Snapshot exporters for external visualisation.
//!
//! All writers emit one value per site in flat index order (x fastest).
//! Boundary values are the [`SiteClass::code`](crate::boundary::SiteClass::code)
//! of each site.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::boundary::BoundaryMask;
use crate::lattice::Lattice;

fn vtk_header<W: Write>(out: &mut W, title: &str, lattice: &Lattice) -> io::Result<()> {
    let [nx, ny, nz] = lattice.dims();
    let a = lattice.agrid();
    writeln!(out, "# vtk DataFile Version 2.0")?;
    writeln!(out, "{}", title)?;
    writeln!(out, "ASCII")?;
    writeln!(out, "DATASET STRUCTURED_POINTS")?;
    writeln!(out, "DIMENSIONS {} {} {}", nx, ny, nz)?;
    writeln!(out, "ORIGIN {} {} {}", 0.5 * a, 0.5 * a, 0.5 * a)?;
    writeln!(out, "SPACING {} {} {}", a, a, a)?;
    writeln!(out, "POINT_DATA {}", lattice.site_count())
}

/// Legacy VTK structured-points file with the boundary classification.
pub fn write_vtk_boundary<W: Write>(
    out: &mut W,
    lattice: &Lattice,
    mask: &BoundaryMask,
) -> io::Result<()> {
    vtk_header(out, "lbboundaries", lattice)?;
    writeln!(out, "SCALARS boundary int 1")?;
    writeln!(out, "LOOKUP_TABLE default")?;
    for class in mask.classes() {
        writeln!(out, "{}", class.code())?;
    }
    Ok(())
}

/// Legacy VTK structured-points file with the fluid velocity (MD units).
pub fn write_vtk_velocity<W: Write>(out: &mut W, lattice: &Lattice) -> io::Result<()> {
    vtk_header(out, "lbfluid", lattice)?;
    writeln!(out, "VECTORS velocity float")?;
    for idx in 0..lattice.site_count() {
        let v = lattice.site_velocity(idx);
        writeln!(out, "{} {} {}", v.x as f32, v.y as f32, v.z as f32)?;
    }
    Ok(())
}

/// Plain text dump: `x y z code` per line, site-centre coordinates.
pub fn write_classification<W: Write>(
    out: &mut W,
    lattice: &Lattice,
    mask: &BoundaryMask,
) -> io::Result<()> {
    writeln!(out, "# x y z class (0 fluid, 1 solid, 2 link boundary)")?;
    for (idx, class) in mask.classes().iter().enumerate() {
        let [i, j, k] = lattice.cell_coords(idx);
        let c = lattice.cell_center(i, j, k);
        writeln!(out, "{} {} {} {}", c.x, c.y, c.z, class.code())?;
    }
    Ok(())
}

/// Write the boundary VTK file to `path`.
pub fn save_vtk_boundary(path: &Path, lattice: &Lattice, mask: &BoundaryMask) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_vtk_boundary(&mut out, lattice, mask)?;
    out.flush()
}

/// Write the velocity VTK file to `path`.
pub fn save_vtk_velocity(path: &Path, lattice: &Lattice) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_vtk_velocity(&mut out, lattice)?;
    out.flush()
}

/// Write the classification dump to `path`.
pub fn save_classification(path: &Path, lattice: &Lattice, mask: &BoundaryMask) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_classification(&mut out, lattice, mask)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FluidConfig, SimulationConfig, ThermostatConfig};
    use crate::shapes::Wall;
    use glam::DVec3;

    fn setup() -> (Lattice, BoundaryMask) {
        let config = SimulationConfig::new(
            [3, 2, 2],
            FluidConfig::new(2.0, 1.0, 1.0, 1.0),
            ThermostatConfig::default(),
        );
        let lattice = Lattice::new(&config).unwrap();
        // Solid for x <= 2
        let wall = Wall::new(DVec3::X, 2.0);
        let mask = BoundaryMask::build(&lattice, &[wall.into()], Default::default()).unwrap();
        (lattice, mask)
    }

    #[test]
    fn test_vtk_boundary_layout() {
        let (lattice, mask) = setup();
        let mut buf = Vec::new();
        write_vtk_boundary(&mut buf, &lattice, &mask).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[4], "DIMENSIONS 3 2 2");
        assert_eq!(lines[5], "ORIGIN 1 1 1");
        assert_eq!(lines[7], "POINT_DATA 12");
        let values: Vec<&str> = lines[10..].to_vec();
        assert_eq!(values.len(), 12);
        // x = 0 column is solid, x fastest
        assert_eq!(&values[..3], &["1", "2", "2"]);
    }

    #[test]
    fn test_classification_scan_order() {
        let (lattice, mask) = setup();
        let mut buf = Vec::new();
        write_classification(&mut buf, &lattice, &mask).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0], "1 1 1 1");
        assert_eq!(rows[1], "3 1 1 2");
        assert_eq!(rows[3], "1 3 1 1");
    }

    #[test]
    fn test_vtk_velocity_rows() {
        let (lattice, _) = setup();
        let mut buf = Vec::new();
        write_vtk_velocity(&mut buf, &lattice).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("VECTORS velocity float"));
        assert_eq!(text.lines().count(), 9 + 12);
    }
}
