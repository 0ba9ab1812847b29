use nalgebra::{Point3, Vector3};

/// Unit cell: three edge lengths (Å) and three angles (degrees, alpha/beta/gamma).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    pub lengths: Vector3<f64>,
    pub angles: Vector3<f64>,
}

impl PeriodicBox {
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Self {
        Self {
            lengths: Vector3::new(a, b, c),
            angles: Vector3::new(90.0, 90.0, 90.0),
        }
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.lengths / 2.0)
    }
}

/// One snapshot of a system.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub coords: Vec<Point3<f64>>,
    pub periodic_box: Option<PeriodicBox>,
    /// Simulation time in ps, when the format records it.
    pub time: Option<f64>,
}

impl Frame {
    pub fn new(natom: usize) -> Self {
        Self {
            coords: vec![Point3::origin(); natom],
            periodic_box: None,
            time: None,
        }
    }

    pub fn natom(&self) -> usize {
        self.coords.len()
    }

    /// Centroid of the selected atoms, weighted by `masses` when given.
    ///
    /// Returns `None` for an empty selection or zero total weight.
    pub fn centroid(&self, atoms: &[usize], masses: Option<&[f64]>) -> Option<Point3<f64>> {
        let mut sum = Vector3::zeros();
        let mut total = 0.0;
        for &i in atoms {
            let w = masses.map_or(1.0, |m| m[i]);
            sum += self.coords[i].coords * w;
            total += w;
        }
        (total > 0.0).then(|| Point3::from(sum / total))
    }

    /// Shifts the selected atoms (all atoms when `atoms` is `None`) by `delta`.
    pub fn translate(&mut self, delta: &Vector3<f64>, atoms: Option<&[usize]>) {
        match atoms {
            Some(selection) => {
                for &i in selection {
                    self.coords[i] += delta;
                }
            }
            None => {
                for p in &mut self.coords {
                    *p += delta;
                }
            }
        }
    }
}
