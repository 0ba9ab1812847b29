//! Coordinate RMSD to a reference structure, with optional best-fit superposition.
//!
//! Fitting uses the Kabsch algorithm: both selections are centered, the optimal rotation is
//! taken from the SVD of their covariance matrix, and the whole frame is then rotated and
//! translated onto the reference so later actions and outputs see the fitted coordinates.

use super::{Action, ActionError, ActionInit, mask_or_all, setup_mask};
use crate::core::mask::AtomMask;
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use crate::engine::args::ArgList;
use crate::engine::datasets::{DataSetId, DataSetList};
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
enum ReferenceMode {
    /// The first frame this action sees.
    First,
    /// A reference frame loaded by name.
    Named(String),
    /// The first loaded reference frame.
    FirstLoaded,
}

pub struct Rmsd {
    name: String,
    out: Option<String>,
    mask: AtomMask,
    mode: ReferenceMode,
    fit: bool,
    mass_weighted: bool,
    /// Full reference frame for the loaded modes.
    reference_frame: Option<Frame>,
    /// Reference coordinates of the selected atoms, in selection order.
    reference: Option<Vec<Point3<f64>>>,
    weights: Vec<f64>,
    set: Option<DataSetId>,
}

pub(super) fn build(args: &mut ArgList) -> Result<Box<dyn Action>, ActionError> {
    let out = args.key_string("out")?;
    let fit = !args.has_key("nofit");
    let mass_weighted = args.has_key("mass");
    let mode = if let Some(name) = args.key_string("ref")? {
        ReferenceMode::Named(name)
    } else if args.has_key("reference") {
        ReferenceMode::FirstLoaded
    } else {
        args.has_key("first");
        ReferenceMode::First
    };
    let mask = mask_or_all(args)?;
    let name = args.next_string().ok_or(ActionError::MissingArgument {
        action: "rmsd",
        what: "a data set name",
    })?;
    Ok(Box::new(Rmsd {
        name,
        out,
        mask,
        mode,
        fit,
        mass_weighted,
        reference_frame: None,
        reference: None,
        weights: Vec::new(),
        set: None,
    }))
}

/// Weighted center of `points`.
fn center(points: &[Point3<f64>], weights: &[f64]) -> Option<Point3<f64>> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let sum = points
        .iter()
        .zip(weights)
        .fold(Vector3::zeros(), |acc, (p, w)| acc + p.coords * *w);
    Some(Point3::from(sum / total))
}

/// Optimal rotation taking the centered `target` onto the centered `reference`.
fn kabsch(
    target: &[Vector3<f64>],
    reference: &[Vector3<f64>],
    weights: &[f64],
) -> Result<Matrix3<f64>, ActionError> {
    let covariance = target
        .iter()
        .zip(reference)
        .zip(weights)
        .fold(Matrix3::zeros(), |acc, ((p, q), w)| acc + (p * q.transpose()) * *w);
    let svd = covariance.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(ActionError::Numerical("SVD of the covariance matrix failed".to_string()));
    };
    let d = (v_t.transpose() * u.transpose()).determinant().signum();
    let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
    Ok(v_t.transpose() * correction * u.transpose())
}

impl Rmsd {
    fn selected_coords(&self, frame: &Frame) -> Vec<Point3<f64>> {
        self.mask.selected().iter().map(|&i| frame.coords[i]).collect()
    }

    /// RMSD of `frame` against the reference; superposes the frame first when fitting.
    fn compare(&self, frame: &mut Frame, reference: &[Point3<f64>]) -> Result<f64, ActionError> {
        let target = self.selected_coords(frame);
        let total: f64 = self.weights.iter().sum();
        let zero_mass = || ActionError::Numerical(format!("{} has zero total mass", self.mask));

        if !self.fit {
            let sum: f64 = target
                .iter()
                .zip(reference)
                .zip(&self.weights)
                .map(|((p, q), w)| w * (p - q).norm_squared())
                .sum();
            return if total > 0.0 {
                Ok((sum / total).sqrt())
            } else {
                Err(zero_mass())
            };
        }

        let target_center = center(&target, &self.weights).ok_or_else(zero_mass)?;
        let reference_center = center(reference, &self.weights).ok_or_else(zero_mass)?;
        let centered_target: Vec<Vector3<f64>> = target.iter().map(|p| p - target_center).collect();
        let centered_reference: Vec<Vector3<f64>> =
            reference.iter().map(|q| q - reference_center).collect();
        let rotation = kabsch(&centered_target, &centered_reference, &self.weights)?;

        let sum: f64 = centered_target
            .iter()
            .zip(&centered_reference)
            .zip(&self.weights)
            .map(|((p, q), w)| w * (rotation * p - q).norm_squared())
            .sum();

        for coord in &mut frame.coords {
            *coord = reference_center + rotation * (*coord - target_center);
        }
        Ok((sum / total).sqrt())
    }
}

impl Action for Rmsd {
    fn name(&self) -> &'static str {
        "rmsd"
    }

    fn init(&mut self, init: &mut ActionInit<'_>) -> Result<(), ActionError> {
        let loaded = match &self.mode {
            ReferenceMode::First => None,
            ReferenceMode::Named(name) => Some(
                init.references
                    .find(name)
                    .ok_or_else(|| ActionError::ReferenceNotFound(name.clone()))?,
            ),
            ReferenceMode::FirstLoaded => Some(init.references.first().ok_or(ActionError::NoReference)?),
        };
        if let Some(reference) = loaded {
            debug!(set = %self.name, reference = %reference.name, "RMSD reference frame resolved.");
            self.reference_frame = Some(reference.frame.clone());
        }
        self.set = Some(init.add_dataset(&self.name, self.out.as_deref())?);
        Ok(())
    }

    fn setup(&mut self, topology: &Topology) -> Result<(), ActionError> {
        let previous = self.mask.selected().len();
        setup_mask(&mut self.mask, topology)?;
        self.weights = if self.mass_weighted {
            let masses = topology.masses();
            self.mask.selected().iter().map(|&i| masses[i]).collect()
        } else {
            vec![1.0; self.mask.selected().len()]
        };

        match &self.reference_frame {
            Some(frame) => {
                if frame.natom() != topology.natom() {
                    return Err(ActionError::ReferenceMismatch {
                        reference: frame.natom(),
                        topology: topology.natom(),
                    });
                }
                self.reference = Some(self.selected_coords(frame));
            }
            None if previous != self.mask.selected().len() => self.reference = None,
            None => {}
        }
        Ok(())
    }

    fn do_action(
        &mut self,
        frame: &mut Frame,
        frame_num: usize,
        datasets: &mut DataSetList,
    ) -> Result<(), ActionError> {
        let set = self.set.ok_or(ActionError::NotSetUp)?;
        let value = match self.reference.take() {
            Some(reference) => {
                let result = self.compare(frame, &reference);
                self.reference = Some(reference);
                result?
            }
            None => {
                self.reference = Some(self.selected_coords(frame));
                0.0
            }
        };
        datasets.set(set, frame_num, value)?;
        Ok(())
    }

    fn print(&mut self, datasets: &DataSetList) {
        if let Some(mean) = self.set.and_then(|id| datasets.get(id)).and_then(|s| s.mean()) {
            info!(set = %self.name, "Mean RMSD of {}: {mean:.3}", self.mask);
        }
    }
}
