use super::{Action, ActionError, ActionInit, mask_or_all, setup_mask};
use crate::core::mask::AtomMask;
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use crate::engine::args::ArgList;
use crate::engine::datasets::DataSetList;
use nalgebra::Point3;

/// Moves the whole frame so the mask centroid sits at the box center, or at the origin
/// when asked to or when the frame has no box.
pub struct Center {
    mask: AtomMask,
    origin: bool,
    mass_weighted: bool,
    masses: Option<Vec<f64>>,
}

pub(super) fn build(args: &mut ArgList) -> Result<Box<dyn Action>, ActionError> {
    let origin = args.has_key("origin");
    let mass_weighted = args.has_key("mass");
    Ok(Box::new(Center {
        mask: mask_or_all(args)?,
        origin,
        mass_weighted,
        masses: None,
    }))
}

impl Action for Center {
    fn name(&self) -> &'static str {
        "center"
    }

    fn init(&mut self, _init: &mut ActionInit<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn setup(&mut self, topology: &Topology) -> Result<(), ActionError> {
        setup_mask(&mut self.mask, topology)?;
        self.masses = self.mass_weighted.then(|| topology.masses());
        Ok(())
    }

    fn do_action(&mut self, frame: &mut Frame, _: usize, _: &mut DataSetList) -> Result<(), ActionError> {
        let centroid = frame
            .centroid(self.mask.selected(), self.masses.as_deref())
            .ok_or_else(|| ActionError::Numerical(format!("{} has zero total mass", self.mask)))?;
        let target = match frame.periodic_box {
            Some(cell) if !self.origin => cell.center(),
            _ => Point3::origin(),
        };
        frame.translate(&(target - centroid), None);
        Ok(())
    }
}
