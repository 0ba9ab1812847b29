use super::{Action, ActionError, ActionInit, mask_or_all, setup_mask};
use crate::core::mask::AtomMask;
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use crate::engine::args::ArgList;
use crate::engine::datasets::{DataSetId, DataSetList};
use tracing::info;

/// Radius of gyration of a mask, geometric unless `mass` is given.
pub struct RadiusOfGyration {
    name: String,
    out: Option<String>,
    mask: AtomMask,
    mass_weighted: bool,
    masses: Option<Vec<f64>>,
    set: Option<DataSetId>,
}

pub(super) fn build(args: &mut ArgList) -> Result<Box<dyn Action>, ActionError> {
    let out = args.key_string("out")?;
    let mass_weighted = args.has_key("mass");
    let mask = mask_or_all(args)?;
    let name = args.next_string().ok_or(ActionError::MissingArgument {
        action: "radgyr",
        what: "a data set name",
    })?;
    Ok(Box::new(RadiusOfGyration {
        name,
        out,
        mask,
        mass_weighted,
        masses: None,
        set: None,
    }))
}

impl Action for RadiusOfGyration {
    fn name(&self) -> &'static str {
        "radgyr"
    }

    fn init(&mut self, init: &mut ActionInit<'_>) -> Result<(), ActionError> {
        self.set = Some(init.add_dataset(&self.name, self.out.as_deref())?);
        Ok(())
    }

    fn setup(&mut self, topology: &Topology) -> Result<(), ActionError> {
        setup_mask(&mut self.mask, topology)?;
        self.masses = self.mass_weighted.then(|| topology.masses());
        Ok(())
    }

    fn do_action(
        &mut self,
        frame: &mut Frame,
        frame_num: usize,
        datasets: &mut DataSetList,
    ) -> Result<(), ActionError> {
        let set = self.set.ok_or(ActionError::NotSetUp)?;
        let masses = self.masses.as_deref();
        let atoms = self.mask.selected();
        let center = frame
            .centroid(atoms, masses)
            .ok_or_else(|| ActionError::Numerical(format!("{} has zero total mass", self.mask)))?;
        let (sum, total) = atoms.iter().fold((0.0, 0.0), |(sum, total), &i| {
            let w = masses.map_or(1.0, |m| m[i]);
            (sum + w * (frame.coords[i] - center).norm_squared(), total + w)
        });
        datasets.set(set, frame_num, (sum / total).sqrt())?;
        Ok(())
    }

    fn print(&mut self, datasets: &DataSetList) {
        if let Some(mean) = self.set.and_then(|id| datasets.get(id)).and_then(|s| s.mean()) {
            info!(set = %self.name, "Mean radius of gyration of {}: {mean:.3}", self.mask);
        }
    }
}
