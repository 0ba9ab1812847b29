use super::{Action, ActionError, ActionInit, setup_mask};
use crate::core::mask::AtomMask;
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use crate::engine::args::ArgList;
use crate::engine::datasets::{DataSetId, DataSetList};
use tracing::debug;

/// Distance between the centroids of two masks.
pub struct Distance {
    name: String,
    out: Option<String>,
    mask1: AtomMask,
    mask2: AtomMask,
    geometric: bool,
    masses: Option<Vec<f64>>,
    set: Option<DataSetId>,
}

pub(super) fn build(args: &mut ArgList) -> Result<Box<dyn Action>, ActionError> {
    let out = args.key_string("out")?;
    let geometric = args.has_key("geom");
    let missing = |what| ActionError::MissingArgument {
        action: "distance",
        what,
    };
    let mask1 = args.next_mask().ok_or_else(|| missing("two atom masks"))?;
    let mask2 = args.next_mask().ok_or_else(|| missing("two atom masks"))?;
    let name = args.next_string().ok_or_else(|| missing("a data set name"))?;
    Ok(Box::new(Distance {
        name,
        out,
        mask1: AtomMask::new(&mask1)?,
        mask2: AtomMask::new(&mask2)?,
        geometric,
        masses: None,
        set: None,
    }))
}

impl Action for Distance {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn init(&mut self, init: &mut ActionInit<'_>) -> Result<(), ActionError> {
        self.set = Some(init.add_dataset(&self.name, self.out.as_deref())?);
        debug!(
            set = %self.name,
            "Distance between {} and {}{}.",
            self.mask1,
            self.mask2,
            if self.geometric { " (geometric centers)" } else { "" }
        );
        Ok(())
    }

    fn setup(&mut self, topology: &Topology) -> Result<(), ActionError> {
        setup_mask(&mut self.mask1, topology)?;
        setup_mask(&mut self.mask2, topology)?;
        self.masses = (!self.geometric).then(|| topology.masses());
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
        let (Some(c1), Some(c2)) = (
            frame.centroid(self.mask1.selected(), masses),
            frame.centroid(self.mask2.selected(), masses),
        ) else {
            return Err(ActionError::Numerical("mask has zero total mass".to_string()));
        };
        datasets.set(set, frame_num, (c1 - c2).norm())?;
        Ok(())
    }
}
