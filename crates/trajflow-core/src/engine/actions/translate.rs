use super::{Action, ActionError, ActionInit, mask_or_all, setup_mask};
use crate::core::mask::AtomMask;
use crate::core::models::frame::Frame;
use crate::core::models::topology::Topology;
use crate::engine::args::ArgList;
use crate::engine::datasets::DataSetList;
use nalgebra::Vector3;

pub struct Translate {
    delta: Vector3<f64>,
    mask: AtomMask,
}

pub(super) fn build(args: &mut ArgList) -> Result<Box<dyn Action>, ActionError> {
    let delta = Vector3::new(
        args.key_double("x", 0.0)?,
        args.key_double("y", 0.0)?,
        args.key_double("z", 0.0)?,
    );
    Ok(Box::new(Translate {
        delta,
        mask: mask_or_all(args)?,
    }))
}

impl Action for Translate {
    fn name(&self) -> &'static str {
        "translate"
    }

    fn init(&mut self, _init: &mut ActionInit<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn setup(&mut self, topology: &Topology) -> Result<(), ActionError> {
        setup_mask(&mut self.mask, topology)
    }

    fn do_action(&mut self, frame: &mut Frame, _: usize, _: &mut DataSetList) -> Result<(), ActionError> {
        frame.translate(&self.delta, Some(self.mask.selected()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::args::ArgError;
    use crate::test_utils::line_topology;
    use nalgebra::Point3;

    #[test]
    fn shifts_only_the_selected_atoms() {
        let mut action = build(&mut ArgList::new("x 1.5 z -2 @2")).unwrap();
        action.setup(&line_topology(2)).unwrap();
        let mut frame = Frame::new(2);
        action.do_action(&mut frame, 0, &mut DataSetList::new()).unwrap();
        assert_eq!(frame.coords[0], Point3::origin());
        assert_eq!(frame.coords[1], Point3::new(1.5, 0.0, -2.0));
    }

    #[test]
    fn rejects_non_numeric_offsets() {
        assert!(matches!(
            build(&mut ArgList::new("x far")),
            Err(ActionError::Args {
                source: ArgError::InvalidNumber { .. }
            })
        ));
    }
}
