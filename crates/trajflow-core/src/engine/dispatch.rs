//! Chain-of-responsibility command dispatch.
//!
//! Every instruction is offered to a fixed sequence of [`CommandHandler`]s. The first handler
//! that accepts it ends the chain; an instruction nobody accepts produces one warning and
//! changes nothing.

use super::actions::ActionError;
use super::args::{ArgError, ArgList};
use super::lists::topology::TopologyList;
use super::state::Settings;
use crate::core::io::registry::{FORMATS, help_text};
use crate::core::mask::{AtomMask, MaskError};
use crate::core::topology::TopologyError;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    Unrecognized,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid arguments: {source}")]
    Args {
        #[from]
        source: ArgError,
    },
    #[error("Cannot load topology: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },
    #[error("Invalid mask: {source}")]
    Mask {
        #[from]
        source: MaskError,
    },
    #[error("Cannot create action: {source}")]
    Action {
        #[from]
        source: ActionError,
    },
    #[error("'{command}' requires a file name")]
    MissingFileName { command: &'static str },
    #[error("No topology named '{0}' has been loaded")]
    UnknownTopology(String),
    #[error("Topology index {index} is out of range ({count} loaded)")]
    TopologyIndex { index: i64, count: usize },
    #[error("No topology has been loaded")]
    NoTopology,
    #[error("Format '{0}' cannot be written")]
    Unwritable(&'static str),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// What a handler may touch besides its own list.
pub struct DispatchContext<'a> {
    pub topologies: &'a mut TopologyList,
    pub settings: &'a mut Settings,
    pub rank: usize,
    pub size: usize,
}

pub trait CommandHandler {
    /// Inspects `args` and either consumes the instruction or passes.
    ///
    /// A handler returning [`DispatchOutcome::Unrecognized`] must leave all state untouched.
    fn try_dispatch(
        &mut self,
        args: &mut ArgList,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError>;
}

/// Offers `args` to `handlers` in order.
///
/// An empty instruction is accepted without effect. Tokens left unconsumed by the accepting
/// handler are reported in a warning.
pub fn dispatch(
    handlers: &mut [&mut dyn CommandHandler],
    args: &mut ArgList,
    ctx: &mut DispatchContext<'_>,
) -> Result<DispatchOutcome, DispatchError> {
    let Some(command) = args.command().map(str::to_string) else {
        return Ok(DispatchOutcome::Accepted);
    };
    for handler in handlers.iter_mut() {
        if handler.try_dispatch(args, ctx)? == DispatchOutcome::Accepted {
            let leftover = args.unmarked();
            if !leftover.is_empty() {
                warn!(command = %command, "Ignoring unrecognized arguments: {}", leftover.join(" "));
            }
            return Ok(DispatchOutcome::Accepted);
        }
    }
    warn!("Unknown command {command}");
    Ok(DispatchOutcome::Unrecognized)
}

/// Built-in directives: `parm`, `debug`, `noprogress`, `parminfo`, `formats`.
#[derive(Debug, Default)]
pub struct Directives;

impl CommandHandler for Directives {
    fn try_dispatch(
        &mut self,
        args: &mut ArgList,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if args.command_is("parm") {
            let path = args.next_string().ok_or(DispatchError::MissingFileName { command: "parm" })?;
            ctx.topologies.add(&path)?;
        } else if args.command_is("debug") {
            let level = args.next_integer(0);
            ctx.settings.debug = u32::try_from(level).map_err(|_| DispatchError::InvalidValue {
                key: "debug",
                reason: format!("{level} is negative"),
            })?;
            info!("Debug level set to {}", ctx.settings.debug);
        } else if args.command_is("noprogress") {
            ctx.settings.progress = false;
            info!("noprogress: Progress bar will not be shown.");
        } else if args.command_is("parminfo") {
            parm_info(args, ctx)?;
        } else if args.command_is("formats") {
            list_formats();
        } else {
            return Ok(DispatchOutcome::Unrecognized);
        }
        Ok(DispatchOutcome::Accepted)
    }
}

fn parm_info(args: &mut ArgList, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
    let index = args.next_integer(0);
    let topology = usize::try_from(index)
        .ok()
        .and_then(|i| ctx.topologies.get(i))
        .ok_or(DispatchError::TopologyIndex {
            index,
            count: ctx.topologies.len(),
        })?;
    let mut mask = match args.next_mask() {
        Some(expr) => AtomMask::new(&expr)?,
        None => AtomMask::all(),
    };
    let selected = mask.setup(topology);
    info!("{topology}: {selected} atoms selected by {mask}");
    for &atom in mask.selected() {
        if let Some(line) = topology.atom_info(atom) {
            info!("{line}");
        }
    }
    Ok(())
}

fn list_formats() {
    info!("Trajectory formats (detection order):");
    for descriptor in FORMATS {
        let status = if descriptor.factory.is_some() { "" } else { " (not available)" };
        info!("  {}{status}", descriptor.name);
        for help in help_text(descriptor.format) {
            for line in help.lines() {
                info!("    {line}");
            }
        }
    }
}
