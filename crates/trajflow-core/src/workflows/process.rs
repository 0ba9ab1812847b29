use crate::core::parallel::World;
use crate::engine::config::RunConfig;
use crate::engine::datasets::DataSetList;
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use crate::engine::run::{RunEngine, RunSummary};
use crate::engine::script::{ScriptError, ScriptEvent, ScriptReader};
use crate::engine::state::PtrajState;
use std::io::{self, BufRead, Cursor};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Where instructions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptInput {
    File(PathBuf),
    /// Standard input, treated as a terminal. Only valid with a single rank.
    Stdin,
    /// Script text held in memory.
    Text(String),
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Completed {
        summary: RunSummary,
        /// Every dataset, merged across ranks.
        datasets: DataSetList,
    },
    /// Interactive input ended with `quit`; nothing was run.
    Aborted,
}

/// Reads instructions into `state` until the script says to run or to stop.
///
/// Returns `false` when the script asked to stop.
fn read_script<R: BufRead>(
    mut reader: ScriptReader<R>,
    state: &mut PtrajState,
) -> Result<bool, ScriptError> {
    loop {
        match reader.next_event()? {
            ScriptEvent::Instruction(line) => {
                debug!(line = reader.line_number(), instruction = %line, "Dispatching.");
                if let Err(e) = state.dispatch(&line) {
                    warn!(instruction = %line, "Error processing '{line}': {e}");
                }
            }
            ScriptEvent::Go => return Ok(true),
            ScriptEvent::Quit => return Ok(false),
        }
    }
}

/// Runs one rank of a complete processing job.
///
/// Progress is only reported when this rank is the coordinator and the script left
/// progress enabled.
///
/// # Errors
///
/// Returns [`EngineError::Script`] when the script cannot be read (including interactive
/// input with more than one rank), [`EngineError::Topology`] when a command-line topology
/// cannot be loaded, and any error the run engine surfaces.
#[instrument(skip_all, name = "process_workflow", fields(rank = world.rank()))]
pub fn run(
    config: &RunConfig,
    input: &ScriptInput,
    world: &World,
    reporter: &ProgressReporter,
) -> Result<ProcessOutcome, EngineError> {
    let mut state = PtrajState::new(config, world.rank(), world.size());
    state.load_topologies(config)?;

    let max = config.max_line_length;
    let go = match input {
        ScriptInput::File(path) => {
            if world.is_master() {
                info!(path = %path.display(), "Reading input.");
            }
            read_script(ScriptReader::open(path, max)?, &mut state)?
        }
        ScriptInput::Stdin => {
            if world.size() > 1 {
                return Err(ScriptError::InteractiveParallel { size: world.size() }.into());
            }
            info!("Reading input from STDIN; type 'go' to run or 'quit' to exit.");
            read_script(ScriptReader::new(io::stdin().lock(), max).interactive(), &mut state)?
        }
        ScriptInput::Text(text) => {
            read_script(ScriptReader::new(Cursor::new(text.as_bytes()), max), &mut state)?
        }
    };
    if !go {
        info!("Input aborted with 'quit'.");
        return Ok(ProcessOutcome::Aborted);
    }

    let silent = ProgressReporter::new();
    let reporter = if world.is_master() && state.settings.progress {
        reporter
    } else {
        &silent
    };
    let summary = RunEngine::run(&mut state, world, reporter)?;
    Ok(ProcessOutcome::Completed {
        summary,
        datasets: state.datasets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RunConfigBuilder;
    use crate::test_utils::{capture_logs, write_crd, write_pdb_topology};
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    /// A three-atom system with a ten-frame trajectory.
    fn system() -> TempDir {
        let dir = tempdir().unwrap();
        let parm = write_pdb_topology(dir.path(), "sys.pdb", 3);
        let topology = crate::core::topology::load(&parm).unwrap();
        write_crd(dir.path(), "md.crd", &topology, 10);
        dir
    }

    fn config(dir: &Path, ranks: usize) -> RunConfig {
        RunConfigBuilder::new()
            .ranks(ranks)
            .max_line_length(1024)
            .data_precision(3)
            .progress(false)
            .topology(dir.join("sys.pdb"))
            .build()
            .unwrap()
    }

    fn models(path: &Path) -> Vec<usize> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter_map(|l| l.strip_prefix("MODEL"))
            .map(|n| n.trim().parse().unwrap())
            .collect()
    }

    mod end_to_end {
        use super::*;

        #[test]
        fn single_rank_writes_every_frame_in_order() {
            let dir = system();
            let out = dir.path().join("out.pdb");
            let script = format!(
                "trajin {}\ntranslate x 0.0\ntrajout {}\ngo\n",
                dir.path().join("md.crd").display(),
                out.display()
            );
            let (outcome, logs) = capture_logs(|| {
                run(&config(dir.path(), 1), &ScriptInput::Text(script), &World::serial(), &ProgressReporter::new())
            });
            let ProcessOutcome::Completed { summary, .. } = outcome.unwrap() else {
                panic!("run was aborted");
            };
            assert_eq!(summary.to_string(), "Read 10 frames and processed 10 frames.");
            assert!(logs.contains("Read 10 frames and processed 10 frames."));
            assert_eq!(models(&out), (1..=10).collect::<Vec<_>>());
        }

        #[test]
        fn two_ranks_split_frames_and_share_datasets() {
            let dir = system();
            let out = dir.path().join("out.pdb");
            let script = format!(
                "trajin {}\nradgyr rg\ndistance d @1 @3\ntrajout {}\n",
                dir.path().join("md.crd").display(),
                out.display()
            );
            let config = config(dir.path(), 2);
            let input = ScriptInput::Text(script);
            let outcomes = World::spawn(2, |world| {
                run(&config, &input, &world, &ProgressReporter::new()).unwrap()
            })
            .unwrap();

            assert_eq!(models(&dir.path().join("out.pdb.0")), vec![1, 2, 3, 4, 5]);
            assert_eq!(models(&dir.path().join("out.pdb.1")), vec![6, 7, 8, 9, 10]);
            assert!(!out.exists());

            let series: Vec<Vec<Vec<(usize, f64)>>> = outcomes
                .into_iter()
                .map(|outcome| match outcome {
                    ProcessOutcome::Completed { summary, datasets } => {
                        assert_eq!(summary.frames_read, 5);
                        datasets.iter().map(|(_, set)| set.iter().collect()).collect()
                    }
                    ProcessOutcome::Aborted => panic!("run was aborted"),
                })
                .collect();
            assert_eq!(series[0], series[1]);
            assert_eq!(series[0][0].len(), 10);
            assert_eq!(series[0][1].len(), 10);
        }

        #[test]
        fn output_names_follow_the_running_group_size() {
            let dir = system();
            let out = dir.path().join("out.pdb");
            let input = ScriptInput::Text(format!(
                "trajin {}\ntrajout {}\n",
                dir.path().join("md.crd").display(),
                out.display()
            ));
            let config = config(dir.path(), 1);
            World::spawn(2, |world| run(&config, &input, &world, &ProgressReporter::new()).unwrap()).unwrap();

            assert!(!out.exists());
            assert_eq!(models(&dir.path().join("out.pdb.0")), vec![1, 2, 3, 4, 5]);
            assert_eq!(models(&dir.path().join("out.pdb.1")), vec![6, 7, 8, 9, 10]);
        }

        #[test]
        fn rank_outputs_keep_the_topology_chosen_at_registration() {
            let dir = tempdir().unwrap();
            for (parm, crd, natom, frames) in [("a.pdb", "a.crd", 2, 1), ("b.pdb", "b.crd", 3, 2)] {
                let path = write_pdb_topology(dir.path(), parm, natom);
                let topology = crate::core::topology::load(&path).unwrap();
                write_crd(dir.path(), crd, &topology, frames);
            }
            let config = |ranks| {
                RunConfigBuilder::new()
                    .ranks(ranks)
                    .max_line_length(1024)
                    .data_precision(3)
                    .progress(false)
                    .topology(dir.path().join("a.pdb"))
                    .topology(dir.path().join("b.pdb"))
                    .build()
                    .unwrap()
            };
            let script = |out: &Path| {
                ScriptInput::Text(format!(
                    "trajin {}\ntrajin {} parmindex 1\ntrajout {}\n",
                    dir.path().join("a.crd").display(),
                    dir.path().join("b.crd").display(),
                    out.display()
                ))
            };
            let atoms = |path: &Path| {
                fs::read_to_string(path)
                    .unwrap()
                    .lines()
                    .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
                    .count()
            };

            let serial = dir.path().join("serial.pdb");
            run(&config(1), &script(&serial), &World::serial(), &ProgressReporter::new()).unwrap();
            assert_eq!(models(&serial), vec![1]);
            assert_eq!(atoms(&serial), 2);

            let split = dir.path().join("split.pdb");
            let (config, input) = (config(2), script(&split));
            World::spawn(2, |world| run(&config, &input, &world, &ProgressReporter::new()).unwrap()).unwrap();

            // Rank 0 has no frames of a.crd, so its output is never opened.
            assert!(!dir.path().join("split.pdb.0").exists());
            let rank1 = dir.path().join("split.pdb.1");
            assert_eq!(models(&rank1), vec![1]);
            assert_eq!(atoms(&rank1), 2);
        }

        #[test]
        fn data_files_are_written_once_by_the_coordinator() {
            let dir = system();
            let data = dir.path().join("dist.csv");
            let script = format!(
                "trajin {}\ndistance d @1 @2 out {}\n",
                dir.path().join("md.crd").display(),
                data.display()
            );
            let config = config(dir.path(), 2);
            let input = ScriptInput::Text(script);
            World::spawn(2, |world| run(&config, &input, &world, &ProgressReporter::new()).unwrap()).unwrap();

            let text = fs::read_to_string(&data).unwrap();
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines[0], "#Frame,d");
            assert_eq!(lines.len(), 11);
            assert_eq!(lines[10], "10,1.000");
        }
    }

    mod scripting {
        use super::*;

        #[test]
        fn unknown_and_failing_instructions_do_not_stop_the_run() {
            let dir = system();
            let script = format!(
                "strip :WAT\ntrajin\ntrajin {}\n",
                dir.path().join("md.crd").display()
            );
            let (outcome, logs) = capture_logs(|| {
                run(&config(dir.path(), 1), &ScriptInput::Text(script), &World::serial(), &ProgressReporter::new())
            });
            assert!(matches!(outcome.unwrap(), ProcessOutcome::Completed { .. }));
            assert!(logs.contains("Unknown command strip"));
            assert!(logs.contains("requires a file name"));
        }

        #[test]
        fn script_file_is_read_until_go() {
            let dir = system();
            let script = dir.path().join("run.in");
            fs::write(
                &script,
                format!(
                    "# comment\ntrajin {} \\\n  1 4\ngo\ntrajin {}\n",
                    dir.path().join("md.crd").display(),
                    dir.path().join("md.crd").display()
                ),
            )
            .unwrap();
            let outcome = run(
                &config(dir.path(), 1),
                &ScriptInput::File(script),
                &World::serial(),
                &ProgressReporter::new(),
            )
            .unwrap();
            let ProcessOutcome::Completed { summary, .. } = outcome else {
                panic!("run was aborted");
            };
            assert_eq!(summary.frames_read, 4);
        }

        #[test]
        fn over_long_lines_are_fatal() {
            let dir = system();
            let config = RunConfigBuilder::new()
                .ranks(1)
                .max_line_length(16)
                .data_precision(3)
                .build()
                .unwrap();
            let input = ScriptInput::Text(format!("trajin {}\n", dir.path().join("md.crd").display()));
            let err = run(&config, &input, &World::serial(), &ProgressReporter::new()).unwrap_err();
            assert!(matches!(
                err,
                EngineError::Script {
                    source: ScriptError::LineTooLong { .. }
                }
            ));
        }

        #[test]
        fn stdin_is_refused_with_several_ranks() {
            let dir = system();
            let config = config(dir.path(), 2);
            let errors = World::spawn(2, |world| {
                run(&config, &ScriptInput::Stdin, &world, &ProgressReporter::new()).unwrap_err()
            })
            .unwrap();
            for err in errors {
                assert!(matches!(
                    err,
                    EngineError::Script {
                        source: ScriptError::InteractiveParallel { size: 2 }
                    }
                ));
            }
        }

        #[test]
        fn missing_script_file_is_fatal() {
            let dir = system();
            let input = ScriptInput::File(dir.path().join("absent.in"));
            let err = run(&config(dir.path(), 1), &input, &World::serial(), &ProgressReporter::new()).unwrap_err();
            assert!(matches!(err, EngineError::Script { source: ScriptError::Open { .. } }));
        }
    }
}
