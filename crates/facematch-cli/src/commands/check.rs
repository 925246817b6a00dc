use std::any::Any;
use std::process::ExitCode;

use crate::cli::{CheckArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::faces::{self, CheckOutcome};
use crate::output::render_check;

/// Exit status for an image the quality gate rejected, shared with
/// quality errors raised during enrollment and identification.
pub const REJECTED_EXIT_CODE: u8 = 3;

pub struct CheckHandler {
    args: CheckArgs,
    run: Box<dyn Fn(&CheckArgs) -> AppResult<CheckOutcome> + Send + Sync>,
    render: Box<dyn Fn(&CheckOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl CheckHandler {
    pub fn new(args: CheckArgs) -> Self {
        Self::with_dependencies(args, faces::run_check, render_check)
    }

    pub fn with_dependencies(
        args: CheckArgs,
        run: impl Fn(&CheckArgs) -> AppResult<CheckOutcome> + Send + Sync + 'static,
        render: impl Fn(&CheckOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for CheckHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        if outcome.accepted {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::from(REJECTED_EXIT_CODE))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
