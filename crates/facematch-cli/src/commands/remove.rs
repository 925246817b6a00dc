use std::any::Any;
use std::process::ExitCode;

use facematch_core::faces::enrollment::SubjectRemoval;

use crate::cli::{OutputMode, RemoveArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::faces;
use crate::output::render_remove;

pub struct RemoveHandler {
    args: RemoveArgs,
    run: Box<dyn Fn(&RemoveArgs) -> AppResult<SubjectRemoval> + Send + Sync>,
    render: Box<dyn Fn(&SubjectRemoval, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl RemoveHandler {
    pub fn new(args: RemoveArgs) -> Self {
        Self::with_dependencies(args, faces::run_remove, render_remove)
    }

    pub fn with_dependencies(
        args: RemoveArgs,
        run: impl Fn(&RemoveArgs) -> AppResult<SubjectRemoval> + Send + Sync + 'static,
        render: impl Fn(&SubjectRemoval, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for RemoveHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
