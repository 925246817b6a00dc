use std::any::Any;
use std::process::ExitCode;

use crate::cli::{ListArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::faces::{self, ListOutcome};
use crate::output::render_list;

pub struct ListHandler {
    args: ListArgs,
    run: Box<dyn Fn(&ListArgs) -> AppResult<ListOutcome> + Send + Sync>,
    render: Box<dyn Fn(&ListOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl ListHandler {
    pub fn new(args: ListArgs) -> Self {
        Self::with_dependencies(args, faces::run_list, render_list)
    }

    pub fn with_dependencies(
        args: ListArgs,
        run: impl Fn(&ListArgs) -> AppResult<ListOutcome> + Send + Sync + 'static,
        render: impl Fn(&ListOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for ListHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
