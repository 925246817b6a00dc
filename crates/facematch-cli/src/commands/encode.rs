use std::any::Any;
use std::process::ExitCode;

use crate::cli::{EncodeArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::faces::{self, EncodeOutcome};
use crate::output::render_encode;

pub struct EncodeHandler {
    args: EncodeArgs,
    run: Box<dyn Fn(&EncodeArgs) -> AppResult<EncodeOutcome> + Send + Sync>,
    render: Box<dyn Fn(&EncodeOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl EncodeHandler {
    pub fn new(args: EncodeArgs) -> Self {
        Self::with_dependencies(args, faces::run_encode, render_encode)
    }

    pub fn with_dependencies(
        args: EncodeArgs,
        run: impl Fn(&EncodeArgs) -> AppResult<EncodeOutcome> + Send + Sync + 'static,
        render: impl Fn(&EncodeOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for EncodeHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
