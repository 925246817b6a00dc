use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod check;
mod doctor;
mod encode;
mod enroll;
mod identify;
mod list;
mod remove;

pub use check::CheckHandler;
pub use doctor::DoctorHandler;
pub use encode::EncodeHandler;
pub use enroll::EnrollHandler;
pub use identify::IdentifyHandler;
pub use list::ListHandler;
pub use remove::RemoveHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Check(args) => Box::new(CheckHandler::new(args)),
            Commands::Encode(args) => Box::new(EncodeHandler::new(args)),
            Commands::Enroll(args) => Box::new(EnrollHandler::new(args)),
            Commands::Identify(args) => Box::new(IdentifyHandler::new(args)),
            Commands::Remove(args) => Box::new(RemoveHandler::new(args)),
            Commands::List(args) => Box::new(ListHandler::new(args)),
            Commands::Doctor(args) => Box::new(DoctorHandler::new(args)),
        }
    }
}
