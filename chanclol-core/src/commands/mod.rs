mod handler;
mod parser;

pub use handler::{CommandHandler, Response};
pub use parser::{parse, Command, ParseError};
