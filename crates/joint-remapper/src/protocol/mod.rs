//! Request/response control protocol.
//!
//! A request is a list of [`Value`]s whose first element is the opcode tag.
//! Two framings are understood: the modern one names an interface at
//! position 1, the legacy one puts the action there directly. Both are parsed
//! into a typed command before any subdevice is touched.

mod args;
mod dispatcher;
pub mod grammar;
mod legacy;
mod modern;
mod pid;
pub mod tags;
mod value;

pub use args::Args;
pub use dispatcher::{Command, Dispatcher, Response, Status};
pub use value::Value;
