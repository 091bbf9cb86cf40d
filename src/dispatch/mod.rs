/*!
 * Dispatch Module
 * The single-use facade a host drives a conversion batch through
 */

mod dispatcher;
mod types;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use types::{DispatchError, DispatchResult, Phase, RunReport};
