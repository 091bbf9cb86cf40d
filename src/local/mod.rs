/*!
 * Local Module
 * In-process fallback execution
 */

mod executor;

pub use executor::LocalExecutor;
