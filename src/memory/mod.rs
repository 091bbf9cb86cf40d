/*!
 * Memory Module
 * Admission gating from projected downstream memory use
 */

mod gate;
mod probe;

pub use gate::{MemoryGate, PressureCallback, PressureDecision, PressureEvent};
pub use probe::{MemoryProbe, SystemMemoryProbe};
