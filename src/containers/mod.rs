//! Small, purpose-built containers shared by the species and gene tree data
//! models: a pooled per-population event list and a label→index map.

pub mod eventlist;
pub mod labelmap;

pub use eventlist::{EventHandle, EventList};
pub use labelmap::LabelMap;
