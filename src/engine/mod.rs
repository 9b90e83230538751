//! Match orchestration core: execution units, routing layer, and the
//! control-plane protocol between them.

pub mod master;
pub mod protocol;
pub mod registry;
pub mod timers;
pub mod worker;
