pub mod agent;
pub mod mission;
pub mod reputation;

pub use agent::*;
pub use mission::*;
pub use reputation::*;
