pub mod flows;
pub mod roles;
pub mod state;
pub mod statistics;

pub use flows::*;
pub use roles::*;
pub use state::*;
pub use statistics::*;
