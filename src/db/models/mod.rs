//! Database models, one module per table family.

pub mod assignment;
pub mod evaluation;
pub mod notification;
pub mod project;
pub mod proposal;
pub mod user;

pub use assignment::*;
pub use evaluation::*;
pub use notification::*;
pub use project::*;
pub use proposal::*;
pub use user::*;
