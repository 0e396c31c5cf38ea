//! Domain record types shared between the core and storage backends.

mod guilds;
mod ids;
mod members;
mod quests;
mod requests;

pub use guilds::*;
pub use ids::*;
pub use members::*;
pub use quests::*;
pub use requests::*;
