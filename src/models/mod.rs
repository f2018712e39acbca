pub mod guild;

pub use guild::{Guild, UnavailableGuild};
