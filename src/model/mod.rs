pub mod transcript;
pub mod types;

pub use transcript::Transcript;
pub use types::{EndSite, Intron, StartSite};
