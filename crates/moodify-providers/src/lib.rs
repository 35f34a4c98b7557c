//! moodify-providers: clients for the external services behind the engine.
//!
//! Ambee supplies weather observations; Spotify resolves track names to
//! playable links. Both use blocking HTTP with a bounded timeout, so
//! create, call and drop them outside any async runtime thread.

pub mod ambee;
pub mod spotify;

pub use ambee::AmbeeClient;
pub use spotify::{CatalogError, CatalogSearch, SpotifyCatalog};
