// Adapters layer: concrete implementations for external systems (http, occurrence and
// boundary services, country lookup, storage).

pub mod country_lookup;
pub mod gbif;
pub mod geoboundaries;
pub mod http;
pub mod storage;
