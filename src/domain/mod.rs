// Domain layer: occurrence and boundary models plus the storage/pipeline ports.

pub mod model;
pub mod ports;
