// Shared telemetry decoding, lap segmentation and lap analysis.

pub mod buffers;
pub mod constants;
pub mod corners;
pub mod crypto;
pub mod delta;
pub mod events;
pub mod geometry;
pub mod model;
pub mod packet;
pub mod parser;
pub mod reference;
pub mod session;
