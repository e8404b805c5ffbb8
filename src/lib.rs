//! Packet ordering and packet-length bookkeeping for JPEG 2000
//! codestreams (ISO/IEC 15444-1).
//!
//! Tier-2 coding interleaves the compressed data of a tile as a sequence
//! of packets, one per (layer, resolution, component, precinct)
//! combination, in one of five progression orders (B.12). This crate
//! provides the machinery around that sequence without touching the
//! entropy-coded data itself:
//!
//! - [`PacketIterSet`]: resumable packet iterators per tile, honoring
//!   progression order changes (POC) and deduplicating packets across
//!   overlapping progressions.
//! - [`encoding_parameters`] / [`all_encoding_parameters`]: precinct grid
//!   geometry per tile, component and resolution level.
//! - [`PacketIterSet::init_encode`] and [`update_encoding_parameters`]:
//!   restricting a progression to the packets of one tile-part.
//! - [`PacketLengthMarkers`] / [`TileLengthMarkers`]: the PLT/PLM and TLM
//!   marker segment codecs that record packet and tile-part lengths.
//!
//! Inputs are plain parameter structs mirroring the SIZ, COD and POC
//! marker segments; no codestream parsing beyond the length marker
//! segments happens here.

mod error;
mod geometry;
mod iterator;
mod length;
mod log;
mod math;
mod params;
mod progression;
mod reader;
mod tilepart;

pub use error::{Error, GeometryError, MarkerError, ResourceError, Result};
pub use geometry::{
    EncodingParameters, IntRect, ResolutionGeometry, all_encoding_parameters,
    encoding_parameters, tile_rect,
};
pub use iterator::{Packet, PacketIterSet, ProgressionBounds};
pub use length::{
    MAX_PACKET_LEN_BYTES_PER_PLT, MIN_PACKETS_PER_PLT, PacketLengthMarkers, TileLengthEntry,
    TileLengthMarkers,
};
pub use params::{
    CodingParameters, ImageComponent, ImageInfo, MAX_RESOLUTION_LEVELS, Poc, T2Mode,
    TileCodingParams, TileComponentParams,
};
pub use progression::{Axis, ProgressionOrder};
pub use tilepart::update_encoding_parameters;
