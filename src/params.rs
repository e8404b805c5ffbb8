//! Image, coding and tile parameters that drive packet ordering.
//!
//! These mirror the information signalled in the SIZ, COD, COC and POC
//! marker segments, reduced to the fields the packet iterator needs.

use crate::progression::ProgressionOrder;

/// Maximum number of resolution levels (32 decomposition levels plus the
/// base resolution).
pub const MAX_RESOLUTION_LEVELS: u32 = 33;

/// Per-component sampling factors on the reference grid (A.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageComponent {
    /// Horizontal sample spacing (XRsiz). Must be non-zero.
    pub dx: u32,
    /// Vertical sample spacing (YRsiz). Must be non-zero.
    pub dy: u32,
}

/// Image geometry as far as packet ordering is concerned (A.5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Left edge of the image area on the reference grid (XOsiz).
    pub x0: u32,
    /// Top edge of the image area (YOsiz).
    pub y0: u32,
    /// Right edge of the image area (Xsiz).
    pub x1: u32,
    /// Bottom edge of the image area (Ysiz).
    pub y1: u32,
    /// The components of the image.
    pub components: Vec<ImageComponent>,
}

impl ImageInfo {
    /// The number of components.
    pub fn num_components(&self) -> u32 {
        self.components.len() as u32
    }
}

/// Per-component coding parameters of one tile (A.6.1, A.6.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileComponentParams {
    /// Number of resolution levels (number of decompositions plus one).
    pub num_resolutions: u32,
    /// Precinct exponents `(PPx, PPy)` per resolution level. Missing
    /// entries default to `(15, 15)`, the maximal precinct size.
    pub precinct_exponents: Vec<(u8, u8)>,
}

impl TileComponentParams {
    /// The precinct exponents at `resno`.
    pub(crate) fn precinct_exponents_at(&self, resno: u32) -> (u8, u8) {
        self.precinct_exponents
            .get(resno as usize)
            .copied()
            .unwrap_or((15, 15))
    }
}

/// Either a progression signalled in a POC marker segment or a synthetic
/// one spanning the whole tile (A.6.6).
///
/// The `*no0`/`*no1` fields are the signalled half-open ranges. The
/// remaining fields are bookkeeping for encoding: the `_e` bounds are
/// frozen when encoding parameters are refreshed and the `_t` cursors
/// track the tile-part odometer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poc {
    /// Progression order to iterate with.
    pub prg: ProgressionOrder,
    /// Signalled progression order. `prg` may temporarily differ while
    /// tile-parts are being generated.
    pub prg1: ProgressionOrder,
    /// First resolution level, inclusive.
    pub resno0: u32,
    /// Last resolution level, exclusive.
    pub resno1: u32,
    /// First component, inclusive.
    pub compno0: u32,
    /// Last component, exclusive.
    pub compno1: u32,
    /// First layer, inclusive.
    pub layno0: u32,
    /// Last layer, exclusive.
    pub layno1: u32,
    /// First precinct, inclusive.
    pub precno0: u64,
    /// Last precinct, exclusive.
    pub precno1: u64,
    /// Spatial window iterated by RPCL, PCRL and CPRL.
    pub tx0: u32,
    /// Right edge of the spatial window, exclusive.
    pub tx1: u32,
    /// Top edge of the spatial window.
    pub ty0: u32,
    /// Bottom edge of the spatial window, exclusive.
    pub ty1: u32,

    pub(crate) res_s: u32,
    pub(crate) res_e: u32,
    pub(crate) comp_s: u32,
    pub(crate) comp_e: u32,
    pub(crate) lay_e: u32,
    pub(crate) prc_e: u64,
    pub(crate) tx_s: u32,
    pub(crate) tx_e: u32,
    pub(crate) ty_s: u32,
    pub(crate) ty_e: u32,
    pub(crate) dx: u32,
    pub(crate) dy: u32,

    pub(crate) lay_t: u32,
    pub(crate) res_t: u32,
    pub(crate) comp_t: u32,
    pub(crate) prc_t: u64,
    pub(crate) tx0_t: u32,
    pub(crate) ty0_t: u32,
}

impl Default for Poc {
    fn default() -> Self {
        Self {
            prg: ProgressionOrder::Unknown,
            prg1: ProgressionOrder::Unknown,
            resno0: 0,
            resno1: 0,
            compno0: 0,
            compno1: 0,
            layno0: 0,
            layno1: 0,
            precno0: 0,
            precno1: 0,
            tx0: 0,
            tx1: 0,
            ty0: 0,
            ty1: 0,
            res_s: 0,
            res_e: 0,
            comp_s: 0,
            comp_e: 0,
            lay_e: 0,
            prc_e: 0,
            tx_s: 0,
            tx_e: 0,
            ty_s: 0,
            ty_e: 0,
            dx: 0,
            dy: 0,
            lay_t: 0,
            res_t: 0,
            comp_t: 0,
            prc_t: 0,
            tx0_t: 0,
            ty0_t: 0,
        }
    }
}

/// Coding parameters of one tile (A.6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCodingParams {
    /// The progression order from the COD marker segment.
    pub prg: ProgressionOrder,
    /// The number of quality layers.
    pub num_layers: u32,
    /// Whether explicit progression order changes were signalled.
    pub poc_present: bool,
    /// The progressions to iterate, one per POC entry. Holds a single
    /// synthetic entry when no POC marker segment is present.
    pub pocs: Vec<Poc>,
    /// Per-component coding parameters.
    pub tccps: Vec<TileComponentParams>,
}

impl TileCodingParams {
    /// Creates tile coding parameters without progression order changes.
    pub fn new(
        prg: ProgressionOrder,
        num_layers: u32,
        tccps: Vec<TileComponentParams>,
    ) -> Self {
        Self {
            prg,
            num_layers,
            poc_present: false,
            pocs: vec![Poc::default()],
            tccps,
        }
    }
}

/// Whether tier-2 runs to size a rate threshold or to emit final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum T2Mode {
    /// Rate allocation is probing candidate thresholds.
    ThreshCalc,
    /// The final pass that produces the codestream.
    FinalPass,
}

/// Codestream-wide coding parameters (A.5.1, A.6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingParameters {
    /// Left edge of the tile grid origin (XTOsiz).
    pub tx0: u32,
    /// Top edge of the tile grid origin (YTOsiz).
    pub ty0: u32,
    /// Nominal tile width (XTsiz).
    pub tile_width: u32,
    /// Nominal tile height (YTsiz).
    pub tile_height: u32,
    /// Number of tiles across the image.
    pub grid_width: u32,
    /// Number of tiles down the image.
    pub grid_height: u32,
    /// Whether the encoder splits tiles into multiple tile-parts.
    pub tp_on: bool,
    /// Coding parameters per tile, in raster order.
    pub tcps: Vec<TileCodingParams>,
}

impl CodingParameters {
    /// The total number of tiles in the grid.
    pub fn num_tiles(&self) -> u32 {
        self.grid_width * self.grid_height
    }
}
