//! Resumable packet iteration over a tile (B.12).
//!
//! A [`PacketIterSet`] holds one iterator per progression (one when no POC
//! marker segment is present). All iterators of a tile share a single
//! inclusion bitmap, so a packet already emitted by an earlier progression
//! is silently skipped by later, overlapping ones.

use crate::error::{GeometryError, ResourceError, Result, bail};
use crate::geometry::{IntRect, ResolutionGeometry, all_encoding_parameters};
use crate::log::lwarn;
use crate::math::shl_saturating;
use crate::params::{CodingParameters, ImageInfo, MAX_RESOLUTION_LEVELS, T2Mode, TileCodingParams};
use crate::progression::ProgressionOrder;
use crate::tilepart;

/// The coordinates of one packet, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    /// The quality layer.
    pub layer: u32,
    /// The resolution level.
    pub resolution: u32,
    /// The component.
    pub component: u32,
    /// The precinct, in raster order within its resolution level.
    pub precinct: u64,
}

/// The window of packet space one progression iterates over.
///
/// Axis ranges are half-open. For RPCL, PCRL and CPRL the position axis is
/// the spatial window `[tx0, tx1) x [ty0, ty1)` on the reference grid
/// instead of the precinct index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressionBounds {
    /// The progression order.
    pub prg: ProgressionOrder,
    /// First layer, inclusive.
    pub layno0: u32,
    /// Last layer, exclusive.
    pub layno1: u32,
    /// First resolution level, inclusive.
    pub resno0: u32,
    /// Last resolution level, exclusive.
    pub resno1: u32,
    /// First component, inclusive.
    pub compno0: u32,
    /// Last component, exclusive.
    pub compno1: u32,
    /// First precinct, inclusive.
    pub precno0: u64,
    /// Last precinct, exclusive.
    pub precno1: u64,
    /// Left edge of the spatial window.
    pub tx0: u32,
    /// Right edge of the spatial window, exclusive.
    pub tx1: u32,
    /// Top edge of the spatial window.
    pub ty0: u32,
    /// Bottom edge of the spatial window, exclusive.
    pub ty1: u32,
}

#[derive(Debug, Clone)]
struct PiComponent {
    dx: u32,
    dy: u32,
    resolutions: Vec<ResolutionGeometry>,
}

impl PiComponent {
    fn num_resolutions(&self) -> u32 {
        self.resolutions.len() as u32
    }
}

/// A resumable iterator over the packets of one progression.
#[derive(Debug, Clone)]
pub(crate) struct PacketIter {
    pub(crate) bounds: ProgressionBounds,
    pub(crate) first: bool,
    comps: Vec<PiComponent>,
    /// The tile's area on the reference grid.
    rect: IntRect,
    /// Merged precinct projections, recomputed lazily on the first step.
    dx: u32,
    dy: u32,
    tp_on: bool,
    step_l: u64,
    step_r: u64,
    step_c: u64,
    layer: u32,
    resolution: u32,
    component: u32,
    precinct: u64,
    x: u32,
    y: u32,
}

/// All packet iterators of one tile, sharing an inclusion bitmap.
#[derive(Debug, Clone)]
pub struct PacketIterSet {
    iters: Vec<PacketIter>,
    include: Vec<bool>,
}

impl PacketIterSet {
    /// Creates the iterators for decoding tile `tileno`.
    ///
    /// One iterator is created per progression signalled in the tile's POC
    /// marker segment, or a single one spanning the whole tile. The
    /// iterators are ready to step.
    pub fn create_decode(
        image: &ImageInfo,
        cp: &CodingParameters,
        tileno: u16,
    ) -> Result<Self> {
        let (mut set, max_prec) = Self::create(image, cp, tileno, false)?;
        let tcp = &cp.tcps[tileno as usize];

        if tcp.poc_present {
            update_decode_poc(&mut set.iters, tcp, max_prec);
        } else {
            update_decode_no_poc(&mut set.iters, tcp, image.num_components(), max_prec);
        }

        Ok(set)
    }

    /// Creates the iterators for encoding tile `tileno`.
    ///
    /// This freezes the encode bounds of every progression of the tile.
    /// The iterators themselves stay unbounded until
    /// [`PacketIterSet::init_encode`] opens a tile-part window.
    pub fn create_encode(
        image: &ImageInfo,
        cp: &mut CodingParameters,
        tileno: u16,
        mode: T2Mode,
    ) -> Result<Self> {
        let (set, _) = Self::create(image, cp, tileno, cp.tp_on)?;
        tilepart::update_encode_bounds(image, cp, tileno, mode);

        Ok(set)
    }

    fn create(
        image: &ImageInfo,
        cp: &CodingParameters,
        tileno: u16,
        tp_on: bool,
    ) -> Result<(Self, u64)> {
        let tcp = &cp.tcps[tileno as usize];
        let mut grids = Vec::new();
        let params = all_encoding_parameters(image, cp, tileno, &mut grids);

        let step_c = params.max_prec;
        let step_r = u64::from(image.num_components()) * step_c;
        let step_l = u64::from(params.max_res) * step_r;

        // One extra layer's worth of slack, matching the decoder's
        // tolerance for out-of-range layer indices in corrupt streams.
        let bitmap_len = (u64::from(tcp.num_layers) + 1)
            .checked_mul(step_l)
            .filter(|&len| len <= isize::MAX as u64)
            .ok_or(ResourceError::InclusionBitmapTooLarge)?;

        let comps: Vec<PiComponent> = image
            .components
            .iter()
            .zip(grids)
            .map(|(comp, resolutions)| PiComponent {
                dx: comp.dx,
                dy: comp.dy,
                resolutions,
            })
            .collect();

        let iters = (0..tcp.pocs.len())
            .map(|_| PacketIter {
                bounds: ProgressionBounds::default(),
                first: true,
                comps: comps.clone(),
                rect: params.rect,
                dx: 0,
                dy: 0,
                tp_on,
                step_l,
                step_r,
                step_c,
                layer: 0,
                resolution: 0,
                component: 0,
                precinct: 0,
                x: 0,
                y: 0,
            })
            .collect();

        let set = Self {
            iters,
            include: vec![false; bitmap_len as usize],
        };

        Ok((set, params.max_prec))
    }

    /// The number of progressions in the set.
    pub fn num_progressions(&self) -> usize {
        self.iters.len()
    }

    /// The bounds progression `pino` currently iterates over.
    pub fn bounds(&self, pino: usize) -> &ProgressionBounds {
        &self.iters[pino].bounds
    }

    /// Steps progression `pino` to its next not-yet-emitted packet.
    ///
    /// Returns `Ok(None)` once the progression is exhausted. Fails only
    /// for CPRL progressions whose spatial window reaches outside the
    /// component's precinct grid.
    pub fn next(&mut self, pino: usize) -> Result<Option<Packet>> {
        self.iters[pino].next(&mut self.include)
    }

    /// Restricts progression `pino` to the packets of tile-part `tpnum`
    /// and advances the tile's odometer.
    ///
    /// `tppos` is the index within the progression order name at which
    /// tile-part boundaries are placed. Must be called once per tile-part
    /// before stepping, with `tpnum` counting up from zero.
    pub fn init_encode(
        &mut self,
        cp: &mut CodingParameters,
        tileno: u16,
        pino: usize,
        tpnum: u32,
        tppos: u32,
        mode: T2Mode,
    ) {
        tilepart::init_encode(&mut self.iters[pino], cp, tileno, pino, tpnum, tppos, mode);
    }
}

impl PacketIter {
    fn next(&mut self, include: &mut [bool]) -> Result<Option<Packet>> {
        match self.bounds.prg {
            ProgressionOrder::Lrcp => Ok(self.next_lrcp(include)),
            ProgressionOrder::Rlcp => Ok(self.next_rlcp(include)),
            ProgressionOrder::Rpcl => self.next_rpcl(include),
            ProgressionOrder::Pcrl => self.next_pcrl(include),
            ProgressionOrder::Cprl => self.next_cprl(include),
            ProgressionOrder::Unknown => Ok(None),
        }
    }

    fn next_lrcp(&mut self, include: &mut [bool]) -> Option<Packet> {
        if self.first {
            self.first = false;
            self.layer = self.bounds.layno0;
            self.resolution = self.bounds.resno0;
            self.component = self.bounds.compno0;
            self.precinct = self.bounds.precno0;
        } else {
            self.precinct += 1;
        }

        while self.layer < self.bounds.layno1 {
            while self.resolution < self.bounds.resno1 {
                while self.component < self.bounds.compno1 {
                    let comp = &self.comps[self.component as usize];
                    if self.resolution < comp.num_resolutions() {
                        let num_precincts =
                            comp.resolutions[self.resolution as usize].num_precincts();
                        if !self.tp_on {
                            self.bounds.precno1 = num_precincts;
                        }
                        while self.precinct < self.bounds.precno1 {
                            if self.precinct < num_precincts {
                                let index = self.include_index();
                                if !include[index] {
                                    include[index] = true;
                                    return Some(self.packet());
                                }
                            }
                            self.precinct += 1;
                        }
                    }
                    self.component += 1;
                    self.precinct = self.bounds.precno0;
                }
                self.resolution += 1;
                self.component = self.bounds.compno0;
            }
            self.layer += 1;
            self.resolution = self.bounds.resno0;
        }

        None
    }

    fn next_rlcp(&mut self, include: &mut [bool]) -> Option<Packet> {
        if self.first {
            self.first = false;
            self.resolution = self.bounds.resno0;
            self.layer = self.bounds.layno0;
            self.component = self.bounds.compno0;
            self.precinct = self.bounds.precno0;
        } else {
            self.precinct += 1;
        }

        while self.resolution < self.bounds.resno1 {
            while self.layer < self.bounds.layno1 {
                while self.component < self.bounds.compno1 {
                    let comp = &self.comps[self.component as usize];
                    if self.resolution < comp.num_resolutions() {
                        let num_precincts =
                            comp.resolutions[self.resolution as usize].num_precincts();
                        if !self.tp_on {
                            self.bounds.precno1 = num_precincts;
                        }
                        while self.precinct < self.bounds.precno1 {
                            if self.precinct < num_precincts {
                                let index = self.include_index();
                                if !include[index] {
                                    include[index] = true;
                                    return Some(self.packet());
                                }
                            }
                            self.precinct += 1;
                        }
                    }
                    self.component += 1;
                    self.precinct = self.bounds.precno0;
                }
                self.layer += 1;
                self.component = self.bounds.compno0;
            }
            self.resolution += 1;
            self.layer = self.bounds.layno0;
        }

        None
    }

    fn next_rpcl(&mut self, include: &mut [bool]) -> Result<Option<Packet>> {
        if self.first {
            self.first = false;
            self.update_dxy();
            if !self.tp_on {
                self.spatial_window_from_tile();
            }
            if self.dx == 0 || self.dy == 0 {
                lwarn!("empty precinct projection, tile has no packets");
                return Ok(None);
            }
            self.resolution = self.bounds.resno0;
            self.y = self.bounds.ty0;
            self.x = self.bounds.tx0;
            self.component = self.bounds.compno0;
            self.layer = self.bounds.layno0;
        } else {
            self.layer += 1;
        }

        while self.resolution < self.bounds.resno1 {
            while self.y < self.bounds.ty1 {
                while self.x < self.bounds.tx1 {
                    while self.component < self.bounds.compno1 {
                        if self.resolution
                            < self.comps[self.component as usize].num_resolutions()
                        {
                            if let Some(precinct) =
                                self.find_precinct_index(self.component, self.resolution, false)?
                            {
                                self.precinct = precinct;
                                while self.layer < self.bounds.layno1 {
                                    let index = self.include_index();
                                    if !include[index] {
                                        include[index] = true;
                                        return Ok(Some(self.packet()));
                                    }
                                    self.layer += 1;
                                }
                            }
                        }
                        self.component += 1;
                        self.layer = self.bounds.layno0;
                    }
                    self.x = next_grid_coord(self.x, self.dx);
                    self.component = self.bounds.compno0;
                }
                self.y = next_grid_coord(self.y, self.dy);
                self.x = self.bounds.tx0;
            }
            self.resolution += 1;
            self.y = self.bounds.ty0;
        }

        Ok(None)
    }

    fn next_pcrl(&mut self, include: &mut [bool]) -> Result<Option<Packet>> {
        if self.first {
            self.first = false;
            self.update_dxy();
            if !self.tp_on {
                self.spatial_window_from_tile();
            }
            if self.dx == 0 || self.dy == 0 {
                lwarn!("empty precinct projection, tile has no packets");
                return Ok(None);
            }
            self.y = self.bounds.ty0;
            self.x = self.bounds.tx0;
            self.component = self.bounds.compno0;
            self.resolution = self.bounds.resno0;
            self.layer = self.bounds.layno0;
        } else {
            self.layer += 1;
        }

        while self.y < self.bounds.ty1 {
            while self.x < self.bounds.tx1 {
                while self.component < self.bounds.compno1 {
                    let num_resolutions =
                        self.comps[self.component as usize].num_resolutions();
                    while self.resolution < self.bounds.resno1.min(num_resolutions) {
                        if let Some(precinct) =
                            self.find_precinct_index(self.component, self.resolution, false)?
                        {
                            self.precinct = precinct;
                            while self.layer < self.bounds.layno1 {
                                let index = self.include_index();
                                if !include[index] {
                                    include[index] = true;
                                    return Ok(Some(self.packet()));
                                }
                                self.layer += 1;
                            }
                        }
                        self.resolution += 1;
                        self.layer = self.bounds.layno0;
                    }
                    self.component += 1;
                    self.resolution = self.bounds.resno0;
                }
                self.x = next_grid_coord(self.x, self.dx);
                self.component = self.bounds.compno0;
            }
            self.y = next_grid_coord(self.y, self.dy);
            self.x = self.bounds.tx0;
        }

        Ok(None)
    }

    fn next_cprl(&mut self, include: &mut [bool]) -> Result<Option<Packet>> {
        if self.first {
            self.first = false;
            self.component = self.bounds.compno0;
            if self.component < self.bounds.compno1 {
                self.enter_component();
            }
        } else {
            self.layer += 1;
        }

        while self.component < self.bounds.compno1 {
            if self.dx == 0 || self.dy == 0 {
                lwarn!("empty precinct projection, component has no packets");
                return Ok(None);
            }
            let num_resolutions = self.comps[self.component as usize].num_resolutions();
            while self.y < self.bounds.ty1 {
                while self.x < self.bounds.tx1 {
                    while self.resolution < self.bounds.resno1.min(num_resolutions) {
                        if let Some(precinct) =
                            self.find_precinct_index(self.component, self.resolution, true)?
                        {
                            self.precinct = precinct;
                            while self.layer < self.bounds.layno1 {
                                let index = self.include_index();
                                if !include[index] {
                                    include[index] = true;
                                    return Ok(Some(self.packet()));
                                }
                                self.layer += 1;
                            }
                        }
                        self.resolution += 1;
                        self.layer = self.bounds.layno0;
                    }
                    self.x = next_grid_coord(self.x, self.dx);
                    self.resolution = self.bounds.resno0;
                }
                self.y = next_grid_coord(self.y, self.dy);
                self.x = self.bounds.tx0;
            }
            self.component += 1;
            if self.component < self.bounds.compno1 {
                self.enter_component();
            }
        }

        Ok(None)
    }

    /// Resets the spatial cursor for the component about to be iterated
    /// by CPRL, which steps at that component's own precinct projection.
    fn enter_component(&mut self) {
        self.dx = 0;
        self.dy = 0;
        self.update_dxy_for_component(self.component);
        if !self.tp_on {
            self.spatial_window_from_tile();
        }
        self.y = self.bounds.ty0;
        self.x = self.bounds.tx0;
        self.resolution = self.bounds.resno0;
        self.layer = self.bounds.layno0;
    }

    fn spatial_window_from_tile(&mut self) {
        self.bounds.tx0 = self.rect.x0;
        self.bounds.ty0 = self.rect.y0;
        self.bounds.tx1 = self.rect.x1;
        self.bounds.ty1 = self.rect.y1;
    }

    fn update_dxy(&mut self) {
        self.dx = 0;
        self.dy = 0;
        for component in 0..self.comps.len() as u32 {
            self.update_dxy_for_component(component);
        }
    }

    fn update_dxy_for_component(&mut self, component: u32) {
        let (mut dx, mut dy) = (self.dx, self.dy);
        let comp = &self.comps[component as usize];

        for (resno, res) in comp.resolutions.iter().enumerate() {
            let level_no = comp.num_resolutions() - 1 - resno as u32;
            let cdx = shl_saturating(u64::from(comp.dx), u32::from(res.pdx) + level_no);
            let cdy = shl_saturating(u64::from(comp.dy), u32::from(res.pdy) + level_no);

            if cdx < u64::from(u32::MAX) {
                dx = if dx == 0 { cdx as u32 } else { dx.min(cdx as u32) };
            }
            if cdy < u64::from(u32::MAX) {
                dy = if dy == 0 { cdy as u32 } else { dy.min(cdy as u32) };
            }
        }

        self.dx = dx;
        self.dy = dy;
    }

    /// Maps the spatial cursor to a precinct index for `component` at
    /// `resolution` (B.12.1.3 to B.12.1.5).
    ///
    /// `Ok(None)` means the cursor does not start a precinct there. With
    /// `strict`, a cursor left of the component's precinct grid is an
    /// error instead of a skip.
    fn find_precinct_index(
        &self,
        component: u32,
        resolution: u32,
        strict: bool,
    ) -> Result<Option<u64>> {
        let comp = &self.comps[component as usize];
        let level_no = comp.num_resolutions() - 1 - resolution;
        if level_no >= MAX_RESOLUTION_LEVELS {
            return Ok(None);
        }
        let res = &comp.resolutions[resolution as usize];

        let cdx = u64::from(comp.dx) << level_no;
        let cdy = u64::from(comp.dy) << level_no;
        let trx0 = u64::from(self.rect.x0).div_ceil(cdx);
        let try0 = u64::from(self.rect.y0).div_ceil(cdy);
        let trx1 = u64::from(self.rect.x1).div_ceil(cdx);
        let try1 = u64::from(self.rect.y1).div_ceil(cdy);

        let rpx = u32::from(res.pdx) + level_no;
        let rpy = u32::from(res.pdy) + level_no;

        // The cursor only starts a precinct on a precinct boundary, or on
        // the tile edge when the precinct grid hangs over it.
        let on_boundary_y = u64::from(self.y)
            .is_multiple_of(shl_saturating(u64::from(comp.dy), rpy))
            || (self.y == self.rect.y0
                && !(try0 << level_no).is_multiple_of(shl_saturating(1, rpy)));
        if !on_boundary_y {
            return Ok(None);
        }

        let on_boundary_x = u64::from(self.x)
            .is_multiple_of(shl_saturating(u64::from(comp.dx), rpx))
            || (self.x == self.rect.x0
                && !(trx0 << level_no).is_multiple_of(shl_saturating(1, rpx)));
        if !on_boundary_x {
            return Ok(None);
        }

        if res.pw == 0 || res.ph == 0 {
            return Ok(None);
        }
        if trx0 == trx1 || try0 == try1 {
            return Ok(None);
        }

        let precinct_x = u64::from(self.x).div_ceil(cdx) >> res.pdx;
        let precinct_y = u64::from(self.y).div_ceil(cdy) >> res.pdy;
        let (Some(column), Some(row)) = (
            precinct_x.checked_sub(trx0 >> res.pdx),
            precinct_y.checked_sub(try0 >> res.pdy),
        ) else {
            if strict {
                bail!(GeometryError::PrecinctIndexUnderflow);
            }
            return Ok(None);
        };

        let precinct = column + row * u64::from(res.pw);
        if precinct >= res.num_precincts() {
            return Ok(None);
        }

        Ok(Some(precinct))
    }

    fn include_index(&self) -> usize {
        (u64::from(self.layer) * self.step_l
            + u64::from(self.resolution) * self.step_r
            + u64::from(self.component) * self.step_c
            + self.precinct) as usize
    }

    fn packet(&self) -> Packet {
        Packet {
            layer: self.layer,
            resolution: self.resolution,
            component: self.component,
            precinct: self.precinct,
        }
    }
}

/// Steps a spatial cursor to the next multiple of `step`.
fn next_grid_coord(coord: u32, step: u32) -> u32 {
    coord.saturating_add(step - (coord % step))
}

fn update_decode_poc(iters: &mut [PacketIter], tcp: &TileCodingParams, max_prec: u64) {
    for (iter, poc) in iters.iter_mut().zip(&tcp.pocs) {
        iter.bounds = ProgressionBounds {
            prg: poc.prg,
            layno0: 0,
            layno1: poc.layno1.min(tcp.num_layers),
            resno0: poc.resno0,
            resno1: poc.resno1,
            compno0: poc.compno0,
            compno1: poc.compno1,
            precno0: 0,
            precno1: max_prec,
            ..ProgressionBounds::default()
        };
    }
}

fn update_decode_no_poc(
    iters: &mut [PacketIter],
    tcp: &TileCodingParams,
    num_comps: u32,
    max_prec: u64,
) {
    let max_res = tcp.tccps.iter().map(|t| t.num_resolutions).max().unwrap_or(0);

    for iter in iters {
        iter.bounds = ProgressionBounds {
            prg: tcp.prg,
            layno0: 0,
            layno1: tcp.num_layers,
            resno0: 0,
            resno1: max_res,
            compno0: 0,
            compno1: num_comps,
            precno0: 0,
            precno1: max_prec,
            ..ProgressionBounds::default()
        };
    }
}
