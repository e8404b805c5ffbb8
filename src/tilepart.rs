//! Splitting a progression into tile-part windows.
//!
//! When an encoder emits multiple tile-parts per tile, each tile-part
//! covers a contiguous slice of the progression: the axes up to the
//! tile-part boundary position are pinned to a single unit, the axes
//! after it keep their full range. The per-axis cursors live on the
//! tile's [`Poc`] descriptors and behave like an odometer: the least
//! significant pinned axis advances once per tile-part, carrying into
//! the next axis when it wraps.

use crate::geometry::{EncodingParameters, encoding_parameters};
use crate::iterator::PacketIter;
use crate::log::ltrace;
use crate::params::{CodingParameters, ImageInfo, Poc, T2Mode, TileCodingParams};
use crate::progression::Axis;

/// Recomputes the frozen encode bounds of every progression of tile
/// `tileno` from current image and coding parameters.
///
/// Call after mutating headers (layer count, precinct exponents, POC
/// ranges) between passes, so tile-part windows are derived from fresh
/// geometry.
pub fn update_encoding_parameters(image: &ImageInfo, cp: &mut CodingParameters, tileno: u16) {
    let params = encoding_parameters(image, cp, tileno);
    let num_comps = image.num_components();
    let tcp = &mut cp.tcps[tileno as usize];

    if tcp.poc_present {
        update_poc_and_final(tcp, &params);
    } else {
        update_no_poc(tcp, num_comps, &params);
    }
}

/// Freezes the encode bounds when the iterators of a tile are created.
///
/// Signalled POC ranges only bind in the final pass; rate-allocation
/// trial passes iterate the full tile.
pub(crate) fn update_encode_bounds(
    image: &ImageInfo,
    cp: &mut CodingParameters,
    tileno: u16,
    mode: T2Mode,
) {
    let params = encoding_parameters(image, cp, tileno);
    let num_comps = image.num_components();
    let tcp = &mut cp.tcps[tileno as usize];

    if tcp.poc_present && mode == T2Mode::FinalPass {
        update_poc_and_final(tcp, &params);
    } else {
        update_no_poc(tcp, num_comps, &params);
    }
}

fn update_poc_and_final(tcp: &mut TileCodingParams, params: &EncodingParameters) {
    for poc in &mut tcp.pocs {
        poc.comp_s = poc.compno0;
        poc.comp_e = poc.compno1;
        poc.res_s = poc.resno0;
        poc.res_e = poc.resno1;
        poc.lay_e = poc.layno1;
        poc.prg = poc.prg1;
        poc.prc_e = params.max_prec;
        poc.tx_s = params.rect.x0;
        poc.tx_e = params.rect.x1;
        poc.ty_s = params.rect.y0;
        poc.ty_e = params.rect.y1;
        poc.dx = params.dx_min;
        poc.dy = params.dy_min;
    }
}

fn update_no_poc(tcp: &mut TileCodingParams, num_comps: u32, params: &EncodingParameters) {
    let prg = tcp.prg;
    let num_layers = tcp.num_layers;

    for poc in &mut tcp.pocs {
        poc.comp_s = 0;
        poc.comp_e = num_comps;
        poc.res_s = 0;
        poc.res_e = params.max_res;
        poc.lay_e = num_layers;
        poc.prg = prg;
        poc.prc_e = params.max_prec;
        poc.tx_s = params.rect.x0;
        poc.tx_e = params.rect.x1;
        poc.ty_s = params.rect.y0;
        poc.ty_e = params.rect.y1;
        poc.dx = params.dx_min;
        poc.dy = params.dy_min;
    }
}

/// Restricts `iter` to the window of tile-part `tpnum` of progression
/// `pino`, advancing the tile's odometer cursors.
pub(crate) fn init_encode(
    iter: &mut PacketIter,
    cp: &mut CodingParameters,
    tileno: u16,
    pino: usize,
    tpnum: u32,
    tppos: u32,
    mode: T2Mode,
) {
    let tp_on = cp.tp_on;
    let tcp = &mut cp.tcps[tileno as usize];
    let poc = &mut tcp.pocs[pino];
    let Some(axes) = poc.prg.axes() else {
        return;
    };
    let tppos = (tppos as usize).min(3);

    iter.first = true;
    iter.bounds.prg = poc.prg;

    if !(tp_on && mode == T2Mode::FinalPass) {
        iter.bounds.resno0 = poc.res_s;
        iter.bounds.resno1 = poc.res_e;
        iter.bounds.compno0 = poc.comp_s;
        iter.bounds.compno1 = poc.comp_e;
        iter.bounds.layno0 = 0;
        iter.bounds.layno1 = poc.lay_e;
        iter.bounds.precno0 = 0;
        iter.bounds.precno1 = poc.prc_e;
        iter.bounds.tx0 = poc.tx_s;
        iter.bounds.ty0 = poc.ty_s;
        iter.bounds.tx1 = poc.tx_e;
        iter.bounds.ty1 = poc.ty_e;
        return;
    }

    ltrace!("tile {}: opening tile-part {} window", tileno, tpnum);

    // Axes after the boundary position keep their full range.
    for axis in &axes[tppos + 1..] {
        match axis {
            Axis::Resolution => {
                iter.bounds.resno0 = poc.res_s;
                iter.bounds.resno1 = poc.res_e;
            }
            Axis::Component => {
                iter.bounds.compno0 = poc.comp_s;
                iter.bounds.compno1 = poc.comp_e;
            }
            Axis::Layer => {
                iter.bounds.layno0 = 0;
                iter.bounds.layno1 = poc.lay_e;
            }
            Axis::Position => {
                if poc.prg.is_spatial() {
                    iter.bounds.tx0 = poc.tx_s;
                    iter.bounds.ty0 = poc.ty_s;
                    iter.bounds.tx1 = poc.tx_e;
                    iter.bounds.ty1 = poc.ty_e;
                } else {
                    iter.bounds.precno0 = 0;
                    iter.bounds.precno1 = poc.prc_e;
                }
            }
        }
    }

    if tpnum == 0 {
        // First tile-part: every pinned axis starts at its lower bound.
        for axis in axes[..=tppos].iter().rev() {
            match axis {
                Axis::Component => {
                    poc.comp_t = poc.comp_s;
                    iter.bounds.compno0 = poc.comp_t;
                    iter.bounds.compno1 = poc.comp_t + 1;
                    poc.comp_t += 1;
                }
                Axis::Resolution => {
                    poc.res_t = poc.res_s;
                    iter.bounds.resno0 = poc.res_t;
                    iter.bounds.resno1 = poc.res_t + 1;
                    poc.res_t += 1;
                }
                Axis::Layer => {
                    poc.lay_t = 0;
                    iter.bounds.layno0 = poc.lay_t;
                    iter.bounds.layno1 = poc.lay_t + 1;
                    poc.lay_t += 1;
                }
                Axis::Position => {
                    if poc.prg.is_spatial() {
                        poc.tx0_t = poc.tx_s;
                        poc.ty0_t = poc.ty_s;
                        iter.bounds.tx0 = poc.tx0_t;
                        iter.bounds.tx1 = next_window_edge(poc.tx0_t, poc.dx);
                        iter.bounds.ty0 = poc.ty0_t;
                        iter.bounds.ty1 = next_window_edge(poc.ty0_t, poc.dy);
                        poc.tx0_t = iter.bounds.tx1;
                        poc.ty0_t = iter.bounds.ty1;
                    } else {
                        poc.prc_t = 0;
                        iter.bounds.precno0 = poc.prc_t;
                        iter.bounds.precno1 = poc.prc_t + 1;
                        poc.prc_t += 1;
                    }
                }
            }
        }
        return;
    }

    let mut incr_top = true;
    let mut reset_x = false;
    for (i, axis) in axes[..=tppos].iter().enumerate().rev() {
        let below = i as i32 - 1;

        // Rebuild the window of the previous step from the cursor, then
        // advance once while the carry is still propagating.
        match axis {
            Axis::Component => {
                iter.bounds.compno0 = poc.comp_t.saturating_sub(1);
                iter.bounds.compno1 = poc.comp_t;
            }
            Axis::Resolution => {
                iter.bounds.resno0 = poc.res_t.saturating_sub(1);
                iter.bounds.resno1 = poc.res_t;
            }
            Axis::Layer => {
                iter.bounds.layno0 = poc.lay_t.saturating_sub(1);
                iter.bounds.layno1 = poc.lay_t;
            }
            Axis::Position => {
                if poc.prg.is_spatial() {
                    iter.bounds.tx0 = previous_window_edge(poc.tx0_t, poc.dx);
                    iter.bounds.tx1 = poc.tx0_t;
                    iter.bounds.ty0 = previous_window_edge(poc.ty0_t, poc.dy);
                    iter.bounds.ty1 = poc.ty0_t;
                } else {
                    iter.bounds.precno0 = poc.prc_t.saturating_sub(1);
                    iter.bounds.precno1 = poc.prc_t;
                }
            }
        }

        if !incr_top {
            continue;
        }

        match axis {
            Axis::Resolution => {
                if poc.res_t == poc.res_e {
                    if check_next_level(below, poc, &axes) {
                        poc.res_t = poc.res_s;
                        iter.bounds.resno0 = poc.res_t;
                        iter.bounds.resno1 = poc.res_t + 1;
                        poc.res_t += 1;
                        incr_top = true;
                    } else {
                        incr_top = false;
                    }
                } else {
                    iter.bounds.resno0 = poc.res_t;
                    iter.bounds.resno1 = poc.res_t + 1;
                    poc.res_t += 1;
                    incr_top = false;
                }
            }
            Axis::Component => {
                if poc.comp_t == poc.comp_e {
                    if check_next_level(below, poc, &axes) {
                        poc.comp_t = poc.comp_s;
                        iter.bounds.compno0 = poc.comp_t;
                        iter.bounds.compno1 = poc.comp_t + 1;
                        poc.comp_t += 1;
                        incr_top = true;
                    } else {
                        incr_top = false;
                    }
                } else {
                    iter.bounds.compno0 = poc.comp_t;
                    iter.bounds.compno1 = poc.comp_t + 1;
                    poc.comp_t += 1;
                    incr_top = false;
                }
            }
            Axis::Layer => {
                if poc.lay_t == poc.lay_e {
                    if check_next_level(below, poc, &axes) {
                        poc.lay_t = 0;
                        iter.bounds.layno0 = poc.lay_t;
                        iter.bounds.layno1 = poc.lay_t + 1;
                        poc.lay_t += 1;
                        incr_top = true;
                    } else {
                        incr_top = false;
                    }
                } else {
                    iter.bounds.layno0 = poc.lay_t;
                    iter.bounds.layno1 = poc.lay_t + 1;
                    poc.lay_t += 1;
                    incr_top = false;
                }
            }
            Axis::Position => {
                if !poc.prg.is_spatial() {
                    if poc.prc_t == poc.prc_e {
                        if check_next_level(below, poc, &axes) {
                            poc.prc_t = 0;
                            iter.bounds.precno0 = poc.prc_t;
                            iter.bounds.precno1 = poc.prc_t + 1;
                            poc.prc_t += 1;
                            incr_top = true;
                        } else {
                            incr_top = false;
                        }
                    } else {
                        iter.bounds.precno0 = poc.prc_t;
                        iter.bounds.precno1 = poc.prc_t + 1;
                        poc.prc_t += 1;
                        incr_top = false;
                    }
                } else if poc.tx0_t >= poc.tx_e {
                    if poc.ty0_t >= poc.ty_e {
                        if check_next_level(below, poc, &axes) {
                            poc.ty0_t = poc.ty_s;
                            iter.bounds.ty0 = poc.ty0_t;
                            iter.bounds.ty1 = next_window_edge(poc.ty0_t, poc.dy);
                            poc.ty0_t = iter.bounds.ty1;
                            incr_top = true;
                            reset_x = true;
                        } else {
                            incr_top = false;
                            reset_x = false;
                        }
                    } else {
                        iter.bounds.ty0 = poc.ty0_t;
                        iter.bounds.ty1 = next_window_edge(poc.ty0_t, poc.dy);
                        poc.ty0_t = iter.bounds.ty1;
                        incr_top = false;
                        reset_x = true;
                    }
                    if reset_x {
                        poc.tx0_t = poc.tx_s;
                        iter.bounds.tx0 = poc.tx0_t;
                        iter.bounds.tx1 = next_window_edge(poc.tx0_t, poc.dx);
                        poc.tx0_t = iter.bounds.tx1;
                    }
                } else {
                    iter.bounds.tx0 = poc.tx0_t;
                    iter.bounds.tx1 = next_window_edge(poc.tx0_t, poc.dx);
                    poc.tx0_t = iter.bounds.tx1;
                    incr_top = false;
                }
            }
        }
    }
}

/// Whether any axis above `pos` in the progression order still has
/// windows left, so a wrapping axis may carry into it.
fn check_next_level(pos: i32, poc: &Poc, axes: &[Axis; 4]) -> bool {
    if pos < 0 {
        return false;
    }

    match axes[pos as usize] {
        Axis::Resolution => {
            if poc.res_t == poc.res_e {
                check_next_level(pos - 1, poc, axes)
            } else {
                true
            }
        }
        Axis::Component => {
            if poc.comp_t == poc.comp_e {
                check_next_level(pos - 1, poc, axes)
            } else {
                true
            }
        }
        Axis::Layer => {
            if poc.lay_t == poc.lay_e {
                check_next_level(pos - 1, poc, axes)
            } else {
                true
            }
        }
        Axis::Position => {
            if poc.prg.is_spatial() {
                if poc.tx0_t == poc.tx_e {
                    if poc.ty0_t == poc.ty_e {
                        check_next_level(pos - 1, poc, axes)
                    } else {
                        true
                    }
                } else {
                    true
                }
            } else if poc.prc_t == poc.prc_e {
                check_next_level(pos - 1, poc, axes)
            } else {
                true
            }
        }
    }
}

/// The end of the spatial window starting at `coord`, snapped to the
/// next multiple of `step`.
fn next_window_edge(coord: u32, step: u32) -> u32 {
    if step == 0 {
        return coord;
    }
    coord.saturating_add(step - coord % step)
}

/// The start of the spatial window ending at `coord`.
fn previous_window_edge(coord: u32, step: u32) -> u32 {
    if step == 0 {
        return coord;
    }
    coord.saturating_sub(step).saturating_sub(coord % step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::{Packet, PacketIterSet};
    use crate::params::{ImageComponent, TileComponentParams};
    use crate::progression::ProgressionOrder;

    fn image(components: Vec<ImageComponent>) -> ImageInfo {
        ImageInfo {
            x0: 0,
            y0: 0,
            x1: 64,
            y1: 64,
            components,
        }
    }

    fn coding_params(
        prg: ProgressionOrder,
        num_layers: u32,
        tccps: Vec<TileComponentParams>,
        tp_on: bool,
    ) -> CodingParameters {
        CodingParameters {
            tx0: 0,
            ty0: 0,
            tile_width: 64,
            tile_height: 64,
            grid_width: 1,
            grid_height: 1,
            tp_on,
            tcps: vec![TileCodingParams::new(prg, num_layers, tccps)],
        }
    }

    fn tccp(num_resolutions: u32, exponent: u8) -> TileComponentParams {
        TileComponentParams {
            num_resolutions,
            precinct_exponents: vec![(exponent, exponent); num_resolutions as usize],
        }
    }

    fn drain(set: &mut PacketIterSet) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = set.next(0).unwrap() {
            packets.push(packet);
        }
        packets
    }

    /// The whole-tile packet sequence the tile-parts must concatenate to.
    fn reference_sequence(image: &ImageInfo, cp: &CodingParameters) -> Vec<Packet> {
        let mut cp = cp.clone();
        cp.tp_on = false;
        let mut set = PacketIterSet::create_decode(image, &cp, 0).unwrap();
        drain(&mut set)
    }

    fn tile_parts(
        image: &ImageInfo,
        cp: &mut CodingParameters,
        num_parts: u32,
        tppos: u32,
    ) -> Vec<Vec<Packet>> {
        let mut set =
            PacketIterSet::create_encode(image, cp, 0, T2Mode::FinalPass).unwrap();

        (0..num_parts)
            .map(|tpnum| {
                set.init_encode(cp, 0, 0, tpnum, tppos, T2Mode::FinalPass);
                drain(&mut set)
            })
            .collect()
    }

    #[test]
    fn lrcp_boundary_at_layers_yields_one_tilepart_per_layer() {
        let image = image(vec![ImageComponent { dx: 1, dy: 1 }]);
        let mut cp = coding_params(ProgressionOrder::Lrcp, 3, vec![tccp(2, 5)], true);
        let reference = reference_sequence(&image, &cp);

        let parts = tile_parts(&image, &mut cp, 3, 0);

        for (tpnum, part) in parts.iter().enumerate() {
            assert_eq!(part.len(), 5);
            assert!(part.iter().all(|p| p.layer == tpnum as u32));
        }
        let concatenated: Vec<Packet> = parts.into_iter().flatten().collect();
        assert_eq!(concatenated, reference);
    }

    #[test]
    fn rlcp_boundary_after_precincts_yields_single_packet_tileparts() {
        let image = image(vec![ImageComponent { dx: 1, dy: 1 }]);
        let mut cp = coding_params(ProgressionOrder::Rlcp, 2, vec![tccp(1, 5)], true);
        let reference = reference_sequence(&image, &cp);
        assert_eq!(reference.len(), 8);

        let parts = tile_parts(&image, &mut cp, 8, 3);

        assert!(parts.iter().all(|part| part.len() == 1));
        let concatenated: Vec<Packet> = parts.into_iter().flatten().collect();
        assert_eq!(concatenated, reference);
    }

    #[test]
    fn rpcl_boundary_at_positions_scans_windows_within_each_resolution() {
        let image = image(vec![ImageComponent { dx: 1, dy: 1 }]);
        let mut cp = coding_params(ProgressionOrder::Rpcl, 1, vec![tccp(2, 5)], true);
        let reference = reference_sequence(&image, &cp);
        assert_eq!(reference.len(), 5);

        // Two resolutions times four 32x32 position windows. The low
        // resolution has a single precinct at the window origin, so three
        // of its windows are empty.
        let parts = tile_parts(&image, &mut cp, 8, 1);

        assert_eq!(parts[0].len(), 1);
        assert!(parts[1..4].iter().all(Vec::is_empty));
        assert!(parts[4..].iter().all(|part| part.len() == 1));
        let concatenated: Vec<Packet> = parts.into_iter().flatten().collect();
        assert_eq!(concatenated, reference);
    }

    #[test]
    fn pcrl_boundary_at_positions_scans_row_major_windows() {
        let image = image(vec![ImageComponent { dx: 1, dy: 1 }]);
        let mut cp = coding_params(ProgressionOrder::Pcrl, 1, vec![tccp(2, 5)], true);
        let reference = reference_sequence(&image, &cp);
        assert_eq!(reference.len(), 5);

        // Four 32x32 position windows; the low resolution only
        // contributes at the tile origin.
        let parts = tile_parts(&image, &mut cp, 4, 0);

        assert_eq!(parts[0].len(), 2);
        assert!(parts[1..].iter().all(|part| part.len() == 1));
        let concatenated: Vec<Packet> = parts.into_iter().flatten().collect();
        assert_eq!(concatenated, reference);
    }

    #[test]
    fn cprl_boundary_at_components_emits_whole_components() {
        let image = image(vec![
            ImageComponent { dx: 1, dy: 1 },
            ImageComponent { dx: 1, dy: 1 },
        ]);
        let mut cp = coding_params(
            ProgressionOrder::Cprl,
            2,
            vec![tccp(1, 5), tccp(1, 5)],
            true,
        );
        let reference = reference_sequence(&image, &cp);
        assert_eq!(reference.len(), 16);

        let parts = tile_parts(&image, &mut cp, 2, 0);

        for (tpnum, part) in parts.iter().enumerate() {
            assert_eq!(part.len(), 8);
            assert!(part.iter().all(|p| p.component == tpnum as u32));
        }
        let concatenated: Vec<Packet> = parts.into_iter().flatten().collect();
        assert_eq!(concatenated, reference);
    }

    #[test]
    fn trial_pass_iterates_the_whole_tile_despite_tileparts() {
        let image = image(vec![ImageComponent { dx: 1, dy: 1 }]);
        let mut cp = coding_params(ProgressionOrder::Lrcp, 2, vec![tccp(2, 5)], true);
        let reference = reference_sequence(&image, &cp);

        let mut set =
            PacketIterSet::create_encode(&image, &mut cp, 0, T2Mode::ThreshCalc).unwrap();
        set.init_encode(&mut cp, 0, 0, 0, 0, T2Mode::ThreshCalc);

        assert_eq!(drain(&mut set), reference);
    }

    #[test]
    fn update_encoding_parameters_rereads_headers() {
        let image = image(vec![ImageComponent { dx: 1, dy: 1 }]);
        let mut cp = coding_params(ProgressionOrder::Lrcp, 2, vec![tccp(2, 5)], true);
        update_encoding_parameters(&image, &mut cp, 0);
        assert_eq!(cp.tcps[0].pocs[0].lay_e, 2);
        assert_eq!(cp.tcps[0].pocs[0].prc_e, 4);

        cp.tcps[0].num_layers = 3;
        update_encoding_parameters(&image, &mut cp, 0);
        let poc = &cp.tcps[0].pocs[0];
        assert_eq!(poc.lay_e, 3);
        assert_eq!(poc.tx_e, 64);
        assert_eq!(poc.dx, 32);
    }
}
