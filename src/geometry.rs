//! Tile and precinct grid geometry (B.3, B.6).

use crate::math::{ceil_div_pow2, floor_div_pow2, shl_saturating};
use crate::params::{CodingParameters, ImageInfo, MAX_RESOLUTION_LEVELS};

/// An axis-aligned rectangle on the reference grid, half-open on the
/// right and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    /// Left edge, inclusive.
    pub x0: u32,
    /// Top edge, inclusive.
    pub y0: u32,
    /// Right edge, exclusive.
    pub x1: u32,
    /// Bottom edge, exclusive.
    pub y1: u32,
}

impl IntRect {
    /// The width of the rectangle, zero if it is degenerate.
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// The height of the rectangle, zero if it is degenerate.
    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// Whether the rectangle contains no samples.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// The precinct grid of one resolution level of one tile-component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionGeometry {
    /// Precinct width exponent (PPx).
    pub pdx: u8,
    /// Precinct height exponent (PPy).
    pub pdy: u8,
    /// Number of precincts across the resolution level.
    pub pw: u32,
    /// Number of precincts down the resolution level.
    pub ph: u32,
}

impl ResolutionGeometry {
    /// The total number of precincts in the grid.
    pub fn num_precincts(&self) -> u64 {
        u64::from(self.pw) * u64::from(self.ph)
    }
}

/// Geometry bounds of one tile, aggregated over all components and
/// resolution levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingParameters {
    /// The tile's area on the reference grid (B-7).
    pub rect: IntRect,
    /// Smallest horizontal projection of any precinct onto the reference
    /// grid. `u32::MAX` if no resolution level produced a representable one.
    pub dx_min: u32,
    /// Smallest vertical precinct projection.
    pub dy_min: u32,
    /// Largest precinct count of any resolution level.
    pub max_prec: u64,
    /// Largest resolution count of any component.
    pub max_res: u32,
}

/// Computes the area of tile `tileno` on the reference grid (B-7).
///
/// Tiles are numbered in raster order. The nominal tile area is clamped
/// to the image area, so edge tiles may be smaller and tiles entirely
/// outside the image collapse to an empty rectangle.
pub fn tile_rect(image: &ImageInfo, cp: &CodingParameters, tileno: u16) -> IntRect {
    let p = u32::from(tileno) % cp.grid_width;
    let q = u32::from(tileno) / cp.grid_width;

    // The uncorrected corner may lie far outside the image for large
    // grids, so keep the intermediate in 64 bits.
    let ux0 = (u64::from(cp.tx0) + u64::from(p) * u64::from(cp.tile_width))
        .min(u64::from(u32::MAX)) as u32;
    let uy0 = (u64::from(cp.ty0) + u64::from(q) * u64::from(cp.tile_height))
        .min(u64::from(u32::MAX)) as u32;

    IntRect {
        x0: ux0.max(image.x0),
        y0: uy0.max(image.y0),
        x1: ux0.saturating_add(cp.tile_width).min(image.x1),
        y1: uy0.saturating_add(cp.tile_height).min(image.y1),
    }
}

/// Computes the scalar geometry bounds of tile `tileno`.
pub fn encoding_parameters(
    image: &ImageInfo,
    cp: &CodingParameters,
    tileno: u16,
) -> EncodingParameters {
    compute(image, cp, tileno, None)
}

/// Like [`encoding_parameters`], but additionally fills `grids` with the
/// precinct grid of every resolution level, indexed by component then
/// resolution.
pub fn all_encoding_parameters(
    image: &ImageInfo,
    cp: &CodingParameters,
    tileno: u16,
    grids: &mut Vec<Vec<ResolutionGeometry>>,
) -> EncodingParameters {
    compute(image, cp, tileno, Some(grids))
}

fn compute(
    image: &ImageInfo,
    cp: &CodingParameters,
    tileno: u16,
    mut grids: Option<&mut Vec<Vec<ResolutionGeometry>>>,
) -> EncodingParameters {
    let rect = tile_rect(image, cp, tileno);
    let tcp = &cp.tcps[tileno as usize];

    if let Some(grids) = grids.as_deref_mut() {
        grids.clear();
    }

    let mut dx_min = u32::MAX;
    let mut dy_min = u32::MAX;
    let mut max_prec = 0u64;
    let mut max_res = 0u32;

    for (compno, comp) in image.components.iter().enumerate() {
        let tccp = &tcp.tccps[compno];
        let num_res = tccp.num_resolutions;
        max_res = max_res.max(num_res);

        // The tile-component area, B-12.
        let tcx0 = rect.x0.div_ceil(comp.dx);
        let tcy0 = rect.y0.div_ceil(comp.dy);
        let tcx1 = rect.x1.div_ceil(comp.dx);
        let tcy1 = rect.y1.div_ceil(comp.dy);

        let mut comp_grid = grids
            .as_deref_mut()
            .map(|_| vec![ResolutionGeometry::default(); num_res as usize]);

        for resno in 0..num_res {
            let level_no = num_res - 1 - resno;
            if level_no >= MAX_RESOLUTION_LEVELS {
                continue;
            }

            let (pdx, pdy) = tccp.precinct_exponents_at(resno);

            // Projection of one precinct onto the reference grid.
            let dx = shl_saturating(u64::from(comp.dx), u32::from(pdx) + level_no);
            let dy = shl_saturating(u64::from(comp.dy), u32::from(pdy) + level_no);
            if dx < u64::from(u32::MAX) {
                dx_min = dx_min.min(dx as u32);
            }
            if dy < u64::from(u32::MAX) {
                dy_min = dy_min.min(dy as u32);
            }

            // The resolution level area (B-14) and its precinct grid (B-16).
            let rx0 = ceil_div_pow2(tcx0, level_no);
            let ry0 = ceil_div_pow2(tcy0, level_no);
            let rx1 = ceil_div_pow2(tcx1, level_no);
            let ry1 = ceil_div_pow2(tcy1, level_no);

            let px0 = u64::from(floor_div_pow2(rx0, u32::from(pdx))) << pdx;
            let py0 = u64::from(floor_div_pow2(ry0, u32::from(pdy))) << pdy;
            let px1 = (u64::from(rx1) + (1u64 << pdx) - 1) >> pdx << pdx;
            let py1 = (u64::from(ry1) + (1u64 << pdy) - 1) >> pdy << pdy;

            let pw = if rx0 == rx1 {
                0
            } else {
                ((px1 - px0) >> pdx) as u32
            };
            let ph = if ry0 == ry1 {
                0
            } else {
                ((py1 - py0) >> pdy) as u32
            };

            max_prec = max_prec.max(u64::from(pw) * u64::from(ph));

            if let Some(comp_grid) = comp_grid.as_deref_mut() {
                comp_grid[resno as usize] = ResolutionGeometry { pdx, pdy, pw, ph };
            }
        }

        if let (Some(grids), Some(comp_grid)) = (grids.as_deref_mut(), comp_grid) {
            grids.push(comp_grid);
        }
    }

    EncodingParameters {
        rect,
        dx_min,
        dy_min,
        max_prec,
        max_res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ImageComponent, TileCodingParams, TileComponentParams};
    use crate::progression::ProgressionOrder;

    fn single_tile_params(tccp: TileComponentParams) -> CodingParameters {
        CodingParameters {
            tx0: 0,
            ty0: 0,
            tile_width: 128,
            tile_height: 128,
            grid_width: 1,
            grid_height: 1,
            tp_on: false,
            tcps: vec![TileCodingParams::new(
                ProgressionOrder::Lrcp,
                1,
                vec![tccp],
            )],
        }
    }

    fn image_128() -> ImageInfo {
        ImageInfo {
            x0: 0,
            y0: 0,
            x1: 128,
            y1: 128,
            components: vec![ImageComponent { dx: 1, dy: 1 }],
        }
    }

    #[test]
    fn tile_rect_clamps_to_image_area() {
        let image = ImageInfo {
            x0: 2,
            y0: 2,
            x1: 100,
            y1: 90,
            components: vec![ImageComponent { dx: 1, dy: 1 }],
        };
        let cp = CodingParameters {
            tx0: 0,
            ty0: 0,
            tile_width: 64,
            tile_height: 64,
            grid_width: 2,
            grid_height: 2,
            tp_on: false,
            tcps: Vec::new(),
        };

        assert_eq!(
            tile_rect(&image, &cp, 0),
            IntRect {
                x0: 2,
                y0: 2,
                x1: 64,
                y1: 64
            }
        );
        assert_eq!(
            tile_rect(&image, &cp, 1),
            IntRect {
                x0: 64,
                y0: 2,
                x1: 100,
                y1: 64
            }
        );
        assert_eq!(
            tile_rect(&image, &cp, 3),
            IntRect {
                x0: 64,
                y0: 64,
                x1: 100,
                y1: 90
            }
        );
    }

    #[test]
    fn precinct_grids_and_minimum_projection() {
        let image = image_128();
        let cp = single_tile_params(TileComponentParams {
            num_resolutions: 3,
            precinct_exponents: vec![(3, 3), (4, 4), (4, 4)],
        });

        let mut grids = Vec::new();
        let params = all_encoding_parameters(&image, &cp, 0, &mut grids);

        assert_eq!(params.max_res, 3);
        assert_eq!(params.max_prec, 64);
        assert_eq!(params.dx_min, 16);
        assert_eq!(params.dy_min, 16);

        assert_eq!(grids.len(), 1);
        assert_eq!(
            grids[0],
            vec![
                ResolutionGeometry {
                    pdx: 3,
                    pdy: 3,
                    pw: 4,
                    ph: 4
                },
                ResolutionGeometry {
                    pdx: 4,
                    pdy: 4,
                    pw: 4,
                    ph: 4
                },
                ResolutionGeometry {
                    pdx: 4,
                    pdy: 4,
                    pw: 8,
                    ph: 8
                },
            ]
        );
    }

    #[test]
    fn scalar_and_grid_variants_agree() {
        let image = image_128();
        let cp = single_tile_params(TileComponentParams {
            num_resolutions: 4,
            precinct_exponents: vec![(2, 3), (3, 3), (4, 5), (5, 5)],
        });

        let mut grids = Vec::new();
        let full = all_encoding_parameters(&image, &cp, 0, &mut grids);
        let scalar = encoding_parameters(&image, &cp, 0);

        assert_eq!(scalar, full);
    }

    #[test]
    fn collapsed_image_area_has_no_precincts() {
        let mut image = image_128();
        image.x1 = image.x0;
        let cp = single_tile_params(TileComponentParams {
            num_resolutions: 3,
            precinct_exponents: vec![(15, 15); 3],
        });

        let params = encoding_parameters(&image, &cp, 0);
        assert!(params.rect.is_empty());
        assert_eq!(params.max_prec, 0);
    }

    #[test]
    fn subsampled_component_shrinks_grid() {
        let mut image = image_128();
        image.components = vec![
            ImageComponent { dx: 1, dy: 1 },
            ImageComponent { dx: 2, dy: 2 },
        ];
        let mut cp = single_tile_params(TileComponentParams {
            num_resolutions: 1,
            precinct_exponents: vec![(5, 5)],
        });
        cp.tcps[0].tccps.push(TileComponentParams {
            num_resolutions: 1,
            precinct_exponents: vec![(5, 5)],
        });

        let mut grids = Vec::new();
        all_encoding_parameters(&image, &cp, 0, &mut grids);

        // 128 luma samples over 32-wide precincts, 64 chroma samples over
        // the same exponent.
        assert_eq!(grids[0][0].pw, 4);
        assert_eq!(grids[1][0].pw, 2);
    }
}
