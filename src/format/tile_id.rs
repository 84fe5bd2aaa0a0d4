//! Hilbert-curve tile ids.
//!
//! Every (z, x, y) coordinate maps to a single integer: the number of tiles on
//! all lower zoom levels, plus the tile's position along a Hilbert curve
//! covering the `2^z × 2^z` grid of its own level. Ids therefore grow with
//! zoom, and spatially close tiles within a level get close ids, which is what
//! lets one flat, sorted directory address every level of the pyramid.
//!
//! The mapping must be bit-exact with the archive producer: a wrong id does
//! not fail, it silently serves a different tile.

use crate::error::TileError;

/// Highest zoom level whose ids are addressable.
pub const MAX_ZOOM: u8 = 26;

/// Number of tiles on all zoom levels below `z` (`sum 4^k for k < z`).
const TZ_VALUES: [u64; 27] = [
    0,
    1,
    5,
    21,
    85,
    341,
    1365,
    5461,
    21845,
    87381,
    349525,
    1398101,
    5592405,
    22369621,
    89478485,
    357913941,
    1431655765,
    5726623061,
    22906492245,
    91625968981,
    366503875925,
    1466015503701,
    5864062014805,
    23456248059221,
    93824992236885,
    375299968947541,
    1501199875790165,
];

/// Convert a tile coordinate to its tile id.
///
/// # Errors
///
/// Returns [`TileError::OutOfRange`] if `z > 26` or `x`/`y` fall outside the
/// `2^z × 2^z` grid.
pub fn zxy_to_tile_id(z: u8, x: u32, y: u32) -> Result<u64, TileError> {
    if z > MAX_ZOOM {
        return Err(TileError::OutOfRange {
            z,
            x,
            y,
            reason: "zoom level exceeds maximum of 26",
        });
    }

    let n = 1u64 << z;
    if u64::from(x) >= n || u64::from(y) >= n {
        return Err(TileError::OutOfRange {
            z,
            x,
            y,
            reason: "x/y outside zoom level bounds",
        });
    }

    let mut tx = u64::from(x);
    let mut ty = u64::from(y);
    let mut d = 0u64;
    let mut s = n >> 1;

    while s > 0 {
        let rx = u64::from(tx & s > 0);
        let ry = u64::from(ty & s > 0);
        d += s * s * ((3 * rx) ^ ry);

        // Only bits below `s` are inspected from here on, so wrapping keeps
        // the reflection exact.
        if ry == 0 {
            if rx == 1 {
                tx = s.wrapping_sub(1).wrapping_sub(tx);
                ty = s.wrapping_sub(1).wrapping_sub(ty);
            }
            std::mem::swap(&mut tx, &mut ty);
        }

        s >>= 1;
    }

    Ok(TZ_VALUES[z as usize] + d)
}
