//! Edge shrink: 4-connected erosion that trims the halo left around a subject.

use crate::mask::Mask;

/// Default number of edge-shrink rounds.
pub const DEFAULT_EDGE_SHRINK: u32 = 1;

const NEIGHBORS_4: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Apply `iterations` rounds of erosion to `mask`.
///
/// In each round a set pixel with any in-bounds 4-neighbour unset becomes
/// unset. Every round reads the previous round's result, never its own
/// partial output, so the erosion radius is exactly `iterations` pixels.
/// Zero iterations returns the mask unchanged.
#[must_use]
pub fn edge_shrink(mask: &Mask, iterations: u32) -> Mask {
    let mut current = mask.clone();
    for _ in 0..iterations {
        let next = shrink_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn shrink_once(mask: &Mask) -> Mask {
    let (w, h) = mask.dimensions();
    let mut next = mask.clone();
    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }
            let touches_foreground = NEIGHBORS_4.iter().any(|&(dx, dy)| {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                    return false;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let neighbor = mask.get(nx as u32, ny as u32);
                !neighbor
            });
            if touches_foreground {
                next.set(x, y, false);
            }
        }
    }
    next
}
