//! Straight-line movement on the grid.
//!
//! Paths are rasterized with an integer digital-line walk. Both error terms
//! are scaled by two so the walk stays in integers; when the error is
//! exactly zero the walk steps diagonally. A path therefore never slips
//! between two blocked cells that touch only at a corner unless the line
//! passes exactly through that corner.

use crate::game::Coord;

/// Cells visited walking from `from` to `to`, both included, in order.
#[must_use]
pub fn line_cells(from: Coord, to: Coord) -> Vec<Coord> {
    let dx = (i64::from(to.x) - i64::from(from.x)).abs();
    let dy = (i64::from(to.y) - i64::from(from.y)).abs();
    let step_x = if to.x > from.x { 1 } else { -1 };
    let step_y = if to.y > from.y { 1 } else { -1 };
    let (dx2, dy2) = (dx * 2, dy * 2);
    let mut error = dx2 - dy2;

    let mut cells = Vec::with_capacity(usize::try_from(1 + dx + dy).unwrap_or(1));
    let (mut x, mut y) = (from.x, from.y);
    cells.push(from);

    while (x, y) != (to.x, to.y) {
        match error.cmp(&0) {
            std::cmp::Ordering::Greater => {
                x += step_x;
                error -= dy2;
            }
            std::cmp::Ordering::Less => {
                y += step_y;
                error += dx2;
            }
            std::cmp::Ordering::Equal => {
                x += step_x;
                y += step_y;
                error += dx2 - dy2;
            }
        }
        cells.push(Coord::new(x, y));
    }

    cells
}

/// Destination actually reached when a unit with `speed` heads for `to`.
///
/// Moves within `speed` (Euclidean) are unchanged. Longer moves are cut to
/// `speed` along the same direction; each component is truncated toward zero
/// so the displacement never exceeds `speed`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn clamp_destination(from: Coord, to: Coord, speed: u32) -> Coord {
    let dx = i64::from(to.x) - i64::from(from.x);
    let dy = i64::from(to.y) - i64::from(from.y);
    let reach = i64::from(speed);
    if dx * dx + dy * dy <= reach * reach {
        return to;
    }

    let distance = ((dx * dx + dy * dy) as f64).sqrt();
    let scaled_x = ((dx * reach) as f64 / distance).trunc() as i32;
    let scaled_y = ((dy * reach) as f64 / distance).trunc() as i32;
    Coord::new(from.x + scaled_x, from.y + scaled_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_single_cell() {
        let c = Coord::new(3, 3);
        assert_eq!(line_cells(c, c), vec![c]);
    }

    #[test]
    fn test_line_horizontal() {
        let cells = line_cells(Coord::new(0, 0), Coord::new(3, 0));
        assert_eq!(
            cells,
            vec![
                Coord::new(0, 0),
                Coord::new(1, 0),
                Coord::new(2, 0),
                Coord::new(3, 0)
            ]
        );
    }

    #[test]
    fn test_line_vertical_negative() {
        let cells = line_cells(Coord::new(2, 4), Coord::new(2, 1));
        assert_eq!(cells.len(), 4);
        assert_eq!(cells.last(), Some(&Coord::new(2, 1)));
    }

    #[test]
    fn test_line_diagonal_steps_both() {
        let cells = line_cells(Coord::new(0, 0), Coord::new(2, 2));
        assert_eq!(
            cells,
            vec![Coord::new(0, 0), Coord::new(1, 1), Coord::new(2, 2)]
        );
    }

    #[test]
    fn test_line_shallow_visits_side_cells() {
        // 2:1 slope touches every cell the segment crosses.
        let cells = line_cells(Coord::new(0, 0), Coord::new(4, 2));
        assert_eq!(cells.first(), Some(&Coord::new(0, 0)));
        assert_eq!(cells.last(), Some(&Coord::new(4, 2)));
        for pair in cells.windows(2) {
            let step = (pair[1].x - pair[0].x).abs() + (pair[1].y - pair[0].y).abs();
            assert!(step == 1 || step == 2);
        }
    }

    #[test]
    fn test_clamp_within_speed_unchanged() {
        let from = Coord::new(0, 0);
        assert_eq!(clamp_destination(from, Coord::new(3, 4), 5), Coord::new(3, 4));
    }

    #[test]
    fn test_clamp_axis_exact_speed() {
        let from = Coord::new(5, 5);
        assert_eq!(clamp_destination(from, Coord::new(25, 5), 10), Coord::new(15, 5));
        assert_eq!(clamp_destination(from, Coord::new(5, -30), 4), Coord::new(5, 1));
    }

    #[test]
    fn test_clamp_pythagorean_direction() {
        let from = Coord::new(0, 0);
        assert_eq!(clamp_destination(from, Coord::new(30, 40), 10), Coord::new(6, 8));
    }
}
