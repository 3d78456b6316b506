//! Pixel-exact collision between agent and obstacle silhouettes.

use crate::model::{Agent, Obstacle};

/// Opaque-pixel silhouette of a sprite.
///
/// Built once and never modified afterwards; instances share it through `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: i32,
    height: i32,
    bits: Vec<bool>,
    n_opaque: usize,
}

impl Mask {
    /// Build a mask by evaluating `opaque` at every pixel.
    pub fn from_fn<F>(width: i32, height: i32, opaque: F) -> Self
    where
        F: Fn(i32, i32) -> bool,
    {
        let width = width.max(0);
        let height = height.max(0);
        let mut bits = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(opaque(x, y));
            }
        }
        let n_opaque = bits.iter().filter(|&&bit| bit).count();
        Self {
            width,
            height,
            bits,
            n_opaque,
        }
    }

    /// Ellipse inscribed in a `width x height` rectangle.
    pub fn ellipse(width: i32, height: i32) -> Self {
        let a = width as f64 / 2.0;
        let b = height as f64 / 2.0;
        Self::from_fn(width, height, |x, y| {
            let dx = (x as f64 + 0.5 - a) / a;
            let dy = (y as f64 + 0.5 - b) / b;
            dx * dx + dy * dy <= 1.0
        })
    }

    /// Obstacle piece: an inset body with a full-width cap band at one end.
    pub fn piece(width: i32, height: i32, cap_height: i32, inset: i32, cap_at_top: bool) -> Self {
        Self::from_fn(width, height, |x, y| {
            let in_cap = if cap_at_top {
                y < cap_height
            } else {
                y >= height - cap_height
            };
            in_cap || (x >= inset && x < width - inset)
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return false;
        }
        self.bits[(y * self.width + x) as usize]
    }

    /// Number of opaque pixels.
    #[cfg(test)]
    pub fn count(&self) -> usize {
        self.n_opaque
    }

    pub fn is_empty(&self) -> bool {
        self.n_opaque == 0
    }

    /// First opaque pixel (in this mask's coordinates) shared with `other`,
    /// where `other`'s origin sits at `offset` relative to this mask's origin.
    pub fn overlap(&self, other: &Mask, offset: (i32, i32)) -> Option<(i32, i32)> {
        let (ox, oy) = offset;
        let x_min = ox.max(0);
        let x_max = (ox + other.width).min(self.width);
        let y_min = oy.max(0);
        let y_max = (oy + other.height).min(self.height);

        for y in y_min..y_max {
            for x in x_min..x_max {
                if self.get(x, y) && other.get(x - ox, y - oy) {
                    return Some((x, y));
                }
            }
        }
        None
    }
}

/// Whether any opaque pixel of the agent overlaps either obstacle piece.
///
/// An agent or piece without opaque pixels never collides.
pub fn collides(agent: &Agent, obstacle: &Obstacle) -> bool {
    let agent_mask = agent.mask();
    if agent_mask.is_empty() {
        log::trace!("agent silhouette is empty, skipping collision test");
        return false;
    }

    let agent_y = agent.y().round() as i32;
    let dx = obstacle.x() - agent.x();

    let pieces = [
        (obstacle.top_mask(), obstacle.top_y()),
        (obstacle.bottom_mask(), obstacle.bottom_y()),
    ];
    pieces
        .iter()
        .any(|(mask, piece_y)| agent_mask.overlap(mask, (dx, piece_y - agent_y)).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::Silhouettes;

    fn setup() -> (Config, Silhouettes) {
        let cfg = Config::default();
        let silhouettes = Silhouettes::new(&cfg.sprite);
        (cfg, silhouettes)
    }

    #[test]
    fn ellipse_leaves_corners_transparent() {
        let mask = Mask::ellipse(68, 48);
        assert!(!mask.get(0, 0));
        assert!(!mask.get(67, 47));
        assert!(mask.get(34, 24));
        assert!(mask.get(0, 24));
        assert!(mask.count() < 68 * 48);
    }

    #[test]
    fn piece_cap_is_wider_than_body() {
        let mask = Mask::piece(104, 640, 48, 4, true);
        assert!(mask.get(0, 0));
        assert!(!mask.get(0, 100));
        assert!(mask.get(4, 100));
        assert!(!mask.get(100, 639));
    }

    #[test]
    fn overlap_ignores_transparent_corners() {
        let ellipse = Mask::ellipse(68, 48);
        let block = Mask::from_fn(4, 4, |_, _| true);
        // Block covers only the ellipse's transparent top-left corner.
        assert_eq!(ellipse.overlap(&block, (-2, -2)), None);
        assert!(ellipse.overlap(&block, (32, 22)).is_some());
        assert_eq!(ellipse.overlap(&block, (100, 0)), None);
    }

    #[test]
    fn empty_mask_never_overlaps() {
        let empty = Mask::from_fn(10, 10, |_, _| false);
        let full = Mask::from_fn(10, 10, |_, _| true);
        assert_eq!(empty.overlap(&full, (0, 0)), None);
        assert_eq!(Mask::from_fn(0, 0, |_, _| true).count(), 0);
    }

    #[test]
    fn opaque_count_is_fixed_at_construction() {
        let stripes = Mask::from_fn(6, 5, |x, _| x % 2 == 0);
        let scanned = (0..5)
            .flat_map(|y| (0..6).map(move |x| (x, y)))
            .filter(|&(x, y)| stripes.get(x, y))
            .count();
        assert_eq!(stripes.count(), scanned);
        assert_eq!(stripes.count(), 15);
        assert!(!stripes.is_empty());
        assert!(Mask::from_fn(6, 5, |_, _| false).is_empty());
        assert!(Mask::from_fn(0, 3, |_, _| true).is_empty());
    }

    #[test]
    fn agent_inside_gap_does_not_collide() {
        let (cfg, sil) = setup();
        let agent = Agent::new(230, 260.0, sil.agent.clone());
        let inside = Obstacle::new(200, 250, &cfg.obstacle, &sil);
        let elsewhere = Obstacle::new(200, 0, &cfg.obstacle, &sil);
        assert!(!collides(&agent, &inside));
        // Same x, gap range [0, 200) does not contain the agent.
        assert!(collides(&agent, &elsewhere));
    }

    #[test]
    fn agent_touching_top_piece_collides() {
        let (cfg, sil) = setup();
        let obstacle = Obstacle::new(200, 300, &cfg.obstacle, &sil);
        assert!(collides(&Agent::new(230, 290.0, sil.agent.clone()), &obstacle));
        assert!(collides(&Agent::new(230, 470.0, sil.agent.clone()), &obstacle));
        assert!(!collides(&Agent::new(230, 300.0, sil.agent.clone()), &obstacle));
    }

    #[test]
    fn collision_is_translation_invariant() {
        let (cfg, sil) = setup();
        for &(agent_y, gap_top, obstacle_x) in
            &[(260.0, 250, 200), (290.0, 300, 200), (100.0, 300, 280), (500.0, 90, 170)]
        {
            let reference = collides(
                &Agent::new(230, agent_y, sil.agent.clone()),
                &Obstacle::new(obstacle_x, gap_top, &cfg.obstacle, &sil),
            );
            for &(dx, dy) in &[(17, 0), (0, -33), (-41, 12)] {
                let agent = Agent::new(230 + dx, agent_y + dy as f64, sil.agent.clone());
                let obstacle = Obstacle::new(obstacle_x + dx, gap_top + dy, &cfg.obstacle, &sil);
                assert_eq!(collides(&agent, &obstacle), reference);
            }
        }
    }

    #[test]
    fn corner_clearance_depends_on_silhouette() {
        let (cfg, sil) = setup();
        // Agent's bounding box overlaps the bottom piece's top-left corner, but the
        // elliptical silhouette does not reach it.
        let obstacle = Obstacle::new(230 + 66, 100, &cfg.obstacle, &sil);
        let agent = Agent::new(230, 300.0 - 46.0, sil.agent.clone());
        assert!(!collides(&agent, &obstacle));
    }

    #[test]
    fn transparent_agent_never_collides() {
        let (cfg, sil) = setup();
        let ghost = std::sync::Arc::new(Mask::from_fn(68, 48, |_, _| false));
        let obstacle = Obstacle::new(230, 0, &cfg.obstacle, &sil);
        assert!(!collides(&Agent::new(230, 500.0, ghost), &obstacle));
    }
}
