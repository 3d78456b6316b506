use crate::collision::Mask;
use crate::config::{ObstacleConfig, PhysicsConfig, SpriteConfig};
use std::sync::Arc;

/// Silhouettes shared by every agent and obstacle of a simulation.
#[derive(Debug, Clone)]
pub struct Silhouettes {
    pub agent: Arc<Mask>,
    pub top: Arc<Mask>,
    pub bottom: Arc<Mask>,
}

impl Silhouettes {
    pub fn new(sprite: &SpriteConfig) -> Self {
        let piece = |cap_at_top| {
            Arc::new(Mask::piece(
                sprite.obstacle_width,
                sprite.obstacle_height,
                sprite.cap_height,
                sprite.cap_inset,
                cap_at_top,
            ))
        };
        Self {
            agent: Arc::new(Mask::ellipse(sprite.agent_width, sprite.agent_height)),
            // The top piece hangs down, so its cap faces the gap from above.
            top: piece(false),
            bottom: piece(true),
        }
    }
}

/// Controllable entity moving vertically at a fixed horizontal position.
#[derive(Debug, Clone)]
pub struct Agent {
    x: i32,
    y: f64,
    vel: f64,
    ticks_since_jump: u32,
    jump_y: f64,
    tilt: f64,
    alive: bool,
    mask: Arc<Mask>,
}

impl Agent {
    /// Create a resting agent at `(x, y)`.
    pub fn new(x: i32, y: f64, mask: Arc<Mask>) -> Self {
        Self {
            x,
            y,
            vel: 0.0,
            ticks_since_jump: 0,
            jump_y: y,
            tilt: 0.0,
            alive: true,
            mask,
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }

    #[cfg(test)]
    pub fn ticks_since_jump(&self) -> u32 {
        self.ticks_since_jump
    }

    pub fn height(&self) -> i32 {
        self.mask.height()
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn kill(&mut self) {
        self.alive = false;
    }

    /// Apply one tick of physics, jumping first if requested.
    ///
    /// Returns the displacement applied this tick.
    pub fn advance(&mut self, jump: bool, physics: &PhysicsConfig) -> f64 {
        if jump {
            self.vel = physics.jump_velocity;
            self.ticks_since_jump = 0;
            self.jump_y = self.y;
        }

        self.ticks_since_jump += 1;
        let t = self.ticks_since_jump as f64;

        let mut d = self.vel * t + physics.gravity * t * t;
        if d >= physics.max_fall {
            d = physics.max_fall;
        }
        if d < 0.0 {
            d += physics.rise_bias;
        }
        self.y += d;

        if d < 0.0 || self.y < self.jump_y + physics.tilt_margin {
            self.tilt = self.tilt.max(physics.max_tilt);
        } else {
            self.tilt = (self.tilt - physics.tilt_rate).max(physics.min_tilt);
        }

        d
    }
}

/// Top/bottom barrier pair with a vertical gap.
#[derive(Debug, Clone)]
pub struct Obstacle {
    x: i32,
    gap_top: i32,
    gap_bottom: i32,
    passed: bool,
    top_mask: Arc<Mask>,
    bottom_mask: Arc<Mask>,
}

impl Obstacle {
    /// Create an obstacle whose gap spans `[gap_top, gap_top + gap)`.
    pub fn new(x: i32, gap_top: i32, cfg: &ObstacleConfig, silhouettes: &Silhouettes) -> Self {
        Self {
            x,
            gap_top,
            gap_bottom: gap_top + cfg.gap,
            passed: false,
            top_mask: silhouettes.top.clone(),
            bottom_mask: silhouettes.bottom.clone(),
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn width(&self) -> i32 {
        self.top_mask.width()
    }

    /// Horizontal position of the trailing (right) edge.
    pub fn trailing_edge(&self) -> i32 {
        self.x + self.width()
    }

    pub fn gap_top(&self) -> i32 {
        self.gap_top
    }

    pub fn gap_bottom(&self) -> i32 {
        self.gap_bottom
    }

    /// Vertical position of the top piece's upper edge.
    pub fn top_y(&self) -> i32 {
        self.gap_top - self.top_mask.height()
    }

    /// Vertical position of the bottom piece's upper edge.
    pub fn bottom_y(&self) -> i32 {
        self.gap_bottom
    }

    pub fn top_mask(&self) -> &Mask {
        &self.top_mask
    }

    pub fn bottom_mask(&self) -> &Mask {
        &self.bottom_mask
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn mark_passed(&mut self) {
        self.passed = true;
    }

    pub fn shift(&mut self, dx: i32) {
        self.x -= dx;
    }
}
