//! Fixed-step physics.
//!
//! Every body accumulates wall-clock time into a private remainder and
//! consumes it in sub-steps of exactly [`STEP`] seconds. The outcome of a run
//! depends only on the total time fed in, not on how it was chunked across
//! frames.

use crate::math::Vec2f;

/// Sub-step duration in seconds.
pub const STEP: f32 = 0.01;

pub const GROUND_WIDTH: f32 = 200.0;
pub const GROUND_HEIGHT: f32 = 100.0;

pub const BALL_RADIUS: f32 = 2.0;
pub const BALL_VELOCITY: f32 = 100.0;

pub const RACKET_WIDTH: f32 = 2.0;
pub const RACKET_HEIGHT: f32 = 20.0;
/// Distance of each racket from the center line.
pub const RACKET_POSITION: f32 = 75.0;
pub const RACKET_VELOCITY: f32 = 50.0;

/// Largest |y| a racket center may reach.
pub const RACKET_Y_LIMIT: f32 = (GROUND_HEIGHT - RACKET_HEIGHT) / 2.0;
/// Largest |y| the ball center may reach.
pub const BALL_Y_LIMIT: f32 = GROUND_HEIGHT / 2.0 - BALL_RADIUS;
/// Largest |x| the ball center may reach before a point is scored.
pub const BALL_X_LIMIT: f32 = GROUND_WIDTH / 2.0 - BALL_RADIUS;

/// Time accumulator driving the sub-steps of one body.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stepper {
    remainder: f32,
}

impl Stepper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `dt` seconds and returns how many whole sub-steps are now due.
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, dt: f32) -> u32 {
        if dt.is_finite() && dt > 0.0 {
            self.remainder += dt;
        }

        let mut steps = 0;
        while self.remainder > STEP {
            self.remainder -= STEP;
            steps += 1;
        }
        steps
    }

    /// Time not yet consumed by a sub-step.
    pub fn remainder(&self) -> f32 {
        self.remainder
    }
}

/// Side of the ground a racket defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Movement intent of a racket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Move {
    Up,
    #[default]
    Stop,
    Down,
}

impl Move {
    /// Vertical velocity this intent produces.
    pub fn velocity(self) -> f32 {
        match self {
            Move::Up => -RACKET_VELOCITY,
            Move::Stop => 0.0,
            Move::Down => RACKET_VELOCITY,
        }
    }
}

/// A racket moving along its side of the ground.
#[derive(Debug, Clone)]
pub struct Racket {
    side: Side,
    position: Vec2f,
    velocity: Vec2f,
    intent: Move,
    stepper: Stepper,
}

impl Racket {
    pub fn new(side: Side) -> Self {
        let x = match side {
            Side::Left => -RACKET_POSITION,
            Side::Right => RACKET_POSITION,
        };
        Self {
            side,
            position: Vec2f::new(x, 0.0),
            velocity: Vec2f::ZERO,
            intent: Move::Stop,
            stepper: Stepper::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn position(&self) -> Vec2f {
        self.position
    }

    pub fn velocity(&self) -> Vec2f {
        self.velocity
    }

    pub fn intent(&self) -> Move {
        self.intent
    }

    pub fn set_move(&mut self, intent: Move) {
        self.intent = intent;
    }

    /// Advances by `dt` seconds of wall-clock time. Returns the number of
    /// sub-steps executed.
    pub fn update(&mut self, dt: f32) -> u32 {
        let steps = self.stepper.advance(dt);
        for _ in 0..steps {
            self.step();
        }
        steps
    }

    fn step(&mut self) {
        self.velocity.y = self.intent.velocity();
        self.position += self.velocity * STEP;
        self.position.y = self.position.y.clamp(-RACKET_Y_LIMIT, RACKET_Y_LIMIT);
    }
}

/// The ball.
#[derive(Debug, Clone)]
pub struct Ball {
    position: Vec2f,
    velocity: Vec2f,
    stepper: Stepper,
}

impl Default for Ball {
    fn default() -> Self {
        Self::new()
    }
}

impl Ball {
    /// A ball at the center, served towards the left racket.
    pub fn new() -> Self {
        Self::launched(Vec2f::ZERO, Vec2f::new(-BALL_VELOCITY, 0.0))
    }

    pub fn launched(position: Vec2f, velocity: Vec2f) -> Self {
        Self {
            position,
            velocity,
            stepper: Stepper::new(),
        }
    }

    pub fn position(&self) -> Vec2f {
        self.position
    }

    pub fn velocity(&self) -> Vec2f {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec2f) {
        self.velocity = velocity;
    }

    pub fn reset_position(&mut self) {
        self.position = Vec2f::ZERO;
    }

    /// Advances by `dt` seconds of wall-clock time. Returns the number of
    /// wall bounces that happened.
    pub fn update(&mut self, dt: f32) -> u32 {
        let steps = self.stepper.advance(dt);
        let mut bounces = 0;
        for _ in 0..steps {
            if self.step() {
                bounces += 1;
            }
        }
        bounces
    }

    fn step(&mut self) -> bool {
        self.position += self.velocity * STEP;

        if self.position.y > BALL_Y_LIMIT {
            self.velocity.y = -self.velocity.y;
            self.position.y = BALL_Y_LIMIT;
            return true;
        }
        if self.position.y < -BALL_Y_LIMIT {
            self.velocity.y = -self.velocity.y;
            self.position.y = -BALL_Y_LIMIT;
            return true;
        }
        false
    }
}
