//! Client-side view of the arena.
//!
//! The server is authoritative. The view holds the latest snapshot and, if
//! enabled, moves bodies by their last known velocity until the next one.

use pong_shared::{
    math::Vec2f,
    physics::{BALL_Y_LIMIT, RACKET_POSITION, RACKET_Y_LIMIT},
    protocol::{BodyState, StateSnapshot},
    rules::Score,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientView {
    pub ball: BodyState,
    pub left: BodyState,
    pub right: BodyState,
    pub score: Score,
}

impl Default for ClientView {
    fn default() -> Self {
        let racket = |x| BodyState {
            position: Vec2f::new(x, 0.0),
            velocity: Vec2f::ZERO,
        };
        Self {
            ball: BodyState::default(),
            left: racket(-RACKET_POSITION),
            right: racket(RACKET_POSITION),
            score: Score::default(),
        }
    }
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the view with `snap`.
    pub fn apply(&mut self, snap: &StateSnapshot) {
        self.ball = snap.ball;
        self.left = snap.left.body;
        self.right = snap.right.body;
        self.score = Score {
            left: snap.left.points,
            right: snap.right.points,
        };
    }

    /// Dead reckoning between snapshots. The ball bounces off the top and
    /// bottom walls like the server's; rackets stop at them.
    pub fn advance(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        let ball = &mut self.ball;
        ball.position += ball.velocity * dt;
        if ball.position.y.abs() > BALL_Y_LIMIT {
            ball.position.y = ball.position.y.clamp(-BALL_Y_LIMIT, BALL_Y_LIMIT);
            ball.velocity.y = -ball.velocity.y;
        }

        for racket in [&mut self.left, &mut self.right] {
            racket.position += racket.velocity * dt;
            racket.position.y = racket.position.y.clamp(-RACKET_Y_LIMIT, RACKET_Y_LIMIT);
        }
    }
}
