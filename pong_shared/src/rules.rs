//! Rally rules: racket returns, points and the arena that ties the bodies
//! together.

use std::f32::consts::PI;

use crate::{
    math::Vec2f,
    physics::{
        Ball, Racket, Side, BALL_RADIUS, BALL_VELOCITY, BALL_X_LIMIT, RACKET_HEIGHT, RACKET_WIDTH,
    },
};

/// Maximum return angle as a fraction of $\pi$, reached at the racket tips.
pub const SPIN_FACTOR: f32 = 0.7;

/// Points scored by each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn of(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn award(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }
}

/// Notable outcome of one rules evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RallyEvent {
    /// The racket on this side sent the ball back.
    Return(Side),
    /// This side scored a point.
    Point(Side),
}

fn is_touching(ball: &Ball, racket: &Racket) -> bool {
    let d = ball.position() - racket.position();
    d.x.abs() < BALL_RADIUS + RACKET_WIDTH / 2.0 && d.y.abs() < RACKET_HEIGHT / 2.0
}

/// Return angle for a hit, proportional to the distance from the racket
/// center.
fn return_angle(ball: &Ball, racket: &Racket) -> f32 {
    let dy = ball.position().y - racket.position().y;
    SPIN_FACTOR * dy / RACKET_HEIGHT * PI
}

/// Evaluates returns and points for the racket the ball is heading to.
///
/// Only the side matching the sign of the ball's horizontal velocity is
/// considered. A return and a point can both happen in the same evaluation
/// if the ball is already past the goal line; the point wins.
pub fn referee(
    ball: &mut Ball,
    left: &Racket,
    right: &Racket,
    score: &mut Score,
) -> Option<RallyEvent> {
    let mut velocity = ball.velocity();
    let position = ball.position();
    let mut event = None;

    if velocity.x > 0.0 {
        if position.x < right.position().x && is_touching(ball, right) {
            let angle = return_angle(ball, right);
            velocity = Vec2f::from_angle(PI - angle, BALL_VELOCITY);
            event = Some(RallyEvent::Return(Side::Right));
        }

        if position.x > BALL_X_LIMIT {
            score.award(Side::Left);
            velocity.x = -velocity.x;
            ball.reset_position();
            event = Some(RallyEvent::Point(Side::Left));
        }
    } else {
        if position.x > left.position().x && is_touching(ball, left) {
            let angle = return_angle(ball, left);
            velocity = Vec2f::from_angle(angle, BALL_VELOCITY);
            event = Some(RallyEvent::Return(Side::Left));
        }

        if position.x < -BALL_X_LIMIT {
            score.award(Side::Right);
            velocity.x = -velocity.x;
            ball.reset_position();
            event = Some(RallyEvent::Point(Side::Right));
        }
    }

    ball.set_velocity(velocity);
    event
}

/// Everything the authoritative simulation owns: the ball, both rackets and
/// the score.
#[derive(Debug, Clone)]
pub struct Arena {
    pub ball: Ball,
    pub left: Racket,
    pub right: Racket,
    pub score: Score,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::with_ball(Ball::new())
    }

    pub fn with_ball(ball: Ball) -> Self {
        Self {
            ball,
            left: Racket::new(Side::Left),
            right: Racket::new(Side::Right),
            score: Score::default(),
        }
    }

    pub fn racket(&self, side: Side) -> &Racket {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn racket_mut(&mut self, side: Side) -> &mut Racket {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Advances every body by `dt` seconds, then applies the rules once.
    pub fn update(&mut self, dt: f32) -> Option<RallyEvent> {
        self.ball.update(dt);
        self.left.update(dt);
        self.right.update(dt);
        referee(&mut self.ball, &self.left, &self.right, &mut self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Move, RACKET_POSITION};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn center_hit_on_right_racket_goes_straight_back() {
        let ball = Ball::launched(
            Vec2f::new(RACKET_POSITION - 2.5, 0.0),
            Vec2f::new(BALL_VELOCITY, 0.0),
        );
        let mut arena = Arena::with_ball(ball);

        let event = arena.update(0.0);

        assert_eq!(event, Some(RallyEvent::Return(Side::Right)));
        let v = arena.ball.velocity();
        assert!(approx(v.x, -BALL_VELOCITY), "vx = {}", v.x);
        assert!(approx(v.y, 0.0), "vy = {}", v.y);
        assert!(approx(v.angle().abs(), PI));
    }

    #[test]
    fn off_center_hit_on_left_racket_adds_spin() {
        let ball = Ball::launched(
            Vec2f::new(-RACKET_POSITION + 2.5, 5.0),
            Vec2f::new(-BALL_VELOCITY, 0.0),
        );
        let mut arena = Arena::with_ball(ball);

        assert_eq!(arena.update(0.0), Some(RallyEvent::Return(Side::Left)));

        let expected = SPIN_FACTOR * 5.0 / RACKET_HEIGHT * PI;
        let v = arena.ball.velocity();
        assert!(approx(v.angle(), expected));
        assert!(approx(v.length(), BALL_VELOCITY));
        assert!(v.x > 0.0 && v.y > 0.0);
    }

    #[test]
    fn miss_on_the_right_scores_for_left() {
        let ball = Ball::launched(
            Vec2f::new(BALL_X_LIMIT + 0.5, 30.0),
            Vec2f::new(BALL_VELOCITY, 10.0),
        );
        let mut arena = Arena::with_ball(ball);

        assert_eq!(arena.update(0.0), Some(RallyEvent::Point(Side::Left)));
        assert_eq!(arena.score, Score { left: 1, right: 0 });
        assert_eq!(arena.ball.position(), Vec2f::ZERO);
        assert_eq!(arena.ball.velocity(), Vec2f::new(-BALL_VELOCITY, 10.0));
    }

    #[test]
    fn unattended_serve_scores_for_right() {
        let mut arena = Arena::new();
        // Move the left racket out of the ball's path.
        arena.left.set_move(Move::Down);

        let mut event = None;
        for _ in 0..200 {
            if let Some(e) = arena.update(0.0101) {
                event = Some(e);
                break;
            }
        }

        assert_eq!(event, Some(RallyEvent::Point(Side::Right)));
        assert_eq!(arena.score.of(Side::Right), 1);
        assert_eq!(arena.score.of(Side::Left), 0);
        assert_eq!(arena.ball.position(), Vec2f::ZERO);
        assert!(arena.ball.velocity().x > 0.0);
    }

    #[test]
    fn ball_moving_away_is_ignored() {
        let ball = Ball::launched(
            Vec2f::new(RACKET_POSITION - 2.5, 0.0),
            Vec2f::new(-BALL_VELOCITY, 0.0),
        );
        let mut arena = Arena::with_ball(ball);

        assert_eq!(arena.update(0.0), None);
        assert_eq!(arena.ball.velocity(), Vec2f::new(-BALL_VELOCITY, 0.0));
    }
}
