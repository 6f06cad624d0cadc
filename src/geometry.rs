//! Displacement math for the `move` command.
//!
//! A move is one or two `DISTANCE DIRECTION` legs. Directions are compass
//! words (`n`, `south`, ...) giving a north/east offset from the current
//! position, body words (`fwd`, `aft`, `port`, `stb`) giving a
//! forward/starboard offset, or, for a single leg, an integer bearing in
//! degrees.

/// Coordinate frame of a relative position target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// North/east offset from the current position.
    LocalOffsetNed,
    /// Forward/starboard offset in the vehicle's body frame.
    BodyOffsetFrd,
}

/// Moves where neither axis exceeds this many metres are not sent.
pub const MIN_DISPLACEMENT: f64 = 0.5;

/// Result of composing the legs of a `move`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub frame: Frame,
    /// Metres north (local) or forward (body).
    pub x: f64,
    /// Metres east (local) or starboard (body).
    pub y: f64,
}

impl Displacement {
    /// `true` when the move is too small to be worth sending.
    #[must_use]
    pub fn is_negligible(&self) -> bool {
        self.x.abs() <= MIN_DISPLACEMENT && self.y.abs() <= MIN_DISPLACEMENT
    }
}

/// Direction words for the two axes of a frame.
struct Axes {
    pos_x: &'static [&'static str],
    neg_x: &'static [&'static str],
    pos_y: &'static [&'static str],
    neg_y: &'static [&'static str],
}

const COMPASS: Axes = Axes {
    pos_x: &["n", "north"],
    neg_x: &["s", "south"],
    pos_y: &["e", "east"],
    neg_y: &["w", "west"],
};

const BODY: Axes = Axes {
    pos_x: &["fwd"],
    neg_x: &["aft"],
    pos_y: &["stb"],
    neg_y: &["port"],
};

impl Axes {
    fn contains(&self, token: &str) -> bool {
        [self.pos_x, self.neg_x, self.pos_y, self.neg_y]
            .iter()
            .any(|set| set.contains(&token))
    }

    /// Contribution of one leg to each axis. Unknown tokens contribute nothing.
    fn project(&self, distance: f64, token: &str) -> (f64, f64) {
        let signed = |pos: &[&str], neg: &[&str]| {
            if pos.contains(&token) {
                distance
            } else if neg.contains(&token) {
                -distance
            } else {
                0.0
            }
        };
        (
            signed(self.pos_x, self.neg_x),
            signed(self.pos_y, self.neg_y),
        )
    }
}

/// Offset of `distance` metres along `bearing_deg` (0 = north, 90 = east).
#[must_use]
pub fn from_bearing(distance: f64, bearing_deg: f64) -> Displacement {
    let rad = bearing_deg.to_radians();
    Displacement {
        frame: Frame::LocalOffsetNed,
        x: distance * rad.cos(),
        y: distance * rad.sin(),
    }
}

/// Compose a displacement from the first leg and an optional second leg.
///
/// Direction tokens are matched case-insensitively. A lone leg whose
/// direction is an integer is a bearing. Otherwise the compass frame is used
/// when every direction is a compass word, and the body frame in all other
/// cases.
#[must_use]
pub fn displacement(distance1: f64, direction1: &str, second: Option<(f64, &str)>) -> Displacement {
    let direction1 = direction1.to_ascii_lowercase();

    if second.is_none() {
        if let Ok(bearing) = direction1.parse::<i32>() {
            return from_bearing(distance1, f64::from(bearing));
        }
    }

    let (distance2, direction2) = match second {
        Some((d, dir)) => (d, dir.to_ascii_lowercase()),
        None => (0.0, String::new()),
    };

    let compass = COMPASS.contains(&direction1)
        && (direction2.is_empty() || COMPASS.contains(&direction2));
    let (frame, axes) = if compass {
        (Frame::LocalOffsetNed, &COMPASS)
    } else {
        (Frame::BodyOffsetFrd, &BODY)
    };

    let (x1, y1) = axes.project(distance1, &direction1);
    let (x2, y2) = axes.project(distance2, &direction2);
    Displacement {
        frame,
        x: x1 + x2,
        y: y1 + y2,
    }
}
