use std::cmp::Ordering;
use std::fmt;
use std::ops;

/// A number is either an integer or a float. Mixed operations promote to float.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn is_int(self) -> bool {
        matches!(self, Number::Int(_))
    }

    pub fn is_float(self) -> bool {
        matches!(self, Number::Float(_))
    }

    /// Truncates floats.
    pub fn to_int(self) -> i64 {
        match self {
            Number::Int(i) => i,
            Number::Float(f) => f as i64,
        }
    }

    pub fn to_float(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn promote(
        self,
        rhs: Number,
        int: impl FnOnce(i64, i64) -> i64,
        float: impl FnOnce(f64, f64) -> f64,
    ) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Number::Int(int(a, b)),
            (a, b) => Number::Float(float(a.to_float(), b.to_float())),
        }
    }

    /// Integer division truncates. Returns `None` when dividing an integer by
    /// integer zero.
    pub fn checked_div(self, rhs: Number) -> Option<Number> {
        if let (Number::Int(_), Number::Int(0)) = (self, rhs) {
            return None;
        }
        Some(self.promote(rhs, i64::wrapping_div, |a, b| a / b))
    }
}

impl ops::Add for Number {
    type Output = Number;

    fn add(self, rhs: Number) -> Number {
        self.promote(rhs, i64::wrapping_add, |a, b| a + b)
    }
}

impl ops::Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Number) -> Number {
        self.promote(rhs, i64::wrapping_sub, |a, b| a - b)
    }
}

impl ops::Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Number) -> Number {
        self.promote(rhs, i64::wrapping_mul, |a, b| a * b)
    }
}

impl ops::Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => Number::Int(i.wrapping_neg()),
            Number::Float(f) => Number::Float(-f),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.to_float() == b.to_float(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (a, b) => a.to_float().partial_cmp(&b.to_float()),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{}", i),
            // keep a fraction so the printed form reads back as a float
            Number::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}
