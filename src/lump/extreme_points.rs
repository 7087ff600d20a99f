use crate::error::Result;
use crate::model_checking::imdp::Interval;

/// Slack when comparing the mass of a point against one.
pub const SUM_EPS: f64 = 1e-9;

/// Enumerates the vertices of `{ p : lower <= p <= upper, sum(p) = 1 }`.
///
/// Every vertex has all classes at one of their bounds except at most one,
/// which takes the remaining mass.
#[derive(Debug, Default)]
pub struct ExtremePointsEnumerator {
    point: Vec<f64>,
}

impl ExtremePointsEnumerator {
    pub fn new() -> ExtremePointsEnumerator {
        ExtremePointsEnumerator::default()
    }

    /// Call `handler` with each extreme point of `intervals`. A handler
    /// returning `true` stops the enumeration; the result tells whether
    /// that happened.
    pub fn enumerate<F>(&mut self, intervals: &[Interval], mut handler: F) -> Result<bool>
    where
        F: FnMut(&[f64]) -> Result<bool>,
    {
        self.point.clear();
        self.point.resize(intervals.len(), 0.0);
        enumerate_rec(intervals, &mut self.point, &mut handler, 0, 0.0, None)
    }
}

fn enumerate_rec<F>(
    intervals: &[Interval],
    point: &mut Vec<f64>,
    handler: &mut F,
    level: usize,
    sum: f64,
    unassigned: Option<usize>,
) -> Result<bool>
where
    F: FnMut(&[f64]) -> Result<bool>,
{
    if sum > 1.0 + SUM_EPS {
        return Ok(false);
    }
    if level == intervals.len() {
        return match unassigned {
            Some(u) => {
                let rest = 1.0 - sum;
                // a rest on a bound is emitted by the branch assigning it
                if rest > intervals[u].lower + SUM_EPS && rest < intervals[u].upper - SUM_EPS {
                    point[u] = rest;
                    handler(point)
                } else {
                    Ok(false)
                }
            }
            None if (sum - 1.0).abs() <= SUM_EPS => handler(point),
            None => Ok(false),
        };
    }
    let interval = intervals[level];
    if unassigned.is_none() && !interval.is_point() {
        if enumerate_rec(intervals, point, handler, level + 1, sum, Some(level))? {
            return Ok(true);
        }
    }
    point[level] = interval.lower;
    if enumerate_rec(intervals, point, handler, level + 1, sum + interval.lower, unassigned)? {
        return Ok(true);
    }
    if !interval.is_point() {
        point[level] = interval.upper;
        if enumerate_rec(intervals, point, handler, level + 1, sum + interval.upper, unassigned)? {
            return Ok(true);
        }
    }
    Ok(false)
}
